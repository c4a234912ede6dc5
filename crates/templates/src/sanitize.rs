//! Field-value and field-name sanitization (§4.4.1). Every processor's
//! `transform` must route its output through here before it reaches a
//! [`QueueItem`][flowbridge_common::QueueItem]: the RPA provider rejects
//! HTML fragments, entity-encoded text, control characters and a handful of
//! punctuation characters in field names.

use flowbridge_common::{FieldMap, FieldValue};
use percent_encoding::percent_decode_str;

/// Characters the RPA provider is known to reject in field names. Treated as
/// a conservative, extensible subset rather than an exhaustive list — see
/// the open question on the provider's exact rejection set.
const FIELD_NAME_REPLACEMENTS: &[(char, &str)] = &[('@', "_at_"), ('.', "_dot_"), ('$', "_dollar_")];

/// Replaces forbidden characters in a field name and collapses the
/// underscore runs that replacement tends to produce, so
/// `"invoice@totals.usd"` becomes `"invoice_at_totals_dot_usd"` rather than
/// `"invoice_at__totals_dot_usd"`.
pub fn sanitize_field_name(name: &str) -> String {
    let mut replaced = String::with_capacity(name.len());
    for c in name.chars() {
        match FIELD_NAME_REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => replaced.push_str(to),
            None if c.is_ascii_alphanumeric() || c == '_' => replaced.push(c),
            None => replaced.push('_'),
        }
    }
    collapse_underscore_runs(&replaced)
}

fn collapse_underscore_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !last_was_underscore {
                out.push('_');
            }
            last_was_underscore = true;
        } else {
            out.push(c);
            last_was_underscore = false;
        }
    }
    out
}

/// Decodes the handful of HTML entities the platform is known to emit:
/// the named entities plus decimal and hex numeric references.
pub fn decode_html_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '&' {
            out.push(c);
            continue;
        }
        let rest = &s[i..];
        if let Some(end) = rest.find(';') {
            if end <= 10 {
                let entity = &rest[1..end];
                if let Some(decoded) = decode_one_entity(entity) {
                    out.push(decoded);
                    for _ in 0..end {
                        chars.next();
                    }
                    continue;
                }
            }
        }
        out.push('&');
    }
    out
}

fn decode_one_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        "nbsp" => return Some('\u{00a0}'),
        _ => {}
    }
    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    None
}

/// Strips control characters below 0x20 other than tab, newline and
/// carriage return (invariant #9).
pub fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Percent-decodes `s` if it's identifiable as a URL; otherwise returns it
/// unchanged. Non-UTF-8 decode results fall back to the original string
/// rather than producing replacement characters in provider-bound data.
pub fn percent_decode_if_url(s: &str) -> String {
    if !looks_like_url(s) {
        return s.to_string();
    }
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Whether `s` contains something that looks like an HTML tag: a `<`
/// eventually followed by a `>`.
fn looks_like_html(s: &str) -> bool {
    s.find('<')
        .and_then(|start| s[start..].find('>'))
        .is_some()
}

/// Extracts the first `href="..."` attribute value and the tag-stripped
/// inner text from an HTML-ish fragment. Either may be absent.
fn extract_html(s: &str) -> (Option<String>, String) {
    let href = extract_first_href(s);
    let mut text = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    (href, text.trim().to_string())
}

fn extract_first_href(s: &str) -> Option<String> {
    let marker = "href=\"";
    let start = s.find(marker)? + marker.len();
    let end = s[start..].find('"')? + start;
    Some(s[start..end].to_string())
}

/// Runs the full field-value sanitization pipeline on one string value:
/// HTML detection, entity decoding, URL percent-decoding, control-character
/// stripping (§4.4.1 steps 1-4, in that order). Returns the cleaned primary
/// value plus an optional extracted-URL sidecar value when `s` looked like
/// HTML and carried an `href`.
pub fn sanitize_string_value(s: &str) -> (String, Option<String>) {
    let (href, primary) = if looks_like_html(s) {
        let (href, text) = extract_html(s);
        (href, text)
    } else {
        (None, s.to_string())
    };
    let primary = decode_html_entities(&primary);
    let primary = percent_decode_if_url(&primary);
    let primary = strip_control_chars(&primary);
    let href = href.map(|h| {
        let h = decode_html_entities(&h);
        let h = percent_decode_if_url(&h);
        strip_control_chars(&h)
    });
    (primary, href)
}

/// Sanitizes every field in `fields`, producing a map whose keys match
/// `[A-Za-z0-9_]+` and whose string values contain no HTML, entities or
/// disallowed control characters. Non-string values pass through unchanged
/// apart from the key rename.
pub fn sanitize_fields(fields: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    for (name, value) in fields {
        let clean_name = sanitize_field_name(name);
        match value {
            FieldValue::String(s) => {
                let (primary, href) = sanitize_string_value(s);
                if let Some(href) = href {
                    out.insert(format!("{clean_name}_url"), FieldValue::String(href));
                    out.insert(format!("{clean_name}_text"), FieldValue::String(primary));
                } else {
                    out.insert(clean_name, FieldValue::String(primary));
                }
            }
            other => {
                out.insert(clean_name, other.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a@b", "a_at_b")]
    #[case("a.b", "a_dot_b")]
    #[case("a$b", "a_dollar_b")]
    #[case("plain_name", "plain_name")]
    fn sanitize_field_name_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_field_name(input), expected);
    }

    #[test]
    fn sanitizes_field_name_punctuation() {
        assert_eq!(sanitize_field_name("invoice@totals.usd"), "invoice_at_totals_dot_usd");
    }

    #[test]
    fn collapses_underscore_runs_in_field_names() {
        assert_eq!(sanitize_field_name("a@@b"), "a_at_at_b");
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(decode_html_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_html_entities("&#65;&#x42;"), "AB");
    }

    #[test]
    fn strips_disallowed_control_chars_but_keeps_whitespace() {
        let input = "a\u{0007}b\tc\nd";
        assert_eq!(strip_control_chars(input), "ab\tc\nd");
    }

    #[test]
    fn percent_decodes_urls_only() {
        assert_eq!(
            percent_decode_if_url("https://example.com/a%20b"),
            "https://example.com/a b"
        );
        assert_eq!(percent_decode_if_url("a%20b"), "a%20b");
    }

    #[test]
    fn extracts_href_and_text_from_html_fragment() {
        let (primary, href) = sanitize_string_value("<a href=\"https://x/y\">Click here</a>");
        assert_eq!(primary, "Click here");
        assert_eq!(href.as_deref(), Some("https://x/y"));
    }

    #[test]
    fn plain_string_passes_through_unchanged() {
        let (primary, href) = sanitize_string_value("no markup here");
        assert_eq!(primary, "no markup here");
        assert_eq!(href, None);
    }

    #[test]
    fn sanitize_fields_renames_keys_and_splits_html_values() {
        let mut fields = FieldMap::new();
        fields.insert(
            "author@email".to_string(),
            FieldValue::String("<a href=\"https://x/y\">Jane &amp; co</a>".to_string()),
        );
        fields.insert("size".to_string(), serde_json::json!(1024));
        let cleaned = sanitize_fields(&fields);
        assert_eq!(
            cleaned.get("author_at_email_url"),
            Some(&FieldValue::String("https://x/y".to_string()))
        );
        assert_eq!(
            cleaned.get("author_at_email_text"),
            Some(&FieldValue::String("Jane & co".to_string()))
        );
        assert_eq!(cleaned.get("size"), Some(&serde_json::json!(1024)));
    }
}
