use time::OffsetDateTime;

/// Normalizes an ISO-8601 timestamp string for comparison so that
/// `"2024-01-01T00:00:00.500Z"` and `"2024-01-01T00:00:00.5Z"` are treated
/// as equal. Only trailing zeros in the fractional-seconds component are
/// collapsed; the rest of the string is left untouched so this stays a
/// cheap string operation rather than a full timestamp parse.
pub fn normalize_timestamp_str(value: &str) -> String {
    let Some(dot) = value.find('.') else {
        return value.to_string();
    };
    let (head, tail) = value.split_at(dot + 1);
    let split_at = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());
    let (fraction, rest) = tail.split_at(split_at);
    let trimmed = fraction.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{}{}", &value[..dot], rest)
    } else {
        format!("{head}{trimmed}{rest}")
    }
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
