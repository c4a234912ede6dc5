use crate::{Destination, DestinationError, ForwardMode, RoutingSpec, TenantTag};

/// Maps a legacy key name onto its canonical counterpart (§4.8's alias
/// table: `processor` ≡ `destination`, `env` ≡ `tenant`).
fn canonical_key(key: &str) -> &str {
    match key {
        "processor" => "destination",
        "env" => "tenant",
        other => other,
    }
}

struct Pairs(Vec<(String, String)>);

impl Pairs {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn split_pairs(chunk: &str, pair_sep: char) -> Pairs {
    let pairs = chunk
        .split(pair_sep)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|part| {
            let (key, value) = part.split_once(':')?;
            Some((canonical_key(key.trim()).to_string(), value.trim().to_string()))
        })
        .collect();
    Pairs(pairs)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Mirrors the forwarder's own loopback exemption (§4.6): a destination
/// pointing at a local sink never needs TLS, so the grammar shouldn't reject
/// it before the forwarder even gets a chance to dispatch it.
fn is_acceptable_forward_url(url: &str) -> bool {
    url.starts_with("https://")
        || url.starts_with("http://127.0.0.1")
        || url.starts_with("http://localhost")
        || url.starts_with("http://[::1]")
}

fn build_forward(pairs: &Pairs) -> Result<Destination, DestinationError> {
    let url = pairs.get("url").unwrap_or("");
    if !is_acceptable_forward_url(url) {
        return Err(DestinationError::MissingOrInsecureUrl);
    }
    let mode = match pairs.get("mode") {
        Some("withData") => ForwardMode::WithData,
        Some("withChanges") => ForwardMode::WithChanges,
        _ => ForwardMode::Simple,
    };
    Ok(Destination::Forward {
        url: url.to_string(),
        mode,
        include_fields: pairs.get("includeFields").map(split_csv),
        exclude_fields: pairs.get("excludeFields").map(split_csv),
        change_detection_enabled: pairs.get("changeDetection") == Some("enabled"),
    })
}

fn build_rpa_queue(pairs: &Pairs) -> Result<Destination, DestinationError> {
    Ok(Destination::RpaQueue {
        handler_name: pairs.get("handler").unwrap_or_default().to_string(),
        queue_name: pairs.get("queue").map(str::to_string),
        tenant_tag: pairs.get("tenant").map(TenantTag::parse),
        folder_id: pairs.get("folder").map(str::to_string),
        label: pairs.get("label").map(str::to_string),
    })
}

fn parse_one(chunk: &str, pair_sep: char) -> Result<Destination, DestinationError> {
    let pairs = split_pairs(chunk, pair_sep);
    match pairs.get("destination").map(str::to_ascii_lowercase).as_deref() {
        Some("forward") => build_forward(&pairs),
        Some("uipath") | Some("rpa") => build_rpa_queue(&pairs),
        Some("none") => Ok(Destination::None),
        _ => Err(DestinationError::UnknownDestinationKind),
    }
}

/// Parses `client_state` into a [`RoutingSpec`], tolerating both the new
/// `|`-delimited-pairs / `;`-delimited-destinations format and the legacy
/// single-destination `;`-delimited-pairs format. The outer separator is
/// "context-inferable": if `|` appears anywhere in the string we know it's
/// new-format (destinations split on `;`, pairs split on `|`); otherwise we
/// treat the whole string as one legacy-format destination with pairs split
/// on `;`.
///
/// Unknown keys are ignored (not surfaced as errors — only logged by the
/// caller, since this function has no side channel for that). A chunk that
/// fails to parse into a valid destination is dropped; it never fails
/// parsing of the other chunks.
pub fn parse(client_state: &str) -> RoutingSpec {
    let chunks: Vec<(&str, char)> = if client_state.contains('|') {
        client_state
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| (c, '|'))
            .collect()
    } else if client_state.trim().is_empty() {
        Vec::new()
    } else {
        vec![(client_state.trim(), ';')]
    };

    let mut destinations = Vec::new();
    for (chunk, pair_sep) in chunks {
        match parse_one(chunk, pair_sep) {
            Ok(destination) => destinations.push(destination),
            Err(error) => {
                tracing::warn!(chunk, %error, "dropping unparseable client_state destination");
            }
        }
    }
    RoutingSpec { destinations }
}
