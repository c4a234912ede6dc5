use flowbridge_common::FieldMap;

/// Row size cap assumed by the underlying table storage (§4.2): ~64 KiB per
/// row for the JSON-encoded fields column.
pub const ROW_SIZE_CAP_BYTES: usize = 64 * 1024;

/// Field-name prefixes treated as low-priority system metadata. These are
/// the first candidates for removal when a snapshot would otherwise exceed
/// [`ROW_SIZE_CAP_BYTES`]; they're platform bookkeeping columns, not
/// business data, so dropping them from the baseline costs us nothing a
/// future diff would care about.
const LOW_PRIORITY_PREFIXES: &[&str] = &["_", "odata.", "odata_", "@odata", "metadata_"];

fn priority(field_name: &str) -> u8 {
    if LOW_PRIORITY_PREFIXES
        .iter()
        .any(|p| field_name.starts_with(p))
    {
        0
    } else {
        1
    }
}

/// Drops fields, least-important first, until the JSON-encoded map fits
/// within `cap_bytes`. Returns the input unchanged if it already fits.
pub fn trim_to_cap(fields: &FieldMap, cap_bytes: usize) -> FieldMap {
    let mut current = fields.clone();
    let Ok(mut encoded_len) = serde_json::to_string(&current).map(|s| s.len()) else {
        return current;
    };
    if encoded_len <= cap_bytes {
        return current;
    }

    let mut candidates: Vec<(String, u8, usize)> = current
        .iter()
        .map(|(k, v)| {
            let size = serde_json::to_string(v).map(|s| s.len()).unwrap_or(0) + k.len();
            (k.clone(), priority(k), size)
        })
        .collect();
    // Lowest priority first, then largest first within the same priority so
    // we shed the most bytes per removal.
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

    for (key, _, size) in candidates {
        if encoded_len <= cap_bytes {
            break;
        }
        current.remove(&key);
        encoded_len = encoded_len.saturating_sub(size);
    }
    current
}
