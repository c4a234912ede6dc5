use std::collections::BTreeMap;

/// A single field value. Field values travel as JSON on the wire and are
/// stored as JSON in [`crate::ItemSnapshot`], so we reuse `serde_json::Value`
/// rather than invent a parallel scalar/structured enum.
pub type FieldValue = serde_json::Value;

/// An item's fields, keyed by field name. `BTreeMap` keeps iteration order
/// deterministic, which matters for diff output and for tests that compare
/// `specific_content` byte-for-byte.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Applies an `includeFields` allowlist followed by an `excludeFields`
/// denylist to a field map, per the ordering required by the client-state
/// grammar (include is applied before exclude).
pub fn apply_field_filters(
    fields: &FieldMap,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> FieldMap {
    let mut out = match include {
        Some(allow) => fields
            .iter()
            .filter(|(k, _)| allow.iter().any(|a| a == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<FieldMap>(),
        None => fields.clone(),
    };
    if let Some(deny) = exclude {
        out.retain(|k, _| !deny.iter().any(|d| d == k));
    }
    out
}
