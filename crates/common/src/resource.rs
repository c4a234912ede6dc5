use std::fmt;

/// Logical path to a list on the collaboration platform, e.g.
/// `sites/contoso/lists/Invoices`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resource(pub String);

impl Resource {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The table-key-safe form of this resource, suitable for use as a
    /// partition key. See [`normalize`].
    pub fn normalized(&self) -> String {
        normalize(&self.0)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Resource {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Resource {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Provider-assigned identifier for a single item within a [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Maps a resource path onto a string safe to use as a table partition key.
///
/// The underlying state store (an Azure-Table-like key/value service in the
/// original deployment, a SQLite table here) forbids `/`, `\`, `#`, `?` and
/// control characters in key columns. This is the single place that decides
/// how those characters are escaped; every read and write must go through
/// it, and changing it invalidates every previously-stored snapshot.
pub fn normalize(resource: &str) -> String {
    resource
        .chars()
        .map(|c| match c {
            '/' | '\\' | '#' | '?' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_replaces_forbidden_characters() {
        assert_eq!(
            normalize("sites/contoso/lists/Invoices"),
            "sites_contoso_lists_Invoices"
        );
    }

    #[test]
    fn normalize_is_stable_for_plain_names() {
        assert_eq!(normalize("Invoices"), "Invoices");
    }

    #[test]
    fn normalize_is_deterministic() {
        let r = Resource::from("a/b:c?d#e\\f");
        assert_eq!(r.normalized(), normalize(r.as_str()));
    }
}
