use std::collections::{BTreeMap, BTreeSet};

use crate::fields::{FieldMap, FieldValue};

/// Both sides of a changed field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldChange {
    pub old: FieldValue,
    pub new: FieldValue,
}

/// The added/removed/modified summary produced by comparing two field maps.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Diff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeMap<String, FieldChange>,
    /// True when there was no previous snapshot at all — the "first-seen
    /// free pass" rule. When set, `added`/`removed`/`modified` are always
    /// empty regardless of the current field set.
    pub is_first_time_tracking: bool,
}

impl Diff {
    pub fn first_seen() -> Self {
        Self {
            is_first_time_tracking: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Checks that this diff exactly and completely accounts for the
    /// transition from `previous` to `current` — every added/removed/
    /// changed key is named, and no unchanged key is. `added` only records
    /// field *names* (per the data model), so reconstructing the new field
    /// values for added keys requires `current` as well as the diff itself;
    /// this is the round-trip check used in property tests rather than a
    /// pure `Diff::apply(previous)` reconstruction.
    pub fn accounts_for_transition(&self, previous: &FieldMap, current: &FieldMap) -> bool {
        for key in current.keys() {
            match previous.get(key) {
                None => {
                    if !self.added.contains(key) {
                        return false;
                    }
                }
                Some(prev_value) => {
                    let cur_value = &current[key];
                    if prev_value == cur_value {
                        if self.modified.contains_key(key) {
                            return false;
                        }
                    } else if self.modified.get(key)
                        != Some(&FieldChange {
                            old: prev_value.clone(),
                            new: cur_value.clone(),
                        })
                    {
                        return false;
                    }
                }
            }
        }
        for key in previous.keys() {
            if !current.contains_key(key) && !self.removed.contains(key) {
                return false;
            }
        }
        true
    }
}
