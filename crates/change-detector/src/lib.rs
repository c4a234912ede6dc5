//! Computes the field-level [`Diff`] between an item's current state and its
//! persisted baseline, and maintains that baseline.
//!
//! This is deliberately not the same as a generic "diff two maps" utility:
//! it owns the first-seen rule (§4.3 step 1) and the baseline replacement
//! (§4.3 step 4), both of which are change-*detection* semantics, not diff
//! math.

use flowbridge_common::fields::apply_field_filters;
use flowbridge_common::{Diff, FieldChange, FieldMap, FieldValue, ItemId, Resource};
use flowbridge_common::time_util::normalize_timestamp_str;
use flowbridge_state_store::{StateStore, StateStoreError};

/// Optional include/exclude allowlists a destination can request, applied
/// include-then-exclude per §4.3 step 3.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

pub struct ChangeDetector<S> {
    store: S,
}

impl<S: StateStore> ChangeDetector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Computes the diff for `current` against the stored baseline for
    /// `(resource, item_id)`, then replaces the baseline with `current`.
    ///
    /// `filter` is applied to the comparison, not to what gets persisted —
    /// the full, unfiltered field set always becomes the new baseline so
    /// that later notifications with different include/exclude lists still
    /// see a complete picture.
    pub fn detect(
        &self,
        resource: &Resource,
        item_id: &ItemId,
        current: &FieldMap,
        filter: &FieldFilter,
    ) -> Result<Diff, StateStoreError> {
        let previous = self.store.get(resource, item_id)?;

        let diff = match &previous {
            None => Diff::first_seen(),
            Some(previous) => compute_diff(
                &previous.fields,
                current,
                filter.include.as_deref(),
                filter.exclude.as_deref(),
            ),
        };

        self.store.put(resource, item_id, current.clone())?;
        Ok(diff)
    }
}

fn compute_diff(
    previous: &FieldMap,
    current: &FieldMap,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> Diff {
    let previous = apply_field_filters(previous, include, exclude);
    let current = apply_field_filters(current, include, exclude);

    let mut diff = Diff::default();
    for (key, value) in &current {
        match previous.get(key) {
            None => {
                diff.added.insert(key.clone());
            }
            Some(prev_value) => {
                if !values_equal(prev_value, value) {
                    diff.modified.insert(
                        key.clone(),
                        FieldChange {
                            old: prev_value.clone(),
                            new: value.clone(),
                        },
                    );
                }
            }
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            diff.removed.insert(key.clone());
        }
    }
    diff
}

/// Structural equality, except that two strings are compared after
/// timestamp normalization (trailing fractional-second zeros collapsed) so
/// that equivalent ISO-8601 timestamps don't register as spurious
/// modifications. A field whose *type* changes (e.g. a string becoming
/// null) is always "modified", per the documented edge case.
fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::String(a), FieldValue::String(b)) => {
            a == b || normalize_timestamp_str(a) == normalize_timestamp_str(b)
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_state_store::SqliteStateStore;
    use serde_json::json;

    fn detector() -> ChangeDetector<SqliteStateStore> {
        ChangeDetector::new(SqliteStateStore::in_memory().unwrap())
    }

    #[test]
    fn first_seen_item_gets_a_free_pass() {
        let detector = detector();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        let fields = FieldMap::from([("Status".to_string(), json!("Draft"))]);

        let diff = detector
            .detect(&resource, &item_id, &fields, &FieldFilter::default())
            .unwrap();

        assert!(diff.is_first_time_tracking);
        assert!(diff.is_empty());
        let stored = detector.store().get(&resource, &item_id).unwrap().unwrap();
        assert_eq!(stored.fields, fields);
    }

    #[test]
    fn detects_additions_removals_and_modifications() {
        let detector = detector();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");

        detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([
                    ("Status".to_string(), json!("Pending")),
                    ("Amount".to_string(), json!(5000)),
                    ("Stale".to_string(), json!("gone soon")),
                ]),
                &FieldFilter::default(),
            )
            .unwrap();

        let diff = detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([
                    ("Status".to_string(), json!("Approved")),
                    ("Amount".to_string(), json!(5000)),
                    ("Author".to_string(), json!("u@x")),
                ]),
                &FieldFilter::default(),
            )
            .unwrap();

        assert!(!diff.is_first_time_tracking);
        assert_eq!(diff.added, std::collections::BTreeSet::from(["Author".to_string()]));
        assert_eq!(diff.removed, std::collections::BTreeSet::from(["Stale".to_string()]));
        assert_eq!(
            diff.modified.get("Status"),
            Some(&FieldChange {
                old: json!("Pending"),
                new: json!("Approved")
            })
        );
        assert!(!diff.modified.contains_key("Amount"));
    }

    #[test]
    fn type_change_counts_as_modified() {
        let detector = detector();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([("Note".to_string(), json!("hello"))]),
                &FieldFilter::default(),
            )
            .unwrap();
        let diff = detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([("Note".to_string(), json!(null))]),
                &FieldFilter::default(),
            )
            .unwrap();
        assert!(diff.modified.contains_key("Note"));
    }

    #[test]
    fn equivalent_timestamps_do_not_register_as_modified() {
        let detector = detector();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([("Modified".to_string(), json!("2024-01-01T00:00:00.500Z"))]),
                &FieldFilter::default(),
            )
            .unwrap();
        let diff = detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([("Modified".to_string(), json!("2024-01-01T00:00:00.5Z"))]),
                &FieldFilter::default(),
            )
            .unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn include_list_narrows_before_exclude_is_applied() {
        let detector = detector();
        let resource = Resource::from("sites/a/lists/b");
        let item_id = ItemId::from("1");
        detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([
                    ("A".to_string(), json!(1)),
                    ("B".to_string(), json!(1)),
                ]),
                &FieldFilter::default(),
            )
            .unwrap();

        let diff = detector
            .detect(
                &resource,
                &item_id,
                &FieldMap::from([
                    ("A".to_string(), json!(2)),
                    ("B".to_string(), json!(2)),
                ]),
                &FieldFilter {
                    include: Some(vec!["A".to_string()]),
                    exclude: Some(vec!["A".to_string()]),
                },
            )
            .unwrap();
        // A is included then excluded -> not reported. B was never included.
        assert!(diff.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn diff_round_trips_for_arbitrary_string_maps(
            previous in proptest::collection::btree_map(
                "[a-z]{1,6}", proptest::string::string_regex("[a-zA-Z0-9]{0,8}").unwrap(), 0..6),
            current in proptest::collection::btree_map(
                "[a-z]{1,6}", proptest::string::string_regex("[a-zA-Z0-9]{0,8}").unwrap(), 0..6),
        ) {
            let detector = detector();
            let resource = Resource::from("sites/a/lists/b");
            let item_id = ItemId::from("1");

            let previous: FieldMap = previous.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let current: FieldMap = current.into_iter().map(|(k, v)| (k, json!(v))).collect();

            detector.detect(&resource, &item_id, &previous, &FieldFilter::default()).unwrap();
            let diff = detector
                .detect(&resource, &item_id, &current, &FieldFilter::default())
                .unwrap();

            proptest::prop_assert!(diff.accounts_for_transition(&previous, &current));
        }
    }
}
