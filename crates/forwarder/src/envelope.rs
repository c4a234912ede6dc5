use flowbridge_client_state::ForwardMode;
use flowbridge_common::{Diff, FieldMap, Notification};
use time::OffsetDateTime;

/// A compact restatement of a [`Diff`] for consumers that want counts
/// without walking the detail maps.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChangesSummary {
    pub added_count: usize,
    pub removed_count: usize,
    pub modified_count: usize,
    pub is_first_time_tracking: bool,
}

impl From<&Diff> for ChangesSummary {
    fn from(diff: &Diff) -> Self {
        Self {
            added_count: diff.added.len(),
            removed_count: diff.removed.len(),
            modified_count: diff.modified.len(),
            is_first_time_tracking: diff.is_first_time_tracking,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Changes {
    pub summary: ChangesSummary,
    pub details: Diff,
}

/// The body POSTed to a forward destination. Shape depends on the
/// destination's [`ForwardMode`] (§4.6); fields absent for a given mode are
/// simply `None` and skipped on serialization.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Envelope {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Changes>,
}

impl Envelope {
    /// Builds the envelope appropriate for `mode`, given whatever state was
    /// actually fetched/diffed upstream. `current`/`previous`/`diff` may be
    /// `None` even for a mode that wants them, if enrichment failed
    /// upstream; the forwarder never fabricates missing state.
    pub fn build(
        mode: ForwardMode,
        source: String,
        notification: Notification,
        current: Option<FieldMap>,
        previous: Option<FieldMap>,
        diff: Option<&Diff>,
    ) -> Self {
        let timestamp = flowbridge_common::time_util::now();
        match mode {
            ForwardMode::Simple => Envelope {
                timestamp,
                source,
                notification,
                current_state: None,
                previous_state: None,
                changes: None,
            },
            ForwardMode::WithData => Envelope {
                timestamp,
                source,
                notification,
                current_state: current,
                previous_state: None,
                changes: None,
            },
            ForwardMode::WithChanges => Envelope {
                timestamp,
                source,
                notification,
                current_state: current,
                previous_state: previous,
                changes: diff.map(|diff| Changes {
                    summary: ChangesSummary::from(diff),
                    details: diff.clone(),
                }),
            },
        }
    }
}
