//! Submits [`QueueItem`][flowbridge_common::QueueItem]s to the RPA queue
//! provider (§4.5).
//!
//! Submission always resolves to a [`QueueOutcome`] rather than a bare
//! `Result` — duplicates, invalid payloads and exhausted retries are all
//! distinct, expected shapes a caller needs to tell apart, not failures to
//! propagate.

mod client;
mod error;
mod presets;

pub use client::{HttpQueueClient, QueueClient, QueueOverride};
pub use error::{QueueClientError, QueueOutcome};
pub use presets::{TenantPreset, TenantPresetTable};
