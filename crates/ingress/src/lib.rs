//! Notification ingress (§4.1): the validation handshake, the dedup cache,
//! and the [`Pipeline`] that parses, enriches and fans out each notification
//! to its configured destinations.

mod dedup;
mod handshake;
mod pipeline;

pub use dedup::{DedupCache, DedupKey};
pub use handshake::respond as handshake_response;
pub use pipeline::{DestinationOutcome, NotificationBatch, NotificationOutcome, Pipeline};
