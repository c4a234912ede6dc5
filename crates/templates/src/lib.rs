//! Routing templates: pluggable processors that turn enriched item state
//! into queue submissions (§4.4).

pub mod builtin;
pub mod processor;
pub mod sanitize;

pub use builtin::{DocumentProcessor, StatusGatedProcessor};
pub use processor::{ProcessOutcome, Processor, TemplateRegistry, UnknownHandlerError};
