mod document;
mod status_gated;

pub use document::DocumentProcessor;
pub use status_gated::StatusGatedProcessor;
