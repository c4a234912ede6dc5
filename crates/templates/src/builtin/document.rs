use flowbridge_common::{FieldMap, Priority, QueueItem, ValidationError};

use crate::processor::Processor;
use crate::sanitize::sanitize_fields;

/// The platform metadata fields flattened into `specific_content` for a
/// generic document-upload notification. Not every field is present on
/// every item; absent ones are simply omitted rather than padded with
/// nulls.
const METADATA_FIELDS: &[&str] = &[
    "id",
    "filename",
    "size",
    "contentType",
    "author",
    "editor",
    "createdDateTime",
    "lastModifiedDateTime",
    "webUrl",
    "downloadUrl",
    "version",
    "eTag",
    "path",
    "driveId",
    "parentFolder",
    "mimeType",
    "checksum",
    "isFolder",
    "shared",
    "sharedWith",
    "lastModifiedBy",
    "createdBy",
    "description",
    "contentLength",
    "hash",
    "fileExtension",
    "odataType",
    "webDavUrl",
    "thumbnailUrl",
    "publicationStatus",
];

/// Always accepts; flattens the document's metadata fields into
/// `specific_content` unchanged beyond sanitization (§4.4 "Document
/// processor"). This is the default handler for plain "notify a robot a
/// file changed" routing.
pub struct DocumentProcessor;

impl Processor for DocumentProcessor {
    fn should_process(&self, _current: &FieldMap, _previous: Option<&FieldMap>) -> bool {
        true
    }

    fn validate(&self, current: &FieldMap) -> Result<(), ValidationError> {
        if current.contains_key("id") {
            Ok(())
        } else {
            Err(ValidationError {
                missing_fields: vec!["id".to_string()],
            })
        }
    }

    fn transform(&self, current: &FieldMap) -> QueueItem {
        let mut content = FieldMap::new();
        for field in METADATA_FIELDS {
            if let Some(value) = current.get(*field) {
                content.insert((*field).to_string(), value.clone());
            }
        }
        let content = sanitize_fields(&content);

        let filename = current
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let item_id = current.get("id").and_then(|v| v.as_str()).unwrap_or("0");
        let millis = flowbridge_common::time_util::now().unix_timestamp_nanos() / 1_000_000;
        let reference = format!("SPDOC_{filename}_{item_id}_{millis}");

        QueueItem {
            name: format!("Document: {filename}"),
            priority: Priority::Normal,
            reference,
            specific_content: content,
            due_date: None,
        }
    }
}
