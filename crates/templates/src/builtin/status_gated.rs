use flowbridge_common::{FieldMap, Priority, QueueItem, ValidationError};
use time::OffsetDateTime;

use crate::processor::Processor;
use crate::sanitize::sanitize_fields;

const STATUS_FIELD: &str = "Status";
const TRIGGER_STATUS: &str = "Send Generated Form";
const MANDATORY_FIELDS: &[&str] = &["ShipToEmail", "ShipDate", "Style", "PurchaseOrder"];
const DUE_DATE_FIELD: &str = "ShipDate";

/// "Form routing": submits a queue item only on the transition into
/// [`TRIGGER_STATUS`] (§4.4 "Status-gated processor", scenarios S2-S4).
/// Compares current to previous explicitly rather than trusting that the
/// notification it received is the first observation of the transition
/// (§5) — a status that was already `TRIGGER_STATUS` on the previous
/// snapshot does not re-trigger.
pub struct StatusGatedProcessor;

fn field_str<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(|v| v.as_str())
}

impl Processor for StatusGatedProcessor {
    fn should_process(&self, current: &FieldMap, previous: Option<&FieldMap>) -> bool {
        let current_status = field_str(current, STATUS_FIELD);
        if current_status != Some(TRIGGER_STATUS) {
            return false;
        }
        let previous_status = previous.and_then(|fields| field_str(fields, STATUS_FIELD));
        previous_status != Some(TRIGGER_STATUS)
    }

    fn validate(&self, current: &FieldMap) -> Result<(), ValidationError> {
        let is_present = |field: &str| current.get(field).map(|v| !v.is_null()).unwrap_or(false);
        let missing_fields: Vec<String> = MANDATORY_FIELDS
            .iter()
            .filter(|field| !is_present(field))
            .map(|field| field.to_string())
            .collect();
        if missing_fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing_fields })
        }
    }

    fn transform(&self, current: &FieldMap) -> QueueItem {
        let ship_date = field_str(current, DUE_DATE_FIELD)
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());
        let priority = match ship_date {
            Some(due) if due <= flowbridge_common::time_util::now() => Priority::High,
            _ => Priority::Normal,
        };

        let mut content = FieldMap::new();
        for field in MANDATORY_FIELDS {
            if let Some(value) = current.get(*field) {
                content.insert((*field).to_string(), value.clone());
            }
        }
        let content = sanitize_fields(&content);

        let reference = format!(
            "SPFORM_{}_{}",
            field_str(current, "Style").unwrap_or("unknown"),
            field_str(current, "PurchaseOrder").unwrap_or("unknown")
        );

        QueueItem {
            name: "Generated form ready for shipment".to_string(),
            priority,
            reference,
            specific_content: content,
            due_date: ship_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn does_not_trigger_while_status_unchanged() {
        let processor = StatusGatedProcessor;
        let previous = fields(&[("Status", "Draft".into())]);
        let current = fields(&[("Status", "Draft".into())]);
        assert!(!processor.should_process(&current, Some(&previous)));
    }

    #[test]
    fn triggers_on_transition_into_status() {
        let processor = StatusGatedProcessor;
        let previous = fields(&[("Status", "Draft".into())]);
        let current = fields(&[("Status", "Send Generated Form".into())]);
        assert!(processor.should_process(&current, Some(&previous)));
    }

    #[test]
    fn does_not_retrigger_if_previous_was_already_at_trigger_status() {
        let processor = StatusGatedProcessor;
        let previous = fields(&[("Status", "Send Generated Form".into())]);
        let current = fields(&[("Status", "Send Generated Form".into())]);
        assert!(!processor.should_process(&current, Some(&previous)));
    }

    #[test]
    fn validation_reports_all_missing_mandatory_fields() {
        let processor = StatusGatedProcessor;
        let current = fields(&[("ShipToEmail", "a@b.com".into())]);
        let result = processor.validate(&current);
        let err = result.unwrap_err();
        assert!(err.missing_fields.contains(&"ShipDate".to_string()));
        assert!(err.missing_fields.contains(&"Style".to_string()));
        assert!(err.missing_fields.contains(&"PurchaseOrder".to_string()));
        assert!(!err.missing_fields.contains(&"ShipToEmail".to_string()));
    }

    #[test]
    fn priority_is_high_when_ship_date_has_passed() {
        let processor = StatusGatedProcessor;
        let current = fields(&[
            ("ShipToEmail", "a@b.com".into()),
            ("ShipDate", "2000-01-01T00:00:00Z".into()),
            ("Style", "A".into()),
            ("PurchaseOrder", "PO1".into()),
        ]);
        let item = processor.transform(&current);
        assert_eq!(item.priority, Priority::High);
    }

    #[test]
    fn priority_is_normal_when_ship_date_is_in_the_future() {
        let processor = StatusGatedProcessor;
        let current = fields(&[
            ("ShipToEmail", "a@b.com".into()),
            ("ShipDate", "2999-01-01T00:00:00Z".into()),
            ("Style", "A".into()),
            ("PurchaseOrder", "PO1".into()),
        ]);
        let item = processor.transform(&current);
        assert_eq!(item.priority, Priority::Normal);
    }
}
