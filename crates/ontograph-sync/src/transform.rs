//! Mapping raw source records onto entity properties.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use ontograph_core::{FieldMapping, Properties};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The mapping itself is unusable; no record of the batch can load.
    #[error("field mapping has no target entity type")]
    NoTargetType,

    #[error("record is a JSON {0}, not an object")]
    NotAnObject(&'static str),
}

/// Records of one batch that survived transformation, plus how many did not.
#[derive(Debug, Default)]
pub struct TransformedBatch {
    pub records: Vec<Properties>,
    pub failed: u64,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Project one record through the mapping. Source fields that are absent
/// are omitted; source fields nobody maps are dropped.
pub fn transform_record(mapping: &FieldMapping, record: &Value) -> Result<Properties, TransformError> {
    let Value::Object(source) = record else {
        return Err(TransformError::NotAnObject(json_kind(record)));
    };

    let mut properties = Properties::new();
    for (target, source_field) in &mapping.field_mappings {
        if let Some(value) = source.get(source_field) {
            properties.insert(target.clone(), value.clone());
        }
    }
    Ok(properties)
}

/// Transform every record of a batch independently.
///
/// Returns `Err` only when the mapping cannot apply to any record, in which
/// case the caller counts the whole batch as failed.
pub fn transform_batch(
    mapping: &FieldMapping,
    batch: &[Value],
) -> Result<TransformedBatch, TransformError> {
    if mapping.target_entity_type.trim().is_empty() {
        return Err(TransformError::NoTargetType);
    }

    let mut out = TransformedBatch {
        records: Vec::with_capacity(batch.len()),
        failed: 0,
    };
    for record in batch {
        match transform_record(mapping, record) {
            Ok(properties) => out.records.push(properties),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to transform record");
                out.failed += 1;
            }
        }
    }
    Ok(out)
}

/// Read a record's change-column value as a UTC instant.
///
/// Accepts the shapes `row_to_json` produces for `timestamptz` (RFC 3339),
/// `timestamp` (no offset, taken as UTC) and `date` (midnight UTC).
pub fn change_value(record: &Value, column: &str) -> Option<DateTime<Utc>> {
    let raw = record.get(column)?.as_str()?;
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(at.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}
