//! Schema validation of candidate records.

use crate::record::{CandidateRecord, ValidatedRecord, ViolationReport};
use crate::schema::RecordSchema;

/// Checks every schema field of `candidate`.
///
/// Missing fields and out-of-domain values are both violations. Fields the
/// schema does not define are ignored. Returns either a complete record in
/// schema order or the full list of violations, never a partial record.
pub fn validate(
    candidate: &CandidateRecord,
    schema: &RecordSchema,
) -> Result<ValidatedRecord, ViolationReport> {
    let mut report = ViolationReport::default();
    let mut fields = Vec::with_capacity(schema.fields().len());

    for spec in schema.fields() {
        match candidate.get(spec.name()) {
            None => report.push(spec.name(), None),
            Some(value) if !spec.admits(value) => report.push(spec.name(), Some(value)),
            Some(value) => fields.push((spec.name().to_string(), value.to_string())),
        }
    }

    if report.is_empty() {
        Ok(ValidatedRecord::new(schema.name(), fields))
    } else {
        Err(report)
    }
}
