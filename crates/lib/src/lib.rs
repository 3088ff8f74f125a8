//! # NarrativeLens
//!
//! Extracts schema-conformant creative metadata from the free-text output of a
//! generative video analysis service and stores it against a batch of assets.
//!
//! The pipeline for one asset is: upload, analyze (bounded retry), extract the
//! JSON payload, validate it against a closed-enum schema, repair it through
//! corrective re-queries or fallback values, and persist the validated record.
//! [`BatchOrchestrator`] runs that pipeline over a batch, skipping assets that
//! are already done.

pub mod assets;
pub mod errors;
pub mod extract;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod record;
pub mod repair;
pub mod schema;
pub mod tasks;
pub mod validate;

pub use errors::{AnalysisError, StoreError};
pub use extract::{extract, ExtractionFailure};
pub use orchestrator::{BatchOrchestrator, RetryPolicy, RunMode, RunReport, RunStats};
pub use record::{CandidateRecord, ValidatedRecord, ViolationReport};
pub use repair::{RepairError, RepairLoop, RepairPolicy};
pub use schema::{FieldSpec, RecordSchema, SchemaError};
pub use tasks::AnalysisTask;
pub use validate::validate;
