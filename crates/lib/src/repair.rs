//! # Repair Loop
//!
//! Drives a candidate record to a valid one. A failing candidate is first sent
//! back to the analysis service with a corrective prompt; once the attempt
//! budget is spent (or the service fails), every offending field is replaced
//! by its schema fallback and the record is validated one last time.
//!
//! The loop runs at most `max_attempts + 1` validation passes and issues at
//! most `max_attempts - 1` corrective calls.

use crate::prompts::{build_corrective_prompt, CORRECTIVE_SYSTEM_PROMPT};
use crate::providers::ai::AnalysisService;
use crate::record::{CandidateRecord, ValidatedRecord, ViolationReport};
use crate::schema::SchemaError;
use crate::tasks::AnalysisTask;
use crate::validate::validate;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum RepairError {
    /// Fallback values did not validate: the schema itself is misconfigured.
    #[error("Fallback values failed validation for schema '{schema}': {report}")]
    InvariantViolation {
        schema: String,
        report: ViolationReport,
    },
    #[error("Schema error during repair: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairPolicy {
    /// Validation attempts on model output before falling back. The first
    /// response counts as attempt one.
    pub max_attempts: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// How a valid record was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The original response was already valid.
    Valid,
    /// A corrective re-query produced a valid record.
    Corrected { corrective_calls: u32 },
    /// These fields were replaced by their fallback values.
    Fallback {
        fields: Vec<String>,
        corrective_calls: u32,
    },
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub record: ValidatedRecord,
    pub resolution: Resolution,
    pub validation_passes: u32,
}

enum State {
    Validate {
        candidate: CandidateRecord,
        raw: String,
        attempt: u32,
    },
    Decide {
        candidate: CandidateRecord,
        raw: String,
        report: ViolationReport,
        attempt: u32,
    },
    CorrectiveRetry {
        candidate: CandidateRecord,
        raw: String,
        report: ViolationReport,
        attempt: u32,
    },
    Fallback {
        candidate: CandidateRecord,
        report: ViolationReport,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairLoop {
    policy: RepairPolicy,
}

impl RepairLoop {
    pub fn new(policy: RepairPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RepairPolicy {
        self.policy
    }

    /// Repairs `candidate`, which was extracted from `raw_text`.
    ///
    /// Corrective re-queries go through `service`, the same client used for
    /// the original analysis call.
    #[instrument(skip_all, fields(task = %task.name()))]
    pub async fn run(
        &self,
        task: &AnalysisTask,
        service: &dyn AnalysisService,
        candidate: CandidateRecord,
        raw_text: &str,
    ) -> Result<RepairOutcome, RepairError> {
        let schema = task.schema();
        let mut passes = 0;
        let mut corrective_calls = 0;
        let mut state = State::Validate {
            candidate,
            raw: raw_text.to_string(),
            attempt: 1,
        };

        loop {
            state = match state {
                State::Validate {
                    candidate,
                    raw,
                    attempt,
                } => {
                    passes += 1;
                    match validate(&candidate, schema) {
                        Ok(record) => {
                            let resolution = if corrective_calls == 0 {
                                Resolution::Valid
                            } else {
                                info!(
                                    "Corrective re-query {} produced a valid record.",
                                    corrective_calls
                                );
                                Resolution::Corrected { corrective_calls }
                            };
                            return Ok(RepairOutcome {
                                record,
                                resolution,
                                validation_passes: passes,
                            });
                        }
                        Err(report) => {
                            warn!(attempt, "Validation failed: {}", report);
                            State::Decide {
                                candidate,
                                raw,
                                report,
                                attempt,
                            }
                        }
                    }
                }
                State::Decide {
                    candidate,
                    raw,
                    report,
                    attempt,
                } => {
                    if attempt < self.policy.max_attempts {
                        State::CorrectiveRetry {
                            candidate,
                            raw,
                            report,
                            attempt,
                        }
                    } else {
                        info!("Attempt budget spent after {} attempts; using fallbacks.", attempt);
                        State::Fallback { candidate, report }
                    }
                }
                State::CorrectiveRetry {
                    candidate,
                    raw,
                    report,
                    attempt,
                } => {
                    let prompt = build_corrective_prompt(schema, &report, &raw);
                    corrective_calls += 1;
                    match service.generate(CORRECTIVE_SYSTEM_PROMPT, &prompt).await {
                        Ok(new_raw) => match task.extract(&new_raw) {
                            Ok(new_candidate) => State::Validate {
                                candidate: new_candidate,
                                raw: new_raw,
                                attempt: attempt + 1,
                            },
                            Err(e) => {
                                warn!("Corrective response had no usable payload: {}", e);
                                State::Fallback { candidate, report }
                            }
                        },
                        Err(e) => {
                            warn!("Corrective re-query failed: {}", e);
                            State::Fallback { candidate, report }
                        }
                    }
                }
                State::Fallback {
                    mut candidate,
                    report,
                } => {
                    let mut substituted = Vec::new();
                    for spec in schema.fields() {
                        let name = spec.name();
                        if report.contains(name) || candidate.get(name).is_none() {
                            candidate.insert(name, schema.fallback_for(name)?);
                            substituted.push(name.to_string());
                        }
                    }
                    passes += 1;
                    return match validate(&candidate, schema) {
                        Ok(record) => {
                            info!("Substituted fallbacks for: {}", substituted.join(", "));
                            Ok(RepairOutcome {
                                record,
                                resolution: Resolution::Fallback {
                                    fields: substituted,
                                    corrective_calls,
                                },
                                validation_passes: passes,
                            })
                        }
                        Err(report) => {
                            error!(
                                schema = %schema.name(),
                                "Fallback values are not admissible: {}", report
                            );
                            Err(RepairError::InvariantViolation {
                                schema: schema.name().to_string(),
                                report,
                            })
                        }
                    };
                }
            };
        }
    }
}
