use serde_json::json;

use crate::model::NaturalKey;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced by the aggregation core.
///
/// Per-pair outcomes (`NoAssessments`, `NoScores`, `ZeroWeight`, `NotFound`) are reported by
/// batch operations instead of aborting them. `Validation` aborts a whole intake batch.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("no assessments defined for subject {subject_id} in term {term_id}")]
    NoAssessments {
        subject_id: String,
        academic_year_id: String,
        term_id: String,
    },

    #[error("No scores or zero total weight")]
    NoScores { key: NaturalKey },

    #[error("assessments with scores carry zero total weight")]
    ZeroWeight { key: NaturalKey },

    #[error("write conflict persisted after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::NoAssessments { .. } => "no_assessments",
            Self::NoScores { .. } => "no_scores",
            Self::ZeroWeight { .. } => "zero_weight",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { details, .. } => details.clone(),
            Self::NoAssessments {
                subject_id,
                academic_year_id,
                term_id,
            } => Some(json!({
                "subjectId": subject_id,
                "academicYearId": academic_year_id,
                "termId": term_id,
            })),
            Self::NoScores { key } | Self::ZeroWeight { key } => {
                serde_json::to_value(key).ok()
            }
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::ConcurrencyConflict { attempts } => Some(json!({ "attempts": attempts })),
            Self::Conflict { .. } | Self::Storage(_) => None,
        }
    }

    /// SQLite reports a competing writer as BUSY or LOCKED.
    pub fn is_write_contention(&self) -> bool {
        match self {
            Self::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
