//! Aggregation engine: turns raw scores into one persisted FinalAssessment per natural key.
//!
//! A FinalAssessment is a cache of `calc::aggregate` over the current assessments and raw
//! scores. Each recompute reads and writes inside a single `BEGIN IMMEDIATE` transaction, so
//! SQLite's write lock gives at most one in-flight writer per key and the score set read is
//! the one the write reflects.

use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::calc::{self, AggregateFailure};
use crate::config::GradebookConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{FinalAssessment, NaturalKey};
use crate::repo::{self, Entity, FinalValues};

#[derive(Debug, Clone, Copy)]
pub struct EngineContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a GradebookConfig,
}

impl<'a> EngineContext<'a> {
    pub fn new(conn: &'a Connection, config: &'a GradebookConfig) -> Self {
        Self { conn, config }
    }
}

/// Runs `f` in an immediate transaction, retrying while another writer holds the lock.
///
/// Anything `f` returns as an error rolls the transaction back.
pub fn with_write_tx<T, F>(ctx: &EngineContext<'_>, mut f: F) -> EngineResult<T>
where
    F: FnMut(&Connection) -> EngineResult<T>,
{
    let attempts = ctx.config.storage.max_write_attempts.max(1);
    for attempt in 1..=attempts {
        let result = Transaction::new_unchecked(ctx.conn, TransactionBehavior::Immediate)
            .map_err(EngineError::from)
            .and_then(|tx| {
                let out = f(&tx)?;
                tx.commit()?;
                Ok(out)
            });
        match result {
            Err(e) if e.is_write_contention() => {
                if attempt == attempts {
                    break;
                }
                tracing::warn!(attempt, attempts, error = %e, "write contention, retrying");
                std::thread::sleep(Duration::from_millis(
                    ctx.config.storage.retry_backoff_ms * u64::from(attempt),
                ));
            }
            other => return other,
        }
    }
    Err(EngineError::ConcurrencyConflict { attempts })
}

fn ensure_exists(conn: &Connection, entity: Entity, id: &str) -> EngineResult<()> {
    if repo::exists(conn, entity, id)? {
        Ok(())
    } else {
        Err(EngineError::not_found(entity.label(), id))
    }
}

/// Recompute body; expects to run inside the caller's transaction.
fn recompute_in(
    conn: &Connection,
    config: &GradebookConfig,
    key: &NaturalKey,
    class_id: Option<&str>,
) -> EngineResult<FinalAssessment> {
    let Some(student_class) = repo::student_class(conn, &key.student_id)? else {
        return Err(EngineError::not_found("student", &key.student_id));
    };
    ensure_exists(conn, Entity::Subject, &key.subject_id)?;
    ensure_exists(conn, Entity::AcademicYear, &key.academic_year_id)?;
    ensure_exists(conn, Entity::Term, &key.term_id)?;
    if let Some(cid) = class_id {
        ensure_exists(conn, Entity::Class, cid)?;
    }

    let assessments =
        repo::assessments_for_scope(conn, &key.subject_id, &key.academic_year_id, &key.term_id)?;
    if assessments.is_empty() {
        return Err(EngineError::NoAssessments {
            subject_id: key.subject_id.clone(),
            academic_year_id: key.academic_year_id.clone(),
            term_id: key.term_id.clone(),
        });
    }

    let mut groups = Vec::with_capacity(assessments.len());
    for a in assessments {
        let scores = repo::scores_for(conn, &key.student_id, &a.id)?;
        groups.push((a, scores));
    }

    let agg = match calc::aggregate(&groups, config.aggregation.effort_mode) {
        Ok(v) => v,
        Err(AggregateFailure::NoScores) => return Err(EngineError::NoScores { key: key.clone() }),
        Err(AggregateFailure::ZeroWeight) => {
            return Err(EngineError::ZeroWeight { key: key.clone() })
        }
    };
    for score_id in &agg.excluded_score_ids {
        tracing::warn!(%key, score_id = %score_id, "raw score has zero weight; excluded from average");
    }

    let (grade, remark) = config.grading.classify(agg.final_score);
    let class_id = class_id.or(student_class.as_deref());
    repo::upsert_final(
        conn,
        key,
        &FinalValues {
            class_id,
            total_score: agg.final_score,
            total_effort: agg.total_effort,
            grade,
            remark,
        },
    )
}

/// Recompute and upsert the FinalAssessment for one natural key.
///
/// `class_id` defaults to the student's class. On any failure nothing is written and an
/// existing FinalAssessment for the key is left as it was.
pub fn recompute(
    ctx: &EngineContext<'_>,
    key: &NaturalKey,
    class_id: Option<&str>,
) -> EngineResult<FinalAssessment> {
    let result = with_write_tx(ctx, |conn| recompute_in(conn, ctx.config, key, class_id));
    match &result {
        Ok(fa) => tracing::debug!(
            %key,
            total_score = fa.total_score,
            grade = %fa.grade,
            "final assessment recomputed"
        ),
        Err(e) => tracing::info!(%key, code = e.code(), error = %e, "recompute failed"),
    }
    result
}

/// Outcome of one (student, subject) pair in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    #[serde(rename_all = "camelCase")]
    Success {
        student_id: String,
        subject_id: String,
        final_assessment: FinalAssessment,
    },
    #[serde(rename_all = "camelCase")]
    Failure {
        student_id: String,
        subject_id: String,
        code: String,
        error: String,
    },
}

impl PairOutcome {
    pub fn from_result(
        student_id: &str,
        subject_id: &str,
        result: EngineResult<FinalAssessment>,
    ) -> Self {
        match result {
            Ok(fa) => Self::Success {
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
                final_assessment: fa,
            },
            Err(e) => Self::Failure {
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
                code: e.code().to_string(),
                error: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn final_assessment(&self) -> Option<&FinalAssessment> {
        match self {
            Self::Success {
                final_assessment, ..
            } => Some(final_assessment),
            Self::Failure { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortFilter {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub academic_year_id: String,
    pub term_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortReport {
    pub academic_year_id: String,
    pub term_id: String,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<PairOutcome>,
}

/// Recompute every (student, subject) pair in a term.
///
/// Students come from `class_id` when given, else all students. Subjects are `subject_id`
/// when given, else every subject with an assessment in the term. Pair failures are
/// collected in the report; only unknown filter references fail the call.
pub fn recompute_for_cohort(
    ctx: &EngineContext<'_>,
    filter: &CohortFilter,
) -> EngineResult<CohortReport> {
    let conn = ctx.conn;
    ensure_exists(conn, Entity::AcademicYear, &filter.academic_year_id)?;
    ensure_exists(conn, Entity::Term, &filter.term_id)?;
    if let Some(cid) = filter.class_id.as_deref() {
        ensure_exists(conn, Entity::Class, cid)?;
    }
    if let Some(sid) = filter.subject_id.as_deref() {
        ensure_exists(conn, Entity::Subject, sid)?;
    }

    let students = repo::students_for_cohort(conn, filter.class_id.as_deref())?;
    let subject_ids: Vec<String> = match &filter.subject_id {
        Some(sid) => vec![sid.clone()],
        None => {
            let assessments = repo::assessments_for_period(
                conn,
                &filter.academic_year_id,
                &filter.term_id,
                None,
            )?;
            let mut ids: Vec<String> = Vec::new();
            for a in assessments {
                if !ids.contains(&a.subject_id) {
                    ids.push(a.subject_id);
                }
            }
            ids
        }
    };

    let mut results: Vec<PairOutcome> = Vec::with_capacity(students.len() * subject_ids.len());
    for (student_id, student_class) in &students {
        for subject_id in &subject_ids {
            let key = NaturalKey::new(
                student_id,
                subject_id,
                &filter.academic_year_id,
                &filter.term_id,
            );
            let result = recompute(ctx, &key, student_class.as_deref());
            results.push(PairOutcome::from_result(student_id, subject_id, result));
        }
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - succeeded;
    tracing::info!(
        academic_year_id = %filter.academic_year_id,
        term_id = %filter.term_id,
        succeeded,
        failed,
        "cohort recompute finished"
    );

    Ok(CohortReport {
        academic_year_id: filter.academic_year_id.clone(),
        term_id: filter.term_id.clone(),
        succeeded,
        failed,
        results,
    })
}
