//! Bulk score intake and the single-score edit paths.
//!
//! Structural problems anywhere in a batch reject the whole batch. Duplicates (same student,
//! assessment and case-insensitive title) are skipped quietly. Items pointing at unknown
//! students or assessments are rejected one by one. Every created score triggers its own
//! recompute after the inserts commit.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::engine::{self, EngineContext, PairOutcome};
use crate::error::{EngineError, EngineResult};
use crate::model::{NaturalKey, RawScore, RawScoreInput, ScorePatch};
use crate::repo;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRejection {
    pub index: usize,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReport {
    pub created_count: usize,
    pub skipped_count: usize,
    pub created: Vec<RawScore>,
    pub rejected: Vec<IntakeRejection>,
    pub recomputed: Vec<PairOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreChange {
    pub score: RawScore,
    pub recomputed: PairOutcome,
}

/// Where a stored score lands once it is aggregated.
#[derive(Debug, Clone)]
struct ScoreScope {
    key: NaturalKey,
    class_id: Option<String>,
}

fn resolve_scope(
    conn: &rusqlite::Connection,
    student_id: &str,
    assessment_id: &str,
) -> EngineResult<ScoreScope> {
    let Some(assessment) = repo::find_assessment(conn, assessment_id)? else {
        return Err(EngineError::not_found("assessment", assessment_id));
    };
    let Some(class_id) = repo::student_class(conn, student_id)? else {
        return Err(EngineError::not_found("student", student_id));
    };
    Ok(ScoreScope {
        key: NaturalKey::new(
            student_id,
            assessment.subject_id,
            assessment.academic_year_id,
            assessment.term_id,
        ),
        class_id,
    })
}

fn recompute_scope(ctx: &EngineContext<'_>, scope: &ScoreScope) -> PairOutcome {
    let result = engine::recompute(ctx, &scope.key, scope.class_id.as_deref());
    PairOutcome::from_result(&scope.key.student_id, &scope.key.subject_id, result)
}

fn issue(index: usize, field: &str, message: &str) -> Value {
    json!({ "index": index, "field": field, "message": message })
}

/// Accepts both the camelCase IPC spelling and the snake_case record spelling.
fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

fn required_text(
    obj: &Map<String, Value>,
    camel: &str,
    snake: &str,
    index: usize,
    issues: &mut Vec<Value>,
) -> Option<String> {
    match field(obj, camel, snake).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => {
            issues.push(issue(index, camel, "must not be empty"));
            None
        }
        None => {
            issues.push(issue(index, camel, "missing or not a string"));
            None
        }
    }
}

fn required_number(
    obj: &Map<String, Value>,
    name: &str,
    index: usize,
    issues: &mut Vec<Value>,
) -> Option<f64> {
    match obj.get(name).and_then(|v| v.as_f64()) {
        Some(n) if n.is_finite() => Some(n),
        _ => {
            issues.push(issue(index, name, "missing or not a number"));
            None
        }
    }
}

/// Effort may arrive as a number or a label; both are stored as text.
fn optional_effort(obj: &Map<String, Value>, index: usize, issues: &mut Vec<Value>) -> Option<String> {
    match obj.get("effort") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            issues.push(issue(index, "effort", "must be a number, string or null"));
            None
        }
    }
}

fn optional_comment(obj: &Map<String, Value>, index: usize, issues: &mut Vec<Value>) -> Option<String> {
    match obj.get("comment") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(issue(index, "comment", "must be a string or null"));
            None
        }
    }
}

fn validation_failure(issues: Vec<Value>) -> EngineError {
    EngineError::Validation {
        message: format!("invalid score batch: {} issue(s)", issues.len()),
        details: Some(json!({ "issues": issues })),
    }
}

/// Structural validation of a raw JSON batch. Any issue fails the whole batch.
pub fn parse_batch(raw: &Value, max_batch_size: usize) -> EngineResult<Vec<RawScoreInput>> {
    let Some(items) = raw.as_array() else {
        return Err(EngineError::validation("scores must be an array"));
    };
    if items.len() > max_batch_size {
        return Err(EngineError::Validation {
            message: format!(
                "batch exceeds max size: {} > {}",
                items.len(),
                max_batch_size
            ),
            details: Some(json!({ "size": items.len(), "maxBatchSize": max_batch_size })),
        });
    }

    let mut issues: Vec<Value> = Vec::new();
    let mut inputs: Vec<RawScoreInput> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            issues.push(issue(i, "", "item must be an object"));
            continue;
        };
        let title = required_text(obj, "title", "title", i, &mut issues);
        let student_id = required_text(obj, "studentId", "student_id", i, &mut issues);
        let assessment_id = required_text(obj, "assessmentId", "assessment_id", i, &mut issues);
        let score = required_number(obj, "score", i, &mut issues);
        let weight = required_number(obj, "weight", i, &mut issues);
        let effort = optional_effort(obj, i, &mut issues);
        let comment = optional_comment(obj, i, &mut issues);

        if let (Some(title), Some(student_id), Some(assessment_id), Some(score), Some(weight)) =
            (title, student_id, assessment_id, score, weight)
        {
            inputs.push(RawScoreInput {
                title,
                student_id,
                assessment_id,
                score,
                weight,
                effort,
                comment,
            });
        }
    }

    if !issues.is_empty() {
        return Err(validation_failure(issues));
    }
    Ok(inputs)
}

/// Structural checks for batches built in code rather than parsed from JSON.
pub fn validate_inputs(inputs: &[RawScoreInput], max_batch_size: usize) -> EngineResult<()> {
    if inputs.len() > max_batch_size {
        return Err(EngineError::validation(format!(
            "batch exceeds max size: {} > {}",
            inputs.len(),
            max_batch_size
        )));
    }
    let mut issues: Vec<Value> = Vec::new();
    for (i, item) in inputs.iter().enumerate() {
        if item.title.trim().is_empty() {
            issues.push(issue(i, "title", "must not be empty"));
        }
        if item.student_id.trim().is_empty() {
            issues.push(issue(i, "studentId", "must not be empty"));
        }
        if item.assessment_id.trim().is_empty() {
            issues.push(issue(i, "assessmentId", "must not be empty"));
        }
        if !item.score.is_finite() {
            issues.push(issue(i, "score", "must be a finite number"));
        }
        if !item.weight.is_finite() {
            issues.push(issue(i, "weight", "must be a finite number"));
        }
    }
    if !issues.is_empty() {
        return Err(validation_failure(issues));
    }
    Ok(())
}

/// Store a batch of raw scores and recompute every affected key.
pub fn ingest(ctx: &EngineContext<'_>, inputs: &[RawScoreInput]) -> EngineResult<IntakeReport> {
    validate_inputs(inputs, ctx.config.intake.max_batch_size)?;

    let (created, skipped_count, rejected) = engine::with_write_tx(ctx, |conn| {
        let mut created: Vec<(RawScore, ScoreScope)> = Vec::new();
        let mut skipped_count: usize = 0;
        let mut rejected: Vec<IntakeRejection> = Vec::new();

        for (i, input) in inputs.iter().enumerate() {
            let scope = match resolve_scope(conn, &input.student_id, &input.assessment_id) {
                Ok(v) => v,
                Err(e @ EngineError::NotFound { .. }) => {
                    rejected.push(IntakeRejection {
                        index: i,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            match repo::insert_score(conn, input)? {
                Some(score) => created.push((score, scope)),
                None => {
                    tracing::debug!(
                        index = i,
                        student_id = %input.student_id,
                        assessment_id = %input.assessment_id,
                        title = %input.title,
                        "duplicate score skipped"
                    );
                    skipped_count += 1;
                }
            }
        }
        Ok((created, skipped_count, rejected))
    })?;

    tracing::info!(
        created = created.len(),
        skipped = skipped_count,
        rejected = rejected.len(),
        "score batch stored"
    );

    let recomputed: Vec<PairOutcome> = created
        .iter()
        .map(|(_, scope)| recompute_scope(ctx, scope))
        .collect();

    Ok(IntakeReport {
        created_count: created.len(),
        skipped_count,
        created: created.into_iter().map(|(score, _)| score).collect(),
        rejected,
        recomputed,
    })
}

fn validate_patch(patch: &ScorePatch) -> EngineResult<()> {
    if patch.is_empty() {
        return Err(EngineError::validation("nothing to update"));
    }
    if let Some(t) = &patch.title {
        if t.trim().is_empty() {
            return Err(EngineError::validation("title must not be empty"));
        }
    }
    if patch.score.is_some_and(|v| !v.is_finite()) {
        return Err(EngineError::validation("score must be a finite number"));
    }
    if patch.weight.is_some_and(|v| !v.is_finite()) {
        return Err(EngineError::validation("weight must be a finite number"));
    }
    Ok(())
}

/// Edit one stored score, then recompute its key once the edit has committed.
pub fn update_score(
    ctx: &EngineContext<'_>,
    score_id: &str,
    patch: &ScorePatch,
) -> EngineResult<ScoreChange> {
    validate_patch(patch)?;

    let (score, scope) = engine::with_write_tx(ctx, |conn| {
        let Some(mut score) = repo::find_score(conn, score_id)? else {
            return Err(EngineError::not_found("score", score_id));
        };
        if let Some(title) = &patch.title {
            let title = title.trim().to_string();
            if let Some(other) =
                repo::find_score_by_title(conn, &score.student_id, &score.assessment_id, &title)?
            {
                if other.id != score.id {
                    return Err(EngineError::Conflict {
                        message: format!("a score titled {:?} already exists", other.title),
                    });
                }
            }
            score.title = title;
        }
        if let Some(v) = patch.score {
            score.score = v;
        }
        if let Some(v) = patch.weight {
            score.weight = v;
        }
        if let Some(v) = &patch.effort {
            score.effort = v.clone();
        }
        if let Some(v) = &patch.comment {
            score.comment = v.clone();
        }
        repo::write_score(conn, &score)?;
        let scope = resolve_scope(conn, &score.student_id, &score.assessment_id)?;
        Ok((score, scope))
    })?;

    let recomputed = recompute_scope(ctx, &scope);
    Ok(ScoreChange { score, recomputed })
}

/// Remove one stored score and recompute its key. A key left without scores keeps its
/// previous FinalAssessment; the recompute reports `no_scores` instead of writing.
pub fn delete_score(ctx: &EngineContext<'_>, score_id: &str) -> EngineResult<ScoreChange> {
    let (score, scope) = engine::with_write_tx(ctx, |conn| {
        let Some(score) = repo::find_score(conn, score_id)? else {
            return Err(EngineError::not_found("score", score_id));
        };
        let scope = resolve_scope(conn, &score.student_id, &score.assessment_id)?;
        repo::delete_score(conn, score_id)?;
        Ok((score, scope))
    })?;

    let recomputed = recompute_scope(ctx, &scope);
    Ok(ScoreChange { score, recomputed })
}

/// Parse an IPC patch object into a [`ScorePatch`].
pub fn parse_patch(raw: &Value) -> EngineResult<ScorePatch> {
    let Some(obj) = raw.as_object() else {
        return Err(EngineError::validation("patch must be an object"));
    };
    let mut patch = ScorePatch::default();
    for (k, v) in obj {
        match k.as_str() {
            "title" => {
                let Some(s) = v.as_str() else {
                    return Err(EngineError::validation("patch.title must be a string"));
                };
                patch.title = Some(s.to_string());
            }
            "score" => {
                let Some(n) = v.as_f64() else {
                    return Err(EngineError::validation("patch.score must be a number"));
                };
                patch.score = Some(n);
            }
            "weight" => {
                let Some(n) = v.as_f64() else {
                    return Err(EngineError::validation("patch.weight must be a number"));
                };
                patch.weight = Some(n);
            }
            "effort" => {
                patch.effort = Some(match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => {
                        return Err(EngineError::validation(
                            "patch.effort must be a number, string or null",
                        ))
                    }
                });
            }
            "comment" => {
                patch.comment = Some(match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    _ => {
                        return Err(EngineError::validation(
                            "patch.comment must be a string or null",
                        ))
                    }
                });
            }
            other => {
                return Err(EngineError::validation(format!(
                    "unknown patch field: {}",
                    other
                )))
            }
        }
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_batch_accepts_both_spellings_and_effort_forms() {
        let raw = json!([
            { "title": "Quiz 1", "studentId": "s1", "assessmentId": "a1", "score": 8, "weight": 10, "effort": 4 },
            { "title": "Quiz 2", "student_id": "s1", "assessment_id": "a1", "score": 7.5, "weight": 10, "effort": "good", "comment": "late" }
        ]);
        let inputs = parse_batch(&raw, 10).expect("parse");
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].effort.as_deref(), Some("4"));
        assert_eq!(inputs[1].student_id, "s1");
        assert_eq!(inputs[1].effort.as_deref(), Some("good"));
        assert_eq!(inputs[1].comment.as_deref(), Some("late"));
    }

    #[test]
    fn one_bad_item_rejects_the_batch() {
        let raw = json!([
            { "title": "Quiz 1", "studentId": "s1", "assessmentId": "a1", "score": 8, "weight": 10 },
            { "title": "", "studentId": "s1", "assessmentId": "a1", "score": "x", "weight": 10 }
        ]);
        let err = parse_batch(&raw, 10).expect_err("must fail");
        assert_eq!(err.code(), "bad_params");
        let issues = err
            .details()
            .and_then(|d| d.get("issues").cloned())
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|i| i.get("index").and_then(|v| v.as_u64()) == Some(1)));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let item = json!({ "title": "Q", "studentId": "s", "assessmentId": "a", "score": 1, "weight": 1 });
        let raw = Value::Array(vec![item; 3]);
        assert!(parse_batch(&raw, 2).is_err());
        assert!(parse_batch(&json!({}), 2).is_err());
    }

    #[test]
    fn validate_inputs_flags_non_finite_numbers() {
        let input = RawScoreInput {
            title: "Q".into(),
            student_id: "s".into(),
            assessment_id: "a".into(),
            score: f64::NAN,
            weight: 10.0,
            effort: None,
            comment: None,
        };
        assert!(validate_inputs(&[input], 10).is_err());
    }

    #[test]
    fn parse_patch_distinguishes_clear_from_absent() {
        let patch = parse_patch(&json!({ "score": 9, "effort": null })).expect("patch");
        assert_eq!(patch.score, Some(9.0));
        assert_eq!(patch.effort, Some(None));
        assert_eq!(patch.comment, None);
        assert!(parse_patch(&json!({ "bogus": 1 })).is_err());
    }
}
