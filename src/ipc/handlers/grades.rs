use crate::engine::{self, CohortFilter, EngineContext};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{no_workspace, optional_str, reply, reply_flat, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::NaturalKey;
use crate::repo::{self, FinalFilter};
use serde_json::json;

fn natural_key(req: &Request) -> Result<NaturalKey, serde_json::Value> {
    Ok(NaturalKey::new(
        required_str(req, "studentId")?,
        required_str(req, "subjectId")?,
        required_str(req, "academicYearId")?,
        required_str(req, "termId")?,
    ))
}

fn handle_recompute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let key = match natural_key(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_id = optional_str(req, "classId");
    let ctx = EngineContext::new(conn, &state.config);
    reply(
        req,
        "finalAssessment",
        engine::recompute(&ctx, &key, class_id.as_deref()),
    )
}

fn handle_recompute_cohort(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let academic_year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term_id = match required_str(req, "termId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let filter = CohortFilter {
        class_id: optional_str(req, "classId"),
        subject_id: optional_str(req, "subjectId"),
        academic_year_id,
        term_id,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply_flat(req, engine::recompute_for_cohort(&ctx, &filter))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let filter = FinalFilter {
        student_id: optional_str(req, "studentId"),
        subject_id: optional_str(req, "subjectId"),
        class_id: optional_str(req, "classId"),
        academic_year_id: optional_str(req, "academicYearId"),
        term_id: optional_str(req, "termId"),
    };
    reply(req, "finalAssessments", repo::list_finals(conn, &filter))
}

/// Looks up by `finalAssessmentId`, or by the full natural key when no id is given.
fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let found = match optional_str(req, "finalAssessmentId") {
        Some(id) => repo::find_final(conn, &id)
            .and_then(|fa| fa.ok_or_else(|| EngineError::not_found("final assessment", id))),
        None => {
            let key = match natural_key(req) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            repo::find_final_by_key(conn, &key).and_then(|fa| {
                fa.ok_or_else(|| EngineError::not_found("final assessment", key.to_string()))
            })
        }
    };
    reply(req, "finalAssessment", found)
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "finalAssessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    match engine::with_write_tx(&ctx, |conn| repo::delete_final(conn, &id)) {
        Ok(true) => {
            tracing::info!(final_assessment_id = %id, "final assessment deleted");
            ok(&req.id, json!({ "deleted": true }))
        }
        Ok(false) => engine_err(&req.id, &EngineError::not_found("final assessment", id)),
        Err(e) => engine_err(&req.id, &e),
    }
}

/// Works before a workspace is selected, against the default grading table.
fn handle_classify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing percentage", None);
    };
    let (grade, remark) = state.config.grading.classify(percentage);
    ok(&req.id, json!({ "grade": grade, "remark": remark }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.recompute" => Some(handle_recompute(state, req)),
        "grades.recomputeCohort" => Some(handle_recompute_cohort(state, req)),
        "grades.list" => Some(handle_list(state, req)),
        "grades.get" => Some(handle_get(state, req)),
        "grades.delete" => Some(handle_delete(state, req)),
        "grades.classify" => Some(handle_classify(state, req)),
        _ => None,
    }
}
