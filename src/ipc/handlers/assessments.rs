use crate::engine::EngineContext;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{no_workspace, optional_bool, optional_str, reply, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::AssessmentKind;
use crate::repo;
use crate::roster::{self, AssessmentPatch, NewAssessment, SubjectTarget};
use serde_json::json;

/// `type` is the public field name; `kind` is accepted as an alias.
fn parse_kind(
    req: &Request,
    v: Option<&serde_json::Value>,
) -> Result<Option<AssessmentKind>, serde_json::Value> {
    let Some(v) = v else {
        return Ok(None);
    };
    let Some(raw) = v.as_str() else {
        return Err(err(&req.id, "bad_params", "type must be a string", None));
    };
    match AssessmentKind::parse(raw) {
        Some(k) => Ok(Some(k)),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("unknown assessment type: {}", raw),
            Some(json!({
                "allowed": [
                    "quiz",
                    "final",
                    "midterm",
                    "assignment",
                    "project",
                    "continuous_assessment"
                ]
            })),
        )),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let subjects = if optional_bool(req, "allSubjects") {
        SubjectTarget::All
    } else {
        match required_str(req, "subjectId") {
            Ok(v) => SubjectTarget::One(v),
            Err(resp) => return resp,
        }
    };
    let academic_year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term_id = match required_str(req, "termId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let raw_kind = req.params.get("type").or_else(|| req.params.get("kind"));
    let kind = match parse_kind(req, raw_kind) {
        Ok(Some(k)) => k,
        Ok(None) => return err(&req.id, "bad_params", "missing type", None),
        Err(resp) => return resp,
    };
    let Some(weight) = req.params.get("weight").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing weight", None);
    };

    let ctx = EngineContext::new(conn, &state.config);
    let new = NewAssessment {
        subjects,
        academic_year_id,
        term_id,
        kind,
        weight,
    };
    match roster::create_assessment(&ctx, &new) {
        Ok(c) => ok(&req.id, json!({ "created": c.created, "skipped": c.skipped })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let subject_id = optional_str(req, "subjectId");
    let year_id = optional_str(req, "academicYearId");
    let term_id = optional_str(req, "termId");
    reply(
        req,
        "assessments",
        repo::list_assessments(
            conn,
            subject_id.as_deref(),
            year_id.as_deref(),
            term_id.as_deref(),
        ),
    )
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    reply(req, "assessment", roster::get_assessment(conn, &id))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let kind = match parse_kind(req, patch.get("type").or_else(|| patch.get("kind"))) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let weight = match patch.get("weight") {
        None => None,
        Some(v) => match v.as_f64() {
            Some(w) => Some(w),
            None => return err(&req.id, "bad_params", "patch.weight must be a number", None),
        },
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply(
        req,
        "assessment",
        roster::update_assessment(&ctx, &id, &AssessmentPatch { kind, weight }),
    )
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    match roster::delete_assessment(&ctx, &id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.create" => Some(handle_create(state, req)),
        "assessments.list" => Some(handle_list(state, req)),
        "assessments.get" => Some(handle_get(state, req)),
        "assessments.update" => Some(handle_update(state, req)),
        "assessments.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
