use crate::engine::EngineContext;
use crate::intake;
use crate::ipc::error::{engine_err, err};
use crate::ipc::helpers::{no_workspace, optional_str, reply, reply_flat, required_str};
use crate::ipc::types::{AppState, Request};
use crate::repo;

fn handle_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let Some(raw) = req.params.get("scores") else {
        return err(&req.id, "bad_params", "missing scores", None);
    };
    let inputs = match intake::parse_batch(raw, state.config.intake.max_batch_size) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply_flat(req, intake::ingest(&ctx, &inputs))
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let score_id = match required_str(req, "scoreId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw_patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let patch = match intake::parse_patch(raw_patch) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply_flat(req, intake::update_score(&ctx, &score_id, &patch))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let score_id = match required_str(req, "scoreId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply_flat(req, intake::delete_score(&ctx, &score_id))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let student_id = optional_str(req, "studentId");
    let assessment_id = optional_str(req, "assessmentId");
    reply(
        req,
        "scores",
        repo::list_scores(conn, student_id.as_deref(), assessment_id.as_deref()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.ingest" => Some(handle_ingest(state, req)),
        "scores.update" => Some(handle_update(state, req)),
        "scores.delete" => Some(handle_delete(state, req)),
        "scores.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
