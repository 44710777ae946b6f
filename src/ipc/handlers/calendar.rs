use crate::calendar::{self, NewPeriod};
use crate::engine::EngineContext;
use crate::ipc::helpers::{no_workspace, optional_bool, optional_str, reply, required_str};
use crate::ipc::types::{AppState, Request};

fn period_params(req: &Request) -> Result<NewPeriod, serde_json::Value> {
    Ok(NewPeriod {
        name: required_str(req, "name")?,
        start_date: required_str(req, "startDate")?,
        end_date: required_str(req, "endDate")?,
        active: optional_bool(req, "active"),
    })
}

fn handle_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let new = match period_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply(req, "academicYear", calendar::create_year(&ctx, &new))
}

fn handle_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    reply(req, "academicYears", calendar::list_years(conn))
}

fn handle_years_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    reply(req, "academicYear", calendar::active_year(conn))
}

fn handle_years_activate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply(req, "academicYear", calendar::activate_year(&ctx, &id))
}

fn handle_terms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new = match period_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply(req, "term", calendar::create_term(&ctx, &year_id, &new))
}

fn handle_terms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let year_id = optional_str(req, "academicYearId");
    reply(req, "terms", calendar::list_terms(conn, year_id.as_deref()))
}

fn handle_terms_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    reply(req, "term", calendar::active_term(conn))
}

fn handle_terms_activate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(req);
    };
    let id = match required_str(req, "termId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = EngineContext::new(conn, &state.config);
    reply(req, "term", calendar::activate_term(&ctx, &id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "years.create" => Some(handle_years_create(state, req)),
        "years.list" => Some(handle_years_list(state, req)),
        "years.active" => Some(handle_years_active(state, req)),
        "years.activate" => Some(handle_years_activate(state, req)),
        "terms.create" => Some(handle_terms_create(state, req)),
        "terms.list" => Some(handle_terms_list(state, req)),
        "terms.active" => Some(handle_terms_active(state, req)),
        "terms.activate" => Some(handle_terms_activate(state, req)),
        _ => None,
    }
}
