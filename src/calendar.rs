//! Academic years and terms.
//!
//! At most one row of each kind is active. Activation clears the current active row and
//! sets the new one inside one immediate transaction; a partial unique index backs this up.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::{self, EngineContext};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub academic_year_id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPeriod {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    AcademicYear,
    Term,
}

impl PeriodKind {
    fn table(self) -> &'static str {
        match self {
            Self::AcademicYear => "academic_years",
            Self::Term => "terms",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::AcademicYear => "academic year",
            Self::Term => "term",
        }
    }
}

fn year_from_row(r: &Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: r.get(0)?,
        name: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

fn term_from_row(r: &Row<'_>) -> rusqlite::Result<Term> {
    Ok(Term {
        id: r.get(0)?,
        academic_year_id: r.get(1)?,
        name: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
    })
}

const YEAR_COLUMNS: &str = "id, name, start_date, end_date, active";
const TERM_COLUMNS: &str = "id, academic_year_id, name, start_date, end_date, active";

fn parse_date(field: &str, raw: &str) -> EngineResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| EngineError::Validation {
        message: format!("{} must be a YYYY-MM-DD date", field),
        details: Some(serde_json::json!({ "field": field, "value": raw })),
    })
}

/// Normalises the period fields; dates come back in canonical form.
fn validate_period(p: &NewPeriod) -> EngineResult<(String, String, String)> {
    let name = p.name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("name must not be empty"));
    }
    let start = parse_date("startDate", &p.start_date)?;
    let end = parse_date("endDate", &p.end_date)?;
    if end < start {
        return Err(EngineError::validation("endDate must not be before startDate"));
    }
    Ok((
        name.to_string(),
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    ))
}

/// Clear-then-set; callers must already be inside a write transaction.
fn switch_active(conn: &Connection, kind: PeriodKind, id: &str) -> EngineResult<()> {
    let table = kind.table();
    conn.execute(
        &format!("UPDATE {} SET active = 0 WHERE active = 1 AND id <> ?", table),
        [id],
    )?;
    let changed = conn.execute(&format!("UPDATE {} SET active = 1 WHERE id = ?", table), [id])?;
    if changed == 0 {
        return Err(EngineError::not_found(kind.label(), id));
    }
    Ok(())
}

pub fn create_year(ctx: &EngineContext<'_>, new: &NewPeriod) -> EngineResult<AcademicYear> {
    let (name, start_date, end_date) = validate_period(new)?;
    let year = engine::with_write_tx(ctx, |conn| {
        let dup: Option<String> = conn
            .query_row(
                "SELECT id FROM academic_years WHERE lower(name) = lower(?)",
                [&name],
                |r| r.get(0),
            )
            .optional()?;
        if dup.is_some() {
            return Err(EngineError::Conflict {
                message: format!("academic year {:?} already exists", name),
            });
        }
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO academic_years(id, name, start_date, end_date, active)
             VALUES(?, ?, ?, ?, 0)",
            (&id, &name, &start_date, &end_date),
        )?;
        if new.active {
            switch_active(conn, PeriodKind::AcademicYear, &id)?;
        }
        Ok(AcademicYear {
            id,
            name: name.clone(),
            start_date: start_date.clone(),
            end_date: end_date.clone(),
            active: new.active,
        })
    })?;
    if year.active {
        tracing::info!(academic_year_id = %year.id, "academic year activated");
    }
    Ok(year)
}

pub fn create_term(
    ctx: &EngineContext<'_>,
    academic_year_id: &str,
    new: &NewPeriod,
) -> EngineResult<Term> {
    let (name, start_date, end_date) = validate_period(new)?;
    let term = engine::with_write_tx(ctx, |conn| {
        if find_year(conn, academic_year_id)?.is_none() {
            return Err(EngineError::not_found("academic year", academic_year_id));
        }
        let dup: Option<String> = conn
            .query_row(
                "SELECT id FROM terms WHERE academic_year_id = ? AND lower(name) = lower(?)",
                (academic_year_id, &name),
                |r| r.get(0),
            )
            .optional()?;
        if dup.is_some() {
            return Err(EngineError::Conflict {
                message: format!("term {:?} already exists in this academic year", name),
            });
        }
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO terms(id, academic_year_id, name, start_date, end_date, active)
             VALUES(?, ?, ?, ?, ?, 0)",
            (&id, academic_year_id, &name, &start_date, &end_date),
        )?;
        if new.active {
            switch_active(conn, PeriodKind::Term, &id)?;
        }
        Ok(Term {
            id,
            academic_year_id: academic_year_id.to_string(),
            name: name.clone(),
            start_date: start_date.clone(),
            end_date: end_date.clone(),
            active: new.active,
        })
    })?;
    if term.active {
        tracing::info!(term_id = %term.id, "term activated");
    }
    Ok(term)
}

pub fn find_year(conn: &Connection, id: &str) -> EngineResult<Option<AcademicYear>> {
    let sql = format!("SELECT {} FROM academic_years WHERE id = ?", YEAR_COLUMNS);
    Ok(conn.query_row(&sql, [id], year_from_row).optional()?)
}

pub fn find_term(conn: &Connection, id: &str) -> EngineResult<Option<Term>> {
    let sql = format!("SELECT {} FROM terms WHERE id = ?", TERM_COLUMNS);
    Ok(conn.query_row(&sql, [id], term_from_row).optional()?)
}

pub fn list_years(conn: &Connection) -> EngineResult<Vec<AcademicYear>> {
    let sql = format!("SELECT {} FROM academic_years ORDER BY start_date DESC", YEAR_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], year_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_terms(conn: &Connection, academic_year_id: Option<&str>) -> EngineResult<Vec<Term>> {
    let rows = match academic_year_id {
        Some(yid) => {
            let sql = format!(
                "SELECT {} FROM terms WHERE academic_year_id = ? ORDER BY start_date",
                TERM_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([yid], term_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {} FROM terms ORDER BY start_date", TERM_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], term_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn active_year(conn: &Connection) -> EngineResult<Option<AcademicYear>> {
    let sql = format!("SELECT {} FROM academic_years WHERE active = 1", YEAR_COLUMNS);
    Ok(conn.query_row(&sql, [], year_from_row).optional()?)
}

pub fn active_term(conn: &Connection) -> EngineResult<Option<Term>> {
    let sql = format!("SELECT {} FROM terms WHERE active = 1", TERM_COLUMNS);
    Ok(conn.query_row(&sql, [], term_from_row).optional()?)
}

pub fn activate_year(ctx: &EngineContext<'_>, id: &str) -> EngineResult<AcademicYear> {
    let year = engine::with_write_tx(ctx, |conn| {
        switch_active(conn, PeriodKind::AcademicYear, id)?;
        find_year(conn, id)?.ok_or_else(|| EngineError::not_found("academic year", id))
    })?;
    tracing::info!(academic_year_id = %year.id, "academic year activated");
    Ok(year)
}

pub fn activate_term(ctx: &EngineContext<'_>, id: &str) -> EngineResult<Term> {
    let term = engine::with_write_tx(ctx, |conn| {
        switch_active(conn, PeriodKind::Term, id)?;
        find_term(conn, id)?.ok_or_else(|| EngineError::not_found("term", id))
    })?;
    tracing::info!(term_id = %term.id, "term activated");
    Ok(term)
}
