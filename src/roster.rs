//! Classes, subjects, students and assessment definitions.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::{self, EngineContext};
use crate::error::{EngineError, EngineResult};
use crate::model::{Assessment, AssessmentKind};
use crate::repo::{self, Entity};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_id: Option<String>,
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        description: r.get(3)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        class_id: r.get(2)?,
    })
}

fn non_empty(field: &str, raw: &str) -> EngineResult<String> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(EngineError::validation(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

pub fn create_class(conn: &Connection, name: &str) -> EngineResult<ClassRecord> {
    let name = non_empty("name", name)?;
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, &name))?;
    Ok(ClassRecord { id, name })
}

pub fn list_classes(conn: &Connection) -> EngineResult<Vec<ClassRecord>> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRecord {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Name and code are each unique, compared case-insensitively.
pub fn create_subject(
    ctx: &EngineContext<'_>,
    name: &str,
    code: &str,
    description: Option<&str>,
) -> EngineResult<Subject> {
    let name = non_empty("name", name)?;
    let code = non_empty("code", code)?;
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    engine::with_write_tx(ctx, |conn| {
        let clash: Option<Subject> = conn
            .query_row(
                "SELECT id, name, code, description FROM subjects
                 WHERE lower(name) = lower(?) OR lower(code) = lower(?)",
                (&name, &code),
                subject_from_row,
            )
            .optional()?;
        if let Some(existing) = clash {
            return Err(EngineError::Conflict {
                message: format!(
                    "subject {:?} ({}) already uses this name or code",
                    existing.name, existing.code
                ),
            });
        }
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO subjects(id, name, code, description) VALUES(?, ?, ?, ?)",
            (&id, &name, &code, &description),
        )?;
        Ok(Subject {
            id,
            name: name.clone(),
            code: code.clone(),
            description: description.clone(),
        })
    })
}

pub fn list_subjects(conn: &Connection) -> EngineResult<Vec<Subject>> {
    let mut stmt =
        conn.prepare("SELECT id, name, code, description FROM subjects ORDER BY name")?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_student(
    conn: &Connection,
    name: &str,
    class_id: Option<&str>,
) -> EngineResult<Student> {
    let name = non_empty("name", name)?;
    if let Some(cid) = class_id {
        if !repo::exists(conn, Entity::Class, cid)? {
            return Err(EngineError::not_found("class", cid));
        }
    }
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(id, class_id, name, updated_at) VALUES(?, ?, ?, ?)",
        (&id, class_id, &name, &now),
    )?;
    Ok(Student {
        id,
        name,
        class_id: class_id.map(str::to_string),
    })
}

pub fn list_students(conn: &Connection, class_id: Option<&str>) -> EngineResult<Vec<Student>> {
    let rows = match class_id {
        Some(cid) => {
            let mut stmt = conn.prepare(
                "SELECT id, name, class_id FROM students WHERE class_id = ? ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([cid], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, name, class_id FROM students ORDER BY rowid")?;
            let rows = stmt
                .query_map([], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Which subjects a new assessment definition applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectTarget {
    One(String),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAssessment {
    pub subjects: SubjectTarget,
    pub academic_year_id: String,
    pub term_id: String,
    pub kind: AssessmentKind,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentCreation {
    pub created: Vec<Assessment>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentPatch {
    pub kind: Option<AssessmentKind>,
    pub weight: Option<f64>,
}

fn check_weight(weight: f64) -> EngineResult<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(EngineError::validation(
            "weight must be a finite, non-negative number",
        ));
    }
    Ok(())
}

fn kind_taken(
    conn: &Connection,
    subject_id: &str,
    academic_year_id: &str,
    term_id: &str,
    kind: AssessmentKind,
) -> EngineResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM assessments
             WHERE subject_id = ? AND academic_year_id = ? AND term_id = ? AND kind = ?",
            (subject_id, academic_year_id, term_id, kind.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_assessment(
    conn: &Connection,
    subject_id: &str,
    new: &NewAssessment,
) -> EngineResult<Assessment> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assessments(id, subject_id, academic_year_id, term_id, kind, weight)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            subject_id,
            &new.academic_year_id,
            &new.term_id,
            new.kind.as_str(),
            new.weight,
        ),
    )?;
    Ok(Assessment {
        id,
        subject_id: subject_id.to_string(),
        academic_year_id: new.academic_year_id.clone(),
        term_id: new.term_id.clone(),
        kind: new.kind,
        weight: new.weight,
    })
}

/// Create one assessment definition, or fan it out across every subject.
///
/// A single-subject create that collides with an existing kind fails with `Conflict`; the
/// fan-out skips subjects that already have it and counts them.
pub fn create_assessment(
    ctx: &EngineContext<'_>,
    new: &NewAssessment,
) -> EngineResult<AssessmentCreation> {
    check_weight(new.weight)?;
    let creation = engine::with_write_tx(ctx, |conn| {
        for (entity, id) in [
            (Entity::AcademicYear, &new.academic_year_id),
            (Entity::Term, &new.term_id),
        ] {
            if !repo::exists(conn, entity, id)? {
                return Err(EngineError::not_found(entity.label(), id.as_str()));
            }
        }

        let subject_ids: Vec<String> = match &new.subjects {
            SubjectTarget::One(sid) => {
                if !repo::exists(conn, Entity::Subject, sid)? {
                    return Err(EngineError::not_found("subject", sid.as_str()));
                }
                if kind_taken(conn, sid, &new.academic_year_id, &new.term_id, new.kind)? {
                    return Err(EngineError::Conflict {
                        message: format!(
                            "a {} assessment already exists for this subject and term",
                            new.kind.as_str()
                        ),
                    });
                }
                vec![sid.clone()]
            }
            SubjectTarget::All => {
                let mut stmt = conn.prepare("SELECT id FROM subjects ORDER BY rowid")?;
                let ids = stmt
                    .query_map([], |r| r.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            }
        };

        let mut created = Vec::with_capacity(subject_ids.len());
        let mut skipped = 0usize;
        for sid in &subject_ids {
            if kind_taken(conn, sid, &new.academic_year_id, &new.term_id, new.kind)? {
                skipped += 1;
                continue;
            }
            created.push(insert_assessment(conn, sid, new)?);
        }
        Ok(AssessmentCreation { created, skipped })
    })?;
    tracing::info!(
        kind = new.kind.as_str(),
        created = creation.created.len(),
        skipped = creation.skipped,
        "assessment definitions created"
    );
    Ok(creation)
}

pub fn get_assessment(conn: &Connection, id: &str) -> EngineResult<Assessment> {
    repo::find_assessment(conn, id)?.ok_or_else(|| EngineError::not_found("assessment", id))
}

/// Change kind or weight. Stored FinalAssessments are not refreshed here; a cohort
/// recompute brings them in line.
pub fn update_assessment(
    ctx: &EngineContext<'_>,
    id: &str,
    patch: &AssessmentPatch,
) -> EngineResult<Assessment> {
    if patch.kind.is_none() && patch.weight.is_none() {
        return Err(EngineError::validation("nothing to update"));
    }
    if let Some(w) = patch.weight {
        check_weight(w)?;
    }
    engine::with_write_tx(ctx, |conn| {
        let mut assessment = get_assessment(conn, id)?;
        if let Some(kind) = patch.kind {
            if kind != assessment.kind
                && kind_taken(
                    conn,
                    &assessment.subject_id,
                    &assessment.academic_year_id,
                    &assessment.term_id,
                    kind,
                )?
            {
                return Err(EngineError::Conflict {
                    message: format!(
                        "a {} assessment already exists for this subject and term",
                        kind.as_str()
                    ),
                });
            }
            assessment.kind = kind;
        }
        if let Some(w) = patch.weight {
            assessment.weight = w;
        }
        conn.execute(
            "UPDATE assessments SET kind = ?, weight = ? WHERE id = ?",
            (assessment.kind.as_str(), assessment.weight, id),
        )?;
        Ok(assessment)
    })
}

/// Assessments with recorded scores cannot be deleted.
pub fn delete_assessment(ctx: &EngineContext<'_>, id: &str) -> EngineResult<()> {
    engine::with_write_tx(ctx, |conn| {
        get_assessment(conn, id)?;
        let scored: i64 = conn.query_row(
            "SELECT COUNT(*) FROM raw_scores WHERE assessment_id = ?",
            [id],
            |r| r.get(0),
        )?;
        if scored > 0 {
            return Err(EngineError::Conflict {
                message: format!("assessment has {} recorded score(s)", scored),
            });
        }
        conn.execute("DELETE FROM assessments WHERE id = ?", [id])?;
        Ok(())
    })
}
