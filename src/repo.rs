//! SQLite-backed lookups and writes the engine and intake depend on.
//!
//! Every function takes a plain `&Connection` so callers can pass a `Transaction` through
//! deref and keep several calls inside one read-consistent unit.

use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::{
    title_key, Assessment, AssessmentKind, FinalAssessment, NaturalKey, RawScore, RawScoreInput,
};

const ASSESSMENT_COLUMNS: &str = "id, subject_id, academic_year_id, term_id, kind, weight";
const SCORE_COLUMNS: &str =
    "id, student_id, assessment_id, title, score, weight, effort, comment";
const FINAL_COLUMNS: &str = "id, student_id, subject_id, class_id, academic_year_id, term_id,
     total_score, total_effort, grade, remark";

fn assessment_from_row(r: &Row<'_>) -> rusqlite::Result<Assessment> {
    let kind_raw: String = r.get(4)?;
    let kind = AssessmentKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown assessment kind: {}", kind_raw).into(),
        )
    })?;
    Ok(Assessment {
        id: r.get(0)?,
        subject_id: r.get(1)?,
        academic_year_id: r.get(2)?,
        term_id: r.get(3)?,
        kind,
        weight: r.get(5)?,
    })
}

fn score_from_row(r: &Row<'_>) -> rusqlite::Result<RawScore> {
    Ok(RawScore {
        id: r.get(0)?,
        student_id: r.get(1)?,
        assessment_id: r.get(2)?,
        title: r.get(3)?,
        score: r.get(4)?,
        weight: r.get(5)?,
        effort: r.get(6)?,
        comment: r.get(7)?,
    })
}

fn final_from_row(r: &Row<'_>) -> rusqlite::Result<FinalAssessment> {
    Ok(FinalAssessment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        class_id: r.get(3)?,
        academic_year_id: r.get(4)?,
        term_id: r.get(5)?,
        total_score: r.get(6)?,
        total_effort: r.get(7)?,
        grade: r.get(8)?,
        remark: r.get(9)?,
    })
}

/// Tables whose rows are looked up by id alone.
#[derive(Debug, Clone, Copy)]
pub enum Entity {
    Class,
    Subject,
    Student,
    AcademicYear,
    Term,
    Assessment,
}

impl Entity {
    fn table(self) -> &'static str {
        match self {
            Self::Class => "classes",
            Self::Subject => "subjects",
            Self::Student => "students",
            Self::AcademicYear => "academic_years",
            Self::Term => "terms",
            Self::Assessment => "assessments",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Subject => "subject",
            Self::Student => "student",
            Self::AcademicYear => "academic year",
            Self::Term => "term",
            Self::Assessment => "assessment",
        }
    }
}

pub fn exists(conn: &Connection, entity: Entity, id: &str) -> EngineResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", entity.table());
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

pub fn find_assessment(conn: &Connection, id: &str) -> EngineResult<Option<Assessment>> {
    let sql = format!("SELECT {} FROM assessments WHERE id = ?", ASSESSMENT_COLUMNS);
    Ok(conn.query_row(&sql, [id], assessment_from_row).optional()?)
}

/// Assessments of one subject in one term, in creation order.
pub fn assessments_for_scope(
    conn: &Connection,
    subject_id: &str,
    academic_year_id: &str,
    term_id: &str,
) -> EngineResult<Vec<Assessment>> {
    let sql = format!(
        "SELECT {} FROM assessments
         WHERE subject_id = ? AND academic_year_id = ? AND term_id = ?
         ORDER BY rowid",
        ASSESSMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((subject_id, academic_year_id, term_id), assessment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Assessments of one term, optionally narrowed to a subject, in creation order.
pub fn assessments_for_period(
    conn: &Connection,
    academic_year_id: &str,
    term_id: &str,
    subject_id: Option<&str>,
) -> EngineResult<Vec<Assessment>> {
    let mut sql = format!(
        "SELECT {} FROM assessments WHERE academic_year_id = ? AND term_id = ?",
        ASSESSMENT_COLUMNS
    );
    let mut bind_values: Vec<Value> = vec![
        Value::Text(academic_year_id.to_string()),
        Value::Text(term_id.to_string()),
    ];
    if let Some(sid) = subject_id {
        sql.push_str(" AND subject_id = ?");
        bind_values.push(Value::Text(sid.to_string()));
    }
    sql.push_str(" ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), assessment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_assessments(
    conn: &Connection,
    subject_id: Option<&str>,
    academic_year_id: Option<&str>,
    term_id: Option<&str>,
) -> EngineResult<Vec<Assessment>> {
    let mut sql = format!("SELECT {} FROM assessments WHERE 1 = 1", ASSESSMENT_COLUMNS);
    let mut bind_values: Vec<Value> = Vec::new();
    for (col, v) in [
        ("subject_id", subject_id),
        ("academic_year_id", academic_year_id),
        ("term_id", term_id),
    ] {
        if let Some(v) = v {
            sql.push_str(&format!(" AND {} = ?", col));
            bind_values.push(Value::Text(v.to_string()));
        }
    }
    sql.push_str(" ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), assessment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Raw scores of one student on one assessment, in insertion order.
pub fn scores_for(
    conn: &Connection,
    student_id: &str,
    assessment_id: &str,
) -> EngineResult<Vec<RawScore>> {
    let sql = format!(
        "SELECT {} FROM raw_scores WHERE student_id = ? AND assessment_id = ? ORDER BY rowid",
        SCORE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, assessment_id), score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_score(conn: &Connection, id: &str) -> EngineResult<Option<RawScore>> {
    let sql = format!("SELECT {} FROM raw_scores WHERE id = ?", SCORE_COLUMNS);
    Ok(conn.query_row(&sql, [id], score_from_row).optional()?)
}

pub fn find_score_by_title(
    conn: &Connection,
    student_id: &str,
    assessment_id: &str,
    title: &str,
) -> EngineResult<Option<RawScore>> {
    let sql = format!(
        "SELECT {} FROM raw_scores WHERE student_id = ? AND assessment_id = ? AND title_key = ?",
        SCORE_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            (student_id, assessment_id, title_key(title)),
            score_from_row,
        )
        .optional()?)
}

pub fn list_scores(
    conn: &Connection,
    student_id: Option<&str>,
    assessment_id: Option<&str>,
) -> EngineResult<Vec<RawScore>> {
    let mut sql = format!("SELECT {} FROM raw_scores WHERE 1 = 1", SCORE_COLUMNS);
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(v) = student_id {
        sql.push_str(" AND student_id = ?");
        bind_values.push(Value::Text(v.to_string()));
    }
    if let Some(v) = assessment_id {
        sql.push_str(" AND assessment_id = ?");
        bind_values.push(Value::Text(v.to_string()));
    }
    sql.push_str(" ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Inserts a raw score unless one with the same case-insensitive title already exists for
/// the student and assessment. Returns `None` for a duplicate.
pub fn insert_score(conn: &Connection, input: &RawScoreInput) -> EngineResult<Option<RawScore>> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let title = input.title.trim().to_string();
    let changed = conn.execute(
        "INSERT INTO raw_scores(
            id, student_id, assessment_id, title, title_key, score, weight, effort, comment,
            created_at
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, assessment_id, title_key) DO NOTHING",
        rusqlite::params![
            id,
            input.student_id,
            input.assessment_id,
            title,
            title_key(&title),
            input.score,
            input.weight,
            input.effort,
            input.comment,
            now,
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(RawScore {
        id,
        student_id: input.student_id.clone(),
        assessment_id: input.assessment_id.clone(),
        title,
        score: input.score,
        weight: input.weight,
        effort: input.effort.clone(),
        comment: input.comment.clone(),
    }))
}

pub fn write_score(conn: &Connection, score: &RawScore) -> EngineResult<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE raw_scores
         SET title = ?, title_key = ?, score = ?, weight = ?, effort = ?, comment = ?,
             updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            score.title,
            title_key(&score.title),
            score.score,
            score.weight,
            score.effort,
            score.comment,
            now,
            score.id,
        ],
    )?;
    Ok(())
}

pub fn delete_score(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute("DELETE FROM raw_scores WHERE id = ?", [id])?;
    Ok(changed > 0)
}

/// `None` when the student does not exist; `Some(None)` when they have no class.
pub fn student_class(conn: &Connection, student_id: &str) -> EngineResult<Option<Option<String>>> {
    Ok(conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()?)
}

/// Students as `(id, class_id)`, optionally restricted to one class, in creation order.
pub fn students_for_cohort(
    conn: &Connection,
    class_id: Option<&str>,
) -> EngineResult<Vec<(String, Option<String>)>> {
    let mut sql = "SELECT id, class_id FROM students".to_string();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" WHERE class_id = ?");
        bind_values.push(Value::Text(cid.to_string()));
    }
    sql.push_str(" ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_final_by_key(
    conn: &Connection,
    key: &NaturalKey,
) -> EngineResult<Option<FinalAssessment>> {
    let sql = format!(
        "SELECT {} FROM final_assessments
         WHERE student_id = ? AND subject_id = ? AND academic_year_id = ? AND term_id = ?",
        FINAL_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            (
                &key.student_id,
                &key.subject_id,
                &key.academic_year_id,
                &key.term_id,
            ),
            final_from_row,
        )
        .optional()?)
}

pub fn find_final(conn: &Connection, id: &str) -> EngineResult<Option<FinalAssessment>> {
    let sql = format!("SELECT {} FROM final_assessments WHERE id = ?", FINAL_COLUMNS);
    Ok(conn.query_row(&sql, [id], final_from_row).optional()?)
}

/// Values computed for one natural key, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalValues<'a> {
    pub class_id: Option<&'a str>,
    pub total_score: f64,
    pub total_effort: f64,
    pub grade: &'a str,
    pub remark: &'a str,
}

/// Insert-or-update keyed by the natural key. The row id is kept across updates.
pub fn upsert_final(
    conn: &Connection,
    key: &NaturalKey,
    values: &FinalValues<'_>,
) -> EngineResult<FinalAssessment> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO final_assessments(
            id, student_id, subject_id, class_id, academic_year_id, term_id,
            total_score, total_effort, grade, remark, updated_at
         )
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id, academic_year_id, term_id) DO UPDATE SET
           class_id = excluded.class_id,
           total_score = excluded.total_score,
           total_effort = excluded.total_effort,
           grade = excluded.grade,
           remark = excluded.remark,
           updated_at = excluded.updated_at",
        rusqlite::params![
            id,
            key.student_id,
            key.subject_id,
            values.class_id,
            key.academic_year_id,
            key.term_id,
            values.total_score,
            values.total_effort,
            values.grade,
            values.remark,
            now,
        ],
    )?;
    find_final_by_key(conn, key)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
}

#[derive(Debug, Clone, Default)]
pub struct FinalFilter {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub class_id: Option<String>,
    pub academic_year_id: Option<String>,
    pub term_id: Option<String>,
}

pub fn list_finals(conn: &Connection, filter: &FinalFilter) -> EngineResult<Vec<FinalAssessment>> {
    let mut sql = format!("SELECT {} FROM final_assessments WHERE 1 = 1", FINAL_COLUMNS);
    let mut bind_values: Vec<Value> = Vec::new();
    for (col, v) in [
        ("student_id", &filter.student_id),
        ("subject_id", &filter.subject_id),
        ("class_id", &filter.class_id),
        ("academic_year_id", &filter.academic_year_id),
        ("term_id", &filter.term_id),
    ] {
        if let Some(v) = v {
            sql.push_str(&format!(" AND {} = ?", col));
            bind_values.push(Value::Text(v.clone()));
        }
    }
    sql.push_str(" ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), final_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_final(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute("DELETE FROM final_assessments WHERE id = ?", [id])?;
    Ok(changed > 0)
}
