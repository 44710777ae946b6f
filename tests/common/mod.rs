#![allow(dead_code)]

use gradebookd::calendar::{self, NewPeriod};
use gradebookd::config::GradebookConfig;
use gradebookd::db;
use gradebookd::engine::EngineContext;
use gradebookd::model::{AssessmentKind, NaturalKey, RawScoreInput};
use gradebookd::roster::{self, NewAssessment, SubjectTarget};
use rusqlite::Connection;

/// A workspace in a temp dir. Fields drop in order, so the connection closes before the dir
/// is removed.
pub struct TestWorkspace {
    pub conn: Connection,
    pub config: GradebookConfig,
    pub dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_config(GradebookConfig::default())
    }

    pub fn with_config(config: GradebookConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path(), &config.storage).expect("open db");
        Self { conn, config, dir }
    }

    pub fn ctx(&self) -> EngineContext<'_> {
        EngineContext::new(&self.conn, &self.config)
    }

    /// A second connection to the same database file.
    pub fn open_another(&self) -> Connection {
        db::open_db(self.dir.path(), &self.config.storage).expect("open second connection")
    }
}

pub struct Seed {
    pub class_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub year_id: String,
    pub term_id: String,
}

impl Seed {
    pub fn key(&self) -> NaturalKey {
        self.key_for(&self.student_id)
    }

    pub fn key_for(&self, student_id: &str) -> NaturalKey {
        NaturalKey::new(student_id, &self.subject_id, &self.year_id, &self.term_id)
    }
}

pub fn period(name: &str, start: &str, end: &str, active: bool) -> NewPeriod {
    NewPeriod {
        name: name.to_string(),
        start_date: start.to_string(),
        end_date: end.to_string(),
        active,
    }
}

/// One class with one student, one subject, and an active year and term.
pub fn seed(ws: &TestWorkspace) -> Seed {
    let ctx = ws.ctx();
    let class = roster::create_class(&ws.conn, "JSS 1A").expect("create class");
    let student = roster::create_student(&ws.conn, "Ada Obi", Some(&class.id)).expect("student");
    let subject =
        roster::create_subject(&ctx, "Mathematics", "MTH", None).expect("create subject");
    let year = calendar::create_year(&ctx, &period("2025/2026", "2025-09-01", "2026-07-31", true))
        .expect("create year");
    let term = calendar::create_term(
        &ctx,
        &year.id,
        &period("First Term", "2025-09-01", "2025-12-15", true),
    )
    .expect("create term");
    Seed {
        class_id: class.id,
        student_id: student.id,
        subject_id: subject.id,
        year_id: year.id,
        term_id: term.id,
    }
}

pub fn add_student(ws: &TestWorkspace, class_id: Option<&str>, name: &str) -> String {
    roster::create_student(&ws.conn, name, class_id)
        .expect("create student")
        .id
}

pub fn add_assessment(ws: &TestWorkspace, seed: &Seed, kind: AssessmentKind, weight: f64) -> String {
    add_assessment_for(ws, seed, &seed.subject_id, kind, weight)
}

pub fn add_assessment_for(
    ws: &TestWorkspace,
    seed: &Seed,
    subject_id: &str,
    kind: AssessmentKind,
    weight: f64,
) -> String {
    let created = roster::create_assessment(
        &ws.ctx(),
        &NewAssessment {
            subjects: SubjectTarget::One(subject_id.to_string()),
            academic_year_id: seed.year_id.clone(),
            term_id: seed.term_id.clone(),
            kind,
            weight,
        },
    )
    .expect("create assessment");
    created.created[0].id.clone()
}

pub fn score(
    student_id: &str,
    assessment_id: &str,
    title: &str,
    score: f64,
    weight: f64,
    effort: Option<&str>,
) -> RawScoreInput {
    RawScoreInput {
        title: title.to_string(),
        student_id: student_id.to_string(),
        assessment_id: assessment_id.to_string(),
        score,
        weight,
        effort: effort.map(str::to_string),
        comment: None,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
