use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::config::StorageConfig;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path, storage: &StorageConfig) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    // At most one active row; the activate path clears before it sets.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_one_active
         ON academic_years(active) WHERE active = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            academic_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_terms_one_active
         ON terms(active) WHERE active = 1",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_year ON terms(academic_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            name TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            weight REAL NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(term_id) REFERENCES terms(id),
            UNIQUE(subject_id, academic_year_id, term_id, kind)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_scope
         ON assessments(subject_id, academic_year_id, term_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS raw_scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            title TEXT NOT NULL,
            title_key TEXT NOT NULL,
            score REAL NOT NULL,
            weight REAL NOT NULL,
            effort TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            UNIQUE(student_id, assessment_id, title_key)
        )",
        [],
    )?;
    ensure_raw_scores_comment(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_raw_scores_pair ON raw_scores(student_id, assessment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_raw_scores_assessment ON raw_scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS final_assessments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT,
            academic_year_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            total_score REAL NOT NULL,
            total_effort REAL NOT NULL,
            grade TEXT NOT NULL,
            remark TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(term_id) REFERENCES terms(id),
            UNIQUE(student_id, subject_id, academic_year_id, term_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_final_assessments_class ON final_assessments(class_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_raw_scores_comment(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "raw_scores", "comment")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE raw_scores ADD COLUMN comment TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_idempotent_and_adds_comment_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageConfig::default();
        let conn = open_db(dir.path(), &storage).expect("first open");
        assert!(table_has_column(&conn, "raw_scores", "comment").expect("pragma"));
        drop(conn);
        let conn = open_db(dir.path(), &storage).expect("second open");
        assert!(table_has_column(&conn, "final_assessments", "grade").expect("pragma"));
    }
}
