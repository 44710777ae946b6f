use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "expected ok response for {}, got {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn str_at<'a>(v: &'a serde_json::Value, path: &[&str]) -> &'a str {
    let mut cur = v;
    for p in path {
        cur = &cur[*p];
    }
    cur.as_str().expect("string field")
}

#[test]
fn calls_before_workspace_select_report_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let resp = request(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(&mut stdin, &mut reader, "3", "nope.nothing", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    // Classification works against the default table without a workspace.
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.classify",
        json!({ "percentage": 79.99 }),
    );
    assert_eq!(graded["grade"], "B");
    assert_eq!(graded["remark"], "Good effort");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn end_to_end_intake_and_grading_over_ipc() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let class = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "JSS 1A" }));
    let class_id = str_at(&class, &["class", "id"]).to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Ada Obi", "classId": class_id }),
    );
    let student_id = str_at(&student, &["student", "id"]).to_string();
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "Mathematics", "code": "MTH" }),
    );
    let subject_id = str_at(&subject, &["subject", "id"]).to_string();
    let year = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "years.create",
        json!({ "name": "2025/2026", "startDate": "2025-09-01", "endDate": "2026-07-31", "active": true }),
    );
    let year_id = str_at(&year, &["academicYear", "id"]).to_string();
    let term = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "terms.create",
        json!({
            "academicYearId": year_id,
            "name": "First Term",
            "startDate": "2025-09-01",
            "endDate": "2025-12-15",
            "active": true
        }),
    );
    let term_id = str_at(&term, &["term", "id"]).to_string();

    let active = request_ok(&mut stdin, &mut reader, "7", "terms.active", json!({}));
    assert_eq!(str_at(&active, &["term", "id"]), term_id);

    let midterm = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assessments.create",
        json!({
            "subjectId": subject_id,
            "academicYearId": year_id,
            "termId": term_id,
            "type": "midterm",
            "weight": 40
        }),
    );
    let midterm_id = midterm["created"][0]["id"].as_str().expect("midterm id").to_string();
    let fin = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "assessments.create",
        json!({
            "subjectId": subject_id,
            "academicYearId": year_id,
            "termId": term_id,
            "type": "final",
            "weight": 60
        }),
    );
    let final_id = fin["created"][0]["id"].as_str().expect("final id").to_string();

    let dup = request(
        &mut stdin,
        &mut reader,
        "10",
        "assessments.create",
        json!({
            "subjectId": subject_id,
            "academicYearId": year_id,
            "termId": term_id,
            "type": "final",
            "weight": 60
        }),
    );
    assert_eq!(error_code(&dup), "conflict");

    let ingest = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "scores.ingest",
        json!({
            "scores": [
                { "title": "Midterm", "studentId": student_id, "assessmentId": midterm_id, "score": 90, "weight": 100, "effort": 3 },
                { "title": "Final", "studentId": student_id, "assessmentId": final_id, "score": 45, "weight": 50, "effort": "4" },
                { "title": "final", "studentId": student_id, "assessmentId": final_id, "score": 10, "weight": 50 }
            ]
        }),
    );
    assert_eq!(ingest["createdCount"], 2);
    assert_eq!(ingest["skippedCount"], 1);

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "grades.get",
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "academicYearId": year_id,
            "termId": term_id
        }),
    );
    let fa = &got["finalAssessment"];
    assert_eq!(fa["totalScore"].as_f64(), Some(90.0));
    assert_eq!(fa["grade"], "A");
    assert_eq!(fa["classId"].as_str(), Some(class_id.as_str()));

    let cohort = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "grades.recomputeCohort",
        json!({ "academicYearId": year_id, "termId": term_id, "classId": class_id }),
    );
    assert_eq!(cohort["succeeded"], 1);
    assert_eq!(cohort["failed"], 0);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "grades.list",
        json!({ "classId": class_id }),
    );
    let finals = listed["finalAssessments"].as_array().expect("finals");
    assert_eq!(finals.len(), 1);
    let final_assessment_id = finals[0]["id"].as_str().expect("id").to_string();

    let bad = request(
        &mut stdin,
        &mut reader,
        "15",
        "scores.ingest",
        json!({ "scores": [ { "title": "x", "studentId": student_id } ] }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "grades.delete",
        json!({ "finalAssessmentId": final_assessment_id }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "17",
        "grades.get",
        json!({ "finalAssessmentId": final_assessment_id }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
