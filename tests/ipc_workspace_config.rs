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

#[test]
fn workspace_config_drives_grading_bands() {
    let workspace = temp_dir("gradebook-config");
    std::fs::write(
        workspace.join("gradebook.toml"),
        r#"
[grading]
bands = [
  { min = 75.0, grade = "Distinction", remark = "Outstanding" },
  { min = 40.0, grade = "Pass", remark = "Satisfactory" },
]
fallback = { grade = "Fail", remark = "Below pass mark" }

[aggregation]
effort_mode = "pooled"
"#,
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], true);

    let cfg = request(&mut stdin, &mut reader, "2", "config.get", json!({}));
    assert_eq!(cfg["result"]["config"]["aggregation"]["effort_mode"], "pooled");
    assert_eq!(cfg["result"]["config"]["intake"]["max_batch_size"], 5000);

    let graded = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.classify",
        json!({ "percentage": 80 }),
    );
    assert_eq!(graded["result"]["grade"], "Distinction");
    let graded = request(
        &mut stdin,
        &mut reader,
        "4",
        "grades.classify",
        json!({ "percentage": 12.5 }),
    );
    assert_eq!(graded["result"]["grade"], "Fail");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn malformed_config_refuses_the_workspace() {
    let workspace = temp_dir("gradebook-bad-config");
    std::fs::write(
        workspace.join("gradebook.toml"),
        "[grading]\nbands = [ { min = 50.0, grade = \"P\", remark = \"ok\" }, { min = 70.0, grade = \"D\", remark = \"good\" } ]\n",
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "config_invalid");

    let after = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(after["error"]["code"], "no_workspace");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&workspace);
}
