use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_examattd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("EXAMATTD_WORKSPACE")
        .spawn()
        .expect("spawn examattd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

fn error_code(value: &Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

struct Seeded {
    exam_id: String,
    center_id: String,
    ids: HashMap<String, String>,
}

/// North Hall / Physics with A(R1, CS), B(R2, CS), C(R3, EE); only R1 is seated (A12).
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seeded {
    let center = request_ok(
        stdin,
        reader,
        "seed-1",
        "centers.create",
        json!({ "name": "North Hall", "code": "NH-1" }),
    );
    let center_id = center["id"].as_str().expect("center id").to_string();
    let exam = request_ok(
        stdin,
        reader,
        "seed-2",
        "exams.create",
        json!({
            "centerId": center_id,
            "subject": "Physics",
            "date": "2024-06-01",
            "startTime": "09:00",
            "venue": "Room 4"
        }),
    );
    let exam_id = exam["examId"].as_str().expect("exam id").to_string();
    let imported = request_ok(
        stdin,
        reader,
        "seed-3",
        "students.import",
        json!({ "students": [
            { "rollNumber": "R1", "name": "Ada", "department": "CS" },
            { "rollNumber": "R2", "name": "Brian", "department": "CS" },
            { "rollNumber": "R3", "name": "Cora", "department": "EE" }
        ]}),
    );
    assert_eq!(imported["created"].as_u64(), Some(3));
    request_ok(
        stdin,
        reader,
        "seed-4",
        "seating.save",
        json!({
            "examId": exam_id,
            "name": "Main hall",
            "assignments": [{ "seatNo": "A12", "regNo": "R1" }]
        }),
    );

    let listed = request_ok(stdin, reader, "seed-5", "students.list", json!({}));
    let ids = listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| {
            (
                s["name"].as_str().expect("name").to_string(),
                s["id"].as_str().expect("id").to_string(),
            )
        })
        .collect();
    Seeded {
        exam_id,
        center_id,
        ids,
    }
}

#[test]
fn marking_requires_a_selected_exam() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let seeded = seed(&mut stdin, &mut reader);

    for (i, (method, params)) in [
        ("attendance.mark", json!({ "studentId": seeded.ids["Ada"] })),
        ("attendance.markAll", json!({})),
        ("attendance.markDepartment", json!({ "department": "CS" })),
        ("attendance.unmark", json!({ "studentId": seeded.ids["Ada"] })),
        ("attendance.save", json!({})),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("p{}", i), method, params);
        assert_eq!(error_code(&resp), "no_exam_selected", "{}", method);
        assert_eq!(
            resp["error"]["message"].as_str(),
            Some("Please select an exam session first.")
        );
    }

    let records = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.list",
        json!({ "examId": seeded.exam_id }),
    );
    assert_eq!(records["records"].as_array().map(Vec::len), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn worked_example_marks_seated_then_department() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let seeded = seed(&mut stdin, &mut reader);

    let selection = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "view.selectCenter",
        json!({ "centerId": seeded.center_id }),
    );
    assert_eq!(
        selection["selection"]["examId"].as_str(),
        Some(seeded.exam_id.as_str())
    );

    let all = request_ok(&mut stdin, &mut reader, "3", "attendance.markAll", json!({}));
    assert_eq!(all["marked"].as_u64(), Some(1));
    assert_eq!(all["message"].as_str(), Some("Marked attendance for 1 students"));

    let dept = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.markDepartment",
        json!({ "department": "CS" }),
    );
    assert_eq!(dept["marked"].as_u64(), Some(2));

    let records = request_ok(&mut stdin, &mut reader, "5", "attendance.list", json!({}));
    let seats: HashMap<String, String> = records["records"]
        .as_array()
        .expect("records")
        .iter()
        .map(|r| {
            (
                r["studentId"].as_str().expect("student").to_string(),
                r["seatNumber"].as_str().expect("seat").to_string(),
            )
        })
        .collect();
    assert_eq!(seats.len(), 2);
    assert_eq!(seats[&seeded.ids["Ada"]], "A12");
    assert_eq!(seats[&seeded.ids["Brian"]], "Not Assigned");

    let model = request_ok(&mut stdin, &mut reader, "6", "reports.model", json!({}));
    let departments = model["model"]["departments"].as_array().expect("departments");
    assert_eq!(departments.len(), 2);
    assert_eq!(departments[0]["name"], "CS");
    assert_eq!(
        departments[0]["totals"],
        json!({ "total": 2, "present": 2, "absent": 0, "rate": 100 })
    );
    assert_eq!(departments[1]["name"], "EE");
    assert_eq!(
        departments[1]["totals"],
        json!({ "total": 1, "present": 0, "absent": 1, "rate": 0 })
    );
    assert_eq!(
        model["totalRow"],
        json!(["Total", "3", "2", "1", "67%"])
    );

    let saved = request_ok(&mut stdin, &mut reader, "7", "attendance.save", json!({}));
    assert_eq!(saved["present"].as_u64(), Some(2));
    assert_eq!(saved["total"].as_u64(), Some(3));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn single_marks_warn_and_unmark_is_idempotent() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let seeded = seed(&mut stdin, &mut reader);
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "view.selectExam",
        json!({ "examId": seeded.exam_id }),
    );

    let cora = seeded.ids["Cora"].clone();
    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.mark",
        json!({ "studentId": cora }),
    );
    assert_eq!(marked["record"]["seatNumber"], "Not Assigned");
    assert_eq!(
        marked["warnings"],
        json!(["No seating assignment found for this student."])
    );

    let present = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.isPresent",
        json!({ "studentId": cora }),
    );
    assert_eq!(present["present"], true);

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.unmark",
        json!({ "studentId": cora }),
    );
    assert_eq!(removed["removed"], true);
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.unmark",
        json!({ "studentId": cora }),
    );
    assert_eq!(again["removed"], false);

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.markDepartment",
        json!({ "department": "Chemistry" }),
    );
    assert_eq!(empty["marked"].as_u64(), Some(0));
    assert_eq!(
        empty["warnings"],
        json!(["No students found in the Chemistry department."])
    );

    let records = request_ok(&mut stdin, &mut reader, "8", "attendance.list", json!({}));
    assert_eq!(records["records"].as_array().map(Vec::len), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn roster_view_filters_by_tab_and_department() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let seeded = seed(&mut stdin, &mut reader);
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "view.selectExam",
        json!({ "examId": seeded.exam_id }),
    );
    request_ok(&mut stdin, &mut reader, "3", "attendance.markAll", json!({}));

    let view = request_ok(&mut stdin, &mut reader, "4", "view.roster", json!({}));
    let roster = &view["roster"];
    assert_eq!(roster["departments"], json!(["all", "CS", "EE"]));
    assert_eq!(roster["stats"]["total"].as_u64(), Some(3));
    assert_eq!(roster["stats"]["present"].as_u64(), Some(1));
    assert_eq!(roster["departmentStats"][0]["name"], "CS");
    assert_eq!(roster["departmentStats"][0]["total"].as_u64(), Some(2));

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "view.setFilters",
        json!({ "tab": "absent", "department": "CS" }),
    );
    let view = request_ok(&mut stdin, &mut reader, "6", "view.roster", json!({}));
    let entries = view["roster"]["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["student"]["name"], "Brian");
    assert_eq!(entries[0]["present"], false);

    let bad = request(
        &mut stdin,
        &mut reader,
        "7",
        "view.setFilters",
        json!({ "tab": "late" }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    drop(stdin);
    let _ = child.wait();
}
