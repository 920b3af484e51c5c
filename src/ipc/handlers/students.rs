use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::Reconciler;
use crate::store::{NewStudent, RosterStore, SqliteRosterStore};
use serde_json::{json, Value};

fn parse_student(v: &Value) -> Result<NewStudent, HandlerErr> {
    let roll_number = required_str(v, "rollNumber")?.trim().to_string();
    let name = required_str(v, "name")?.trim().to_string();
    if roll_number.is_empty() || name.is_empty() {
        return Err(HandlerErr::bad_params("rollNumber and name must not be empty"));
    }
    Ok(NewStudent {
        roll_number,
        name,
        department: optional_str(v, "department").map(|d| d.trim().to_string()),
    })
}

fn students_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student = parse_student(params)?;
    let id = SqliteRosterStore::new(conn)
        .create_student(&student)
        .map_err(HandlerErr::update)?;
    tracing::info!(student_id = %id, roll_number = %student.roll_number, "student created");
    Ok(json!({ "studentId": id }))
}

fn students_import(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let Some(rows) = params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing students"));
    };
    let students = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            parse_student(row).map_err(|mut e| {
                e.details = Some(json!({ "index": i }));
                e
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (created, updated) = SqliteRosterStore::new(conn)
        .import_students(&students)
        .map_err(HandlerErr::update)?;
    tracing::info!(created, updated, "students imported");
    Ok(json!({ "created": created, "updated": updated }))
}

fn students_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let students = SqliteRosterStore::new(conn)
        .list_students()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": to_json(&students)? }))
}

fn students_set_signature(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let signature = required_str(params, "signature")?;
    let store = SqliteRosterStore::new(conn);
    let mut rec = Reconciler::load(&store, state.selection.exam_id.as_deref())?;
    let student = rec.capture_signature(&student_id, &signature)?;
    Ok(json!({ "student": to_json(&student)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.create" => students_create(state, &req.params),
        "students.import" => students_import(state, &req.params),
        "students.list" => students_list(state),
        "students.setSignature" => students_set_signature(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
