use crate::ipc::helpers::{db_conn, required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::Reconciler;
use crate::store::SqliteRosterStore;
use serde_json::{json, Value};

fn teachers_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let id = SqliteRosterStore::new(conn)
        .create_teacher(name.trim())
        .map_err(HandlerErr::update)?;
    tracing::info!(teacher_id = %id, "teacher created");
    Ok(json!({ "teacherId": id }))
}

fn teachers_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let teachers = SqliteRosterStore::new(conn)
        .list_teachers()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "teachers": to_json(&teachers)? }))
}

fn teachers_set_signature(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(params, "teacherId")?;
    let signature = required_str(params, "signature")?;
    let store = SqliteRosterStore::new(conn);
    let rec = Reconciler::load(&store, state.selection.exam_id.as_deref())?;
    let teacher = rec.set_teacher_signature(&teacher_id, &signature)?;
    Ok(json!({ "teacher": to_json(&teacher)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teachers.create" => teachers_create(state, &req.params),
        "teachers.list" => teachers_list(state),
        "teachers.setSignature" => teachers_set_signature(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
