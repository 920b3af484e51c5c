use crate::ipc::helpers::{
    db_conn, exam_param, optional_str, required_str, respond, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::SeatingAssignment;
use crate::reconcile::Reconciler;
use crate::store::{RosterStore, SqliteRosterStore};
use serde_json::{json, Value};

fn seating_save(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam_id = exam_param(state, params)?;
    let name = optional_str(params, "name").unwrap_or_else(|| "Seating".to_string());
    let arrangement_id = optional_str(params, "arrangementId");
    let Some(raw) = params.get("assignments") else {
        return Err(HandlerErr::bad_params("missing assignments"));
    };
    let assignments: Vec<SeatingAssignment> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid assignments: {}", e)))?;
    if let Some(i) = assignments
        .iter()
        .position(|a| a.seat_no.trim().is_empty() || a.reg_no.trim().is_empty())
    {
        let mut e = HandlerErr::bad_params("seatNo and regNo must not be empty");
        e.details = Some(json!({ "index": i }));
        return Err(e);
    }

    let id = SqliteRosterStore::new(conn)
        .save_seating_arrangement(&exam_id, arrangement_id.as_deref(), &name, &assignments)
        .map_err(HandlerErr::update)?;
    tracing::info!(exam_id = %exam_id, arrangement_id = %id, seats = assignments.len(), "seating saved");
    Ok(json!({ "arrangementId": id, "assignments": assignments.len() }))
}

fn seating_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam_id = exam_param(state, params)?;
    let groups = SqliteRosterStore::new(conn)
        .list_seating_groups(&exam_id)
        .map_err(HandlerErr::query)?;
    Ok(json!({ "examId": exam_id, "arrangements": to_json(&groups)? }))
}

fn seating_resolve(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let exam_id = exam_param(state, params)?;
    let store = SqliteRosterStore::new(conn);
    let rec = Reconciler::load(&store, Some(&exam_id))?;
    Ok(json!({
        "studentId": student_id,
        "seatNumber": rec.resolve_seat(&student_id),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "seating.save" => seating_save(state, &req.params),
        "seating.list" => seating_list(state, &req.params),
        "seating.resolve" => seating_resolve(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
