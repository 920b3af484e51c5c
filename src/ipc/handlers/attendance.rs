use crate::ipc::helpers::{
    batch_mode, db_conn, exam_param, required_str, respond, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{BatchReport, Reconciler};
use crate::store::{RosterStore, SqliteRosterStore};
use serde_json::{json, Value};

fn batch_json(report: BatchReport) -> Value {
    json!({
        "marked": report.marked,
        "message": report.message,
        "warnings": report.warnings,
    })
}

fn attendance_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam_id = exam_param(state, params)?;
    let records = SqliteRosterStore::new(conn)
        .list_attendance(&exam_id)
        .map_err(HandlerErr::query)?;
    Ok(json!({ "examId": exam_id, "records": to_json(&records)? }))
}

fn attendance_is_present(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let exam_id = exam_param(state, params)?;
    let store = SqliteRosterStore::new(conn);
    let rec = Reconciler::load(&store, Some(&exam_id))?;
    Ok(json!({
        "examId": exam_id,
        "studentId": student_id,
        "present": rec.is_present(&student_id),
    }))
}

fn attendance_mark(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let store = SqliteRosterStore::new(conn);
    let mut rec = Reconciler::for_selected(&store, state.selection.exam_id.as_deref())?;
    let outcome = rec.mark(&student_id)?;
    Ok(json!({
        "record": to_json(&outcome.record)?,
        "warnings": outcome.warnings,
    }))
}

fn attendance_mark_all(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let store = SqliteRosterStore::new(conn);
    let mut rec = Reconciler::for_selected(&store, state.selection.exam_id.as_deref())?;
    let report = rec.mark_all(batch_mode(params))?;
    Ok(batch_json(report))
}

fn attendance_mark_department(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let department = required_str(params, "department")?;
    let store = SqliteRosterStore::new(conn);
    let mut rec = Reconciler::for_selected(&store, state.selection.exam_id.as_deref())?;
    let normalized = crate::model::normalize_department(Some(&department));
    let report = rec.mark_department(normalized, batch_mode(params))?;
    Ok(batch_json(report))
}

fn attendance_unmark(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let store = SqliteRosterStore::new(conn);
    let mut rec = Reconciler::for_selected(&store, state.selection.exam_id.as_deref())?;
    let removed = rec.unmark(&student_id)?;
    Ok(json!({ "studentId": student_id, "removed": removed }))
}

fn attendance_save(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let store = SqliteRosterStore::new(conn);
    let rec = Reconciler::for_selected(&store, state.selection.exam_id.as_deref())?;
    let (present, total) = rec.save_summary()?;
    tracing::info!(exam_id = ?state.selection.exam_id, present, total, "attendance saved");
    Ok(json!({
        "present": present,
        "total": total,
        "message": "Attendance saved successfully",
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.isPresent" => attendance_is_present(state, &req.params),
        "attendance.mark" => attendance_mark(state, &req.params),
        "attendance.markAll" => attendance_mark_all(state, &req.params),
        "attendance.markDepartment" => attendance_mark_department(state, &req.params),
        "attendance.unmark" => attendance_unmark(state, &req.params),
        "attendance.save" => attendance_save(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
