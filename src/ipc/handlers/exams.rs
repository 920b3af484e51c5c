use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{NewExam, RosterStore, SqliteRosterStore};
use serde_json::{json, Value};

fn centers_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let code = required_str(params, "code")?;
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let center = SqliteRosterStore::new(conn)
        .create_center(name.trim(), code.trim())
        .map_err(HandlerErr::update)?;
    tracing::info!(center_id = %center.id, "exam center created");
    to_json(&center)
}

fn centers_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let centers = SqliteRosterStore::new(conn)
        .list_centers()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "centers": to_json(&centers)? }))
}

fn exams_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam = NewExam {
        center_id: optional_str(params, "centerId"),
        subject: required_str(params, "subject")?,
        date: required_str(params, "date")?,
        start_time: required_str(params, "startTime")?,
        venue: optional_str(params, "venue").unwrap_or_default(),
    };
    if chrono::NaiveDate::parse_from_str(&exam.date, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    let id = SqliteRosterStore::new(conn)
        .create_exam(&exam)
        .map_err(HandlerErr::update)?;
    tracing::info!(exam_id = %id, subject = %exam.subject, "exam session created");
    Ok(json!({ "examId": id }))
}

fn exams_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let center_id = optional_str(params, "centerId");
    let exams: Vec<_> = SqliteRosterStore::new(conn)
        .list_exam_sessions()
        .map_err(HandlerErr::query)?
        .into_iter()
        .filter(|e| match center_id.as_deref() {
            Some(id) => e.center.as_ref().is_some_and(|c| c.id == id),
            None => true,
        })
        .collect();
    Ok(json!({ "exams": to_json(&exams)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "centers.create" => centers_create(state, &req.params),
        "centers.list" => centers_list(state),
        "exams.create" => exams_create(state, &req.params),
        "exams.list" => exams_list(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
