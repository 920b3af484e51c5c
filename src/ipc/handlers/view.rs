use crate::ipc::helpers::{db_conn, optional_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_department, ExamSession};
use crate::reconcile::Reconciler;
use crate::store::{RosterStore, SqliteRosterStore};
use crate::view::{self, AttendanceTab, ALL_DEPARTMENTS};
use serde_json::{json, Value};

fn load_exams(state: &AppState) -> Result<Vec<ExamSession>, HandlerErr> {
    let conn = db_conn(state)?;
    SqliteRosterStore::new(conn)
        .list_exam_sessions()
        .map_err(HandlerErr::query)
}

fn selection_json(state: &AppState) -> Result<Value, HandlerErr> {
    Ok(json!({ "selection": to_json(&state.selection)? }))
}

fn view_select_center(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let exams = load_exams(state)?;
    let center_id = optional_str(params, "centerId");
    state.selection.select_center(center_id, &exams);
    tracing::debug!(center_id = ?state.selection.center_id, exam_id = ?state.selection.exam_id, "center selected");
    selection_json(state)
}

fn view_select_exam(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let exams = load_exams(state)?;
    let exam_id = optional_str(params, "examId");
    if let Some(id) = exam_id.as_deref() {
        if !exams.iter().any(|e| e.id == id) {
            return Err(HandlerErr::new("not_found", format!("exam session not found: {}", id)));
        }
    }
    state.selection.exam_id = exam_id;
    tracing::debug!(exam_id = ?state.selection.exam_id, "exam selected");
    selection_json(state)
}

fn view_set_filters(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    db_conn(state)?;
    if let Some(search) = params.get("search") {
        let Some(s) = search.as_str() else {
            return Err(HandlerErr::bad_params("search must be a string"));
        };
        state.selection.search = s.to_string();
    }
    if let Some(department) = params.get("department") {
        let Some(d) = department.as_str() else {
            return Err(HandlerErr::bad_params("department must be a string"));
        };
        state.selection.department = if d == ALL_DEPARTMENTS {
            ALL_DEPARTMENTS.to_string()
        } else {
            normalize_department(Some(d)).to_string()
        };
    }
    if let Some(tab) = params.get("tab") {
        let Some(parsed) = tab.as_str().and_then(AttendanceTab::parse) else {
            return Err(HandlerErr::bad_params("tab must be one of: all, present, absent"));
        };
        state.selection.tab = parsed;
    }
    selection_json(state)
}

fn view_roster(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let store = SqliteRosterStore::new(conn);
    let rec = Reconciler::load(&store, state.selection.exam_id.as_deref())?;
    let snapshot = rec.snapshot();
    let roster = view::roster_view(snapshot, &state.selection);
    Ok(json!({
        "selection": to_json(&state.selection)?,
        "exam": to_json(&snapshot.exam())?,
        "roster": to_json(&roster)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "view.selectCenter" => view_select_center(state, &req.params),
        "view.selectExam" => view_select_exam(state, &req.params),
        "view.setFilters" => view_set_filters(state, &req.params),
        "view.state" => selection_json(state),
        "view.roster" => view_roster(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
