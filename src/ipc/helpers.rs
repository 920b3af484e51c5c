use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::reconcile::AttendanceError;
use crate::render::RenderError;
use crate::store::BatchMode;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: impl std::fmt::Display) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        let details = match &e {
            AttendanceError::BatchFailed { outcome, .. } => Some(json!({
                "attempted": outcome.attempted,
                "applied": outcome.applied,
            })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<RenderError> for HandlerErr {
    fn from(e: RenderError) -> Self {
        tracing::error!(error = %e, "report render failed");
        let code = match e {
            RenderError::MissingSession(_) => "not_found",
            _ => "render_failed",
        };
        Self::new(code, e.to_string())
    }
}

pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// A non-empty string param; empty strings count as absent.
pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

pub fn batch_mode(params: &Value) -> BatchMode {
    if params.get("atomic").and_then(|v| v.as_bool()).unwrap_or(false) {
        BatchMode::Atomic
    } else {
        BatchMode::BestEffort
    }
}

/// Exam from `params.examId`, falling back to the current selection.
pub fn exam_param(state: &AppState, params: &Value) -> Result<String, HandlerErr> {
    optional_str(params, "examId")
        .or_else(|| state.selection.exam_id.clone())
        .ok_or_else(|| AttendanceError::NoExamSelected.into())
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal_error", e.to_string()))
}
