use crate::config::{ExportSettings, ReportSettings};
use crate::ipc::helpers::{db_conn, exam_param, optional_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Teacher;
use crate::reconcile::Reconciler;
use crate::render::{self, Artifact, ExportFormat};
use crate::report::{self, ReportModel};
use crate::store::{RosterStore, SqliteRosterStore};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn load_teacher(store: &SqliteRosterStore<'_>, params: &Value) -> Result<Option<Teacher>, HandlerErr> {
    let Some(teacher_id) = optional_str(params, "teacherId") else {
        return Ok(None);
    };
    match store.get_teacher(&teacher_id).map_err(HandlerErr::query)? {
        Some(t) => Ok(Some(t)),
        None => Err(HandlerErr::new(
            "not_found",
            format!("teacher not found: {}", teacher_id),
        )),
    }
}

/// Loads the exam's roster and builds its report. `None` when the exam does not exist.
fn build_model(
    conn: &Connection,
    exam_id: &str,
    params: &Value,
) -> Result<Option<ReportModel>, HandlerErr> {
    let store = SqliteRosterStore::new(conn);
    let settings = ReportSettings::load(conn).map_err(HandlerErr::query)?;
    let teacher = load_teacher(&store, params)?;
    let snapshot = Reconciler::load(&store, Some(exam_id))?.into_snapshot();
    Ok(report::build_report(&snapshot, &settings, teacher.as_ref()))
}

fn reports_model(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam_id = exam_param(state, params)?;
    let Some(model) = build_model(conn, &exam_id, params)? else {
        return Err(HandlerErr::new(
            "not_found",
            format!("exam session not found: {}", exam_id),
        ));
    };
    Ok(json!({
        "examId": exam_id,
        "model": to_json(&model)?,
        "summary": to_json(&model.summary_table())?,
        "totalRow": model.total_row(),
    }))
}

fn write_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf, HandlerErr> {
    let out = dir.join(&artifact.file_name);
    let fail = |e: std::io::Error| HandlerErr {
        code: "export_failed",
        message: e.to_string(),
        details: Some(json!({ "path": out.to_string_lossy() })),
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    std::fs::write(&out, &artifact.bytes).map_err(fail)?;
    Ok(out)
}

fn reports_export(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let exam_id = exam_param(state, params)?;
    let format_raw = optional_str(params, "format").unwrap_or_else(|| "xlsx".to_string());
    let Some(format) = ExportFormat::parse(&format_raw) else {
        return Err(HandlerErr::bad_params(format!(
            "unknown format: {} (expected xlsx, pdf or docx)",
            format_raw
        )));
    };

    let model = build_model(conn, &exam_id, params)?;
    let artifact = render::render_report(format, model.as_ref(), &exam_id)?;

    let dir = match optional_str(params, "outDir") {
        Some(d) => PathBuf::from(d),
        None => {
            let settings = ExportSettings::load(conn).map_err(HandlerErr::query)?;
            match state.workspace.as_deref() {
                Some(ws) => settings.resolve_dir(ws),
                None => PathBuf::from(&settings.dir),
            }
        }
    };
    let path = write_artifact(&dir, &artifact)?;
    let sha256 = artifact.sha256_hex();
    tracing::info!(
        exam_id = %exam_id,
        format = format.extension(),
        path = %path.display(),
        bytes = artifact.bytes.len(),
        "report exported"
    );
    Ok(json!({
        "path": path.to_string_lossy(),
        "fileName": artifact.file_name,
        "contentType": artifact.format.content_type(),
        "bytes": artifact.bytes.len(),
        "sha256": sha256,
        "rows": model.as_ref().map(ReportModel::row_count).unwrap_or(0),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.model" => reports_model(state, &req.params),
        "reports.export" => reports_export(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
