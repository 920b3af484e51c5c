use crate::db;
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Exam attendance sidecar: reads JSON requests on stdin, one per line.
#[derive(Debug, Parser)]
#[command(name = "examattd", version)]
pub struct Cli {
    /// Open this workspace directory before reading requests.
    #[arg(long, env = "EXAMATTD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log level used when EXAMATTD_LOG is unset.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsSection {
    Reports,
    Export,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 2] = [SettingsSection::Reports, SettingsSection::Export];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reports" => Some(Self::Reports),
            "export" => Some(Self::Export),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reports => "reports",
            Self::Export => "export",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Reports => "settings.reports",
            Self::Export => "settings.export",
        }
    }
}

fn default_section(section: SettingsSection) -> Value {
    match section {
        SettingsSection::Reports => json!({
            "title": "Exam Attendance Report",
            "signaturePlaceholder": "_____________",
            "seatPlaceholder": "-",
            "teacherSignatureLabel": "Teacher Signature",
            "teacherSignaturePlaceholder": "_________________"
        }),
        SettingsSection::Export => json!({
            "dir": "exports"
        }),
    }
}

fn parse_string_max(v: &Value, key: &str, max: usize) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    if s.chars().count() > max {
        return Err(format!("{} must be at most {} characters", key, max));
    }
    Ok(s.to_string())
}

pub fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let Some(obj) = current.as_object_mut() else {
        return Err("settings section is not an object".to_string());
    };
    for (k, v) in patch {
        match section {
            SettingsSection::Reports => match k.as_str() {
                "title" | "teacherSignatureLabel" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "signaturePlaceholder" | "seatPlaceholder" | "teacherSignaturePlaceholder" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 40)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
            SettingsSection::Export => match k.as_str() {
                "dir" => {
                    let dir = parse_string_max(v, k, 400)?;
                    if dir.trim().is_empty() {
                        return Err("dir must not be empty".to_string());
                    }
                    obj.insert(k.clone(), Value::String(dir));
                }
                _ => return Err(format!("unknown export field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SettingsSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Stale fields from older builds are dropped rather than failing the load.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring saved settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub fn save_section(
    conn: &rusqlite::Connection,
    section: SettingsSection,
    value: &Value,
) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub title: String,
    pub signature_placeholder: String,
    pub seat_placeholder: String,
    pub teacher_signature_label: String,
    pub teacher_signature_placeholder: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: "Exam Attendance Report".to_string(),
            signature_placeholder: "_____________".to_string(),
            seat_placeholder: "-".to_string(),
            teacher_signature_label: "Teacher Signature".to_string(),
            teacher_signature_placeholder: "_________________".to_string(),
        }
    }
}

impl ReportSettings {
    pub fn load(conn: &rusqlite::Connection) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(load_section(conn, SettingsSection::Reports)?)?)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExportSettings {
    pub dir: String,
}

impl ExportSettings {
    pub fn load(conn: &rusqlite::Connection) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(load_section(conn, SettingsSection::Export)?)?)
    }

    /// Export directory; relative paths are taken from the workspace root.
    pub fn resolve_dir(&self, workspace: &std::path::Path) -> PathBuf {
        let p = PathBuf::from(&self.dir);
        if p.is_absolute() {
            p
        } else {
            workspace.join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().expect("open db");
        db::init_schema(&conn).expect("init");
        conn
    }

    #[test]
    fn defaults_apply_without_saved_values() {
        let conn = open();
        let settings = ReportSettings::load(&conn).expect("load");
        assert_eq!(settings, ReportSettings::default());
        assert_eq!(settings.signature_placeholder, "_____________");
        assert_eq!(settings.seat_placeholder, "-");
    }

    #[test]
    fn patch_merges_over_defaults() {
        let conn = open();
        let mut current = load_section(&conn, SettingsSection::Reports).expect("load");
        let patch = json!({ "seatPlaceholder": "n/a" });
        merge_section_patch(
            SettingsSection::Reports,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect("merge");
        save_section(&conn, SettingsSection::Reports, &current).expect("save");

        let settings = ReportSettings::load(&conn).expect("reload");
        assert_eq!(settings.seat_placeholder, "n/a");
        assert_eq!(settings.title, "Exam Attendance Report");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut current = default_section(SettingsSection::Export);
        let patch = json!({ "format": "xlsx" });
        let err = merge_section_patch(
            SettingsSection::Export,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect_err("unknown field");
        assert!(err.contains("unknown export field"));
    }

    #[test]
    fn relative_export_dir_is_under_workspace() {
        let settings = ExportSettings {
            dir: "exports".to_string(),
        };
        let ws = std::path::Path::new("/tmp/ws");
        assert_eq!(settings.resolve_dir(ws), ws.join("exports"));
    }
}
