use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "examattd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_centers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            center_id TEXT,
            subject TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            venue TEXT NOT NULL,
            FOREIGN KEY(center_id) REFERENCES exam_centers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_center ON exams(center_id)",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_exams_date ON exams(date)", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            roll_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department TEXT,
            signature TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            signature TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seating_arrangements(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(exam_id) REFERENCES exams(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_seating_arrangements_exam ON seating_arrangements(exam_id)",
        [],
    )?;

    // Assignments reference the registration number, not a student row:
    // seating plans are authored before (or without) the roster import.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS seating_assignments(
            arrangement_id TEXT NOT NULL,
            seat_no TEXT NOT NULL,
            reg_no TEXT NOT NULL,
            student_name TEXT,
            department TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(arrangement_id, sort_order),
            FOREIGN KEY(arrangement_id) REFERENCES seating_arrangements(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_seating_assignments_reg ON seating_assignments(reg_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_attendance(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            seat_number TEXT NOT NULL,
            marked_at TEXT,
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(exam_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_attendance_exam ON exam_attendance(exam_id)",
        [],
    )?;

    ensure_exam_attendance_marked_at(conn)?;

    Ok(())
}

// Workspaces created before presence timestamps were recorded.
fn ensure_exam_attendance_marked_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "exam_attendance", "marked_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE exam_attendance ADD COLUMN marked_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, &text),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open db");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "exam_attendance", "marked_at").expect("pragma"));
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = Connection::open_in_memory().expect("open db");
        init_schema(&conn).expect("init");
        assert_eq!(settings_get_json(&conn, "report").expect("get"), None);
        settings_set_json(&conn, "report", &json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "report", &json!({ "a": 2 })).expect("set again");
        assert_eq!(
            settings_get_json(&conn, "report").expect("get"),
            Some(json!({ "a": 2 }))
        );
    }
}
