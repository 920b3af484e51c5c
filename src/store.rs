use crate::model::{
    AttendanceRecord, ExamCenter, ExamSession, SeatingAssignment, SeatingGroup, Student, Teacher,
};
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

/// How a multi-student upsert treats a failure part way through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Every upsert is attempted on its own; committed ones stay committed.
    BestEffort,
    /// All upserts commit together or none do.
    Atomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub applied: usize,
}

impl BatchOutcome {
    pub fn failed(&self) -> usize {
        self.attempted - self.applied
    }
}

/// Storage operations the reconciler and report builder rely on.
pub trait RosterStore {
    fn list_exam_sessions(&self) -> anyhow::Result<Vec<ExamSession>>;
    fn list_students(&self) -> anyhow::Result<Vec<Student>>;
    fn list_attendance(&self, exam_id: &str) -> anyhow::Result<Vec<AttendanceRecord>>;
    fn list_seating_groups(&self, exam_id: &str) -> anyhow::Result<Vec<SeatingGroup>>;
    fn upsert_attendance(
        &self,
        exam_id: &str,
        student_id: &str,
        seat_number: &str,
    ) -> anyhow::Result<AttendanceRecord>;
    fn delete_attendance(&self, record_id: &str) -> anyhow::Result<()>;
    fn update_student_signature(&self, student_id: &str, signature: &str)
        -> anyhow::Result<Student>;
    fn get_teacher(&self, teacher_id: &str) -> anyhow::Result<Option<Teacher>>;
    fn update_teacher_signature(&self, teacher_id: &str, signature: &str)
        -> anyhow::Result<Teacher>;

    fn upsert_attendance_batch(
        &self,
        exam_id: &str,
        entries: &[(String, String)],
        mode: BatchMode,
    ) -> anyhow::Result<BatchOutcome> {
        if mode == BatchMode::Atomic {
            return Err(anyhow!("this store does not support atomic batches"));
        }
        Ok(upsert_each(self, exam_id, entries))
    }
}

/// Attempts every upsert, logging failures instead of stopping at the first one.
pub fn upsert_each<S: RosterStore + ?Sized>(
    store: &S,
    exam_id: &str,
    entries: &[(String, String)],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (student_id, seat_number) in entries {
        outcome.attempted += 1;
        match store.upsert_attendance(exam_id, student_id, seat_number) {
            Ok(_) => outcome.applied += 1,
            Err(e) => {
                tracing::error!(exam_id, student_id = %student_id, error = %e, "attendance upsert failed");
            }
        }
    }
    outcome
}

pub struct SqliteRosterStore<'a> {
    conn: &'a Connection,
}

fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        roll_number: r.get(1)?,
        name: r.get(2)?,
        department: r.get(3)?,
        signature: r.get(4)?,
    })
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: r.get(0)?,
        exam_id: r.get(1)?,
        student_id: r.get(2)?,
        seat_number: r.get(3)?,
        marked_at: r.get(4)?,
    })
}

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        name: r.get(1)?,
        signature: r.get(2)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub roll_number: String,
    pub name: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewExam {
    pub center_id: Option<String>,
    pub subject: String,
    pub date: String,
    pub start_time: String,
    pub venue: String,
}

impl<'a> SqliteRosterStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_center(&self, name: &str, code: &str) -> anyhow::Result<ExamCenter> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO exam_centers(id, name, code) VALUES(?, ?, ?)",
                (&id, name, code),
            )
            .context("insert exam center")?;
        Ok(ExamCenter {
            id,
            name: name.to_string(),
            code: code.to_string(),
        })
    }

    pub fn list_centers(&self) -> anyhow::Result<Vec<ExamCenter>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, code FROM exam_centers ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ExamCenter {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    code: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn create_exam(&self, exam: &NewExam) -> anyhow::Result<String> {
        if let Some(center_id) = exam.center_id.as_deref() {
            let exists = self
                .conn
                .query_row("SELECT 1 FROM exam_centers WHERE id = ?", [center_id], |r| {
                    r.get::<_, i64>(0)
                })
                .optional()?
                .is_some();
            if !exists {
                return Err(anyhow!("exam center not found: {}", center_id));
            }
        }
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO exams(id, center_id, subject, date, start_time, venue)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &exam.center_id,
                    &exam.subject,
                    &exam.date,
                    &exam.start_time,
                    &exam.venue,
                ),
            )
            .context("insert exam")?;
        Ok(id)
    }

    pub fn create_student(&self, student: &NewStudent) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO students(id, roll_number, name, department, signature, updated_at)
                 VALUES(?, ?, ?, ?, NULL, ?)",
                (
                    &id,
                    &student.roll_number,
                    &student.name,
                    &student.department,
                    now_stamp(),
                ),
            )
            .with_context(|| format!("insert student {}", student.roll_number))?;
        Ok(id)
    }

    /// Inserts or refreshes students keyed by registration number in one transaction.
    /// Returns `(created, updated)`.
    pub fn import_students(&self, students: &[NewStudent]) -> anyhow::Result<(usize, usize)> {
        let tx = self.conn.unchecked_transaction()?;
        let mut created = 0;
        let mut updated = 0;
        for s in students {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM students WHERE roll_number = ?",
                    [&s.roll_number],
                    |r| r.get(0),
                )
                .optional()?;
            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE students SET name = ?, department = ?, updated_at = ? WHERE id = ?",
                        (&s.name, &s.department, now_stamp(), &id),
                    )?;
                    updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO students(id, roll_number, name, department, signature, updated_at)
                         VALUES(?, ?, ?, ?, NULL, ?)",
                        (
                            Uuid::new_v4().to_string(),
                            &s.roll_number,
                            &s.name,
                            &s.department,
                            now_stamp(),
                        ),
                    )?;
                    created += 1;
                }
            }
        }
        tx.commit()?;
        Ok((created, updated))
    }

    pub fn create_teacher(&self, name: &str) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO teachers(id, name, signature, updated_at) VALUES(?, ?, NULL, ?)",
                (&id, name, now_stamp()),
            )
            .context("insert teacher")?;
        Ok(id)
    }

    pub fn list_teachers(&self) -> anyhow::Result<Vec<Teacher>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, signature FROM teachers ORDER BY name")?;
        let rows = stmt
            .query_map([], teacher_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Stores a seating arrangement for an exam. With `arrangement_id` set the
    /// existing arrangement's assignments are replaced in place.
    pub fn save_seating_arrangement(
        &self,
        exam_id: &str,
        arrangement_id: Option<&str>,
        name: &str,
        assignments: &[SeatingAssignment],
    ) -> anyhow::Result<String> {
        let tx = self.conn.unchecked_transaction()?;
        let exam_exists = tx
            .query_row("SELECT 1 FROM exams WHERE id = ?", [exam_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exam_exists {
            return Err(anyhow!("exam not found: {}", exam_id));
        }

        let id = match arrangement_id {
            Some(id) => {
                let changed = tx.execute(
                    "UPDATE seating_arrangements SET name = ? WHERE id = ? AND exam_id = ?",
                    (name, id, exam_id),
                )?;
                if changed == 0 {
                    return Err(anyhow!("seating arrangement not found: {}", id));
                }
                tx.execute(
                    "DELETE FROM seating_assignments WHERE arrangement_id = ?",
                    [id],
                )?;
                id.to_string()
            }
            None => {
                let next_order: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM seating_arrangements WHERE exam_id = ?",
                    [exam_id],
                    |r| r.get(0),
                )?;
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO seating_arrangements(id, exam_id, name, sort_order) VALUES(?, ?, ?, ?)",
                    (&id, exam_id, name, next_order),
                )?;
                id
            }
        };

        for (i, a) in assignments.iter().enumerate() {
            tx.execute(
                "INSERT INTO seating_assignments(arrangement_id, seat_no, reg_no, student_name, department, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &a.seat_no,
                    &a.reg_no,
                    &a.student_name,
                    &a.department,
                    i as i64,
                ),
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    fn find_attendance(&self, exam_id: &str, student_id: &str) -> anyhow::Result<AttendanceRecord> {
        self.conn
            .query_row(
                "SELECT id, exam_id, student_id, seat_number, marked_at
                 FROM exam_attendance WHERE exam_id = ? AND student_id = ?",
                (exam_id, student_id),
                attendance_from_row,
            )
            .context("read back attendance record")
    }
}

const UPSERT_ATTENDANCE_SQL: &str = "INSERT INTO exam_attendance(id, exam_id, student_id, seat_number, marked_at)
     VALUES(?, ?, ?, ?, ?)
     ON CONFLICT(exam_id, student_id) DO UPDATE SET
       seat_number = excluded.seat_number,
       marked_at = excluded.marked_at";

impl RosterStore for SqliteRosterStore<'_> {
    fn list_exam_sessions(&self) -> anyhow::Result<Vec<ExamSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.subject, e.date, e.start_time, e.venue, c.id, c.name, c.code
             FROM exams e
             LEFT JOIN exam_centers c ON c.id = e.center_id
             ORDER BY e.date, e.start_time",
        )?;
        let rows = stmt
            .query_map([], |r| {
                let center_id: Option<String> = r.get(5)?;
                let center = match center_id {
                    Some(id) => Some(ExamCenter {
                        id,
                        name: r.get(6)?,
                        code: r.get(7)?,
                    }),
                    None => None,
                };
                Ok(ExamSession {
                    id: r.get(0)?,
                    subject: r.get(1)?,
                    date: r.get(2)?,
                    start_time: r.get(3)?,
                    venue: r.get(4)?,
                    center,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_students(&self) -> anyhow::Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, roll_number, name, department, signature
             FROM students
             ORDER BY name, roll_number",
        )?;
        let rows = stmt
            .query_map([], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_attendance(&self, exam_id: &str) -> anyhow::Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, exam_id, student_id, seat_number, marked_at
             FROM exam_attendance
             WHERE exam_id = ?",
        )?;
        let rows = stmt
            .query_map([exam_id], attendance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_seating_groups(&self, exam_id: &str) -> anyhow::Result<Vec<SeatingGroup>> {
        let mut group_stmt = self.conn.prepare(
            "SELECT id, exam_id, name FROM seating_arrangements
             WHERE exam_id = ?
             ORDER BY sort_order",
        )?;
        let mut groups = group_stmt
            .query_map([exam_id], |r| {
                Ok(SeatingGroup {
                    id: r.get(0)?,
                    exam_id: r.get(1)?,
                    name: r.get(2)?,
                    assignments: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut seat_stmt = self.conn.prepare(
            "SELECT seat_no, reg_no, student_name, department
             FROM seating_assignments
             WHERE arrangement_id = ?
             ORDER BY sort_order",
        )?;
        for g in groups.iter_mut() {
            g.assignments = seat_stmt
                .query_map([&g.id], |r| {
                    Ok(SeatingAssignment {
                        seat_no: r.get(0)?,
                        reg_no: r.get(1)?,
                        student_name: r.get(2)?,
                        department: r.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(groups)
    }

    fn upsert_attendance(
        &self,
        exam_id: &str,
        student_id: &str,
        seat_number: &str,
    ) -> anyhow::Result<AttendanceRecord> {
        self.conn
            .execute(
                UPSERT_ATTENDANCE_SQL,
                (
                    Uuid::new_v4().to_string(),
                    exam_id,
                    student_id,
                    seat_number,
                    now_stamp(),
                ),
            )
            .with_context(|| format!("upsert attendance for student {}", student_id))?;
        self.find_attendance(exam_id, student_id)
    }

    fn delete_attendance(&self, record_id: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM exam_attendance WHERE id = ?", [record_id])
            .context("delete attendance record")?;
        Ok(())
    }

    fn update_student_signature(
        &self,
        student_id: &str,
        signature: &str,
    ) -> anyhow::Result<Student> {
        let changed = self.conn.execute(
            "UPDATE students SET signature = ?, updated_at = ? WHERE id = ?",
            (signature, now_stamp(), student_id),
        )?;
        if changed == 0 {
            return Err(anyhow!("student not found: {}", student_id));
        }
        self.conn
            .query_row(
                "SELECT id, roll_number, name, department, signature FROM students WHERE id = ?",
                [student_id],
                student_from_row,
            )
            .context("read back student")
    }

    fn get_teacher(&self, teacher_id: &str) -> anyhow::Result<Option<Teacher>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, signature FROM teachers WHERE id = ?",
                [teacher_id],
                teacher_from_row,
            )
            .optional()?)
    }

    fn update_teacher_signature(
        &self,
        teacher_id: &str,
        signature: &str,
    ) -> anyhow::Result<Teacher> {
        let changed = self.conn.execute(
            "UPDATE teachers SET signature = ?, updated_at = ? WHERE id = ?",
            (signature, now_stamp(), teacher_id),
        )?;
        if changed == 0 {
            return Err(anyhow!("teacher not found: {}", teacher_id));
        }
        self.get_teacher(teacher_id)?
            .ok_or_else(|| anyhow!("teacher not found: {}", teacher_id))
    }

    fn upsert_attendance_batch(
        &self,
        exam_id: &str,
        entries: &[(String, String)],
        mode: BatchMode,
    ) -> anyhow::Result<BatchOutcome> {
        if mode == BatchMode::BestEffort {
            return Ok(upsert_each(self, exam_id, entries));
        }

        let tx = self.conn.unchecked_transaction()?;
        let stamp = now_stamp();
        for (student_id, seat_number) in entries {
            tx.execute(
                UPSERT_ATTENDANCE_SQL,
                (
                    Uuid::new_v4().to_string(),
                    exam_id,
                    student_id,
                    seat_number,
                    &stamp,
                ),
            )
            .with_context(|| format!("upsert attendance for student {}", student_id))?;
        }
        tx.commit().context("commit attendance batch")?;
        Ok(BatchOutcome {
            attempted: entries.len(),
            applied: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("open db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn seed(store: &SqliteRosterStore<'_>) -> (String, String) {
        let center = store.create_center("North Hall", "NH-01").expect("center");
        let exam_id = store
            .create_exam(&NewExam {
                center_id: Some(center.id),
                subject: "Physics".into(),
                date: "2024-06-01".into(),
                start_time: "09:00".into(),
                venue: "Room 4".into(),
            })
            .expect("exam");
        let student_id = store
            .create_student(&NewStudent {
                roll_number: "R1".into(),
                name: "Ada".into(),
                department: Some("CS".into()),
            })
            .expect("student");
        (exam_id, student_id)
    }

    #[test]
    fn upsert_keeps_one_record_per_exam_and_student() {
        let conn = open();
        let store = SqliteRosterStore::new(&conn);
        let (exam_id, student_id) = seed(&store);

        let first = store
            .upsert_attendance(&exam_id, &student_id, "A12")
            .expect("first upsert");
        let second = store
            .upsert_attendance(&exam_id, &student_id, "B3")
            .expect("second upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.seat_number, "B3");
        assert_eq!(store.list_attendance(&exam_id).expect("list").len(), 1);
    }

    #[test]
    fn seating_groups_keep_arrangement_and_seat_order() {
        let conn = open();
        let store = SqliteRosterStore::new(&conn);
        let (exam_id, _) = seed(&store);
        let seat = |s: &str, r: &str| SeatingAssignment {
            seat_no: s.into(),
            reg_no: r.into(),
            student_name: None,
            department: None,
        };
        store
            .save_seating_arrangement(&exam_id, None, "Hall A", &[seat("A2", "R2"), seat("A1", "R1")])
            .expect("hall a");
        let b = store
            .save_seating_arrangement(&exam_id, None, "Hall B", &[seat("B1", "R9")])
            .expect("hall b");
        store
            .save_seating_arrangement(&exam_id, Some(&b), "Hall B", &[seat("B7", "R7")])
            .expect("replace hall b");

        let groups = store.list_seating_groups(&exam_id).expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Hall A");
        assert_eq!(groups[0].assignments[0].seat_no, "A2");
        assert_eq!(groups[1].assignments.len(), 1);
        assert_eq!(groups[1].assignments[0].seat_no, "B7");
    }

    #[test]
    fn atomic_batch_rolls_back_on_unknown_student() {
        let conn = open();
        let store = SqliteRosterStore::new(&conn);
        let (exam_id, student_id) = seed(&store);

        let entries = vec![
            (student_id.clone(), "A1".to_string()),
            ("missing-student".to_string(), "A2".to_string()),
        ];
        assert!(store
            .upsert_attendance_batch(&exam_id, &entries, BatchMode::Atomic)
            .is_err());
        assert!(store.list_attendance(&exam_id).expect("list").is_empty());

        let outcome = store
            .upsert_attendance_batch(&exam_id, &entries, BatchMode::BestEffort)
            .expect("best effort");
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(store.list_attendance(&exam_id).expect("list").len(), 1);
    }

    #[test]
    fn import_students_updates_by_registration_number() {
        let conn = open();
        let store = SqliteRosterStore::new(&conn);
        seed(&store);
        let (created, updated) = store
            .import_students(&[
                NewStudent {
                    roll_number: "R1".into(),
                    name: "Ada Lovelace".into(),
                    department: Some("Math".into()),
                },
                NewStudent {
                    roll_number: "R2".into(),
                    name: "Brian".into(),
                    department: None,
                },
            ])
            .expect("import");
        assert_eq!((created, updated), (1, 1));
        let students = store.list_students().expect("students");
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].name, "Ada Lovelace");
        assert_eq!(students[0].department.as_deref(), Some("Math"));
    }
}
