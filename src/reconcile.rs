use crate::model::{
    AttendanceRecord, ExamSession, SeatingGroup, Student, Teacher, SEAT_NOT_ASSIGNED,
};
use crate::seat;
use crate::store::{BatchMode, BatchOutcome, RosterStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Please select an exam session first.")]
    NoExamSelected,
    #[error("{message}: {cause}")]
    Load { message: String, cause: String },
    #[error("{message}: {cause}")]
    Store { message: String, cause: String },
    #[error("{message}")]
    BatchFailed {
        message: String,
        outcome: BatchOutcome,
    },
}

impl AttendanceError {
    fn load(message: impl Into<String>, e: anyhow::Error) -> Self {
        AttendanceError::Load {
            message: message.into(),
            cause: format!("{e:#}"),
        }
    }

    fn store(message: impl Into<String>, e: anyhow::Error) -> Self {
        AttendanceError::Store {
            message: message.into(),
            cause: format!("{e:#}"),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::NoExamSelected => "no_exam_selected",
            AttendanceError::Load { .. } => "db_query_failed",
            AttendanceError::Store { .. } => "db_update_failed",
            AttendanceError::BatchFailed { .. } => "batch_failed",
        }
    }
}

/// Everything read from the store for one exam session.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    pub exam_id: Option<String>,
    pub exams: Vec<ExamSession>,
    pub students: Vec<Student>,
    pub attendance: Vec<AttendanceRecord>,
    pub seating: Vec<SeatingGroup>,
}

impl RosterSnapshot {
    pub fn load<S: RosterStore + ?Sized>(
        store: &S,
        exam_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let exams = store.list_exam_sessions()?;
        let students = store.list_students()?;
        let (attendance, seating) = match exam_id {
            Some(id) => (store.list_attendance(id)?, store.list_seating_groups(id)?),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Self {
            exam_id: exam_id.map(str::to_string),
            exams,
            students,
            attendance,
            seating,
        })
    }

    pub fn exam(&self) -> Option<&ExamSession> {
        let id = self.exam_id.as_deref()?;
        self.exams.iter().find(|e| e.id == id)
    }

    pub fn record_for(&self, student_id: &str) -> Option<&AttendanceRecord> {
        let exam_id = self.exam_id.as_deref()?;
        self.attendance
            .iter()
            .find(|r| r.exam_id == exam_id && r.student_id == student_id)
    }

    pub fn is_present(&self, student_id: &str) -> bool {
        self.record_for(student_id).is_some()
    }

    pub fn resolve_seat(&self, student_id: &str) -> Option<&str> {
        let exam_id = self.exam_id.as_deref()?;
        seat::resolve_seat(&self.students, &self.seating, exam_id, student_id)
    }
}

#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub record: AttendanceRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub marked: usize,
    pub message: Option<String>,
    pub warnings: Vec<String>,
}

pub struct Reconciler<'s, S: RosterStore + ?Sized> {
    store: &'s S,
    snapshot: RosterSnapshot,
}

impl<'s, S: RosterStore + ?Sized> Reconciler<'s, S> {
    pub fn load(store: &'s S, selected_exam: Option<&str>) -> Result<Self, AttendanceError> {
        let snapshot = RosterSnapshot::load(store, selected_exam)
            .map_err(|e| AttendanceError::load("Failed to load roster", e))?;
        Ok(Self { store, snapshot })
    }

    /// Loads the roster for the selected exam. With nothing selected this fails
    /// before the store is touched.
    pub fn for_selected(
        store: &'s S,
        selected_exam: Option<&str>,
    ) -> Result<Self, AttendanceError> {
        let exam_id = selected_exam.ok_or(AttendanceError::NoExamSelected)?;
        Self::load(store, Some(exam_id))
    }

    /// Re-reads the roster so later lookups observe committed writes.
    pub fn refresh(&mut self) -> Result<(), AttendanceError> {
        let exam_id = self.snapshot.exam_id.clone();
        self.snapshot = RosterSnapshot::load(self.store, exam_id.as_deref())
            .map_err(|e| AttendanceError::load("Failed to refresh roster", e))?;
        Ok(())
    }

    /// The write already stands, so a failed re-read is logged, not returned.
    fn refresh_after_write(&mut self) {
        if let Err(e) = self.refresh() {
            tracing::warn!(error = %e, "roster refresh failed after committed write");
        }
    }

    pub fn snapshot(&self) -> &RosterSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> RosterSnapshot {
        self.snapshot
    }

    pub fn is_present(&self, student_id: &str) -> bool {
        self.snapshot.is_present(student_id)
    }

    pub fn resolve_seat(&self, student_id: &str) -> Option<&str> {
        self.snapshot.resolve_seat(student_id)
    }

    fn require_exam(&self) -> Result<String, AttendanceError> {
        self.snapshot
            .exam_id
            .clone()
            .ok_or(AttendanceError::NoExamSelected)
    }

    /// Marks one student present. A missing seating assignment is a warning;
    /// the record is still written with the `Not Assigned` seat.
    pub fn mark(&mut self, student_id: &str) -> Result<MarkOutcome, AttendanceError> {
        let exam_id = self.require_exam()?;
        let mut warnings = Vec::new();
        let seat = match self.resolve_seat(student_id) {
            Some(s) => s.to_string(),
            None => {
                tracing::warn!(exam_id = %exam_id, student_id, "no seating assignment for student");
                warnings.push("No seating assignment found for this student.".to_string());
                SEAT_NOT_ASSIGNED.to_string()
            }
        };

        let record = self
            .store
            .upsert_attendance(&exam_id, student_id, &seat)
            .map_err(|e| AttendanceError::store("Failed to update attendance", e))?;
        tracing::info!(exam_id = %exam_id, student_id, seat = %record.seat_number, "attendance marked");
        self.refresh_after_write();
        Ok(MarkOutcome { record, warnings })
    }

    /// Marks every student that has a seating assignment in the selected exam.
    /// Students without one are left out of the batch.
    pub fn mark_all(&mut self, mode: BatchMode) -> Result<BatchReport, AttendanceError> {
        let exam_id = self.require_exam()?;
        let entries: Vec<(String, String)> = self
            .snapshot
            .students
            .iter()
            .filter_map(|s| {
                self.resolve_seat(&s.id)
                    .map(|seat| (s.id.clone(), seat.to_string()))
            })
            .collect();

        if entries.is_empty() {
            let warning = "No students have seating assignments for this exam.".to_string();
            tracing::warn!(exam_id = %exam_id, "{}", warning);
            return Ok(BatchReport {
                marked: 0,
                message: None,
                warnings: vec![warning],
            });
        }

        self.run_batch(
            &exam_id,
            &entries,
            mode,
            "Failed to mark attendance for all students".to_string(),
        )?;
        Ok(BatchReport {
            marked: entries.len(),
            message: Some(format!("Marked attendance for {} students", entries.len())),
            warnings: Vec::new(),
        })
    }

    /// Marks every member of `department`, using the `Not Assigned` seat for
    /// members without a seating assignment.
    pub fn mark_department(
        &mut self,
        department: &str,
        mode: BatchMode,
    ) -> Result<BatchReport, AttendanceError> {
        let exam_id = self.require_exam()?;
        let entries: Vec<(String, String)> = self
            .snapshot
            .students
            .iter()
            .filter(|s| s.department_label() == department)
            .map(|s| {
                let seat = self.resolve_seat(&s.id).unwrap_or(SEAT_NOT_ASSIGNED);
                (s.id.clone(), seat.to_string())
            })
            .collect();

        if entries.is_empty() {
            let warning = format!("No students found in the {} department.", department);
            tracing::warn!(exam_id = %exam_id, department, "{}", warning);
            return Ok(BatchReport {
                marked: 0,
                message: None,
                warnings: vec![warning],
            });
        }

        self.run_batch(
            &exam_id,
            &entries,
            mode,
            format!("Failed to mark attendance for {} department students", department),
        )?;
        Ok(BatchReport {
            marked: entries.len(),
            message: Some(format!(
                "Marked attendance for {} students in {} department",
                entries.len(),
                department
            )),
            warnings: Vec::new(),
        })
    }

    fn run_batch(
        &mut self,
        exam_id: &str,
        entries: &[(String, String)],
        mode: BatchMode,
        failure_message: String,
    ) -> Result<(), AttendanceError> {
        let result = self.store.upsert_attendance_batch(exam_id, entries, mode);
        // Best-effort batches leave committed upserts behind; show them either way.
        self.refresh_after_write();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(exam_id, error = %format!("{e:#}"), "attendance batch aborted");
                BatchOutcome {
                    attempted: entries.len(),
                    applied: 0,
                }
            }
        };
        if outcome.failed() > 0 {
            tracing::error!(
                exam_id,
                attempted = outcome.attempted,
                applied = outcome.applied,
                "attendance batch incomplete"
            );
            return Err(AttendanceError::BatchFailed {
                message: failure_message,
                outcome,
            });
        }
        tracing::info!(exam_id, marked = outcome.applied, "attendance batch applied");
        Ok(())
    }

    /// Removes the student's presence record. Returns false when there was none.
    pub fn unmark(&mut self, student_id: &str) -> Result<bool, AttendanceError> {
        let exam_id = self.require_exam()?;
        let Some(record_id) = self.snapshot.record_for(student_id).map(|r| r.id.clone()) else {
            return Ok(false);
        };
        self.store
            .delete_attendance(&record_id)
            .map_err(|e| AttendanceError::store("Failed to remove attendance record", e))?;
        tracing::info!(exam_id = %exam_id, student_id, "attendance removed");
        self.refresh_after_write();
        Ok(true)
    }

    /// Stores a student's signature. Presence is unaffected.
    pub fn capture_signature(
        &mut self,
        student_id: &str,
        signature: &str,
    ) -> Result<Student, AttendanceError> {
        let student = self
            .store
            .update_student_signature(student_id, signature)
            .map_err(|e| AttendanceError::store("Failed to save signature", e))?;
        tracing::info!(student_id, "student signature captured");
        self.refresh_after_write();
        Ok(student)
    }

    pub fn set_teacher_signature(
        &self,
        teacher_id: &str,
        signature: &str,
    ) -> Result<Teacher, AttendanceError> {
        let teacher = self
            .store
            .update_teacher_signature(teacher_id, signature)
            .map_err(|e| AttendanceError::store("Failed to save teacher signature", e))?;
        tracing::info!(teacher_id, "teacher signature captured");
        Ok(teacher)
    }

    /// Present and total counts for the selected exam.
    pub fn save_summary(&self) -> Result<(usize, usize), AttendanceError> {
        self.require_exam()?;
        let present = self
            .snapshot
            .students
            .iter()
            .filter(|s| self.is_present(&s.id))
            .count();
        Ok((present, self.snapshot.students.len()))
    }
}
