use serde::{Deserialize, Serialize};

/// Department label used for students without a department.
pub const UNASSIGNED_DEPARTMENT: &str = "Unassigned";

/// Seat label written when a student is marked present without a seating assignment.
pub const SEAT_NOT_ASSIGNED: &str = "Not Assigned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamCenter {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    pub id: String,
    pub subject: String,
    pub date: String,
    pub start_time: String,
    pub venue: String,
    pub center: Option<ExamCenter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_number: String,
    pub name: String,
    pub department: Option<String>,
    pub signature: Option<String>,
}

impl Student {
    /// Department with the `Unassigned` bucket applied for null or blank values.
    pub fn department_label(&self) -> &str {
        normalize_department(self.department.as_deref())
    }

    /// Stored signature, treating blank strings as unset.
    pub fn signature_text(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn normalize_department(raw: Option<&str>) -> &str {
    match raw.map(str::trim) {
        Some(d) if !d.is_empty() => d,
        _ => UNASSIGNED_DEPARTMENT,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatingAssignment {
    pub seat_no: String,
    pub reg_no: String,
    pub student_name: Option<String>,
    pub department: Option<String>,
}

/// One seating arrangement of an exam session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatingGroup {
    pub id: String,
    pub exam_id: String,
    pub name: String,
    pub assignments: Vec<SeatingAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub seat_number: String,
    pub marked_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_department_falls_into_unassigned() {
        assert_eq!(normalize_department(None), UNASSIGNED_DEPARTMENT);
        assert_eq!(normalize_department(Some("   ")), UNASSIGNED_DEPARTMENT);
        assert_eq!(normalize_department(Some("CS")), "CS");
    }

    #[test]
    fn blank_signature_is_unset() {
        let s = Student {
            id: "s1".into(),
            roll_number: "R1".into(),
            name: "Ada".into(),
            department: None,
            signature: Some("  ".into()),
        };
        assert_eq!(s.signature_text(), None);
        assert_eq!(s.department_label(), UNASSIGNED_DEPARTMENT);
    }
}
