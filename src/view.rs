use crate::model::{ExamSession, Student};
use crate::reconcile::RosterSnapshot;
use serde::Serialize;

pub const ALL_DEPARTMENTS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceTab {
    #[default]
    All,
    Present,
    Absent,
}

impl AttendanceTab {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Selection and filters shared by the attendance screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub center_id: Option<String>,
    pub exam_id: Option<String>,
    pub department: String,
    pub tab: AttendanceTab,
    pub search: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            center_id: None,
            exam_id: None,
            department: ALL_DEPARTMENTS.to_string(),
            tab: AttendanceTab::All,
            search: String::new(),
        }
    }
}

impl Selection {
    /// Switches the center filter. When the current exam is not held at the
    /// new center, the center's first exam (by date) becomes selected.
    pub fn select_center(&mut self, center_id: Option<String>, exams: &[ExamSession]) {
        self.center_id = center_id;
        let Some(center_id) = self.center_id.as_deref() else {
            return;
        };
        let center_exams: Vec<&ExamSession> = exams
            .iter()
            .filter(|e| e.center.as_ref().map(|c| c.id.as_str()) == Some(center_id))
            .collect();
        let Some(first) = center_exams.first() else {
            return;
        };
        let current_in_center = self
            .exam_id
            .as_deref()
            .is_some_and(|id| center_exams.iter().any(|e| e.id == id));
        if !current_in_center {
            self.exam_id = Some(first.id.clone());
        }
    }
}

/// `all` followed by each normalized department in first-seen order.
pub fn departments(students: &[Student]) -> Vec<String> {
    let mut out = vec![ALL_DEPARTMENTS.to_string()];
    for s in students {
        let d = s.department_label();
        if !out.iter().any(|x| x == d) {
            out.push(d.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student: Student,
    pub department: String,
    pub present: bool,
    pub seat_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub rate: f64,
}

impl AttendanceStats {
    fn from_counts(total: usize, present: usize) -> Self {
        let rate = if total > 0 {
            present as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            present,
            absent: total - present,
            rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStat {
    pub name: String,
    #[serde(flatten)]
    pub stats: AttendanceStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterView {
    pub entries: Vec<RosterEntry>,
    pub stats: AttendanceStats,
    pub department_stats: Vec<DepartmentStat>,
    pub departments: Vec<String>,
}

fn matches_search(student: &Student, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    student.name.to_lowercase().contains(needle)
        || student.roll_number.to_lowercase().contains(needle)
        || student
            .department
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}

pub fn roster_view(snapshot: &RosterSnapshot, selection: &Selection) -> RosterView {
    let needle = selection.search.trim().to_lowercase();
    let entries: Vec<RosterEntry> = snapshot
        .students
        .iter()
        .filter(|s| matches_search(s, &needle))
        .filter(|s| {
            selection.department == ALL_DEPARTMENTS || s.department_label() == selection.department
        })
        .filter(|s| match selection.tab {
            AttendanceTab::All => true,
            AttendanceTab::Present => snapshot.is_present(&s.id),
            AttendanceTab::Absent => !snapshot.is_present(&s.id),
        })
        .map(|s| RosterEntry {
            student: s.clone(),
            department: s.department_label().to_string(),
            present: snapshot.is_present(&s.id),
            seat_number: snapshot
                .record_for(&s.id)
                .map(|r| r.seat_number.clone())
                .or_else(|| snapshot.resolve_seat(&s.id).map(str::to_string)),
        })
        .collect();

    let present = entries.iter().filter(|e| e.present).count();
    let stats = AttendanceStats::from_counts(entries.len(), present);

    let departments = departments(&snapshot.students);
    let mut department_stats: Vec<DepartmentStat> = departments
        .iter()
        .filter(|d| d.as_str() != ALL_DEPARTMENTS)
        .map(|d| {
            let members: Vec<&Student> = snapshot
                .students
                .iter()
                .filter(|s| s.department_label() == d)
                .collect();
            let present = members.iter().filter(|s| snapshot.is_present(&s.id)).count();
            DepartmentStat {
                name: d.clone(),
                stats: AttendanceStats::from_counts(members.len(), present),
            }
        })
        .filter(|d| d.stats.total > 0)
        .collect();
    department_stats.sort_by(|a, b| b.stats.total.cmp(&a.stats.total));

    RosterView {
        entries,
        stats,
        department_stats,
        departments,
    }
}
