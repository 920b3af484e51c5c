use crate::config::ReportSettings;
use crate::model::{ExamSession, Teacher};
use crate::reconcile::RosterSnapshot;
use serde::Serialize;

pub const SUMMARY_HEADERS: [&str; 5] = ["Department", "Total", "Present", "Absent", "Rate"];
pub const ROSTER_HEADERS: [&str; 5] = ["Reg No", "Name", "Present", "Seat Number", "Student Signature"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeader {
    pub center_name: String,
    pub center_code: String,
    pub room: String,
    pub subject: String,
    pub date: String,
    pub time: String,
}

impl ReportHeader {
    fn from_exam(exam: &ExamSession) -> Self {
        let (center_name, center_code) = match exam.center.as_ref() {
            Some(c) => (c.name.clone(), c.code.clone()),
            None => (String::new(), String::new()),
        };
        Self {
            center_name,
            center_code,
            room: exam.venue.clone(),
            subject: exam.subject.clone(),
            date: exam.date.clone(),
            time: exam.start_time.clone(),
        }
    }

    /// Label/value pairs in print order.
    pub fn lines(&self) -> [(&'static str, &str); 6] {
        [
            ("Center Name:", self.center_name.as_str()),
            ("Center Code:", self.center_code.as_str()),
            ("Room:", self.room.as_str()),
            ("Subject:", self.subject.as_str()),
            ("Date:", self.date.as_str()),
            ("Time:", self.time.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub reg_no: String,
    pub name: String,
    pub signature: String,
    pub present: bool,
    pub seat_number: String,
}

impl ReportRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.reg_no.clone(),
            self.name.clone(),
            if self.present { "Yes" } else { "No" }.to_string(),
            self.seat_number.clone(),
            self.signature.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Totals {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub rate: u32,
}

impl Totals {
    pub fn from_counts(total: usize, present: usize) -> Self {
        Self {
            total,
            present,
            absent: total - present,
            rate: attendance_rate(present, total),
        }
    }

    pub fn cells(&self, label: &str) -> Vec<String> {
        vec![
            label.to_string(),
            self.total.to_string(),
            self.present.to_string(),
            self.absent.to_string(),
            format!("{}%", self.rate),
        ]
    }
}

/// `present / total` as a whole percentage, half rounding up; 0 for an empty group.
pub fn attendance_rate(present: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((present * 200 + total) / (total * 2)) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentGroup {
    pub name: String,
    pub rows: Vec<ReportRow>,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub title: String,
    pub header: ReportHeader,
    pub departments: Vec<DepartmentGroup>,
    pub overall: Totals,
    pub signature_line: String,
}

impl ReportModel {
    pub fn summary_table(&self) -> Table {
        Table {
            headers: SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: self
                .departments
                .iter()
                .map(|d| d.totals.cells(&d.name))
                .collect(),
        }
    }

    pub fn total_row(&self) -> Vec<String> {
        self.overall.cells("Total")
    }

    pub fn department_table(group: &DepartmentGroup) -> Table {
        Table {
            headers: ROSTER_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: group.rows.iter().map(ReportRow::cells).collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.departments.iter().map(|d| d.rows.len()).sum()
    }

    /// `attendance-{subject}-{date}.{ext}` with path separators neutralized.
    pub fn file_name(&self, extension: &str) -> String {
        let stem = format!("attendance-{}-{}", self.header.subject, self.header.date);
        let safe: String = stem
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        format!("{}.{}", safe, extension)
    }
}

/// Builds the report for the snapshot's exam. `None` when that exam is not loaded.
pub fn build_report(
    snapshot: &RosterSnapshot,
    settings: &ReportSettings,
    teacher: Option<&Teacher>,
) -> Option<ReportModel> {
    let exam = snapshot.exam()?;

    let mut departments: Vec<DepartmentGroup> = Vec::new();
    for student in &snapshot.students {
        let record = snapshot.record_for(&student.id);
        let seat_number = record
            .map(|r| r.seat_number.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| snapshot.resolve_seat(&student.id))
            .unwrap_or(settings.seat_placeholder.as_str())
            .to_string();
        let row = ReportRow {
            reg_no: student.roll_number.clone(),
            name: student.name.clone(),
            signature: student
                .signature_text()
                .unwrap_or(settings.signature_placeholder.as_str())
                .to_string(),
            present: record.is_some(),
            seat_number,
        };

        let dept = student.department_label();
        match departments.iter_mut().find(|g| g.name == dept) {
            Some(group) => group.rows.push(row),
            None => departments.push(DepartmentGroup {
                name: dept.to_string(),
                rows: vec![row],
                totals: Totals::default(),
            }),
        }
    }

    let mut total = 0;
    let mut present = 0;
    for group in departments.iter_mut() {
        let p = group.rows.iter().filter(|r| r.present).count();
        group.totals = Totals::from_counts(group.rows.len(), p);
        total += group.totals.total;
        present += p;
    }

    let teacher_signature = teacher
        .and_then(|t| t.signature.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(settings.teacher_signature_placeholder.as_str());

    Some(ReportModel {
        title: settings.title.clone(),
        header: ReportHeader::from_exam(exam),
        departments,
        overall: Totals::from_counts(total, present),
        signature_line: format!("{}: {}", settings.teacher_signature_label, teacher_signature),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceRecord, ExamCenter, SeatingAssignment, SeatingGroup, Student};
    use pretty_assertions::assert_eq;

    fn student(id: &str, reg: &str, dept: Option<&str>) -> Student {
        Student {
            id: id.into(),
            roll_number: reg.into(),
            name: format!("Name {}", id),
            department: dept.map(str::to_string),
            signature: None,
        }
    }

    fn record(student_id: &str, seat: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("rec-{}", student_id),
            exam_id: "E".into(),
            student_id: student_id.into(),
            seat_number: seat.into(),
            marked_at: None,
        }
    }

    fn snapshot(students: Vec<Student>, attendance: Vec<AttendanceRecord>) -> RosterSnapshot {
        RosterSnapshot {
            exam_id: Some("E".into()),
            exams: vec![ExamSession {
                id: "E".into(),
                subject: "Biology".into(),
                date: "2024-06-03".into(),
                start_time: "13:30".into(),
                venue: "Lab 1".into(),
                center: Some(ExamCenter {
                    id: "c".into(),
                    name: "West Campus".into(),
                    code: "WC-7".into(),
                }),
            }],
            students,
            attendance,
            seating: vec![SeatingGroup {
                id: "g".into(),
                exam_id: "E".into(),
                name: "Main".into(),
                assignments: vec![SeatingAssignment {
                    seat_no: "A12".into(),
                    reg_no: "R1".into(),
                    student_name: None,
                    department: None,
                }],
            }],
        }
    }

    #[test]
    fn rate_rounds_to_nearest_percent() {
        assert_eq!(attendance_rate(0, 0), 0);
        assert_eq!(attendance_rate(1, 3), 33);
        assert_eq!(attendance_rate(2, 3), 67);
        assert_eq!(attendance_rate(1, 8), 13);
        assert_eq!(attendance_rate(1, 200), 1);
        assert_eq!(attendance_rate(5, 5), 100);
    }

    #[test]
    fn missing_exam_yields_no_report() {
        let mut snap = snapshot(Vec::new(), Vec::new());
        snap.exam_id = Some("other".into());
        assert!(build_report(&snap, &ReportSettings::default(), None).is_none());
    }

    #[test]
    fn worked_example_groups_and_totals() {
        let snap = snapshot(
            vec![
                student("a", "R1", Some("CS")),
                student("b", "R2", Some("CS")),
                student("c", "R3", Some("EE")),
            ],
            vec![record("a", "A12"), record("b", "Not Assigned")],
        );
        let model = build_report(&snap, &ReportSettings::default(), None).expect("report");

        let names: Vec<&str> = model.departments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["CS", "EE"]);
        assert_eq!(model.departments[0].totals, Totals::from_counts(2, 2));
        assert_eq!(
            model.departments[1].totals,
            Totals {
                total: 1,
                present: 0,
                absent: 1,
                rate: 0
            }
        );
        assert_eq!(model.row_count(), 3);
        assert_eq!(model.overall.total, 3);
        assert_eq!(model.overall.rate, 67);
        assert_eq!(model.departments[0].rows[1].seat_number, "Not Assigned");
        assert_eq!(model.departments[1].rows[0].seat_number, "-");
        assert_eq!(model.departments[1].rows[0].signature, "_____________");
        assert_eq!(model.header.center_code, "WC-7");
        assert_eq!(model.signature_line, "Teacher Signature: _________________");
    }

    #[test]
    fn seat_falls_back_to_live_resolution() {
        let snap = snapshot(vec![student("a", "R1", None)], Vec::new());
        let model = build_report(&snap, &ReportSettings::default(), None).expect("report");
        let row = &model.departments[0].rows[0];
        assert_eq!(model.departments[0].name, "Unassigned");
        assert!(!row.present);
        assert_eq!(row.seat_number, "A12");
    }

    #[test]
    fn empty_roster_is_a_valid_report() {
        let snap = snapshot(Vec::new(), Vec::new());
        let model = build_report(&snap, &ReportSettings::default(), None).expect("report");
        assert!(model.departments.is_empty());
        assert_eq!(model.overall, Totals::default());
        assert_eq!(model.total_row(), vec!["Total", "0", "0", "0", "0%"]);
    }

    #[test]
    fn department_totals_sum_to_row_count() {
        let students: Vec<Student> = (0..17)
            .map(|i| {
                let dept = match i % 3 {
                    0 => Some("CS"),
                    1 => Some("EE"),
                    _ => None,
                };
                student(&format!("s{}", i), &format!("R{}", i + 10), dept)
            })
            .collect();
        let attendance = (0..17)
            .step_by(2)
            .map(|i| record(&format!("s{}", i), "X"))
            .collect();
        let snap = snapshot(students, attendance);
        let model = build_report(&snap, &ReportSettings::default(), None).expect("report");
        let sum: usize = model.departments.iter().map(|d| d.totals.total).sum();
        assert_eq!(sum, 17);
        assert_eq!(model.row_count(), 17);
        assert_eq!(model.overall.present, 9);
    }

    #[test]
    fn teacher_signature_and_file_name() {
        let snap = snapshot(Vec::new(), Vec::new());
        let teacher = Teacher {
            id: "t".into(),
            name: "Ms. Hopper".into(),
            signature: Some("G. Hopper".into()),
        };
        let model =
            build_report(&snap, &ReportSettings::default(), Some(&teacher)).expect("report");
        assert_eq!(model.signature_line, "Teacher Signature: G. Hopper");
        assert_eq!(model.file_name("pdf"), "attendance-Biology-2024-06-03.pdf");

        let mut odd = model.clone();
        odd.header.subject = "Maths/Stats".into();
        assert_eq!(odd.file_name("xlsx"), "attendance-Maths_Stats-2024-06-03.xlsx");
    }
}
