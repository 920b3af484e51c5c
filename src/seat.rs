use crate::model::{SeatingGroup, Student};

/// Seat label assigned to `reg_no` within one exam's seating arrangements.
///
/// Arrangements are scanned in order and the first matching assignment wins.
/// Assignments are matched on registration number because seating plans are
/// authored against the printed roll list rather than internal ids.
pub fn seat_for_reg_no<'g>(
    groups: &'g [SeatingGroup],
    exam_id: &str,
    reg_no: &str,
) -> Option<&'g str> {
    groups
        .iter()
        .filter(|g| g.exam_id == exam_id)
        .find_map(|g| g.assignments.iter().find(|a| a.reg_no == reg_no))
        .map(|a| a.seat_no.as_str())
}

/// Looks the student up by id, then resolves their seat by registration number.
/// `None` covers both an unknown student and a student without an assignment.
pub fn resolve_seat<'g>(
    students: &[Student],
    groups: &'g [SeatingGroup],
    exam_id: &str,
    student_id: &str,
) -> Option<&'g str> {
    let student = students.iter().find(|s| s.id == student_id)?;
    seat_for_reg_no(groups, exam_id, &student.roll_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeatingAssignment;

    fn student(id: &str, reg: &str) -> Student {
        Student {
            id: id.into(),
            roll_number: reg.into(),
            name: format!("Student {}", id),
            department: None,
            signature: None,
        }
    }

    fn group(id: &str, exam: &str, seats: &[(&str, &str)]) -> SeatingGroup {
        SeatingGroup {
            id: id.into(),
            exam_id: exam.into(),
            name: id.into(),
            assignments: seats
                .iter()
                .map(|(seat, reg)| SeatingAssignment {
                    seat_no: seat.to_string(),
                    reg_no: reg.to_string(),
                    student_name: None,
                    department: None,
                })
                .collect(),
        }
    }

    #[test]
    fn first_arrangement_with_a_match_wins() {
        let students = vec![student("a", "R1")];
        let groups = vec![
            group("g1", "E", &[("A1", "R9")]),
            group("g2", "E", &[("B4", "R1")]),
            group("g3", "E", &[("C2", "R1")]),
        ];
        assert_eq!(resolve_seat(&students, &groups, "E", "a"), Some("B4"));
    }

    #[test]
    fn unknown_student_or_missing_assignment_is_none() {
        let students = vec![student("a", "R1")];
        let groups = vec![group("g1", "E", &[("A1", "R2")])];
        assert_eq!(resolve_seat(&students, &groups, "E", "a"), None);
        assert_eq!(resolve_seat(&students, &groups, "E", "nobody"), None);
    }

    #[test]
    fn shared_registration_number_resolves_to_same_seat() {
        let students = vec![student("a", "R1"), student("b", "R1")];
        let groups = vec![group("g1", "E", &[("A12", "R1")])];
        assert_eq!(resolve_seat(&students, &groups, "E", "a"), Some("A12"));
        assert_eq!(resolve_seat(&students, &groups, "E", "b"), Some("A12"));
    }

    #[test]
    fn arrangements_of_other_exams_are_ignored() {
        let students = vec![student("a", "R1")];
        let groups = vec![group("g1", "OTHER", &[("Z9", "R1")])];
        assert_eq!(resolve_seat(&students, &groups, "E", "a"), None);
    }
}
