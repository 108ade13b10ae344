use crate::attendance::model::{Attendance, CaptureMethod, Course, Student};
use std::collections::HashSet;
use uuid::Uuid;

/// One record per student, all sharing the same timestamp.
pub fn mark_attendance(
    course_id: &str,
    student_ids: &[String],
    is_present: bool,
    captured_by: &str,
    capture_method: CaptureMethod,
) -> Vec<Attendance> {
    let timestamp = chrono::Utc::now().timestamp_millis();

    student_ids
        .iter()
        .map(|student_id| Attendance {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            student_id: student_id.clone(),
            timestamp,
            is_present,
            capture_method,
            captured_by: captured_by.to_string(),
        })
        .collect()
}

/// Students taking `course`: same level, and same branch/group when the
/// course specifies them.
pub fn students_for_course<'a>(course: &Course, students: &'a [Student]) -> Vec<&'a Student> {
    students
        .iter()
        .filter(|s| s.level == course.level)
        .filter(|s| course.branch.is_empty() || s.branch == course.branch)
        .filter(|s| course.group.is_empty() || s.group == course.group)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttendanceSummary {
    pub total_sessions: usize,
    pub present_sessions: usize,
    pub absences: usize,
    /// Fraction of sessions attended, 0 when there were none.
    pub attendance_rate: f32,
}

impl AttendanceSummary {
    pub fn from_records(records: &[Attendance]) -> Self {
        let total_sessions = records.len();
        let present_sessions = records.iter().filter(|r| r.is_present).count();
        let attendance_rate = if total_sessions > 0 {
            present_sessions as f32 / total_sessions as f32
        } else {
            0.0
        };

        Self {
            total_sessions,
            present_sessions,
            absences: total_sessions - present_sessions,
            attendance_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsenceStatistics {
    pub total_students: usize,
    pub students_with_absences: usize,
    pub total_absences: usize,
}

impl AbsenceStatistics {
    /// Counts absences in `records` belonging to `students` (matched on `user_id`).
    pub fn compute(students: &[Student], records: &[Attendance]) -> Self {
        let ids: HashSet<&str> = students.iter().map(|s| s.user_id.as_str()).collect();

        let mut absent_students = HashSet::new();
        let mut total_absences = 0;
        for record in records.iter().filter(|r| !r.is_present) {
            if ids.contains(record.student_id.as_str()) {
                absent_students.insert(record.student_id.as_str());
                total_absences += 1;
            }
        }

        Self {
            total_students: students.len(),
            students_with_absences: absent_students.len(),
            total_absences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(student: &str, present: bool) -> Attendance {
        Attendance {
            student_id: student.into(),
            is_present: present,
            ..Default::default()
        }
    }

    fn student(user_id: &str, level: &str, branch: &str, group: &str) -> Student {
        Student {
            user_id: user_id.into(),
            level: level.into(),
            branch: branch.into(),
            group: group.into(),
            ..Default::default()
        }
    }

    #[test]
    fn marking_creates_one_record_per_student() {
        let ids = vec!["s1".to_string(), "s2".to_string()];
        let records = mark_attendance("c1", &ids, true, "t1", CaptureMethod::FaceRecognition);

        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[0].timestamp, records[1].timestamp);
        assert!(records.iter().all(|r| r.is_present && r.course_id == "c1" && r.captured_by == "t1"));
    }

    #[test]
    fn summary_counts_sessions() {
        let records = vec![record("s1", true), record("s1", false), record("s1", true), record("s1", true)];
        let summary = AttendanceSummary::from_records(&records);
        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.present_sessions, 3);
        assert_eq!(summary.absences, 1);
        assert!((summary.attendance_rate - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_summary_has_zero_rate() {
        assert_eq!(AttendanceSummary::from_records(&[]), AttendanceSummary::default());
    }

    #[test]
    fn absence_statistics_only_count_listed_students() {
        let students = vec![student("s1", "L", "", ""), student("s2", "L", "", ""), student("s3", "L", "", "")];
        let records = vec![
            record("s1", false),
            record("s1", false),
            record("s2", true),
            record("outsider", false),
        ];
        let stats = AbsenceStatistics::compute(&students, &records);
        assert_eq!(stats, AbsenceStatistics {
            total_students: 3,
            students_with_absences: 1,
            total_absences: 2,
        });
    }

    #[test]
    fn course_filters_by_level_branch_and_group() {
        let students = vec![
            student("s1", "L", "INFO", "G1"),
            student("s2", "L", "INFO", "G2"),
            student("s3", "M", "INFO", "G1"),
            student("s4", "L", "MATH", "G1"),
        ];
        let course = Course { level: "L".into(), branch: "INFO".into(), group: "G1".into(), ..Default::default() };
        let ids: Vec<_> = students_for_course(&course, &students).into_iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);

        let open_course = Course { level: "L".into(), ..Default::default() };
        assert_eq!(students_for_course(&open_course, &students).len(), 3);
    }
}
