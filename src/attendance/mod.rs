pub mod bookkeeping;
pub mod model;
pub mod record_store;

pub use bookkeeping::{mark_attendance, students_for_course, AbsenceStatistics, AttendanceSummary};
pub use model::{Admin, Attendance, CaptureMethod, Course, Schedule, Student, Teacher, User, UserRole};
pub use record_store::{AttendanceField, JsonLinesStore, RecordStore};
