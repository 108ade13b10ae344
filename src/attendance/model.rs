//! Plain records of the attendance domain, stored as documents keyed by id.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Teacher,
    #[default]
    Student,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub profile_image_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Student {
    pub user_id: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub group: String,
    pub branch: String,
    pub level: String,
    /// Base64 face features as kept by the document store; unused by the
    /// matching pipeline, which only works from the encrypted photo.
    pub face_data: String,
    pub absences: Vec<Attendance>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Teacher {
    pub user_id: String,
    pub teacher_id: String,
    pub specialization: String,
    pub first_name: String,
    pub last_name: String,
    pub assigned_courses: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Admin {
    pub user_id: String,
    pub admin_id: String,
    pub managed_branches: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    pub teacher_id: String,
    pub branch: String,
    pub level: String,
    pub group: String,
    pub is_exam: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Schedule {
    pub id: String,
    pub course_id: String,
    /// 0-based day of week.
    pub day: u8,
    pub start_time: String,
    pub end_time: String,
    pub room: String,
    pub recurring: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            id: String::new(),
            course_id: String::new(),
            day: 0,
            start_time: String::new(),
            end_time: String::new(),
            room: String::new(),
            recurring: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureMethod {
    #[default]
    FaceRecognition,
    ManualEntry,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Attendance {
    pub id: String,
    pub course_id: String,
    pub student_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub is_present: bool,
    pub capture_method: CaptureMethod,
    /// User id of whoever took the attendance.
    pub captured_by: String,
}
