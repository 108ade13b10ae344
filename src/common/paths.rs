use std::path::PathBuf;
use directories::ProjectDirs;
use crate::common::{AttendanceError, Config, DevMode, Result};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "attendance", "FaceAttendance")
}

pub fn system_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("face-attendance.toml"))
}

pub fn system_data_dir() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| AttendanceError::Storage("Failed to get project dirs".into()))
}

/// Where every on-disk artifact lives for one run.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub photo_dir: PathBuf,
    pub key_file: PathBuf,
    pub attendance_ledger: PathBuf,
    pub models_dir: PathBuf,
    pub debug_dir: PathBuf,
}

impl DataLayout {
    /// Dev mode wins over the system directories; explicit config paths win over both.
    pub fn resolve(config: &Config, dev_mode: &DevMode) -> Result<Self> {
        let base = match dev_mode.base_dir() {
            Some(base) => base.to_path_buf(),
            None => system_data_dir()?,
        };

        let layout = Self {
            photo_dir: config
                .storage
                .photo_dir
                .clone()
                .unwrap_or_else(|| base.join("student_photos")),
            key_file: config
                .storage
                .key_file
                .clone()
                .unwrap_or_else(|| base.join("keys").join("photo_master.keyset")),
            attendance_ledger: config
                .storage
                .attendance_ledger
                .clone()
                .unwrap_or_else(|| base.join("attendance.jsonl")),
            models_dir: base.join("models"),
            debug_dir: base.join("debug"),
        };

        if dev_mode.is_enabled() {
            tracing::debug!("Using dev data layout: {:?}", layout);
        }

        Ok(layout)
    }

    pub fn debug_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.debug_dir.join(format!("{}_{}.jpg", prefix, timestamp))
    }
}
