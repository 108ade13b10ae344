use std::path::{Path, PathBuf};
use std::fs;
use crate::common::error::Result;

const DEV_DATA_DIR: &str = "./dev_data";

#[derive(Debug, Clone)]
pub struct DevMode {
    base_dir: Option<PathBuf>,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        if enabled {
            let dev_mode = Self::with_base_dir(PathBuf::from(DEV_DATA_DIR))?;
            println!("📁 Development mode enabled - data will be saved to: {}", DEV_DATA_DIR);
            Ok(dev_mode)
        } else {
            Ok(Self { base_dir: None })
        }
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        fs::create_dir_all(base_dir.join("student_photos"))?;
        fs::create_dir_all(base_dir.join("keys"))?;
        fs::create_dir_all(base_dir.join("models"))?;
        fs::create_dir_all(base_dir.join("debug"))?;

        Ok(Self { base_dir: Some(base_dir) })
    }

    pub fn is_enabled(&self) -> bool {
        self.base_dir.is_some()
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }
}
