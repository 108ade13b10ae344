use crate::common::{AttendanceError, Result};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Relative model paths are resolved against `models_base`.
pub fn resolve_model_path(model_path: &Path, models_base: &Path) -> PathBuf {
    if model_path.is_relative() {
        models_base.join(model_path)
    } else {
        model_path.to_path_buf()
    }
}

pub fn optimization_level(level: u32) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

pub fn build_session(
    name: &str,
    model_path: &Path,
    level: u32,
) -> Result<(Arc<Environment>, Session)> {
    if !model_path.exists() {
        return Err(AttendanceError::Model(format!(
            "{} model not found at: {:?}", name, model_path
        )));
    }

    let environment = Arc::new(
        Environment::builder()
            .with_name(name)
            .build()
            .map_err(|e| AttendanceError::Model(format!("Failed to create environment: {}", e)))?,
    );

    let session = SessionBuilder::new(&environment)?
        .with_optimization_level(optimization_level(level))?
        .with_model_from_file(model_path)?;

    tracing::debug!("Loaded {} model from {:?}", name, model_path);
    Ok((environment, session))
}
