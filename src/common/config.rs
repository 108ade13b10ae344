use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{AttendanceError, Result};
use crate::core::matcher::MATCH_THRESHOLD;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
    #[serde(default = "default_recognizer_path")]
    pub recognizer_path: PathBuf,
}

fn default_detector_path() -> PathBuf { PathBuf::from("face_detector.onnx") }
fn default_recognizer_path() -> PathBuf { PathBuf::from("facenet.onnx") }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: default_detector_path(),
            recognizer_path: default_recognizer_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_detector_input() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_nms_iou() -> f32 { 0.45 }
fn default_max_faces() -> usize { 5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            confidence_threshold: default_detection_confidence(),
            nms_iou_threshold: default_nms_iou(),
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Subtracted from every raw 0-255 channel value before inference.
    #[serde(default)]
    pub normalization_mean: f32,
    #[serde(default = "default_normalization_std")]
    pub normalization_std: f32,
}

fn default_recognizer_input() -> u32 { 160 }
fn default_embedding_dim() -> usize { 512 }
fn default_normalization_std() -> f32 { 1.0 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_input(),
            embedding_dim: default_embedding_dim(),
            normalization_mean: 0.0,
            normalization_std: default_normalization_std(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 { MATCH_THRESHOLD }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { similarity_threshold: default_similarity_threshold() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Overrides the platform data directory for encrypted reference photos.
    #[serde(default)]
    pub photo_dir: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub attendance_ledger: Option<PathBuf>,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 { 90 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            photo_dir: None,
            key_file: None,
            attendance_ledger: None,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    /// Loads `path` when given, otherwise the system config file if present,
    /// otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let system = crate::common::paths::system_config_file();
                match system {
                    Some(system) if system.exists() => Self::load_from_path(&system),
                    _ => {
                        tracing::debug!("No config file found, using defaults");
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttendanceError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AttendanceError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.similarity_threshold < 0.0 || self.matching.similarity_threshold > 1.0 {
            return Err(AttendanceError::Config(format!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.matching.similarity_threshold
            )));
        }
        if self.detector.confidence_threshold < 0.0 || self.detector.confidence_threshold > 1.0 {
            return Err(AttendanceError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }
        if self.detector.nms_iou_threshold <= 0.0 || self.detector.nms_iou_threshold > 1.0 {
            return Err(AttendanceError::Config(format!(
                "NMS IoU threshold must be in (0.0, 1.0], got {}",
                self.detector.nms_iou_threshold
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(AttendanceError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(AttendanceError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(AttendanceError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.embedding_dim == 0 {
            return Err(AttendanceError::Config("Embedding dimension must be positive".into()));
        }
        if self.recognizer.normalization_std == 0.0 {
            return Err(AttendanceError::Config("Normalization std must be non-zero".into()));
        }

        if self.storage.jpeg_quality == 0 || self.storage.jpeg_quality > 100 {
            return Err(AttendanceError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.storage.jpeg_quality
            )));
        }

        Ok(())
    }
}
