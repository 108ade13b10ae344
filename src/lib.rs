// Core modules
pub mod common;
pub mod core;
pub mod storage;
pub mod service;
pub mod attendance;
pub mod cli;

// Re-export commonly used types
pub use common::{Config, DataLayout, DevMode, AttendanceError, Result};
pub use core::{FaceBox, FaceDetection, FaceRecognizer, Embedding, cosine_similarity, MatchDecision, MATCH_THRESHOLD};
pub use storage::{PhotoStore, FileKeyStore, KeyStore};
pub use service::{FaceRecognitionService, FaceWorker, PipelineError, Outcome};
pub use attendance::{Attendance, CaptureMethod, JsonLinesStore, RecordStore};
