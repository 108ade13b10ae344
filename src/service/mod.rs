pub mod face_service;
pub mod protocol;
pub mod worker;

pub use face_service::{Engines, EngineLoader, FaceRecognitionService, PipelineError};
pub use protocol::{Job, JobId, JobKind, Outcome};
pub use worker::FaceWorker;
