pub mod detector;
pub mod matcher;
pub mod recognizer;
pub mod session;

pub use detector::{FaceBox, FaceDetection, OnnxFaceDetector, select_primary_face};
pub use matcher::{cosine_similarity, is_match, MatchDecision, MATCH_THRESHOLD};
pub use recognizer::{Embedding, EmbeddingModel, FaceRecognizer, OnnxEmbedder};
