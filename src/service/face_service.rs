use crate::common::{AttendanceError, Config, Result};
use crate::core::{
    detector::{select_primary_face, FaceBox, FaceDetection, OnnxFaceDetector},
    matcher::MatchDecision,
    recognizer::{Embedding, FaceRecognizer},
};
use crate::storage::PhotoStore;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Why a pipeline run did not produce a match or a registration.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("face recognition engines are not initialized")]
    NotInitialized,

    #[error("no reference photo stored for {0}")]
    NoReference(String),

    #[error("no face detected in captured image")]
    NoFaceInCapture,

    #[error("no face detected in stored photo for {0}")]
    NoFaceInReference(String),

    #[error("embedding extraction failed: {0}")]
    Extraction(#[source] AttendanceError),

    #[error("photo store failure: {0}")]
    Storage(#[source] AttendanceError),
}

/// Detector and embedder, loaded together.
pub struct Engines {
    pub detector: Box<dyn FaceDetection>,
    pub recognizer: FaceRecognizer,
}

impl Engines {
    pub fn load_onnx(config: &Config, models_base: &Path) -> Result<Self> {
        Ok(Self {
            detector: Box::new(OnnxFaceDetector::new(config, models_base)?),
            recognizer: FaceRecognizer::from_config(config, models_base)?,
        })
    }
}

pub type EngineLoader = Box<dyn Fn() -> Result<Engines> + Send + Sync>;

/// Face registration and verification against encrypted reference photos.
///
/// Engines load on first use. A failed load disables this instance for good;
/// every later call reports `NotInitialized` until the service is re-created.
pub struct FaceRecognitionService {
    store: PhotoStore,
    threshold: f32,
    loader: EngineLoader,
    engines: OnceLock<Option<Engines>>,
}

impl FaceRecognitionService {
    pub fn new(config: &Config, store: PhotoStore, models_base: PathBuf) -> Self {
        let config = config.clone();
        let threshold = config.matching.similarity_threshold;
        let loader: EngineLoader = Box::new(move || Engines::load_onnx(&config, &models_base));
        Self::with_loader(store, threshold, loader)
    }

    pub fn with_loader(store: PhotoStore, threshold: f32, loader: EngineLoader) -> Self {
        Self {
            store,
            threshold,
            loader,
            engines: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn engines(&self) -> Option<&Engines> {
        self.engines
            .get_or_init(|| match (self.loader)() {
                Ok(engines) => {
                    tracing::info!("Face recognition engines loaded");
                    Some(engines)
                }
                Err(e) => {
                    tracing::error!("Error loading face recognition models: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.engines().is_some()
    }

    /// Every face found in `image`; `None` when the engines are unavailable.
    pub fn detect(&self, image: &DynamicImage) -> Option<Vec<FaceBox>> {
        self.engines().map(|engines| Self::detect_faces(engines, image))
    }

    fn detect_faces(engines: &Engines, image: &DynamicImage) -> Vec<FaceBox> {
        match engines.detector.detect(image) {
            Ok(faces) => {
                tracing::debug!("Detected {} face(s)", faces.len());
                faces
            }
            Err(e) => {
                tracing::error!("Face detection failed: {}", e);
                Vec::new()
            }
        }
    }

    fn primary_embedding(engines: &Engines, image: &DynamicImage) -> std::result::Result<Option<Embedding>, PipelineError> {
        let faces = Self::detect_faces(engines, image);
        let Some(face) = select_primary_face(&faces) else {
            return Ok(None);
        };
        engines
            .recognizer
            .extract(image, face)
            .map(Some)
            .map_err(PipelineError::Extraction)
    }

    /// Embedding of the largest face in `image`, if any.
    pub fn extract_embedding(&self, image: &DynamicImage) -> Option<Embedding> {
        let engines = self.engines()?;
        match Self::primary_embedding(engines, image) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// Validates that `image` holds a face, then stores it encrypted for `identity`.
    pub fn register(&self, image: &DynamicImage, identity: &str) -> std::result::Result<(), PipelineError> {
        let engines = self.engines().ok_or(PipelineError::NotInitialized)?;

        // The embedding only proves a usable face is present; it is not kept.
        let _embedding = Self::primary_embedding(engines, image)?
            .ok_or(PipelineError::NoFaceInCapture)?;

        self.store
            .save(identity, image)
            .map_err(PipelineError::Storage)?;
        tracing::info!("Photo saved successfully for {}", identity);
        Ok(())
    }

    /// Compares the largest face in `image` with the stored reference photo.
    /// Reference embeddings are recomputed on every call.
    pub fn verify(&self, image: &DynamicImage, identity: &str) -> std::result::Result<MatchDecision, PipelineError> {
        let engines = self.engines().ok_or(PipelineError::NotInitialized)?;

        let stored = self
            .store
            .load(identity)
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| PipelineError::NoReference(identity.to_string()))?;

        let captured_embedding = Self::primary_embedding(engines, image)?
            .ok_or(PipelineError::NoFaceInCapture)?;
        let stored_embedding = Self::primary_embedding(engines, &stored)?
            .ok_or_else(|| PipelineError::NoFaceInReference(identity.to_string()))?;

        let decision = MatchDecision::compare(&captured_embedding, &stored_embedding, self.threshold);
        tracing::debug!(
            "Face similarity for {}: {:.4}, threshold: {}",
            identity, decision.similarity, decision.threshold
        );
        Ok(decision)
    }

    /// `true` only when a face was stored; every failure is logged and reported as `false`.
    pub fn register_face(&self, image: &DynamicImage, identity: &str) -> bool {
        match self.register(image, identity) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Face registration failed for {}: {}", identity, e);
                false
            }
        }
    }

    /// `true` only on a positive match; every failure is logged and reported as `false`.
    pub fn match_face(&self, image: &DynamicImage, identity: &str) -> bool {
        match self.verify(image, identity) {
            Ok(decision) => decision.matched,
            Err(e) => {
                tracing::warn!("Face matching failed for {}: {}", identity, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::matcher::cosine_similarity;
    use crate::core::recognizer::EmbeddingModel;
    use crate::storage::{MasterKey, StaticKeyStore};
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Boxes the bright region of the image; dark images have no face.
    pub(crate) struct BrightRegionDetector;

    impl FaceDetection for BrightRegionDetector {
        fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
            let rgb = image.to_rgb8();
            let mut bounds: Option<(u32, u32, u32, u32)> = None;
            for (x, y, pixel) in rgb.enumerate_pixels() {
                if pixel.0.iter().any(|&c| c > 100) {
                    bounds = Some(match bounds {
                        None => (x, y, x, y),
                        Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                    });
                }
            }
            Ok(bounds
                .map(|(x1, y1, x2, y2)| FaceBox {
                    x1: x1 as f32,
                    y1: y1 as f32,
                    x2: (x2 + 1) as f32,
                    y2: (y2 + 1) as f32,
                    confidence: 0.99,
                })
                .into_iter()
                .collect())
        }
    }

    /// Per-cell mean colour over a 4x4 grid.
    pub(crate) struct GridColorEmbedder;

    impl EmbeddingModel for GridColorEmbedder {
        fn input_size(&self) -> u32 {
            16
        }

        fn embed(&self, face: &DynamicImage) -> Result<Embedding> {
            let rgb = face.to_rgb8();
            let mut features = vec![0.0f32; 4 * 4 * 3];
            for (x, y, pixel) in rgb.enumerate_pixels() {
                let cell = ((y / 4) * 4 + x / 4) as usize;
                for c in 0..3 {
                    features[cell * 3 + c] += pixel[c] as f32 / (16.0 * 255.0);
                }
            }
            Ok(features)
        }
    }

    pub(crate) fn fake_engines() -> Result<Engines> {
        Ok(Engines {
            detector: Box::new(BrightRegionDetector),
            recognizer: FaceRecognizer::new(Box::new(GridColorEmbedder)),
        })
    }

    /// Dark 64x64 frame with a coloured 32x32 "face".
    pub(crate) fn face_image(color: [u8; 3]) -> DynamicImage {
        let mut img = RgbImage::new(64, 64);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if (16..48).contains(&x) && (12..44).contains(&y) {
                *pixel = Rgb(color);
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    pub(crate) fn blank_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(64, 64))
    }

    pub(crate) fn service_in(dir: &Path) -> FaceRecognitionService {
        let keys = Arc::new(StaticKeyStore::new(MasterKey::generate()));
        let store = PhotoStore::new(dir.join("student_photos"), keys, 90).unwrap();
        FaceRecognitionService::with_loader(store, 0.9, Box::new(fake_engines))
    }

    struct FailingDetector;

    impl FaceDetection for FailingDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<FaceBox>> {
            Err(AttendanceError::Model("detector inference failed".into()))
        }
    }

    struct FailingEmbedder;

    impl EmbeddingModel for FailingEmbedder {
        fn input_size(&self) -> u32 {
            16
        }

        fn embed(&self, _face: &DynamicImage) -> Result<Embedding> {
            Err(AttendanceError::Model("embedding inference failed".into()))
        }
    }

    fn service_with(dir: &Path, loader: fn() -> Result<Engines>) -> FaceRecognitionService {
        let keys = Arc::new(StaticKeyStore::new(MasterKey::generate()));
        let store = PhotoStore::new(dir.join("student_photos"), keys, 90).unwrap();
        FaceRecognitionService::with_loader(store, 0.9, Box::new(loader))
    }

    #[test]
    fn detector_errors_count_as_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(dir.path(), || {
            Ok(Engines {
                detector: Box::new(FailingDetector),
                recognizer: FaceRecognizer::new(Box::new(GridColorEmbedder)),
            })
        });

        assert_eq!(service.detect(&face_image([200, 200, 200])), Some(Vec::new()));
        assert!(!service.register_face(&face_image([200, 200, 200]), "stu-1"));
        assert!(!service.store().exists("stu-1").unwrap());

        service.store().save("stu-1", &face_image([200, 200, 200])).unwrap();
        assert!(matches!(
            service.verify(&face_image([200, 200, 200]), "stu-1"),
            Err(PipelineError::NoFaceInCapture)
        ));
        assert!(!service.match_face(&face_image([200, 200, 200]), "stu-1"));
    }

    #[test]
    fn embedding_errors_fail_registration_and_matching() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(dir.path(), || {
            Ok(Engines {
                detector: Box::new(BrightRegionDetector),
                recognizer: FaceRecognizer::new(Box::new(FailingEmbedder)),
            })
        });

        assert!(matches!(
            service.register(&face_image([200, 60, 60]), "stu-1"),
            Err(PipelineError::Extraction(_))
        ));
        assert!(!service.register_face(&face_image([200, 60, 60]), "stu-1"));
        assert!(!service.store().exists("stu-1").unwrap());

        service.store().save("stu-1", &face_image([200, 60, 60])).unwrap();
        assert!(matches!(
            service.verify(&face_image([200, 60, 60]), "stu-1"),
            Err(PipelineError::Extraction(_))
        ));
        assert!(!service.match_face(&face_image([200, 60, 60]), "stu-1"));
        assert!(service.extract_embedding(&face_image([200, 60, 60])).is_none());
    }

    #[test]
    fn stored_photo_without_face_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());
        service.store().save("stu-1", &blank_image()).unwrap();

        assert!(matches!(
            service.verify(&face_image([200, 200, 200]), "stu-1"),
            Err(PipelineError::NoFaceInReference(id)) if id == "stu-1"
        ));
        assert!(!service.match_face(&face_image([200, 200, 200]), "stu-1"));
    }

    #[test]
    fn registered_student_matches_own_face() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        assert!(service.register_face(&face_image([220, 40, 40]), "stu-1"));
        assert!(service.store().exists("stu-1").unwrap());
        assert!(service.match_face(&face_image([220, 40, 40]), "stu-1"));
    }

    #[test]
    fn different_face_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        assert!(service.register_face(&face_image([230, 0, 0]), "stu-1"));
        let decision = service.verify(&face_image([0, 0, 230]), "stu-1").unwrap();
        assert!(!decision.matched);
        assert!(decision.similarity < 0.5);
        assert!(!service.match_face(&face_image([0, 0, 230]), "stu-1"));
    }

    #[test]
    fn unknown_student_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        assert!(matches!(
            service.verify(&face_image([200, 200, 200]), "ghost"),
            Err(PipelineError::NoReference(_))
        ));
        assert!(!service.match_face(&face_image([200, 200, 200]), "ghost"));
    }

    #[test]
    fn capture_without_face_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());
        assert!(service.register_face(&face_image([200, 200, 200]), "stu-1"));

        assert!(matches!(
            service.verify(&blank_image(), "stu-1"),
            Err(PipelineError::NoFaceInCapture)
        ));
        assert!(!service.match_face(&blank_image(), "stu-1"));
    }

    #[test]
    fn registration_without_face_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        assert!(!service.register_face(&blank_image(), "stu-1"));
        assert!(!service.store().exists("stu-1").unwrap());
        assert!(service.store().list().unwrap().is_empty());
    }

    #[test]
    fn detect_reports_every_face() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());

        assert_eq!(service.detect(&face_image([200, 200, 200])).unwrap().len(), 1);
        assert!(service.detect(&blank_image()).unwrap().is_empty());
    }

    #[test]
    fn invalid_identity_fails_registration() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());
        assert!(!service.register_face(&face_image([200, 200, 200]), "../etc"));
    }

    #[test]
    fn stored_photo_embeddings_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path());
        assert!(service.register_face(&face_image([90, 180, 220]), "stu-1"));

        let stored = service.store().load("stu-1").unwrap().unwrap();
        let first = service.extract_embedding(&stored).unwrap();
        let second = service.extract_embedding(&stored).unwrap();
        assert!((cosine_similarity(&first, &second) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn failed_initialization_disables_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(StaticKeyStore::new(MasterKey::generate()));
        let store = PhotoStore::new(dir.path().join("photos"), keys, 90).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let service = FaceRecognitionService::with_loader(
            store,
            0.9,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AttendanceError::Model("model asset missing".into()))
            }),
        );

        assert!(!service.register_face(&face_image([200, 0, 0]), "stu-1"));
        assert!(!service.match_face(&face_image([200, 0, 0]), "stu-1"));
        assert!(matches!(
            service.verify(&face_image([200, 0, 0]), "stu-1"),
            Err(PipelineError::NotInitialized)
        ));
        assert!(!service.is_initialized());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!service.store().exists("stu-1").unwrap());
    }

    #[test]
    fn engines_load_once_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(StaticKeyStore::new(MasterKey::generate()));
        let store = PhotoStore::new(dir.path().join("photos"), keys, 90).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let service = FaceRecognitionService::with_loader(
            store,
            0.9,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                fake_engines()
            }),
        );

        assert!(service.register_face(&face_image([10, 200, 10]), "stu-1"));
        assert!(service.match_face(&face_image([10, 200, 10]), "stu-1"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
