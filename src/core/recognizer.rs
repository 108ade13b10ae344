use crate::common::{AttendanceError, Config, Result};
use crate::common::config::RecognizerConfig;
use crate::core::detector::FaceBox;
use crate::core::session::{build_session, resolve_model_path};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::{Array4, CowArray};

pub type Embedding = Vec<f32>;

/// Maps an already cropped and resized face to a raw embedding vector.
pub trait EmbeddingModel: Send + Sync {
    /// Side of the square input the model expects.
    fn input_size(&self) -> u32;

    fn embed(&self, face: &DynamicImage) -> Result<Embedding>;
}

/// FaceNet-style embedder: NHWC float RGB input, fixed-length output.
pub struct OnnxEmbedder {
    session: Session,
    _environment: Arc<Environment>,
    config: RecognizerConfig,
}

impl OnnxEmbedder {
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        let model_path = resolve_model_path(&config.models.recognizer_path, models_base);
        let (environment, session) = build_session(
            "face_recognizer",
            &model_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.recognizer.clone(),
        })
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let size = self.config.input_size as usize;
        let mean = self.config.normalization_mean;
        let std = self.config.normalization_std;
        let mut array = Array4::<f32>::zeros((1, size, size, 3));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            if x >= size || y >= size {
                continue;
            }
            for c in 0..3 {
                array[[0, y, x, c]] = (pixel[c] as f32 - mean) / std;
            }
        }

        array
    }
}

impl EmbeddingModel for OnnxEmbedder {
    fn input_size(&self) -> u32 {
        self.config.input_size
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding> {
        let input_array = self.preprocess_face(face);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let output = outputs
            .first()
            .ok_or_else(|| AttendanceError::Model("Embedding model produced no outputs".into()))?;
        let embedding: Embedding = output.try_extract::<f32>()?.view().iter().copied().collect();

        if embedding.len() != self.config.embedding_dim {
            return Err(AttendanceError::Model(format!(
                "Expected embedding of length {}, got {}",
                self.config.embedding_dim,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

pub struct FaceRecognizer {
    model: Box<dyn EmbeddingModel>,
}

impl FaceRecognizer {
    pub fn new(model: Box<dyn EmbeddingModel>) -> Self {
        Self { model }
    }

    pub fn from_config(config: &Config, models_base: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(OnnxEmbedder::new(config, models_base)?)))
    }

    /// Crop to `face`, resize for the model, run it and L2-normalise the output.
    pub fn extract(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding> {
        let face_img = crop_face(image, face)?;

        let size = self.model.input_size();
        let resized = face_img.resize_exact(size, size, FilterType::Nearest);

        let mut embedding = self.model.embed(&resized)?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Crops the bounding box after clamping it to the image.
pub fn crop_face(image: &DynamicImage, face: &FaceBox) -> Result<DynamicImage> {
    let (img_w, img_h) = image.dimensions();

    let x1 = face.x1.floor().clamp(0.0, img_w as f32) as u32;
    let y1 = face.y1.floor().clamp(0.0, img_h as f32) as u32;
    let x2 = face.x2.ceil().clamp(0.0, img_w as f32) as u32;
    let y2 = face.y2.ceil().clamp(0.0, img_h as f32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return Err(AttendanceError::NoFaceDetected);
    }

    Ok(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

/// Scales `v` to unit length; a zero vector is left as is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
