use crate::common::{Config, Result};
use crate::common::config::DetectorConfig;
use crate::core::session::{build_session, resolve_model_path};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Finds face regions in a decoded image, in source-image pixel coordinates.
pub trait FaceDetection: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// The face with the largest bounding box is taken as the subject.
pub fn select_primary_face(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces
        .iter()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// YOLO-style single-class face detector running on ONNX Runtime.
pub struct OnnxFaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl OnnxFaceDetector {
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        let model_path = resolve_model_path(&config.models.detector_path, models_base);
        let (environment, session) = build_session(
            "face_detector",
            &model_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.detector.clone(),
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let gray = img.to_luma8();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = pixel[0] as f32 * norm_factor;
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = value;
            array[[0, 1, y, x]] = value;
            array[[0, 2, y, x]] = value;
        }

        array
    }
}

impl FaceDetection for OnnxFaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;
        let input_width = self.config.input_width;
        let input_height = self.config.input_height;

        let img_array = if image.width() == input_width && image.height() == input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(input_width, input_height, FilterType::Nearest);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let Some(output) = outputs.first() else {
            tracing::warn!("Detector produced no outputs");
            return Ok(Vec::new());
        };
        let tensor = output.try_extract::<f32>()?;
        let view = tensor.view();
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let candidates = parse_yolo_output(&data, &shape, input_width as f32, input_height as f32);
        let mut faces = non_max_suppression(candidates, self.config.nms_iou_threshold);
        faces.retain(|face| face.confidence >= self.config.confidence_threshold);
        faces.truncate(self.config.max_faces);

        let scale_x = orig_width / input_width as f32;
        let scale_y = orig_height / input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        tracing::debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }
}

/// Decodes `[1, N, 5+]`, `[1, 5+, N]` (transposed) or `[N, 5+]` predictions of
/// `[cx, cy, w, h, score, ..]` into corner boxes in detector-input space.
pub fn parse_yolo_output(data: &[f32], shape: &[usize], input_width: f32, input_height: f32) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, is_transposed) = match shape {
        [_, a, b] if *b > *a && *a <= 10 => (*b, *a, true),
        [_, a, b] => (*a, *b, false),
        [a, b] => (*a, *b, false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Vec::new();
        }
    };

    if prediction_length < 4 || data.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too small for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if is_transposed {
            data[field * num_predictions + i]
        } else {
            data[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
        if confidence <= 0.001 {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        // Normalised coordinates are scaled up to input pixels.
        let (sx, sy) = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 {
            (1.0, 1.0)
        } else {
            (input_width, input_height)
        };
        let (cx, cy, w, h) = (cx * sx, cy * sy, w * sx, h * sy);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width);
        let y2 = (cy + h / 2.0).min(input_height);

        if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    faces
}

pub fn intersection_over_union(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy NMS; the result is ordered by descending confidence.
pub fn non_max_suppression(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| intersection_over_union(kept, &candidate) < iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}
