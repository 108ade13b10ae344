use crate::core::detector::{select_primary_face, FaceBox};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const HIGH_CONFIDENCE: Rgb<u8> = Rgb([0, 255, 0]);
const MEDIUM_CONFIDENCE: Rgb<u8> = Rgb([255, 255, 0]);
const LOW_CONFIDENCE: Rgb<u8> = Rgb([255, 0, 0]);
const PRIMARY: Rgb<u8> = Rgb([0, 255, 255]);

fn confidence_color(confidence: f32) -> Rgb<u8> {
    if confidence > 0.7 {
        HIGH_CONFIDENCE
    } else if confidence > 0.5 {
        MEDIUM_CONFIDENCE
    } else {
        LOW_CONFIDENCE
    }
}

/// Clamps `face` grown by `margin` pixels to the image; `None` for empty boxes.
fn face_rect(img: &RgbImage, face: &FaceBox, margin: f32) -> Option<Rect> {
    if face.width() <= 0.0 || face.height() <= 0.0 {
        return None;
    }

    let x1 = (face.x1 - margin).max(0.0) as i32;
    let y1 = (face.y1 - margin).max(0.0) as i32;
    let x2 = (face.x2 + margin).min(img.width() as f32) as i32;
    let y2 = (face.y2 + margin).min(img.height() as f32) as i32;

    let width = (x2 - x1).max(1) as u32;
    let height = (y2 - y1).max(1) as u32;
    Some(Rect::at(x1, y1).of_size(width, height))
}

/// Draws every detection coloured by confidence, and outlines the face the
/// pipeline would use in cyan.
pub fn annotate_detections(image: &DynamicImage, faces: &[FaceBox]) -> DynamicImage {
    let mut img = image.to_rgb8();

    for face in faces {
        let Some(rect) = face_rect(&img, face, 0.0) else { continue };
        let color = confidence_color(face.confidence);
        draw_hollow_rect_mut(&mut img, rect, color);

        // Second outline for a thicker border on confident boxes
        if face.confidence > 0.5 && rect.width() > 2 && rect.height() > 2 {
            let inner = Rect::at(rect.left() + 1, rect.top() + 1)
                .of_size(rect.width() - 2, rect.height() - 2);
            draw_hollow_rect_mut(&mut img, inner, color);
        }
    }

    if let Some(primary) = select_primary_face(faces) {
        for margin in [2.0, 3.0] {
            if let Some(rect) = face_rect(&img, primary, margin) {
                draw_hollow_rect_mut(&mut img, rect, PRIMARY);
            }
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn primary_face_is_outlined_in_cyan() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let faces = [face(10.0, 10.0, 40.0, 40.0, 0.9), face(45.0, 45.0, 55.0, 55.0, 0.3)];

        let annotated = annotate_detections(&image, &faces).to_rgb8();
        assert_eq!(*annotated.get_pixel(8, 20), PRIMARY);
        assert_eq!(*annotated.get_pixel(10, 20), HIGH_CONFIDENCE);
        assert_eq!(*annotated.get_pixel(45, 50), LOW_CONFIDENCE);
        assert_eq!(*annotated.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_image_are_clamped() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(32, 32));
        let faces = [face(-10.0, -10.0, 100.0, 100.0, 0.6)];
        let annotated = annotate_detections(&image, &faces);
        assert_eq!(annotated.width(), 32);
    }

    #[test]
    fn empty_boxes_are_skipped() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let annotated = annotate_detections(&image, &[face(5.0, 5.0, 5.0, 9.0, 0.9)]).to_rgb8();
        assert!(annotated.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
