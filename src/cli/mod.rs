pub mod annotate;

pub use annotate::annotate_detections;
