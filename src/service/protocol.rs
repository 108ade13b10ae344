use image::DynamicImage;

pub type JobId = u64;

// Requests handled by the background worker
#[derive(Debug, Clone)]
pub enum Job {
    Register(RegisterJob),
    Verify(VerifyJob),
}

#[derive(Debug, Clone)]
pub struct RegisterJob {
    pub id: JobId,
    pub identity: String,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct VerifyJob {
    pub id: JobId,
    pub identity: String,
    pub image: DynamicImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Register,
    Verify,
}

// Delivered back to the submitting thread
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub id: JobId,
    pub kind: JobKind,
    pub identity: String,
    pub success: bool,
}
