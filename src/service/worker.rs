use crate::common::{AttendanceError, Result};
use crate::service::face_service::FaceRecognitionService;
use crate::service::protocol::{Job, JobId, JobKind, Outcome, RegisterJob, VerifyJob};
use image::DynamicImage;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs pipeline jobs on a dedicated thread so callers never block on
/// detection or inference. Outcomes come back in submission order.
///
/// Dropping the worker closes the job queue and joins the thread after the
/// queued jobs finish.
pub struct FaceWorker {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<Outcome>,
    handle: Option<JoinHandle<()>>,
    next_id: JobId,
}

impl FaceWorker {
    pub fn spawn(service: Arc<FaceRecognitionService>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>();

        let handle = thread::Builder::new()
            .name("face-pipeline".into())
            .spawn(move || run(service, job_rx, outcome_tx))?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            handle: Some(handle),
            next_id: 1,
        })
    }

    fn submit(&mut self, build: impl FnOnce(JobId) -> Job) -> Result<JobId> {
        let id = self.next_id;
        self.next_id += 1;

        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| AttendanceError::Other(anyhow::anyhow!("Face worker is shut down")))?;
        sender
            .send(build(id))
            .map_err(|_| AttendanceError::Other(anyhow::anyhow!("Face worker thread has exited")))?;
        Ok(id)
    }

    pub fn submit_register(&mut self, identity: &str, image: DynamicImage) -> Result<JobId> {
        let identity = identity.to_string();
        self.submit(|id| Job::Register(RegisterJob { id, identity, image }))
    }

    pub fn submit_verify(&mut self, identity: &str, image: DynamicImage) -> Result<JobId> {
        let identity = identity.to_string();
        self.submit(|id| Job::Verify(VerifyJob { id, identity, image }))
    }

    /// Blocks until the next outcome; `None` once the worker has stopped.
    pub fn recv(&self) -> Option<Outcome> {
        self.outcomes.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Outcome> {
        self.outcomes.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Outcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for FaceWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Face worker thread panicked");
            }
        }
    }
}

fn run(service: Arc<FaceRecognitionService>, jobs: Receiver<Job>, outcomes: Sender<Outcome>) {
    tracing::debug!("Face worker started");

    for job in jobs {
        let outcome = match job {
            Job::Register(job) => {
                tracing::info!("Processing registration for: {}", job.identity);
                let success = service.register_face(&job.image, &job.identity);
                Outcome { id: job.id, kind: JobKind::Register, identity: job.identity, success }
            }
            Job::Verify(job) => {
                tracing::info!("Processing verification for: {}", job.identity);
                let success = service.match_face(&job.image, &job.identity);
                Outcome { id: job.id, kind: JobKind::Verify, identity: job.identity, success }
            }
        };

        if outcomes.send(outcome).is_err() {
            tracing::debug!("Outcome receiver dropped, stopping face worker");
            break;
        }
    }

    tracing::debug!("Face worker stopped");
}
