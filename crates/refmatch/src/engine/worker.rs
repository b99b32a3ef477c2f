//! Background scanning on a dedicated thread.
//!
//! The job queue holds a single frame. While it is occupied, further frames
//! are refused with [`WorkerError::Busy`] instead of piling up behind a slow
//! scan.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::debug;
use refmatch_core::{CameraRays, RgbaImage};

use super::{Engine, Frame, ScanOutcome};

const JOB_QUEUE_CAPACITY: usize = 1;

/// An owned frame handed to the worker thread.
pub struct ScanJob {
    pub image: RgbaImage,
    pub camera: Option<Arc<dyn CameraRays + Send + Sync>>,
}

impl ScanJob {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraRays + Send + Sync>) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// Result of one accepted job. `sequence` counts accepted jobs from zero.
#[derive(Clone, Debug)]
pub struct ScanReply {
    pub sequence: u64,
    pub outcome: ScanOutcome,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    #[error("a scan is already queued; frame dropped")]
    Busy,
    #[error("worker thread is no longer running")]
    Disconnected,
    #[error("worker thread panicked")]
    Panicked,
}

pub struct ScanWorker {
    jobs: Option<Sender<(u64, ScanJob)>>,
    results: Receiver<ScanReply>,
    handle: Option<JoinHandle<Engine>>,
    accepted: u64,
}

impl ScanWorker {
    /// Move `engine` onto a new thread. Every accepted job is scanned
    /// immediately; the engine's scan interval does not apply here.
    pub fn spawn(engine: Engine) -> Self {
        let (job_tx, job_rx) = bounded::<(u64, ScanJob)>(JOB_QUEUE_CAPACITY);
        let (reply_tx, reply_rx) = unbounded::<ScanReply>();
        let handle = thread::spawn(move || run(engine, job_rx, reply_tx));
        Self {
            jobs: Some(job_tx),
            results: reply_rx,
            handle: Some(handle),
            accepted: 0,
        }
    }

    /// Queue a frame without blocking.
    pub fn try_submit(&mut self, job: ScanJob) -> Result<u64, WorkerError> {
        let tx = self.jobs.as_ref().ok_or(WorkerError::Disconnected)?;
        let sequence = self.accepted;
        match tx.try_send((sequence, job)) {
            Ok(()) => {
                self.accepted += 1;
                Ok(sequence)
            }
            Err(TrySendError::Full(_)) => {
                debug!("scan worker busy, dropping frame");
                Err(WorkerError::Busy)
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::Disconnected),
        }
    }

    #[inline]
    pub fn results(&self) -> &Receiver<ScanReply> {
        &self.results
    }

    #[inline]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Finish queued work, stop the thread and hand the engine back.
    ///
    /// Replies still in the results channel stay readable through
    /// [`Self::results`] until the worker is dropped.
    pub fn shutdown(&mut self) -> Result<Engine, WorkerError> {
        self.jobs.take();
        let handle = self.handle.take().ok_or(WorkerError::Disconnected)?;
        handle.join().map_err(|_| WorkerError::Panicked)
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(mut engine: Engine, jobs: Receiver<(u64, ScanJob)>, replies: Sender<ScanReply>) -> Engine {
    for (sequence, job) in jobs.iter() {
        let mut frame = Frame::new(job.image.view());
        if let Some(camera) = job.camera.as_deref() {
            frame = frame.with_camera(camera);
        }
        let outcome = engine.scan(&frame);
        if replies.send(ScanReply { sequence, outcome }).is_err() {
            break;
        }
    }
    engine
}
