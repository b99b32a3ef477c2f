//! Recognition engine.
//!
//! The engine owns the enrolled catalog and the per-frame pipeline
//! (preprocess, detect, describe, match, estimate). Frames arriving between
//! scans are skipped without doing any work.

mod error;
mod observer;
mod params;
mod pipeline;
mod worker;

pub use error::EngineError;
pub use observer::{RecognitionEvent, RecognitionHold, RecognitionObserver, DEFAULT_HOLD_FRAMES};
pub use params::EngineParams;
pub use pipeline::{Engine, Frame, ScanOutcome, ScanStats};
pub use worker::{ScanJob, ScanReply, ScanWorker, WorkerError};
