//! Consumers of recognition events.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender;

use crate::pose::RecognizedTarget;

/// Frames a recognition stays current after the last successful scan.
pub const DEFAULT_HOLD_FRAMES: u32 = 20;

/// Receives engine events. All methods run on the thread driving the engine.
pub trait RecognitionObserver: Send {
    /// Called once per frame handed to the engine, scanned or not.
    fn on_frame(&mut self, _frame_index: u64) {}

    fn on_recognized(&mut self, target: &RecognizedTarget);

    /// A scan ran and found nothing.
    fn on_empty(&mut self) {}
}

/// Shared observer. A poisoned lock is recovered, so events keep flowing
/// after another holder panicked.
impl<O: RecognitionObserver + ?Sized> RecognitionObserver for Arc<Mutex<O>> {
    fn on_frame(&mut self, frame_index: u64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_frame(frame_index);
    }

    fn on_recognized(&mut self, target: &RecognizedTarget) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_recognized(target);
    }

    fn on_empty(&mut self) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_empty();
    }
}

/// Event forwarded through a channel.
#[derive(Clone, Debug)]
pub enum RecognitionEvent {
    Recognized(RecognizedTarget),
    Empty,
}

impl RecognitionObserver for Sender<RecognitionEvent> {
    fn on_recognized(&mut self, target: &RecognizedTarget) {
        // a full or closed channel drops the event
        let _ = self.try_send(RecognitionEvent::Recognized(target.clone()));
    }

    fn on_empty(&mut self) {
        let _ = self.try_send(RecognitionEvent::Empty);
    }
}

/// Keeps the last recognition current for a fixed number of frames.
///
/// Empty scans do not clear the held result; only age does.
#[derive(Clone, Debug)]
pub struct RecognitionHold {
    hold_frames: u32,
    current: Option<RecognizedTarget>,
    age: u32,
}

impl Default for RecognitionHold {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_FRAMES)
    }
}

impl RecognitionHold {
    pub fn new(hold_frames: u32) -> Self {
        Self {
            hold_frames,
            current: None,
            age: 0,
        }
    }

    /// The held recognition, if it has not expired.
    pub fn current(&self) -> Option<&RecognizedTarget> {
        self.current.as_ref()
    }

    /// Frames since the held recognition was produced.
    pub fn age(&self) -> u32 {
        self.age
    }
}

impl RecognitionObserver for RecognitionHold {
    fn on_frame(&mut self, _frame_index: u64) {
        if self.current.is_none() {
            return;
        }
        self.age += 1;
        if self.age >= self.hold_frames {
            self.current = None;
        }
    }

    fn on_recognized(&mut self, target: &RecognizedTarget) {
        self.current = Some(target.clone());
        self.age = 0;
    }
}
