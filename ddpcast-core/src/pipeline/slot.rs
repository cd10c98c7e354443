//! Latest-wins frame slot shared between the capture loop and readers.
//!
//! Holds at most one [`ResampledFrame`]. A write replaces the previous
//! frame; there is no queue, so memory stays bounded and a slow reader
//! only ever sees the newest frame.

use std::sync::{Mutex, PoisonError};

use crate::pipeline::types::ResampledFrame;

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<ResampledFrame>,
    generation: u64,
}

/// Single-slot, overwrite-on-write frame buffer.
///
/// Frames are immutable once stored, so a reader's copy can never mix
/// bytes from two writes.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    inner: Mutex<SlotInner>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame and return the new generation.
    pub fn write(&self, frame: ResampledFrame) -> u64 {
        let (displaced, generation) = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.generation += 1;
            (inner.frame.replace(frame), inner.generation)
        };
        // Released outside the lock.
        drop(displaced);
        generation
    }

    /// Most recent frame, or `None` if nothing has been written yet.
    pub fn read(&self) -> Option<ResampledFrame> {
        self.snapshot().map(|(_, frame)| frame)
    }

    /// Most recent frame together with the generation that wrote it.
    pub fn snapshot(&self) -> Option<(u64, ResampledFrame)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.frame.clone().map(|f| (inner.generation, f))
    }

    /// Number of writes so far; 0 means the slot is empty.
    pub fn generation(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// Drop the stored frame. The generation keeps counting.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.frame = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────
