use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Per-stream counters, shared between the stream task and its handle.
#[derive(Debug, Default)]
pub struct StreamDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_rejected: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub windows: AtomicUsize,
    pub speech_windows: AtomicUsize,
    pub lagging_windows: AtomicUsize,
    /// Times the stream went from keeping up to lagging.
    pub lag_episodes: AtomicUsize,
    pub slow_inferences: AtomicUsize,
    pub segments_started: AtomicUsize,
    pub segments_ended: AtomicUsize,
    pub buffer_overflows: AtomicUsize,
    pub option_updates: AtomicUsize,
}

impl StreamDiagnostics {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            speech_windows: self.speech_windows.load(Ordering::Relaxed),
            lagging_windows: self.lagging_windows.load(Ordering::Relaxed),
            lag_episodes: self.lag_episodes.load(Ordering::Relaxed),
            slow_inferences: self.slow_inferences.load(Ordering::Relaxed),
            segments_started: self.segments_started.load(Ordering::Relaxed),
            segments_ended: self.segments_ended.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            option_updates: self.option_updates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_rejected: usize,
    pub samples_in: usize,
    pub windows: usize,
    pub speech_windows: usize,
    pub lagging_windows: usize,
    pub lag_episodes: usize,
    pub slow_inferences: usize,
    pub segments_started: usize,
    pub segments_ended: usize,
    pub buffer_overflows: usize,
    pub option_updates: usize,
}
