//! Fixed-capacity buffer of raw (input-rate) audio for the current segment.
//!
//! Holds the pre-roll padding plus all speech written since the last cursor
//! reset. Every write is clamped to the source length and the free space, so
//! a shrinking resize between windows can never cause an out-of-bounds copy.

use crate::audio::{AudioFrame, SampleCount};

/// Result of one [`SpeechBuffer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This many samples were copied (possibly fewer than requested).
    Written(SampleCount),
    /// No space left. `first` is true only the first time this segment.
    Full { first: bool },
}

#[derive(Debug, Clone)]
pub struct SpeechBuffer {
    data: Vec<i16>,
    /// Next free slot; `data[..cursor]` is valid audio.
    cursor: usize,
    prefix_padding: SampleCount,
    max_reached: bool,
    sample_rate: u32,
}

impl SpeechBuffer {
    pub fn new(capacity: SampleCount, prefix_padding: SampleCount, sample_rate: u32) -> Self {
        Self {
            data: vec![0; capacity.get()],
            cursor: 0,
            prefix_padding,
            max_reached: false,
            sample_rate,
        }
    }

    pub fn capacity(&self) -> SampleCount {
        SampleCount(self.data.len())
    }

    pub fn cursor(&self) -> SampleCount {
        SampleCount(self.cursor)
    }

    pub fn remaining(&self) -> SampleCount {
        SampleCount(self.data.len().saturating_sub(self.cursor))
    }

    pub fn is_max_reached(&self) -> bool {
        self.max_reached
    }

    /// Copy up to `requested` samples of `src` at the cursor.
    ///
    /// The copy length is `min(requested, src.len(), remaining)`.
    pub fn write(&mut self, src: &[i16], requested: SampleCount) -> WriteOutcome {
        if requested.get() > 0 && self.remaining() == SampleCount::ZERO {
            let first = !self.max_reached;
            self.max_reached = true;
            return WriteOutcome::Full { first };
        }

        let n = requested.get().min(src.len()).min(self.remaining().get());
        let end = self.cursor + n;
        // Re-slice against the current length rather than trusting `n`.
        let Some(dest) = self.data.get_mut(self.cursor..end) else {
            return WriteOutcome::Written(SampleCount::ZERO);
        };
        dest.copy_from_slice(&src[..dest.len()]);
        self.cursor = end;
        WriteOutcome::Written(SampleCount(n))
    }

    /// Keep only the last `prefix_padding` samples, moved to the front.
    ///
    /// No-op while the cursor is within the padding region.
    pub fn reset_write_cursor(&mut self) {
        let padding = self.prefix_padding.get().min(self.data.len());
        if self.cursor <= padding {
            return;
        }
        self.data.copy_within(self.cursor - padding..self.cursor, 0);
        self.cursor = padding;
        self.max_reached = false;
    }

    /// Owned copy of `data[..cursor]`.
    pub fn snapshot(&self) -> AudioFrame {
        AudioFrame::new(self.data[..self.cursor].to_vec(), self.sample_rate)
    }

    /// Change capacity and padding. Data past the new capacity is dropped.
    pub fn resize(&mut self, capacity: SampleCount, prefix_padding: SampleCount) {
        self.data.resize(capacity.get(), 0);
        self.cursor = self.cursor.min(self.data.len());
        self.prefix_padding = prefix_padding;
    }

    pub fn clear_full_flag(&mut self) {
        self.max_reached = false;
    }
}
