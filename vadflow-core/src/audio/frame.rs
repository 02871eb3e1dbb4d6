//! PCM frame type and the sample-count unit used across component boundaries.
//!
//! Every offset and length that crosses a module boundary is a
//! [`SampleCount`]: a number of mono 16-bit samples, never a byte offset.

use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Number of mono samples at some sample rate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SampleCount(pub usize);

impl SampleCount {
    pub const ZERO: SampleCount = SampleCount(0);

    /// Convert a duration in seconds to samples at `sample_rate`, rounded to
    /// the nearest sample. Negative or non-finite durations yield zero.
    pub fn from_secs(secs: f64, sample_rate: u32) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * sample_rate as f64).round() as usize)
    }

    /// Duration of this many samples at `sample_rate`.
    pub fn as_secs(self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.0 as f64 / sample_rate as f64
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn saturating_sub(self, rhs: SampleCount) -> SampleCount {
        SampleCount(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SampleCount {
    type Output = SampleCount;

    fn add(self, rhs: SampleCount) -> SampleCount {
        SampleCount(self.0 + rhs.0)
    }
}

impl AddAssign for SampleCount {
    fn add_assign(&mut self, rhs: SampleCount) {
        self.0 += rhs.0;
    }
}

impl Sub for SampleCount {
    type Output = SampleCount;

    fn sub(self, rhs: SampleCount) -> SampleCount {
        SampleCount(self.0 - rhs.0)
    }
}

/// An owned chunk of mono 16-bit PCM at a declared sample rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    /// Sample rate in Hz (e.g. 8000, 16000, 48000).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a frame from f32 samples in [-1.0, 1.0].
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().map(|&s| f32_to_pcm16(s)).collect(), sample_rate)
    }

    pub fn len(&self) -> SampleCount {
        SampleCount(self.samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.len().as_secs(self.sample_rate)
    }
}

/// Normalise 16-bit PCM into `out` by dividing by `i16::MAX`.
///
/// Converts `min(src.len(), out.len())` samples and returns that count.
pub fn pcm16_to_f32(src: &[i16], out: &mut [f32]) -> usize {
    let n = src.len().min(out.len());
    for (dst, &s) in out[..n].iter_mut().zip(&src[..n]) {
        *dst = s as f32 / i16::MAX as f32;
    }
    n
}

pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * i16::MAX as f32)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// FIFO of samples at one sample rate.
///
/// Appending a frame is the "merge"; consuming a prefix leaves the tail queued
/// for the next window.
#[derive(Debug, Default, Clone)]
pub struct SampleQueue {
    samples: Vec<i16>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn len(&self) -> SampleCount {
        SampleCount(self.samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The first `n` queued samples, or fewer if the queue is shorter.
    pub fn head(&self, n: SampleCount) -> &[i16] {
        &self.samples[..n.get().min(self.samples.len())]
    }

    /// Drop the first `n` samples (all of them if `n` exceeds the length).
    pub fn consume(&mut self, n: SampleCount) {
        let n = n.get().min(self.samples.len());
        self.samples.drain(..n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_rounds_durations() {
        assert_eq!(SampleCount::from_secs(0.05, 16_000), SampleCount(800));
        assert_eq!(SampleCount::from_secs(0.29, 100), SampleCount(29));
        assert_eq!(SampleCount::from_secs(-1.0, 16_000), SampleCount::ZERO);
        assert_eq!(SampleCount::from_secs(f64::NAN, 16_000), SampleCount::ZERO);
    }

    #[test]
    fn pcm16_normalises_full_scale() {
        let mut out = [0f32; 3];
        let n = pcm16_to_f32(&[i16::MAX, 0, -i16::MAX], &mut out);
        assert_eq!(n, 3);
        assert_eq!(out, [1.0, 0.0, -1.0]);
    }

    #[test]
    fn pcm16_conversion_truncates_to_shorter_side() {
        let mut out = [0f32; 2];
        assert_eq!(pcm16_to_f32(&[100, 200, 300], &mut out), 2);
    }

    #[test]
    fn f32_round_trip_clamps() {
        assert_eq!(f32_to_pcm16(2.0), i16::MAX);
        assert_eq!(f32_to_pcm16(-2.0), i16::MIN);
        assert_eq!(f32_to_pcm16(0.0), 0);
    }

    #[test]
    fn queue_keeps_tail_after_consume() {
        let mut q = SampleQueue::new();
        q.push(&[1, 2, 3]);
        q.push(&[4, 5]);
        assert_eq!(q.head(SampleCount(4)), &[1, 2, 3, 4]);
        q.consume(SampleCount(4));
        assert_eq!(q.len(), SampleCount(1));
        assert_eq!(q.head(SampleCount(10)), &[5]);
        q.consume(SampleCount(10));
        assert!(q.is_empty());
    }
}
