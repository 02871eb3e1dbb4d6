//! Input-to-model sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Frames arrive at whatever rate the source produces (commonly 48 kHz);
//! the VAD model runs at a fixed rate (16 kHz for Silero). `RateConverter`
//! bridges that gap on the stream task.
//!
//! When input rate == model rate, `RateConverter` is a passthrough and no
//! rubato session is created at all. That is the common case.
//!
//! VAD does not need high quality resampling, so the cheap cubic polynomial
//! interpolator is used. Rubato's fixed-input latency is small and bounded
//! and is ignored by the scheduler.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::audio::frame::f32_to_pcm16;
use crate::error::{Result, VadError};

/// Converts 16-bit mono PCM from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when input rate == output rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Accumulation buffer holding partial input blocks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    input_rate: u32,
    output_rate: u32,
}

impl RateConverter {
    /// Create a converter processing blocks of 10 ms of input audio.
    ///
    /// # Errors
    /// Returns `VadError::Resampler` if either rate is zero or rubato fails
    /// to initialise.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        Self::with_chunk_size(input_rate, output_rate, (input_rate as usize / 100).max(1))
    }

    pub fn with_chunk_size(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(VadError::Resampler(format!(
                "invalid rates from={input_rate} to={output_rate}"
            )));
        }

        if input_rate == output_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                input_rate,
                output_rate,
            });
        }

        let ratio = output_rate as f64 / input_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VadError::Resampler(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        info!(
            input_rate,
            output_rate, chunk_size, max_out, "resampling enabled"
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
            input_rate,
            output_rate,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block is
    /// available for rubato. Any remainder is kept for the next call.
    ///
    /// In passthrough mode (same rates), input is returned unchanged.
    pub fn process(&mut self, samples: &[i16]) -> Vec<i16> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf
            .extend(samples.iter().map(|&s| s as f32 / i16::MAX as f32));

        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend(self.output_buf[0][..produced].iter().map(|&s| f32_to_pcm16(s)));
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Resample whatever partial block is still buffered, zero-padding it to
    /// a full block, and return only the output that corresponds to real input.
    pub fn flush(&mut self) -> Vec<i16> {
        let Some(ref mut resampler) = self.resampler else {
            return Vec::new();
        };
        if self.input_buf.is_empty() {
            return Vec::new();
        }

        let pending = self.input_buf.len();
        let expected =
            (pending as f64 * self.output_rate as f64 / self.input_rate as f64).round() as usize;

        let out = match resampler.process_partial_into_buffer(
            Some(&[&self.input_buf[..]][..]),
            &mut self.output_buf,
            None,
        ) {
            Ok((_consumed, produced)) => self.output_buf[0][..produced.min(expected)]
                .iter()
                .map(|&s| f32_to_pcm16(s))
                .collect(),
            Err(e) => {
                error!("resampler flush error: {e}");
                Vec::new()
            }
        };

        self.input_buf.clear();
        out
    }

    /// Returns `true` when input rate == output rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

impl std::fmt::Debug for RateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateConverter")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("passthrough", &self.is_passthrough())
            .finish_non_exhaustive()
    }
}
