//! Energy-based VAD model using window RMS.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the window.
//! 2. Subtract the noise floor.
//! 3. Scale so that `full_scale_rms` above the floor maps to probability 1.
//!
//! No hidden state; the stream's exponential filter and hysteresis provide
//! the temporal smoothing.

use super::VadModel;
use crate::error::Result;

/// A dependency-free RMS model.
#[derive(Debug, Clone)]
pub struct EnergyModel {
    window_size: usize,
    sample_rate: u32,
    /// RMS treated as silence. Typical range: 0.001–0.01.
    noise_floor: f32,
    /// RMS above the floor that maps to probability 1.0.
    full_scale_rms: f32,
}

impl EnergyModel {
    /// # Parameters
    /// - `window_size`: Samples per window (e.g. `512` = 32 ms at 16 kHz).
    /// - `sample_rate`: Rate the windows are at (Hz).
    pub fn new(window_size: usize, sample_rate: u32) -> Self {
        Self {
            window_size: window_size.max(1),
            sample_rate,
            noise_floor: 0.005,
            full_scale_rms: 0.05,
        }
    }

    pub fn with_levels(mut self, noise_floor: f32, full_scale_rms: f32) -> Self {
        self.noise_floor = noise_floor.max(0.0);
        self.full_scale_rms = full_scale_rms.max(f32::EPSILON);
        self
    }

    /// Compute the root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self::new(512, 16_000)
    }
}

impl VadModel for EnergyModel {
    fn window_size_samples(&self) -> usize {
        self.window_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn predict(&mut self, window: &[f32]) -> Result<f32> {
        let rms = Self::rms(window);
        Ok(((rms - self.noise_floor) / self.full_scale_rms).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn silence_is_zero_probability() {
        let mut model = EnergyModel::default();
        assert_eq!(model.predict(&[0.0; 512]).unwrap(), 0.0);
    }

    #[test]
    fn loud_window_saturates() {
        let mut model = EnergyModel::default();
        assert_eq!(model.predict(&[0.5; 512]).unwrap(), 1.0);
    }

    #[test]
    fn probability_scales_between_floor_and_full_scale() {
        let mut model = EnergyModel::new(4, 16_000).with_levels(0.0, 0.5);
        let p = model.predict(&[0.25, -0.25, 0.25, -0.25]).unwrap();
        assert_relative_eq!(p, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn rms_of_square_wave() {
        // A square wave at ±0.5 should have RMS = 0.5
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let rms = EnergyModel::rms(&samples);
        assert!((rms - 0.5).abs() < 1e-5, "rms={rms}");
    }

    #[test]
    fn empty_window_is_silence() {
        assert_eq!(EnergyModel::rms(&[]), 0.0);
    }
}
