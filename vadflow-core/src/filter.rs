//! Exponential smoothing of per-window speech probabilities.

/// Recursive low-pass filter: `smoothed = alpha * new + (1 - alpha) * previous`.
///
/// The first sample seeds the filter directly.
#[derive(Debug, Clone)]
pub struct ExpFilter {
    alpha: f32,
    filtered: Option<f32>,
}

impl ExpFilter {
    /// `alpha` is the weight of the newest sample, in `(0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            filtered: None,
        }
    }

    pub fn apply(&mut self, sample: f32) -> f32 {
        let next = match self.filtered {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.filtered = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_sample_seeds_filter() {
        let mut f = ExpFilter::new(0.65);
        assert_relative_eq!(f.apply(0.8), 0.8);
    }

    #[test]
    fn step_response_follows_alpha() {
        let mut f = ExpFilter::new(0.65);
        f.apply(0.0);
        assert_relative_eq!(f.apply(1.0), 0.65, epsilon = 1e-6);
        assert_relative_eq!(f.apply(1.0), 0.8775, epsilon = 1e-6);
    }

    #[test]
    fn single_window_spike_is_damped() {
        let mut f = ExpFilter::new(0.35);
        for _ in 0..10 {
            f.apply(0.0);
        }
        assert!(f.apply(1.0) < 0.5);
        assert!(f.apply(0.0) < 0.25);
    }

    #[test]
    fn alpha_of_one_tracks_input() {
        let mut f = ExpFilter::new(1.0);
        f.apply(0.9);
        assert_relative_eq!(f.apply(0.1), 0.1);
    }
}
