//! Per-stream VAD configuration.
//!
//! `VadOptions` is what a stream is created with; `VadOptionsUpdate` is a
//! partial override applied later through the stream's command queue.
//! Both serialise as camelCase JSON so hosts can keep them in settings files.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::SampleCount;
use crate::error::{Result, VadError};

/// Upper bound (seconds) for `maxBufferedSpeech` and `prefixPaddingDuration`.
/// Both size the speech buffer, which is allocated up front.
pub const MAX_BUFFER_DURATION: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadOptions {
    /// Sustained speech (seconds) required before `StartOfSpeech`.
    pub min_speech_duration: f64,
    /// Sustained silence (seconds) required before `EndOfSpeech`.
    pub min_silence_duration: f64,
    /// Audio (seconds) kept from before speech onset.
    pub prefix_padding_duration: f64,
    /// Maximum speech (seconds) buffered for one segment, padding excluded.
    pub max_buffered_speech: f64,
    /// Smoothed probability at or above which a window counts as speech.
    pub activation_threshold: f32,
    /// Sample rate the model runs at (Hz). Fixed per model.
    pub model_sample_rate: u32,
    /// Weight of the newest probability in the exponential filter.
    pub smoothing_alpha: f32,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self {
            min_speech_duration: 0.05,
            min_silence_duration: 0.55,
            prefix_padding_duration: 0.5,
            max_buffered_speech: 60.0,
            activation_threshold: 0.5,
            model_sample_rate: 16_000,
            smoothing_alpha: 0.65,
        }
    }
}

impl VadOptions {
    /// Check every field is in range.
    ///
    /// # Errors
    /// `VadError::InvalidOptions` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_duration("minSpeechDuration", self.min_speech_duration)?;
        check_duration("minSilenceDuration", self.min_silence_duration)?;
        check_buffer_duration("prefixPaddingDuration", self.prefix_padding_duration)?;
        check_buffer_duration("maxBufferedSpeech", self.max_buffered_speech)?;
        check_threshold(self.activation_threshold)?;
        if self.model_sample_rate == 0 {
            return Err(VadError::InvalidOptions(
                "modelSampleRate must be non-zero".into(),
            ));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(VadError::InvalidOptions(format!(
                "smoothingAlpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        Ok(())
    }

    /// Overlay `VADFLOW_*` environment variables on top of `self`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env("VADFLOW_MIN_SPEECH_DURATION", &mut self.min_speech_duration);
        override_from_env("VADFLOW_MIN_SILENCE_DURATION", &mut self.min_silence_duration);
        override_from_env(
            "VADFLOW_PREFIX_PADDING_DURATION",
            &mut self.prefix_padding_duration,
        );
        override_from_env("VADFLOW_MAX_BUFFERED_SPEECH", &mut self.max_buffered_speech);
        override_from_env(
            "VADFLOW_ACTIVATION_THRESHOLD",
            &mut self.activation_threshold,
        );
        override_from_env("VADFLOW_SMOOTHING_ALPHA", &mut self.smoothing_alpha);
        self
    }

    /// Apply a partial override; unset fields keep their current value.
    pub fn apply(&mut self, update: &VadOptionsUpdate) {
        if let Some(v) = update.min_speech_duration {
            self.min_speech_duration = v;
        }
        if let Some(v) = update.min_silence_duration {
            self.min_silence_duration = v;
        }
        if let Some(v) = update.prefix_padding_duration {
            self.prefix_padding_duration = v;
        }
        if let Some(v) = update.max_buffered_speech {
            self.max_buffered_speech = v;
        }
        if let Some(v) = update.activation_threshold {
            self.activation_threshold = v;
        }
    }

    /// Pre-roll length at `input_rate`.
    pub fn prefix_padding_samples(&self, input_rate: u32) -> SampleCount {
        SampleCount::from_secs(self.prefix_padding_duration, input_rate)
    }

    /// Speech buffer capacity at `input_rate`: max speech plus pre-roll.
    pub fn speech_buffer_capacity(&self, input_rate: u32) -> SampleCount {
        SampleCount::from_secs(self.max_buffered_speech, input_rate)
            + self.prefix_padding_samples(input_rate)
    }

    pub fn min_speech_samples(&self) -> SampleCount {
        SampleCount::from_secs(self.min_speech_duration, self.model_sample_rate)
    }

    pub fn min_silence_samples(&self) -> SampleCount {
        SampleCount::from_secs(self.min_silence_duration, self.model_sample_rate)
    }
}

/// Partial override of [`VadOptions`].
///
/// `model_sample_rate` is absent on purpose: it is a property of the model.
/// `Some(0.0)` is an explicit value, not "unset".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadOptionsUpdate {
    pub min_speech_duration: Option<f64>,
    pub min_silence_duration: Option<f64>,
    pub prefix_padding_duration: Option<f64>,
    pub max_buffered_speech: Option<f64>,
    pub activation_threshold: Option<f32>,
}

impl VadOptionsUpdate {
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("minSpeechDuration", self.min_speech_duration),
            ("minSilenceDuration", self.min_silence_duration),
        ];
        for (name, value) in durations {
            if let Some(v) = value {
                check_duration(name, v)?;
            }
        }
        let buffer_durations = [
            ("prefixPaddingDuration", self.prefix_padding_duration),
            ("maxBufferedSpeech", self.max_buffered_speech),
        ];
        for (name, value) in buffer_durations {
            if let Some(v) = value {
                check_buffer_duration(name, v)?;
            }
        }
        if let Some(t) = self.activation_threshold {
            check_threshold(t)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn check_duration(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(VadError::InvalidOptions(format!(
            "{name} must be a finite, non-negative number of seconds, got {value}"
        )))
    }
}

fn check_buffer_duration(name: &str, value: f64) -> Result<()> {
    check_duration(name, value)?;
    if value > MAX_BUFFER_DURATION {
        return Err(VadError::InvalidOptions(format!(
            "{name} must be at most {MAX_BUFFER_DURATION} seconds, got {value}"
        )));
    }
    Ok(())
}

fn check_threshold(value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(VadError::InvalidOptions(format!(
            "activationThreshold must be in [0, 1], got {value}"
        )))
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => warn!(key, value = %raw, "ignoring unparsable option override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        VadOptions::default().validate().expect("defaults must validate");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut opts = VadOptions::default();
        opts.activation_threshold = 1.5;
        assert!(matches!(opts.validate(), Err(VadError::InvalidOptions(_))));

        let mut opts = VadOptions::default();
        opts.min_silence_duration = -0.1;
        assert!(opts.validate().is_err());

        let mut opts = VadOptions::default();
        opts.max_buffered_speech = f64::INFINITY;
        assert!(opts.validate().is_err());

        let mut opts = VadOptions::default();
        opts.smoothing_alpha = 0.0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_buffer_sizes_that_cannot_be_allocated() {
        let opts = VadOptions {
            max_buffered_speech: 1e15,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(VadError::InvalidOptions(_))));

        let opts = VadOptions {
            prefix_padding_duration: MAX_BUFFER_DURATION + 1.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let at_limit = VadOptions {
            max_buffered_speech: MAX_BUFFER_DURATION,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let update = VadOptionsUpdate {
            max_buffered_speech: Some(1e15),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(VadError::InvalidOptions(_))));
    }

    #[test]
    fn update_keeps_unset_fields_and_honours_explicit_zero() {
        let mut opts = VadOptions::default();
        opts.apply(&VadOptionsUpdate {
            min_speech_duration: Some(0.0),
            activation_threshold: Some(0.6),
            ..Default::default()
        });
        assert_eq!(opts.min_speech_duration, 0.0);
        assert_eq!(opts.activation_threshold, 0.6);
        assert_eq!(opts.min_silence_duration, 0.55);
        assert_eq!(opts.max_buffered_speech, 60.0);
    }

    #[test]
    fn update_validation_checks_only_set_fields() {
        assert!(VadOptionsUpdate::default().validate().is_ok());
        let bad = VadOptionsUpdate {
            prefix_padding_duration: Some(f64::NAN),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn buffer_capacity_includes_padding() {
        let opts = VadOptions {
            max_buffered_speech: 1.0,
            prefix_padding_duration: 0.25,
            ..Default::default()
        };
        assert_eq!(opts.prefix_padding_samples(48_000), SampleCount(12_000));
        assert_eq!(opts.speech_buffer_capacity(48_000), SampleCount(60_000));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let opts: VadOptions =
            serde_json::from_str(r#"{"minSilenceDuration": 2.0, "activationThreshold": 0.6}"#)
                .expect("parse options");
        assert_eq!(opts.min_silence_duration, 2.0);
        assert_eq!(opts.activation_threshold, 0.6);
        assert_eq!(opts.model_sample_rate, 16_000);
    }

    #[test]
    fn env_override_parses_and_ignores_garbage() {
        std::env::set_var("VADFLOW_MAX_BUFFERED_SPEECH", "300");
        std::env::set_var("VADFLOW_SMOOTHING_ALPHA", "not-a-number");
        let opts = VadOptions::default().with_env_overrides();
        std::env::remove_var("VADFLOW_MAX_BUFFERED_SPEECH");
        std::env::remove_var("VADFLOW_SMOOTHING_ALPHA");
        assert_eq!(opts.max_buffered_speech, 300.0);
        assert_eq!(opts.smoothing_alpha, 0.65);
    }
}
