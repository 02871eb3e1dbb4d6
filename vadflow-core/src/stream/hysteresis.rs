//! Speech/silence state machine with duration hysteresis.
//!
//! Two counters accumulate consecutive above-threshold and below-threshold
//! time; a state flip requires the relevant counter to reach its minimum.
//! All counters are kept in model-rate samples so thresholds compare exactly.
//!
//! ```text
//!            p >= threshold for min_speech
//!   ┌──────┐ ─────────────────────────────► ┌──────────┐
//!   │ Idle │                                │ Speaking │
//!   └──────┘ ◄───────────────────────────── └──────────┘
//!            p < threshold for min_silence
//! ```

use serde::{Deserialize, Serialize};

use crate::audio::SampleCount;
use crate::options::VadOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechState {
    Idle,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartOfSpeech,
    EndOfSpeech,
}

/// Durations reported to listeners, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedDurations {
    pub speech: f64,
    pub silence: f64,
    pub speaking: bool,
}

/// What the stream has to do after one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStep {
    /// Durations for this window's `InferenceDone`, before any transition.
    pub window: ReportedDurations,
    pub transition: Option<Transition>,
    /// Trim the speech buffer back to its pre-roll. For `EndOfSpeech` the
    /// buffer must be snapshotted first.
    pub reset_cursor: bool,
}

#[derive(Debug, Clone)]
pub struct SpeechStateMachine {
    state: SpeechState,
    activation_threshold: f32,
    min_speech: SampleCount,
    min_silence: SampleCount,
    speech_run: SampleCount,
    silence_run: SampleCount,
    reported_speech: SampleCount,
    reported_silence: SampleCount,
    sample_rate: u32,
}

impl SpeechStateMachine {
    pub fn new(options: &VadOptions) -> Self {
        Self {
            state: SpeechState::Idle,
            activation_threshold: options.activation_threshold,
            min_speech: options.min_speech_samples(),
            min_silence: options.min_silence_samples(),
            speech_run: SampleCount::ZERO,
            silence_run: SampleCount::ZERO,
            reported_speech: SampleCount::ZERO,
            reported_silence: SampleCount::ZERO,
            sample_rate: options.model_sample_rate,
        }
    }

    /// Pick up new thresholds. Counters and state are left alone.
    pub fn set_options(&mut self, options: &VadOptions) {
        self.activation_threshold = options.activation_threshold;
        self.min_speech = options.min_speech_samples();
        self.min_silence = options.min_silence_samples();
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == SpeechState::Speaking
    }

    pub fn durations(&self) -> ReportedDurations {
        ReportedDurations {
            speech: self.reported_speech.as_secs(self.sample_rate),
            silence: self.reported_silence.as_secs(self.sample_rate),
            speaking: self.is_speaking(),
        }
    }

    /// Feed one smoothed probability covering `window` model-rate samples.
    pub fn step(&mut self, probability: f32, window: SampleCount) -> WindowStep {
        if self.is_speaking() {
            self.reported_speech += window;
        } else {
            self.reported_silence += window;
        }
        let reported = self.durations();

        let mut transition = None;
        let mut reset_cursor = false;

        if probability >= self.activation_threshold {
            self.speech_run += window;
            self.silence_run = SampleCount::ZERO;

            if !self.is_speaking() && self.speech_run >= self.min_speech {
                self.state = SpeechState::Speaking;
                self.reported_silence = SampleCount::ZERO;
                self.reported_speech = self.speech_run;
                transition = Some(Transition::StartOfSpeech);
            }
        } else {
            self.silence_run += window;
            self.speech_run = SampleCount::ZERO;

            if !self.is_speaking() {
                reset_cursor = true;
            } else if self.silence_run >= self.min_silence {
                self.state = SpeechState::Idle;
                self.reported_speech = SampleCount::ZERO;
                self.reported_silence = self.silence_run;
                transition = Some(Transition::EndOfSpeech);
                reset_cursor = true;
            }
        }

        WindowStep {
            window: reported,
            transition,
            reset_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: SampleCount = SampleCount(1600);

    fn machine(min_speech: f64, min_silence: f64) -> SpeechStateMachine {
        SpeechStateMachine::new(&VadOptions {
            min_speech_duration: min_speech,
            min_silence_duration: min_silence,
            ..Default::default()
        })
    }

    /// Index (1-based) of the first window producing `wanted`.
    fn first(m: &mut SpeechStateMachine, p: f32, wanted: Transition, limit: usize) -> Option<usize> {
        (1..=limit).find(|_| m.step(p, WINDOW).transition == Some(wanted))
    }

    #[test]
    fn start_fires_when_accumulated_speech_reaches_minimum() {
        // 0.1 s windows, 0.5 s minimum: the fifth window, not the fourth.
        let mut m = machine(0.5, 0.55);
        assert_eq!(first(&mut m, 0.9, Transition::StartOfSpeech, 10), Some(5));
        assert!(m.is_speaking());
        let d = m.durations();
        assert!((d.speech - 0.5).abs() < 1e-9);
        assert_eq!(d.silence, 0.0);
    }

    #[test]
    fn end_is_symmetric() {
        let mut m = machine(0.1, 0.3);
        first(&mut m, 0.9, Transition::StartOfSpeech, 5);
        assert_eq!(first(&mut m, 0.1, Transition::EndOfSpeech, 10), Some(3));
        assert_eq!(m.state(), SpeechState::Idle);
        let d = m.durations();
        assert_eq!(d.speech, 0.0);
        assert!((d.silence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn no_duplicate_transitions() {
        let mut m = machine(0.1, 0.1);
        let starts = (0..20)
            .filter(|_| m.step(0.9, WINDOW).transition == Some(Transition::StartOfSpeech))
            .count();
        assert_eq!(starts, 1);
        let ends = (0..20)
            .filter(|_| m.step(0.1, WINDOW).transition == Some(Transition::EndOfSpeech))
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn a_dip_resets_the_speech_run() {
        let mut m = machine(0.3, 0.5);
        m.step(0.9, WINDOW);
        m.step(0.9, WINDOW);
        m.step(0.1, WINDOW);
        assert_eq!(first(&mut m, 0.9, Transition::StartOfSpeech, 10), Some(3));
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut m = machine(0.0, 0.5);
        let step = m.step(0.5, WINDOW);
        assert_eq!(step.transition, Some(Transition::StartOfSpeech));
    }

    #[test]
    fn idle_silence_requests_cursor_reset() {
        let mut m = machine(0.5, 0.5);
        assert!(m.step(0.1, WINDOW).reset_cursor);
        assert!(!m.step(0.9, WINDOW).reset_cursor);
    }

    #[test]
    fn window_durations_are_reported_before_transition() {
        let mut m = machine(0.1, 0.5);
        let step = m.step(0.1, WINDOW);
        assert!((step.window.silence - 0.1).abs() < 1e-9);
        let step = m.step(0.9, WINDOW);
        assert_eq!(step.transition, Some(Transition::StartOfSpeech));
        assert!(!step.window.speaking);
        assert!((step.window.silence - 0.2).abs() < 1e-9);
        let step = m.step(0.9, WINDOW);
        assert!(step.window.speaking);
        assert!((step.window.speech - 0.2).abs() < 1e-9);
    }

    #[test]
    fn new_thresholds_apply_to_running_counters() {
        let mut m = machine(1.0, 0.5);
        for _ in 0..3 {
            assert_eq!(m.step(0.9, WINDOW).transition, None);
        }
        m.set_options(&VadOptions {
            min_speech_duration: 0.4,
            ..Default::default()
        });
        assert_eq!(m.step(0.9, WINDOW).transition, Some(Transition::StartOfSpeech));
    }
}
