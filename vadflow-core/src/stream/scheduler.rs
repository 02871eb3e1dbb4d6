//! Window formation and per-window processing.
//!
//! ## Data flow
//!
//! ```text
//! AudioFrame (input rate)
//!     ├─► raw queue ─────────────────────────────┐
//!     └─► RateConverter ─► pending (model rate)  │
//!                              │ one window       │ matching raw slice
//!                              ▼                  ▼
//!                      InferenceWorker      SpeechBuffer
//!                              │
//!                   ExpFilter ─► SpeechStateMachine ─► EventEmitter
//! ```
//!
//! Windows run strictly one after another: the next window is not formed
//! until the previous one's events are emitted. Options updates are applied
//! between frames, never inside a window.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::diagnostics::StreamDiagnostics;
use super::hysteresis::{SpeechStateMachine, Transition};
use super::speech_buffer::{SpeechBuffer, WriteOutcome};
use crate::audio::frame::pcm16_to_f32;
use crate::audio::{AudioFrame, RateConverter, SampleCount, SampleQueue};
use crate::error::{Result, VadError};
use crate::events::{EventEmitter, EventHeader, InferenceTiming, VadEventKind};
use crate::filter::ExpFilter;
use crate::inference::InferenceWorker;
use crate::options::{VadOptions, VadOptionsUpdate};

/// Single-window inference time (seconds) above which a warning is logged.
pub const SLOW_INFERENCE_THRESHOLD: f64 = 0.2;

/// State that only exists once the input rate is known.
#[derive(Debug)]
struct InputState {
    sample_rate: u32,
    resampler: RateConverter,
    raw: SampleQueue,
    buffer: SpeechBuffer,
    /// Fractional input samples owed to the next window's raw slice.
    copy_fract: f64,
}

#[derive(Debug)]
pub(crate) struct InferenceScheduler {
    options: VadOptions,
    window: SampleCount,
    model_rate: u32,
    filter: ExpFilter,
    machine: SpeechStateMachine,
    emitter: EventEmitter,
    diagnostics: Arc<StreamDiagnostics>,
    pending: SampleQueue,
    input: Option<InputState>,
    processed: SampleCount,
    extra_inference_time: f64,
    /// Set while a non-zero backlog has already been reported.
    behind: bool,
}

impl InferenceScheduler {
    pub fn new(
        options: VadOptions,
        window: SampleCount,
        emitter: EventEmitter,
        diagnostics: Arc<StreamDiagnostics>,
    ) -> Self {
        Self {
            filter: ExpFilter::new(options.smoothing_alpha),
            machine: SpeechStateMachine::new(&options),
            model_rate: options.model_sample_rate,
            options,
            window,
            emitter,
            diagnostics,
            pending: SampleQueue::new(),
            input: None,
            processed: SampleCount::ZERO,
            extra_inference_time: 0.0,
            behind: false,
        }
    }

    pub fn diagnostics(&self) -> &StreamDiagnostics {
        &self.diagnostics
    }

    pub fn input_rate(&self) -> Option<u32> {
        self.input.as_ref().map(|i| i.sample_rate)
    }

    /// Stream time (seconds) covered by processed windows.
    pub fn processed_secs(&self) -> f64 {
        self.processed.as_secs(self.model_rate)
    }

    pub fn events_emitted(&self) -> u64 {
        self.emitter.emitted()
    }

    /// Queue one frame's samples. The first frame fixes the input rate.
    ///
    /// # Errors
    /// - `VadError::SampleRateMismatch` (non-fatal) if the frame's rate
    ///   differs from the first frame's or is zero. The frame is dropped.
    /// - `VadError::Resampler` if no converter can be built for the rate.
    pub fn accept_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        match self.input_rate() {
            Some(rate) if rate == frame.sample_rate => {}
            Some(rate) => {
                StreamDiagnostics::bump(&self.diagnostics.frames_rejected);
                return Err(VadError::SampleRateMismatch {
                    expected: rate,
                    got: frame.sample_rate,
                });
            }
            None if frame.sample_rate == 0 => {
                StreamDiagnostics::bump(&self.diagnostics.frames_rejected);
                return Err(VadError::SampleRateMismatch {
                    expected: self.model_rate,
                    got: 0,
                });
            }
            None => {
                let state = self.allocate_input(frame.sample_rate)?;
                self.input = Some(state);
            }
        }
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };

        StreamDiagnostics::bump(&self.diagnostics.frames_in);
        self.diagnostics
            .samples_in
            .fetch_add(frame.samples.len(), std::sync::atomic::Ordering::Relaxed);

        input.raw.push(&frame.samples);
        let resampled = input.resampler.process(&frame.samples);
        self.pending.push(&resampled);
        Ok(())
    }

    fn allocate_input(&self, sample_rate: u32) -> Result<InputState> {
        let resampler = RateConverter::new(sample_rate, self.model_rate)?;
        let capacity = self.options.speech_buffer_capacity(sample_rate);
        let padding = self.options.prefix_padding_samples(sample_rate);
        if resampler.is_passthrough() {
            info!(sample_rate, capacity = capacity.get(), "input rate fixed");
        } else {
            info!(
                "resampling enabled from={} to={} capacity={}",
                sample_rate,
                self.model_rate,
                capacity.get()
            );
        }
        Ok(InputState {
            sample_rate,
            resampler,
            raw: SampleQueue::new(),
            buffer: SpeechBuffer::new(capacity, padding, sample_rate),
            copy_fract: 0.0,
        })
    }

    /// Apply a partial options update between windows.
    ///
    /// # Errors
    /// `VadError::InvalidOptions` (non-fatal); nothing is applied then.
    pub fn update_options(&mut self, update: &VadOptionsUpdate) -> Result<()> {
        update.validate()?;
        let previous_max = self.options.max_buffered_speech;
        self.options.apply(update);
        self.machine.set_options(&self.options);
        StreamDiagnostics::bump(&self.diagnostics.option_updates);

        if let Some(input) = &mut self.input {
            let capacity = self.options.speech_buffer_capacity(input.sample_rate);
            let padding = self.options.prefix_padding_samples(input.sample_rate);
            if capacity < input.buffer.cursor() {
                warn!(
                    cursor = input.buffer.cursor().get(),
                    capacity = capacity.get(),
                    "speech buffer shrunk below buffered audio, truncating segment"
                );
            }
            input.buffer.resize(capacity, padding);
            if self.options.max_buffered_speech > previous_max {
                input.buffer.clear_full_flag();
            }
        }

        debug!(options = ?self.options, "options updated");
        Ok(())
    }

    /// Push the resampler tail through and process what became complete.
    ///
    /// A trailing partial window stays queued and is never inferred.
    pub async fn drain(&mut self, worker: &InferenceWorker) -> Result<()> {
        if let Some(input) = &mut self.input {
            let tail = input.resampler.flush();
            self.pending.push(&tail);
        }
        self.run_windows(worker).await
    }

    /// Run every complete window currently queued.
    pub async fn run_windows(&mut self, worker: &InferenceWorker) -> Result<()> {
        while self.pending.len() >= self.window {
            self.run_window(worker).await?;
        }
        Ok(())
    }

    async fn run_window(&mut self, worker: &InferenceWorker) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        let start = Instant::now();

        let mut samples = vec![0f32; self.window.get()];
        pcm16_to_f32(self.pending.head(self.window), &mut samples);
        let output = worker.infer(samples).await?;
        let raw_probability = output.probability;
        let probability = self.filter.apply(raw_probability);

        let window_duration = self.window.as_secs(self.model_rate);
        self.processed += self.window;

        let exact = self.window.get() as f64 * input.sample_rate as f64 / self.model_rate as f64
            + input.copy_fract;
        let to_copy = exact.floor();
        input.copy_fract = exact - to_copy;
        let to_copy = SampleCount(to_copy as usize);

        let raw_window = input.raw.head(to_copy).to_vec();
        if let WriteOutcome::Full { first: true } = input.buffer.write(&raw_window, to_copy) {
            StreamDiagnostics::bump(&self.diagnostics.buffer_overflows);
            warn!(
                max_buffered_speech = self.options.max_buffered_speech,
                "max buffered speech reached, ignoring further data for the current segment"
            );
        }

        let inference_duration = start.elapsed().as_secs_f64();
        self.extra_inference_time =
            (self.extra_inference_time + inference_duration - window_duration).max(0.0);
        let lagging = self.extra_inference_time > 0.0;
        if lagging {
            StreamDiagnostics::bump(&self.diagnostics.lagging_windows);
            if !self.behind {
                StreamDiagnostics::bump(&self.diagnostics.lag_episodes);
                warn!(
                    extra_inference_time = self.extra_inference_time,
                    "inference fell behind realtime"
                );
            }
        }
        self.behind = lagging;
        if inference_duration > SLOW_INFERENCE_THRESHOLD {
            StreamDiagnostics::bump(&self.diagnostics.slow_inferences);
            warn!(
                inference_ms = (inference_duration * 1000.0) as u64,
                delay = self.extra_inference_time,
                "inference is slower than realtime"
            );
        }

        let step = self.machine.step(probability, self.window);
        StreamDiagnostics::bump(&self.diagnostics.windows);
        if probability >= self.options.activation_threshold {
            StreamDiagnostics::bump(&self.diagnostics.speech_windows);
        }

        let samples_index = self.processed.get() as u64;
        let timestamp = self.processed.as_secs(self.model_rate);

        self.emitter.emit(
            EventHeader {
                samples_index,
                timestamp,
                durations: step.window,
            },
            VadEventKind::InferenceDone {
                raw_probability,
                probability,
                timing: InferenceTiming {
                    inference_duration,
                    model_duration: output.compute_time.as_secs_f64(),
                    window_duration,
                    extra_inference_time: self.extra_inference_time,
                    lagging,
                },
                frame: AudioFrame::new(raw_window, input.sample_rate),
            },
        )?;

        if let Some(transition) = step.transition {
            let frame = input.buffer.snapshot();
            let header = EventHeader {
                samples_index,
                timestamp,
                durations: self.machine.durations(),
            };
            let kind = match transition {
                Transition::StartOfSpeech => {
                    StreamDiagnostics::bump(&self.diagnostics.segments_started);
                    debug!(timestamp, samples = frame.samples.len(), "start of speech");
                    VadEventKind::StartOfSpeech { frame }
                }
                Transition::EndOfSpeech => {
                    StreamDiagnostics::bump(&self.diagnostics.segments_ended);
                    debug!(timestamp, samples = frame.samples.len(), "end of speech");
                    VadEventKind::EndOfSpeech { frame }
                }
            };
            self.emitter.emit(header, kind)?;
        }

        if step.reset_cursor {
            input.buffer.reset_write_cursor();
        }

        input.raw.consume(to_copy);
        self.pending.consume(self.window);
        Ok(())
    }
}
