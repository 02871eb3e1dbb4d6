//! Events a stream delivers to its host.
//!
//! ## Ordering
//!
//! Per stream, events arrive in window order with a strictly increasing
//! `seq`. Each window yields exactly one `InferenceDone`, followed by at most
//! one `StartOfSpeech` or `EndOfSpeech` for the same window.
//!
//! ## JSON shape
//!
//! ```json
//! { "seq": 55, "samplesIndex": 88000, "timestamp": 5.5,
//!   "speechDuration": 0.05, "silenceDuration": 0.0, "speaking": true,
//!   "type": "start_of_speech", "frame": { "samples": [...], "sampleRate": 16000 } }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::error::{Result, VadError};
use crate::stream::hysteresis::ReportedDurations;

// ---------------------------------------------------------------------------
// VAD events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadEvent {
    /// Monotonically increasing per-stream sequence number, starting at 0.
    pub seq: u64,
    /// Model-rate samples processed up to and including this window.
    pub samples_index: u64,
    /// Stream time (seconds) at the end of this window.
    pub timestamp: f64,
    pub speech_duration: f64,
    pub silence_duration: f64,
    pub speaking: bool,
    #[serde(flatten)]
    pub kind: VadEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VadEventKind {
    /// One per window.
    #[serde(rename_all = "camelCase")]
    InferenceDone {
        raw_probability: f32,
        /// Smoothed probability the state machine acted on.
        probability: f32,
        timing: InferenceTiming,
        /// Raw input-rate audio corresponding to this window.
        frame: AudioFrame,
    },
    /// Speech began. `frame` is the pre-roll plus the speech so far.
    StartOfSpeech { frame: AudioFrame },
    /// Speech ended. `frame` is the whole segment including trailing silence.
    EndOfSpeech { frame: AudioFrame },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceTiming {
    /// Wall time spent on this window (seconds).
    pub inference_duration: f64,
    /// Part of `inference_duration` spent inside the model (seconds).
    pub model_duration: f64,
    /// Audio time one window covers (seconds).
    pub window_duration: f64,
    /// Accumulated backlog (seconds) of inference time beyond real time.
    pub extra_inference_time: f64,
    pub lagging: bool,
}

impl VadEvent {
    pub fn is_boundary(&self) -> bool {
        matches!(
            self.kind,
            VadEventKind::StartOfSpeech { .. } | VadEventKind::EndOfSpeech { .. }
        )
    }

    pub fn frame(&self) -> &AudioFrame {
        match &self.kind {
            VadEventKind::InferenceDone { frame, .. }
            | VadEventKind::StartOfSpeech { frame }
            | VadEventKind::EndOfSpeech { frame } => frame,
        }
    }
}

/// Position of a window in the stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventHeader {
    pub samples_index: u64,
    pub timestamp: f64,
    pub durations: ReportedDurations,
}

/// Stamps sequence numbers and hands events to the host.
#[derive(Debug)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<VadEvent>,
    next_seq: u64,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<VadEvent>) -> Self {
        Self { tx, next_seq: 0 }
    }

    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    /// # Errors
    /// `VadError::EventChannelClosed` once the host dropped its receiver.
    pub fn emit(&mut self, header: EventHeader, kind: VadEventKind) -> Result<()> {
        let event = VadEvent {
            seq: self.next_seq,
            samples_index: header.samples_index,
            timestamp: header.timestamp,
            speech_duration: header.durations.speech,
            silence_duration: header.durations.silence,
            speaking: header.durations.speaking,
            kind,
        };
        self.tx
            .send(event)
            .map_err(|_| VadError::EventChannelClosed)?;
        self.next_seq += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusEvent {
    pub stream_id: u64,
    pub status: StreamStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Accepting frames.
    Running,
    /// Input ended and every complete window was processed.
    Closed,
    /// Stopped on a fatal error; no further events will arrive.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> EventHeader {
        EventHeader {
            samples_index: 88_000,
            timestamp: 5.5,
            durations: ReportedDurations {
                speech: 0.05,
                silence: 0.0,
                speaking: true,
            },
        }
    }

    #[test]
    fn boundary_event_serializes_with_snake_case_type() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut emitter = EventEmitter::new(tx);
        emitter
            .emit(
                header(),
                VadEventKind::StartOfSpeech {
                    frame: AudioFrame::new(vec![1, -2, 3], 48_000),
                },
            )
            .expect("emit");
        let event = rx.try_recv().expect("event queued");

        let json = serde_json::to_value(&event).expect("serialize vad event");
        assert_eq!(json["seq"], 0);
        assert_eq!(json["type"], "start_of_speech");
        assert_eq!(json["samplesIndex"], 88_000);
        assert_eq!(json["speaking"], true);
        assert_eq!(json["frame"]["sampleRate"], 48_000);
        assert_eq!(json["frame"]["samples"][1], -2);

        let round_trip: VadEvent = serde_json::from_value(json).expect("deserialize vad event");
        assert_eq!(round_trip, event);
        assert!(round_trip.is_boundary());
    }

    #[test]
    fn inference_done_uses_camel_case_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut emitter = EventEmitter::new(tx);
        emitter
            .emit(
                header(),
                VadEventKind::InferenceDone {
                    raw_probability: 0.75,
                    probability: 0.5,
                    timing: InferenceTiming {
                        inference_duration: 0.002,
                        model_duration: 0.0015,
                        window_duration: 0.032,
                        extra_inference_time: 0.0,
                        lagging: false,
                    },
                    frame: AudioFrame::new(vec![0; 4], 16_000),
                },
            )
            .expect("emit");
        let event = rx.try_recv().expect("event queued");
        assert!(!event.is_boundary());
        assert_eq!(event.frame().samples.len(), 4);

        let json = serde_json::to_value(&event).expect("serialize vad event");
        assert_eq!(json["type"], "inference_done");
        assert_eq!(json["rawProbability"], 0.75);
        assert_eq!(json["timing"]["windowDuration"], 0.032);
        assert_eq!(json["timing"]["modelDuration"], 0.0015);
        assert_eq!(json["timing"]["lagging"], false);
    }

    #[test]
    fn sequence_numbers_increase() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut emitter = EventEmitter::new(tx);
        for _ in 0..3 {
            emitter
                .emit(
                    header(),
                    VadEventKind::EndOfSpeech {
                        frame: AudioFrame::new(Vec::new(), 16_000),
                    },
                )
                .expect("emit");
        }
        assert_eq!(emitter.emitted(), 3);
        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn dropped_receiver_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut emitter = EventEmitter::new(tx);
        let err = emitter
            .emit(
                header(),
                VadEventKind::EndOfSpeech {
                    frame: AudioFrame::new(Vec::new(), 16_000),
                },
            )
            .unwrap_err();
        assert!(matches!(err, VadError::EventChannelClosed));
    }

    #[test]
    fn stream_status_serializes_lowercase() {
        let event = StreamStatusEvent {
            stream_id: 3,
            status: StreamStatus::Failed,
            detail: Some("model panicked".into()),
        };
        let json = serde_json::to_value(&event).expect("serialize status");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["streamId"], 3);
    }
}
