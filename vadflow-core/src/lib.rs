//! # vadflow-core
//!
//! Streaming voice activity detection.
//!
//! ## Architecture
//!
//! ```text
//! host ──StreamCommand──► stream task (tokio) ──Job──► inference thread
//!                              │                          (VadModel)
//!                RateConverter · SpeechBuffer
//!                ExpFilter · SpeechStateMachine
//!                              │
//!               mpsc::UnboundedSender<VadEvent> ──► host
//! ```
//!
//! Frames are pushed at any rate; the stream resamples them to the model's
//! rate, runs one inference per fixed-size window and reports
//! `InferenceDone` every window plus `StartOfSpeech` / `EndOfSpeech` at
//! segment boundaries, each carrying the raw input-rate audio.
//!
//! ```no_run
//! use vadflow_core::{AudioFrame, EnergyModel, ModelFactory, Vad, VadOptions};
//!
//! # async fn demo() -> vadflow_core::Result<()> {
//! let vad = Vad::new(
//!     VadOptions::default(),
//!     ModelFactory::new(|| Ok(EnergyModel::default())),
//! )?;
//! let mut stream = vad.stream()?;
//! stream.push_frame(AudioFrame::new(vec![0; 480], 48_000))?;
//! stream.end_input();
//! while let Some(event) = stream.recv_event().await {
//!     println!("{}", event.seq);
//! }
//! stream.join().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod inference;
pub mod options;
pub mod stream;

// Convenience re-exports for downstream crates
pub use audio::{AudioFrame, SampleCount};
pub use engine::Vad;
pub use error::{Result, VadError};
pub use events::{InferenceTiming, StreamStatus, StreamStatusEvent, VadEvent, VadEventKind};
pub use filter::ExpFilter;
pub use inference::{EnergyModel, ModelFactory, VadModel};
pub use options::{VadOptions, VadOptionsUpdate};
pub use stream::{DiagnosticsSnapshot, StreamSummary, VadStream};

#[cfg(feature = "onnx")]
pub use inference::SileroModel;
