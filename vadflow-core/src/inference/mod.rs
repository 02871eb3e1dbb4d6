//! VAD model abstraction.
//!
//! The `VadModel` trait decouples the stream from any specific backend
//! (energy heuristic, Silero ONNX, test scripts). A model is an opaque
//! function from one fixed-size f32 window to a speech probability.
//!
//! `&mut self` on `predict` expresses that models are stateful (RNN hidden
//! states). Each stream therefore builds its own model through a
//! [`ModelFactory`] and hands it to a dedicated [`InferenceWorker`].

pub mod energy;
pub mod worker;

#[cfg(feature = "onnx")]
pub mod silero;

pub use energy::EnergyModel;
pub use worker::{InferenceOutput, InferenceWorker};

#[cfg(feature = "onnx")]
pub use silero::SileroModel;

use std::sync::Arc;

use crate::error::Result;

/// Contract for VAD inference backends.
pub trait VadModel: Send + 'static {
    /// Number of samples one `predict` call consumes.
    fn window_size_samples(&self) -> usize;

    /// Sample rate (Hz) the window must be at.
    fn sample_rate(&self) -> u32;

    /// Speech probability in [0, 1] for one window normalised to [-1, 1].
    ///
    /// `window.len()` always equals `window_size_samples()`.
    ///
    /// # Errors
    /// Backend failures. The stream treats them as fatal.
    fn predict(&mut self, window: &[f32]) -> Result<f32>;

    /// Reset internal state (e.g. RNN hidden states).
    fn reset(&mut self) {}
}

/// Builds one fresh model per stream.
#[derive(Clone)]
pub struct ModelFactory(Arc<dyn Fn() -> Result<Box<dyn VadModel>> + Send + Sync>);

impl ModelFactory {
    pub fn new<F, M>(build: F) -> Self
    where
        F: Fn() -> Result<M> + Send + Sync + 'static,
        M: VadModel,
    {
        Self(Arc::new(move || Ok(Box::new(build()?) as Box<dyn VadModel>)))
    }

    pub fn build(&self) -> Result<Box<dyn VadModel>> {
        (self.0)()
    }
}

impl std::fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFactory").finish_non_exhaustive()
    }
}
