//! `Vad`: validated options plus a model factory; creates streams.
//!
//! ## Lifecycle
//!
//! ```text
//! Vad::new(options, factory)
//!     └─► probe model built once  → rate / window checked, then dropped
//!         └─► stream()            → fresh model + worker thread + task
//!         └─► stream()            → independent second stream
//! ```
//!
//! A `Vad` holds no per-stream state, so one instance can serve any number
//! of concurrent streams.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::error::{Result, VadError};
use crate::inference::{InferenceWorker, ModelFactory, VadModel};
use crate::options::VadOptions;
use crate::stream::VadStream;

pub struct Vad {
    options: VadOptions,
    factory: ModelFactory,
    window_size: usize,
    next_stream_id: AtomicU64,
}

impl Vad {
    /// # Errors
    /// - `VadError::InvalidOptions` if `options` fail validation.
    /// - `VadError::ModelRateMismatch` if the model runs at another rate
    ///   than `options.model_sample_rate`.
    /// - Whatever the factory returns when building the probe model.
    pub fn new(options: VadOptions, factory: ModelFactory) -> Result<Self> {
        options.validate()?;
        let probe = factory.build()?;
        let window_size = check_model(probe.as_ref(), &options)?;
        info!(
            model_rate = options.model_sample_rate,
            window = window_size,
            "vad ready"
        );
        Ok(Self {
            options,
            factory,
            window_size,
            next_stream_id: AtomicU64::new(0),
        })
    }

    /// Build with options read from `VADFLOW_*` environment variables on
    /// top of the defaults.
    pub fn from_env(factory: ModelFactory) -> Result<Self> {
        Self::new(VadOptions::default().with_env_overrides(), factory)
    }

    pub fn options(&self) -> &VadOptions {
        &self.options
    }

    /// Samples per inference window at the model rate.
    pub fn window_size_samples(&self) -> usize {
        self.window_size
    }

    /// Open a new stream. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - Model construction failures from the factory.
    /// - `VadError::Io` if the inference thread cannot be spawned.
    /// - `VadError::Other` when no tokio runtime is running.
    pub fn stream(&self) -> Result<VadStream> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| VadError::Other(anyhow::anyhow!("no tokio runtime: {e}")))?;

        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let model = self.factory.build()?;
        check_model(model.as_ref(), &self.options)?;
        let worker = InferenceWorker::spawn(model, &format!("vadflow-infer-{id}"))?;

        Ok(VadStream::spawn(id, self.options.clone(), worker))
    }
}

impl std::fmt::Debug for Vad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vad")
            .field("options", &self.options)
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

fn check_model(model: &dyn VadModel, options: &VadOptions) -> Result<usize> {
    if model.sample_rate() != options.model_sample_rate {
        return Err(VadError::ModelRateMismatch {
            model: model.sample_rate(),
            configured: options.model_sample_rate,
        });
    }
    let window = model.window_size_samples();
    if window == 0 {
        return Err(VadError::InvalidOptions(
            "model reports a zero-sample window".into(),
        ));
    }
    Ok(window)
}
