use thiserror::Error;

/// All errors produced by vadflow-core.
#[derive(Debug, Error)]
pub enum VadError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("frame sample rate {got} Hz does not match stream sample rate {expected} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },

    #[error("model runs at {model} Hz but options request {configured} Hz")]
    ModelRateMismatch { model: u32, configured: u32 },

    #[error("resampler error: {0}")]
    Resampler(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("model panicked during inference: {0}")]
    ModelPanicked(String),

    #[error("inference worker is gone")]
    WorkerGone,

    #[error("event receiver dropped, stream cannot emit events")]
    EventChannelClosed,

    #[error("stream is closed")]
    StreamClosed,

    #[error("stream task panicked: {0}")]
    StreamPanicked(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VadError {
    /// Whether this error tears down the stream that produced it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VadError::SampleRateMismatch { .. } | VadError::InvalidOptions(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VadError>;
