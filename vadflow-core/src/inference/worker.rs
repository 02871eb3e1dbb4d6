//! Single-worker inference dispatcher.
//!
//! ## Threading
//!
//! Model calls are blocking and may take longer than a window lasts. Each
//! stream therefore owns one dedicated OS thread that owns the model:
//!
//! ```text
//! stream task ──Job{window, oneshot}──► crossbeam channel ──► worker thread
//!      ▲                                                         │
//!      └──────────── oneshot::Receiver.await ◄── predict() ──────┘
//! ```
//!
//! The stream awaits each reply before forming the next window, so at most
//! one inference is in flight and results come back in window order. The
//! await yields to the runtime; other streams keep running.
//!
//! A panic inside the model is caught on the worker thread and reported as
//! `VadError::ModelPanicked`; the worker exits afterwards since the model's
//! state can no longer be trusted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::VadModel;
use crate::error::{Result, VadError};

/// Result of one model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOutput {
    /// Raw model probability, clamped to [0, 1].
    pub probability: f32,
    /// Time spent inside `predict` on the worker thread.
    pub compute_time: Duration,
}

struct Job {
    window: Vec<f32>,
    reply: oneshot::Sender<Result<InferenceOutput>>,
}

/// Handle to a dedicated inference thread.
///
/// Dropping the handle closes the job channel; the thread exits once its
/// current job (if any) returns. A model that never returns keeps only its
/// own thread alive.
pub struct InferenceWorker {
    jobs: Option<Sender<Job>>,
    window_size: usize,
    sample_rate: u32,
}

impl InferenceWorker {
    /// Move `model` onto a new thread named `name`.
    ///
    /// # Errors
    /// `VadError::Io` if the OS refuses to spawn the thread.
    pub fn spawn(mut model: Box<dyn VadModel>, name: &str) -> Result<Self> {
        let window_size = model.window_size_samples();
        let sample_rate = model.sample_rate();
        let (tx, rx) = bounded::<Job>(1);
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                model.reset();
                debug!(worker = %thread_name, "inference worker started");

                while let Ok(job) = rx.recv() {
                    let start = Instant::now();
                    let outcome = catch_unwind(AssertUnwindSafe(|| model.predict(&job.window)));
                    let compute_time = start.elapsed();

                    let (reply, poisoned) = match outcome {
                        Ok(Ok(p)) if p.is_finite() => (
                            Ok(InferenceOutput {
                                probability: p.clamp(0.0, 1.0),
                                compute_time,
                            }),
                            false,
                        ),
                        Ok(Ok(p)) => (
                            Err(VadError::Inference(format!(
                                "model returned non-finite probability {p}"
                            ))),
                            false,
                        ),
                        Ok(Err(e)) => (Err(e), false),
                        Err(payload) => {
                            let msg = panic_message(payload.as_ref());
                            error!(worker = %thread_name, panic = %msg, "model panicked");
                            (Err(VadError::ModelPanicked(msg)), true)
                        }
                    };

                    // The stream may already be gone; nothing to do then.
                    let _ = job.reply.send(reply);

                    if poisoned {
                        break;
                    }
                }

                debug!(worker = %thread_name, "inference worker stopped");
            })?;

        Ok(Self {
            jobs: Some(tx),
            window_size,
            sample_rate,
        })
    }

    /// Run the model on one window and wait for the result.
    ///
    /// # Errors
    /// - `VadError::WorkerGone` if the worker thread has exited.
    /// - Whatever the model returned, including `VadError::ModelPanicked`.
    pub async fn infer(&self, window: Vec<f32>) -> Result<InferenceOutput> {
        let jobs = self.jobs.as_ref().ok_or(VadError::WorkerGone)?;
        let (reply, rx) = oneshot::channel();

        match jobs.try_send(Job { window, reply }) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => return Err(VadError::WorkerGone),
            Err(TrySendError::Full(_)) => {
                return Err(VadError::Inference(
                    "inference worker already has a pending window".into(),
                ))
            }
        }

        rx.await.map_err(|_| VadError::WorkerGone)?
    }

    pub fn window_size_samples(&self) -> usize {
        self.window_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Close the job channel. Further `infer` calls fail with `WorkerGone`.
    pub fn shutdown(&mut self) {
        self.jobs = None;
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for InferenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceWorker")
            .field("window_size", &self.window_size)
            .field("sample_rate", &self.sample_rate)
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
