//! `VadStream`: one live audio stream and the task that processes it.
//!
//! ## Lifecycle
//!
//! ```text
//! Vad::stream()
//!     └─► status = Running     push_frame / update_options / flush
//!         └─► end_input()      → remaining complete windows processed
//!             └─► join()       → status = Closed, StreamSummary
//! ```
//!
//! Every host call is a `StreamCommand` on one unbounded queue, so frames and
//! options updates are applied in the order they were issued and never in the
//! middle of a window.
//!
//! A fatal error (model failure, dropped event receiver) stops the task,
//! sets status `Failed`, broadcasts a `StreamStatusEvent` and is returned
//! from `join()`. Other streams are unaffected.

pub mod diagnostics;
pub mod hysteresis;
pub mod scheduler;
pub mod speech_buffer;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

pub use diagnostics::{DiagnosticsSnapshot, StreamDiagnostics};
pub use hysteresis::SpeechState;

use crate::audio::{AudioFrame, SampleCount};
use crate::error::{Result, VadError};
use crate::events::{EventEmitter, StreamStatus, StreamStatusEvent, VadEvent};
use crate::inference::InferenceWorker;
use crate::options::{VadOptions, VadOptionsUpdate};
use scheduler::InferenceScheduler;

/// Status broadcast capacity; status changes are rare.
const STATUS_CAP: usize = 16;

/// Work items for the stream task, processed strictly in order.
#[derive(Debug)]
pub enum StreamCommand {
    Frame(AudioFrame),
    UpdateOptions(VadOptionsUpdate),
    /// Push the resampler tail through without ending the stream.
    Flush,
}

/// Final accounting returned by [`VadStream::join`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub stream_id: u64,
    /// Stream time (seconds) covered by processed windows.
    pub processed_secs: f64,
    pub events: u64,
    pub diagnostics: DiagnosticsSnapshot,
}

/// Host-side handle to one stream.
///
/// Dropping the handle also drops the event receiver. The detached task then
/// fails with `EventChannelClosed` at its next event and settles `Failed`.
/// For a clean close, call `end_input()`, read the remaining events and
/// `join()`.
pub struct VadStream {
    id: u64,
    commands: Option<mpsc::UnboundedSender<StreamCommand>>,
    events: mpsc::UnboundedReceiver<VadEvent>,
    status: Arc<Mutex<StreamStatus>>,
    status_tx: broadcast::Sender<StreamStatusEvent>,
    diagnostics: Arc<StreamDiagnostics>,
    task: JoinHandle<Result<StreamSummary>>,
}

impl VadStream {
    /// Spawn the stream task on the current tokio runtime.
    pub(crate) fn spawn(id: u64, options: VadOptions, worker: InferenceWorker) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        let status = Arc::new(Mutex::new(StreamStatus::Running));
        let diagnostics = Arc::new(StreamDiagnostics::default());

        let scheduler = InferenceScheduler::new(
            options,
            SampleCount(worker.window_size_samples()),
            EventEmitter::new(event_tx),
            Arc::clone(&diagnostics),
        );
        let guard = StatusGuard {
            stream_id: id,
            status: Arc::clone(&status),
            status_tx: status_tx.clone(),
            settled: false,
        };

        let span = info_span!("vad_stream", stream_id = id);
        let task = tokio::spawn(run(id, scheduler, worker, command_rx, guard).instrument(span));

        Self {
            id,
            commands: Some(command_tx),
            events: event_rx,
            status,
            status_tx,
            diagnostics,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame. Returns immediately; inference happens on the task.
    ///
    /// # Errors
    /// `VadError::StreamClosed` after `end_input()` or once the task stopped.
    pub fn push_frame(&self, frame: AudioFrame) -> Result<()> {
        self.send(StreamCommand::Frame(frame))
    }

    /// Queue an options update, applied after every frame pushed before it.
    ///
    /// # Errors
    /// - `VadError::InvalidOptions` if a field is out of range.
    /// - `VadError::StreamClosed` as for `push_frame`.
    pub fn update_options(&self, update: VadOptionsUpdate) -> Result<()> {
        update.validate()?;
        if update.is_empty() {
            return Ok(());
        }
        self.send(StreamCommand::UpdateOptions(update))
    }

    /// Drain the resampler so that buffered input reaches the model.
    pub fn flush(&self) -> Result<()> {
        self.send(StreamCommand::Flush)
    }

    /// Signal end of input. Queued frames are still processed.
    pub fn end_input(&mut self) {
        self.commands = None;
    }

    /// Next event, or `None` once the stream has stopped and all events
    /// were delivered.
    pub async fn recv_event(&mut self) -> Option<VadEvent> {
        self.events.recv().await
    }

    pub fn try_recv_event(&mut self) -> Option<VadEvent> {
        self.events.try_recv().ok()
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StreamStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// End input and wait for the task to finish.
    ///
    /// Events not yet received stay readable only until this returns, so
    /// drain them first if they matter.
    ///
    /// # Errors
    /// The fatal error that stopped the stream, or `VadError::StreamPanicked`.
    pub async fn join(self) -> Result<StreamSummary> {
        let Self {
            commands,
            events,
            task,
            ..
        } = self;
        drop(commands);
        let outcome = task.await;
        drop(events);
        match outcome {
            Ok(result) => result,
            Err(e) => Err(VadError::StreamPanicked(e.to_string())),
        }
    }

    fn send(&self, command: StreamCommand) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(VadError::StreamClosed)?
            .send(command)
            .map_err(|_| VadError::StreamClosed)
    }
}

impl std::fmt::Debug for VadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadStream")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("input_open", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

/// Publishes the terminal status exactly once, including when the task
/// unwinds.
struct StatusGuard {
    stream_id: u64,
    status: Arc<Mutex<StreamStatus>>,
    status_tx: broadcast::Sender<StreamStatusEvent>,
    settled: bool,
}

impl StatusGuard {
    fn settle(&mut self, status: StreamStatus, detail: Option<String>) {
        if self.settled {
            return;
        }
        self.settled = true;
        *self.status.lock() = status;
        // No subscribers is fine.
        let _ = self.status_tx.send(StreamStatusEvent {
            stream_id: self.stream_id,
            status,
            detail,
        });
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        self.settle(StreamStatus::Failed, Some("stream task panicked".into()));
    }
}

async fn run(
    id: u64,
    mut scheduler: InferenceScheduler,
    mut worker: InferenceWorker,
    mut commands: mpsc::UnboundedReceiver<StreamCommand>,
    mut guard: StatusGuard,
) -> Result<StreamSummary> {
    info!(
        window = worker.window_size_samples(),
        model_rate = worker.sample_rate(),
        "stream started"
    );

    let outcome = drive(&mut scheduler, &worker, &mut commands).await;
    // Reject further pushes before the terminal status becomes visible.
    drop(commands);
    worker.shutdown();
    let diagnostics = scheduler.diagnostics().snapshot();

    match outcome {
        Ok(()) => {
            info!(
                processed_secs = scheduler.processed_secs(),
                events = scheduler.events_emitted(),
                "stream closed"
            );
            guard.settle(StreamStatus::Closed, None);
            Ok(StreamSummary {
                stream_id: id,
                processed_secs: scheduler.processed_secs(),
                events: scheduler.events_emitted(),
                diagnostics,
            })
        }
        Err(e) => {
            error!(error = %e, ?diagnostics, "stream failed");
            guard.settle(StreamStatus::Failed, Some(e.to_string()));
            Err(e)
        }
    }
}

async fn drive(
    scheduler: &mut InferenceScheduler,
    worker: &InferenceWorker,
    commands: &mut mpsc::UnboundedReceiver<StreamCommand>,
) -> Result<()> {
    while let Some(command) = commands.recv().await {
        match command {
            StreamCommand::Frame(frame) => {
                match scheduler.accept_frame(&frame) {
                    Ok(()) => {}
                    Err(e) if !e.is_fatal() => {
                        error!(error = %e, "dropping frame");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
                scheduler.run_windows(worker).await?;
            }
            StreamCommand::UpdateOptions(update) => {
                if let Err(e) = scheduler.update_options(&update) {
                    error!(error = %e, "ignoring options update");
                }
            }
            StreamCommand::Flush => {
                debug!("flush requested");
                scheduler.drain(worker).await?;
            }
        }
    }

    debug!(input_rate = ?scheduler.input_rate(), "input closed, draining");
    scheduler.drain(worker).await
}
