//! Streaming transcript assembler.
//!
//! `start` appends the user's message, opens a completion stream on a
//! backend, and folds its content deltas into the last assistant message on
//! a spawned task. Observers see a snapshot after every mutation.

pub mod observer;
pub mod transcript;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, trace, warn};
use medassist_core_types::{Message, TranscriptSnapshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::backend::CompletionBackend;
use crate::config::ChatStreamConfig;
use crate::error::{AssemblerError, AssemblerResult};
use crate::notice::FailureNotices;
use crate::stream_handler::{FrameEvent, FrameReader, ReaderLimits};

pub use observer::{AssemblerEvent, ChannelObserver, TranscriptObserver};
pub use transcript::fold_delta;

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Longest wait for the next chunk before the stream counts as dead.
    pub idle_timeout: Duration,
    pub reader_limits: ReaderLimits,
    pub notices: FailureNotices,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            reader_limits: ReaderLimits::default(),
            notices: FailureNotices::default(),
        }
    }
}

impl From<&ChatStreamConfig> for AssemblerSettings {
    fn from(config: &ChatStreamConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            reader_limits: config.reader_limits(),
            notices: config.notices.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Failed(AssemblerError),
}

/// Final state of one `start` call.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub transcript: Vec<Message>,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Default)]
pub struct StreamingTranscriptAssembler {
    settings: Arc<AssemblerSettings>,
}

impl StreamingTranscriptAssembler {
    pub fn new(settings: AssemblerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(config: &ChatStreamConfig) -> Self {
        Self::new(AssemblerSettings::from(config))
    }

    /// Append `user_text` to `prior_messages` and start streaming the reply.
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    /// Callers must not start a second stream for the same conversation
    /// until this one has finished.
    pub fn start<O>(
        &self,
        prior_messages: Vec<Message>,
        user_text: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
        observer: O,
    ) -> StreamHandle
    where
        O: TranscriptObserver,
    {
        let mut transcript = prior_messages;
        transcript.push(Message::user(user_text));

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let task = StreamTask {
            settings: self.settings.clone(),
            transcript,
            observer,
            cancel: cancel.clone(),
            finished: finished.clone(),
        };
        let join = tokio::spawn(task.run(backend));

        StreamHandle {
            cancel,
            finished,
            join,
        }
    }
}

/// Handle to one in-flight stream. Inert once the stream has finished.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    finished: CancellationToken,
    join: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Best-effort abort. Content folded so far is kept.
    pub fn cancel(&self) {
        if self.finished.is_cancelled() {
            return;
        }
        debug!("Chat stream cancellation requested");
        self.cancel.cancel();
    }

    /// Cancel the stream if it is still running after `after`.
    pub fn cancel_after(&self, after: Duration) {
        let cancel = self.cancel.clone();
        let finished = self.finished.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    warn!("Chat stream still running after {}ms, cancelling", after.as_millis());
                    cancel.cancel();
                }
            }
        });
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait for the stream to end and take back the transcript.
    pub async fn wait(self) -> AssemblerResult<StreamOutcome> {
        self.join
            .await
            .map_err(|e| AssemblerError::Internal(format!("chat stream task failed: {}", e)))
    }
}

struct StreamTask<O> {
    settings: Arc<AssemblerSettings>,
    transcript: Vec<Message>,
    observer: O,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl<O: TranscriptObserver> StreamTask<O> {
    async fn run(mut self, backend: Arc<dyn CompletionBackend>) -> StreamOutcome {
        debug!(
            "Chat stream started: messages={}",
            self.transcript.len()
        );

        let status = match self.drive(backend.as_ref()).await {
            Ok(()) => {
                debug!("Chat stream completed: messages={}", self.transcript.len());
                let snapshot = self.snapshot();
                self.observer.on_complete(&snapshot);
                StreamStatus::Completed
            }
            Err(err) => {
                if let Some(notice) = self.settings.notices.for_error(&err) {
                    self.transcript.push(Message::assistant(notice));
                }
                if err.is_cancelled() {
                    debug!("Chat stream cancelled");
                } else {
                    error!("Chat stream failed: {}", err);
                }
                let snapshot = self.snapshot();
                self.observer.on_error(&err, &snapshot);
                StreamStatus::Failed(err)
            }
        };

        self.finished.cancel();
        StreamOutcome {
            transcript: self.transcript,
            status,
        }
    }

    async fn drive(&mut self, backend: &dyn CompletionBackend) -> AssemblerResult<()> {
        let cancel = self.cancel.clone();
        let request = self.transcript.clone();

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AssemblerError::Cancelled),
            opened = backend.open(&request) => opened?,
        };

        let mut reader = FrameReader::new(self.settings.reader_limits);
        let idle_timeout = self.settings.idle_timeout;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AssemblerError::Cancelled),
                next = timeout(idle_timeout, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(chunk))) => {
                    trace!("Chat stream chunk: {} bytes", chunk.len());
                    reader.feed(&chunk);
                    if self.fold_available(&mut reader)? {
                        return Ok(());
                    }
                }
                Ok(Some(Err(err))) => return Err(err),
                Ok(None) => {
                    debug!("Chat stream closed by server");
                    reader.finish();
                    self.fold_available(&mut reader)?;
                    return Ok(());
                }
                Err(_) => {
                    return Err(AssemblerError::TransientNetwork(format!(
                        "no data received for {}s",
                        idle_timeout.as_secs()
                    )));
                }
            }
        }
    }

    /// Fold every event the reader can produce. Returns true at `[DONE]`.
    fn fold_available(&mut self, reader: &mut FrameReader) -> AssemblerResult<bool> {
        while let Some(event) = reader.next_event() {
            if self.cancel.is_cancelled() {
                return Err(AssemblerError::Cancelled);
            }
            match event? {
                FrameEvent::Done => {
                    debug!("Chat stream reached [DONE]");
                    return Ok(true);
                }
                FrameEvent::Delta(delta) => {
                    if fold_delta(&mut self.transcript, &delta) {
                        let snapshot = self.snapshot();
                        self.observer.on_update(&snapshot);
                    }
                }
            }
        }
        Ok(false)
    }

    fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot::from(self.transcript.as_slice())
    }
}
