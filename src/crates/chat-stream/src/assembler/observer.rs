use medassist_core_types::TranscriptSnapshot;
use tokio::sync::mpsc;

use crate::error::AssemblerError;

/// Receives transcript notifications from a running stream.
///
/// `on_update` fires once per content mutation, in order. Exactly one of
/// `on_error` / `on_complete` fires per `start` call, and nothing fires after it.
pub trait TranscriptObserver: Send + 'static {
    fn on_update(&mut self, snapshot: &TranscriptSnapshot);

    fn on_error(&mut self, error: &AssemblerError, snapshot: &TranscriptSnapshot);

    fn on_complete(&mut self, snapshot: &TranscriptSnapshot);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    Update(TranscriptSnapshot),
    Failed {
        error: AssemblerError,
        snapshot: TranscriptSnapshot,
    },
    Completed(TranscriptSnapshot),
}

impl AssemblerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssemblerEvent::Failed { .. } | AssemblerEvent::Completed(_)
        )
    }

    pub fn snapshot(&self) -> &TranscriptSnapshot {
        match self {
            AssemblerEvent::Update(snapshot)
            | AssemblerEvent::Completed(snapshot)
            | AssemblerEvent::Failed { snapshot, .. } => snapshot,
        }
    }
}

/// Forwards notifications over an unbounded channel.
///
/// A dropped receiver is ignored; the stream keeps folding so the final
/// transcript is still returned by the handle.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<AssemblerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AssemblerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TranscriptObserver for ChannelObserver {
    fn on_update(&mut self, snapshot: &TranscriptSnapshot) {
        let _ = self.tx.send(AssemblerEvent::Update(snapshot.clone()));
    }

    fn on_error(&mut self, error: &AssemblerError, snapshot: &TranscriptSnapshot) {
        let _ = self.tx.send(AssemblerEvent::Failed {
            error: error.clone(),
            snapshot: snapshot.clone(),
        });
    }

    fn on_complete(&mut self, snapshot: &TranscriptSnapshot) {
        let _ = self.tx.send(AssemblerEvent::Completed(snapshot.clone()));
    }
}
