//! MedAssist chat streaming core.
//!
//! Layers, bottom up: wire types -> stream handler (UTF-8 decoding, line
//! framing, payload extraction) -> assembler (transcript folding, observers,
//! cancellation). Backends supply the byte stream and stay outside the
//! assembler.

pub mod assembler;
pub mod backend;
pub mod config;
pub mod error;
pub mod notice;
pub mod stream_handler;
pub mod types;

pub use assembler::{
    AssemblerEvent, AssemblerSettings, ChannelObserver, StreamHandle, StreamOutcome,
    StreamStatus, StreamingTranscriptAssembler, TranscriptObserver,
};
pub use backend::{
    backend_from_config, Authenticator, ByteStream, CompletionBackend, Credentials,
    DirectReplyBackend, HttpCompletionBackend, HttpEndpoint, KeywordRouteSelector, Route,
    RouteSelector, RoutedBackend, StaticAuthenticator,
};
pub use config::{ChatStreamConfig, ConfigError};
pub use error::{AssemblerError, AssemblerResult};
pub use notice::FailureNotices;
pub use stream_handler::{Frame, FrameEvent, FrameReader, MalformedFramePolicy, ReaderLimits};

pub use medassist_core_types::{Message, Role, TranscriptSnapshot};
