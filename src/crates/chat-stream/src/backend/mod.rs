//! Collaborators that produce the completion byte stream.
//!
//! The assembler only sees [`CompletionBackend`]; which endpoint answers a
//! given query is decided here, outside the assembler.

pub mod auth;
pub mod direct;
pub mod http;
pub mod router;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use log::debug;
use medassist_core_types::Message;

use crate::config::ChatStreamConfig;
use crate::error::AssemblerResult;

pub use auth::{Authenticator, Credentials, StaticAuthenticator};
pub use direct::DirectReplyBackend;
pub use http::{HttpCompletionBackend, HttpEndpoint};
pub use router::{KeywordRouteSelector, Route, RouteSelector, RoutedBackend};

/// Raw response chunks as they arrive from the network.
pub type ByteStream = BoxStream<'static, AssemblerResult<Vec<u8>>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the conversation and return the framed response stream.
    ///
    /// Non-success responses are mapped to [`crate::AssemblerError`] here,
    /// before any stream is handed out.
    async fn open(&self, messages: &[Message]) -> AssemblerResult<ByteStream>;
}

/// Build the backend described by `config`: the streaming endpoint alone, or
/// a keyword-routed pair when a direct endpoint and keywords are configured.
pub fn backend_from_config(
    config: &ChatStreamConfig,
    auth: Arc<dyn Authenticator>,
) -> AssemblerResult<Arc<dyn CompletionBackend>> {
    let streaming: Arc<dyn CompletionBackend> =
        Arc::new(HttpCompletionBackend::from_config(config, auth.clone())?);

    let selector = KeywordRouteSelector::new(&config.direct_keywords);
    if selector.is_empty() {
        return Ok(streaming);
    }
    match DirectReplyBackend::from_config(config, auth)? {
        Some(direct) => {
            debug!(
                "Keyword routing enabled: direct_endpoint={:?}",
                config.direct_endpoint_url
            );
            Ok(Arc::new(RoutedBackend::new(
                Arc::new(selector),
                streaming,
                Arc::new(direct),
            )))
        }
        None => Ok(streaming),
    }
}
