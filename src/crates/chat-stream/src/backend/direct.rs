use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::debug;
use medassist_core_types::Message;
use serde_json::{Map, Value};

use super::{Authenticator, ByteStream, CompletionBackend, HttpEndpoint};
use crate::config::ChatStreamConfig;
use crate::error::{AssemblerError, AssemblerResult};
use crate::types::DirectReply;

/// Non-streaming alternate endpoint.
///
/// The whole reply arrives as one JSON body. It is re-framed as a single data
/// frame followed by `[DONE]`, so the assembler only ever consumes one stream
/// shape.
pub struct DirectReplyBackend {
    endpoint: HttpEndpoint,
    metadata: Map<String, Value>,
}

impl DirectReplyBackend {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            endpoint,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// `None` when no direct endpoint is configured.
    pub fn from_config(
        config: &ChatStreamConfig,
        auth: Arc<dyn Authenticator>,
    ) -> AssemblerResult<Option<Self>> {
        let Some(url) = config.direct_endpoint_url.clone() else {
            return Ok(None);
        };
        let endpoint = HttpEndpoint::new(url, auth, config.request_timeout())?;
        Ok(Some(
            Self::new(endpoint).with_metadata(config.metadata.clone()),
        ))
    }
}

#[async_trait]
impl CompletionBackend for DirectReplyBackend {
    async fn open(&self, messages: &[Message]) -> AssemblerResult<ByteStream> {
        let response = self.endpoint.post(messages, &self.metadata, false).await?;
        let body = response.text().await?;
        let reply: DirectReply = serde_json::from_str(&body).map_err(|e| {
            AssemblerError::Protocol(format!("direct reply is not valid JSON: {}", e))
        })?;
        let text = reply
            .into_text()
            .ok_or_else(|| AssemblerError::Protocol("direct reply has no text".to_string()))?;

        debug!("Direct reply received: {} chars", text.chars().count());
        Ok(stream::iter(vec![Ok(encode_as_frames(&text))]).boxed())
    }
}

/// Encode a complete reply in the streaming wire format.
pub fn encode_as_frames(text: &str) -> Vec<u8> {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {}\n\ndata: [DONE]\n\n", payload).into_bytes()
}
