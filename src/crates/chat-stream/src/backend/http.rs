use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use medassist_core_types::Message;
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};
use tokio::time::timeout;

use super::{Authenticator, ByteStream, CompletionBackend};
use crate::config::ChatStreamConfig;
use crate::error::{AssemblerError, AssemblerResult};
use crate::types::completion::extract_api_error_message;

/// One authenticated JSON endpoint.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    auth: Arc<dyn Authenticator>,
    request_timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(
        url: impl Into<String>,
        auth: Arc<dyn Authenticator>,
        request_timeout: Duration,
    ) -> AssemblerResult<Self> {
        // No overall client timeout: it would also cut long-running streams.
        let client = reqwest::Client::builder()
            .user_agent(concat!("medassist/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| AssemblerError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            auth,
            request_timeout,
        })
    }

    /// POST the conversation and return the response once its status is a success.
    pub async fn post(
        &self,
        messages: &[Message],
        metadata: &Map<String, Value>,
        stream: bool,
    ) -> AssemblerResult<Response> {
        let credentials = self.auth.credentials().await?;
        let body = request_body(messages, &credentials.user_id, metadata, stream);
        debug!(
            "Sending chat request: url={}, messages={}, stream={}",
            self.url,
            messages.len(),
            stream
        );

        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&credentials.bearer_token)
            .json(&body)
            .send();
        let response = match timeout(self.request_timeout, request).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AssemblerError::TransientNetwork(format!(
                    "no response within {}s",
                    self.request_timeout.as_secs()
                )))
            }
        };

        check_status(response).await
    }
}

fn request_body(
    messages: &[Message],
    user_id: &str,
    metadata: &Map<String, Value>,
    stream: bool,
) -> Value {
    let mut body = metadata.clone();
    let messages = messages
        .iter()
        .map(|message| {
            serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect();
    body.insert("messages".to_string(), Value::Array(messages));
    body.insert("userId".to_string(), Value::String(user_id.to_string()));
    body.insert("stream".to_string(), Value::Bool(stream));
    Value::Object(body)
}

pub(crate) async fn check_status(response: Response) -> AssemblerResult<Response> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Err(AssemblerError::Protocol("response has no body".to_string()));
    }
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body);
    warn!(
        "Chat request rejected: status={}, message={}",
        status,
        message.as_deref().unwrap_or("<none>")
    );
    Err(AssemblerError::from_status(status.as_u16(), message))
}

fn error_message_from_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(json) => extract_api_error_message(&json),
        Err(_) => Some(body.chars().take(200).collect()),
    }
}

/// The streaming chat completion endpoint.
pub struct HttpCompletionBackend {
    endpoint: HttpEndpoint,
    metadata: Map<String, Value>,
}

impl HttpCompletionBackend {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            endpoint,
            metadata: Map::new(),
        }
    }

    /// Extra fields merged into every request body.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn from_config(
        config: &ChatStreamConfig,
        auth: Arc<dyn Authenticator>,
    ) -> AssemblerResult<Self> {
        let endpoint = HttpEndpoint::new(
            config.endpoint_url.clone(),
            auth,
            config.request_timeout(),
        )?;
        Ok(Self::new(endpoint).with_metadata(config.metadata.clone()))
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn open(&self, messages: &[Message]) -> AssemblerResult<ByteStream> {
        let response = self.endpoint.post(messages, &self.metadata, true).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AssemblerError::from));
        Ok(stream.boxed())
    }
}
