use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use medassist_core_types::{Message, Role};

use super::{ByteStream, CompletionBackend};
use crate::error::AssemblerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Streaming,
    Direct,
}

/// Caller-side decision of which endpoint answers a query.
pub trait RouteSelector: Send + Sync {
    fn select(&self, user_text: &str) -> Route;
}

/// Routes queries mentioning any keyword to the direct endpoint.
#[derive(Debug, Clone, Default)]
pub struct KeywordRouteSelector {
    keywords: Vec<String>,
}

impl KeywordRouteSelector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl RouteSelector for KeywordRouteSelector {
    fn select(&self, user_text: &str) -> Route {
        let text = user_text.to_lowercase();
        if self.keywords.iter().any(|keyword| text.contains(keyword.as_str())) {
            Route::Direct
        } else {
            Route::Streaming
        }
    }
}

/// Picks a backend per call from the latest user message.
pub struct RoutedBackend {
    selector: Arc<dyn RouteSelector>,
    streaming: Arc<dyn CompletionBackend>,
    direct: Arc<dyn CompletionBackend>,
}

impl RoutedBackend {
    pub fn new(
        selector: Arc<dyn RouteSelector>,
        streaming: Arc<dyn CompletionBackend>,
        direct: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            selector,
            streaming,
            direct,
        }
    }
}

#[async_trait]
impl CompletionBackend for RoutedBackend {
    async fn open(&self, messages: &[Message]) -> AssemblerResult<ByteStream> {
        let user_text = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();

        let route = self.selector.select(user_text);
        debug!("Chat request routed: route={:?}", route);
        match route {
            Route::Streaming => self.streaming.open(messages).await,
            Route::Direct => self.direct.open(messages).await,
        }
    }
}
