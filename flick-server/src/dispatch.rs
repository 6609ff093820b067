//! Push notification dispatch.
//!
//! [`Dispatch`] is what the rest of the server talks to. It skips empty
//! destinations and swallows transport failures after logging them, so callers
//! never special-case missing device tokens or failed deliveries.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Eq, PartialEq, Clone, Debug, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Target {
    Token(String),
    Topic(String),
}

impl Target {
    fn is_empty(&self) -> bool {
        match self {
            Target::Token(s) | Target::Topic(s) => s.is_empty(),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct PushMessage {
    pub title: String,
    pub message: Option<String>,
    pub link: Option<String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Flat string map as carried in a push data payload.
    pub fn data(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut data = serde_json::Map::new();
        data.insert("title".into(), self.title.clone().into());
        if let Some(message) = &self.message {
            data.insert("message".into(), message.clone().into());
        }
        if let Some(link) = &self.link {
            let body = serde_json::json!({ "link": link }).to_string();
            data.insert("body".into(), body.into());
        }
        data
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn subscribe(&self, token: &str, topic: &str) -> anyhow::Result<()>;
    async fn unsubscribe(&self, token: &str, topic: &str) -> anyhow::Result<()>;
    async fn send(&self, target: &Target, message: &PushMessage) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Dispatch {
    transport: Arc<dyn PushTransport>,
}

impl Dispatch {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    pub async fn subscribe(&self, token: &str, topic: &str) {
        if token.is_empty() || topic.is_empty() {
            return;
        }
        match self.transport.subscribe(token, topic).await {
            Ok(()) => tracing::debug!(topic, "token subscribed"),
            Err(err) => tracing::warn!(topic, error = ?err, "failed to subscribe to topic"),
        }
    }

    pub async fn unsubscribe(&self, token: &str, topic: &str) {
        if token.is_empty() || topic.is_empty() {
            return;
        }
        match self.transport.unsubscribe(token, topic).await {
            Ok(()) => tracing::debug!(topic, "token unsubscribed"),
            Err(err) => tracing::warn!(topic, error = ?err, "failed to unsubscribe from topic"),
        }
    }

    pub async fn send(&self, target: Target, message: PushMessage) {
        if target.is_empty() {
            return;
        }
        match self.transport.send(&target, &message).await {
            Ok(()) => tracing::info!(title = %message.title, "sent notification"),
            Err(err) => tracing::warn!(error = ?err, "failed to send notification"),
        }
    }
}

/// Transport that only logs. Used when no push gateway is configured.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl PushTransport for LogTransport {
    async fn subscribe(&self, _token: &str, topic: &str) -> anyhow::Result<()> {
        tracing::info!(topic, "subscribe");
        Ok(())
    }
    async fn unsubscribe(&self, _token: &str, topic: &str) -> anyhow::Result<()> {
        tracing::info!(topic, "unsubscribe");
        Ok(())
    }
    async fn send(&self, target: &Target, message: &PushMessage) -> anyhow::Result<()> {
        tracing::info!(?target, data = ?message.data(), "push");
        Ok(())
    }
}

/// Forwards to an HTTP push gateway as JSON posts.
pub struct GatewayTransport {
    base: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TopicBody<'a> {
    token: &'a str,
    topic: &'a str,
}

#[derive(Serialize)]
struct SendBody<'a> {
    target: &'a Target,
    data: serde_json::Map<String, serde_json::Value>,
}

impl GatewayTransport {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: Default::default(),
        }
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> anyhow::Result<()> {
        self.client
            .post(self.base.clone() + path)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl PushTransport for GatewayTransport {
    async fn subscribe(&self, token: &str, topic: &str) -> anyhow::Result<()> {
        self.post("/subscribe", &TopicBody { token, topic }).await
    }
    async fn unsubscribe(&self, token: &str, topic: &str) -> anyhow::Result<()> {
        self.post("/unsubscribe", &TopicBody { token, topic }).await
    }
    async fn send(&self, target: &Target, message: &PushMessage) -> anyhow::Result<()> {
        self.post("/send", &SendBody { target, data: message.data() }).await
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum PushCall {
    Subscribe { token: String, topic: String },
    Unsubscribe { token: String, topic: String },
    Send { target: Target, message: PushMessage },
}

/// Records every call in memory. Can be told to fail, to exercise the
/// swallow-and-log path.
#[derive(Default)]
pub struct MemoryTransport {
    calls: Mutex<Vec<PushCall>>,
    failing: Mutex<bool>,
}

impl MemoryTransport {
    pub fn calls(&self) -> Vec<PushCall> {
        self.calls.lock().clone()
    }
    pub fn sent(&self) -> Vec<(Target, PushMessage)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PushCall::Send { target, message } => Some((target.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
    fn record(&self, call: PushCall) -> anyhow::Result<()> {
        if *self.failing.lock() {
            anyhow::bail!("push transport unavailable");
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl PushTransport for MemoryTransport {
    async fn subscribe(&self, token: &str, topic: &str) -> anyhow::Result<()> {
        self.record(PushCall::Subscribe { token: token.into(), topic: topic.into() })
    }
    async fn unsubscribe(&self, token: &str, topic: &str) -> anyhow::Result<()> {
        self.record(PushCall::Unsubscribe { token: token.into(), topic: topic.into() })
    }
    async fn send(&self, target: &Target, message: &PushMessage) -> anyhow::Result<()> {
        self.record(PushCall::Send { target: target.clone(), message: message.clone() })
    }
}
