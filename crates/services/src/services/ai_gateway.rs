//! Chat-completions client used by the garment AI features.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::config::GarmentAiConfig;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: no credential configured for the AI gateway")]
    MissingApiKey,
}

impl GatewayError {
    /// Returns true if the error is transient and may be retried under a retry policy.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// A role-tagged message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Either plain text or a list of typed parts (text + image reference)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// User message carrying an instruction plus one image reference
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// Concatenated text of every text part
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(_) => None,
            MessageContent::Parts(parts) => parts.iter().find_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            }),
        }
    }
}

/// Request body for the chat-completions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response from the chat-completions endpoint
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Extract the text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.content.as_deref())
    }

    /// Reply text handed to the interpreter. Blank or `null` content is an empty
    /// reply, not a transport failure.
    pub fn into_reply(self) -> String {
        self.text().unwrap_or_default().to_string()
    }
}

/// Sends one request to the model endpoint and returns the raw reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        api_key: &SecretString,
        request: &ChatRequest,
    ) -> Result<String, GatewayError>;
}

/// HTTPS transport for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    http: Client,
    endpoint: String,
}

impl HttpChatTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .user_agent(concat!("wardrobe-catalog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(
        &self,
        api_key: &SecretString,
        request: &ChatRequest,
    ) -> Result<String, GatewayError> {
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let body = res
                    .json::<ChatCompletionResponse>()
                    .await
                    .map_err(|e| GatewayError::Serde(e.to_string()))?;
                Ok(body.into_reply())
            }
            StatusCode::UNAUTHORIZED => Err(GatewayError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(GatewayError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// How failed calls are retried. The default performs no retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Gateway to the hosted model: credential check, concurrency limit, timeout and retries
/// wrapped around a [`ChatTransport`].
pub struct AiGateway {
    transport: Arc<dyn ChatTransport>,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    request_timeout: Option<Duration>,
    retry: RetryPolicy,
    limiter: Option<Semaphore>,
}

impl AiGateway {
    /// Build a gateway backed by the HTTPS transport
    pub fn from_config(config: GarmentAiConfig) -> Result<Self, GatewayError> {
        let transport = HttpChatTransport::new(config.endpoint.clone())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn ChatTransport>, config: GarmentAiConfig) -> Self {
        Self {
            transport,
            api_key: config.api_key,
            model: config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_timeout: config.request_timeout,
            retry: config.retry,
            limiter: config.max_concurrency.map(Semaphore::new),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the messages and return the raw reply text
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_ref().ok_or(GatewayError::MissingApiKey)?;

        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?,
            ),
            None => None,
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            "Sending chat completion request"
        );

        (|| async { self.send_once(api_key, &request).await })
            .retry(self.retry.backoff())
            .when(|e: &GatewayError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "AI gateway call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_once(
        &self,
        api_key: &SecretString,
        request: &ChatRequest,
    ) -> Result<String, GatewayError> {
        let call = self.transport.send(api_key, request);
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GatewayError::Timeout)?,
            None => call.await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::future::join_all;
    use tokio::time::Instant;

    use super::*;

    /// Transport double that replays scripted replies and records every request
    pub(crate) struct ScriptedTransport {
        replies: Mutex<Vec<Result<String, GatewayError>>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(replies: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub(crate) fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(
            &self,
            _api_key: &SecretString,
            request: &ChatRequest,
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut replies = self.replies.lock().unwrap();
            // The last scripted reply repeats once the script runs out
            if replies.len() > 1 {
                replies.pop().unwrap()
            } else {
                replies
                    .last()
                    .cloned()
                    .unwrap_or_else(|| Ok(String::new()))
            }
        }
    }

    /// Transport double that tracks requests in flight and when each one started.
    /// Requests whose text mentions `FALLA` fail with `RateLimited`.
    pub(crate) struct InFlightTransport {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        starts: Mutex<Vec<Instant>>,
    }

    impl InFlightTransport {
        pub(crate) fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                starts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        /// Start times in the order requests reached the transport
        pub(crate) fn starts(&self) -> Vec<Instant> {
            self.starts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for InFlightTransport {
        async fn send(
            &self,
            _api_key: &SecretString,
            request: &ChatRequest,
        ) -> Result<String, GatewayError> {
            self.starts.lock().unwrap().push(Instant::now());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.messages.iter().any(|m| m.text().contains("FALLA")) {
                return Err(GatewayError::RateLimited);
            }
            Ok("Descripción.".to_string())
        }
    }

    /// Transport double that fails the test if it is ever reached
    pub(crate) struct UnreachableTransport;

    #[async_trait]
    impl ChatTransport for UnreachableTransport {
        async fn send(
            &self,
            _api_key: &SecretString,
            _request: &ChatRequest,
        ) -> Result<String, GatewayError> {
            panic!("transport must not be invoked");
        }
    }

    pub(crate) fn test_config() -> GarmentAiConfig {
        GarmentAiConfig {
            api_key: Some(SecretString::from("sk-test".to_string())),
            ..GarmentAiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_never_reaches_transport() {
        let config = GarmentAiConfig {
            api_key: None,
            ..GarmentAiConfig::default()
        };
        let gateway = AiGateway::with_transport(Arc::new(UnreachableTransport), config);

        let err = gateway
            .complete(vec![ChatMessage::user("hola")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_default_policy_does_not_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(GatewayError::RateLimited)]));
        let gateway = AiGateway::with_transport(transport.clone(), test_config());

        let err = gateway
            .complete(vec![ChatMessage::user("hola")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_configured_retries_recover_from_transient_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(GatewayError::Http {
                status: 503,
                body: "busy".to_string(),
            }),
            Err(GatewayError::Transport("reset".to_string())),
            Ok("listo".to_string()),
        ]));
        let config = GarmentAiConfig {
            retry: RetryPolicy {
                max_retries: 3,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: false,
            },
            ..test_config()
        };
        let gateway = AiGateway::with_transport(transport.clone(), config);

        let reply = gateway
            .complete(vec![ChatMessage::user("hola")])
            .await
            .unwrap();
        assert_eq!(reply, "listo");
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(GatewayError::InvalidApiKey)]));
        let config = GarmentAiConfig {
            retry: RetryPolicy {
                max_retries: 3,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: false,
            },
            ..test_config()
        };
        let gateway = AiGateway::with_transport(transport.clone(), config);

        let err = gateway
            .complete(vec![ChatMessage::user("hola")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidApiKey));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_timeout_is_enforced() {
        let transport = Arc::new(
            ScriptedTransport::replying("tarde").with_delay(Duration::from_millis(200)),
        );
        let config = GarmentAiConfig {
            request_timeout: Some(Duration::from_millis(20)),
            ..test_config()
        };
        let gateway = AiGateway::with_transport(transport, config);

        let err = gateway
            .complete(vec![ChatMessage::user("hola")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }

    #[tokio::test]
    async fn test_concurrency_limit_bounds_requests_in_flight() {
        let transport = Arc::new(InFlightTransport::new(Duration::from_millis(20)));
        let config = GarmentAiConfig {
            max_concurrency: Some(1),
            ..test_config()
        };
        let gateway = AiGateway::with_transport(transport.clone(), config);

        let replies = join_all(
            (0..4).map(|i| gateway.complete(vec![ChatMessage::user(format!("hola {i}"))])),
        )
        .await;

        assert!(replies.iter().all(Result::is_ok));
        assert_eq!(transport.starts().len(), 4);
        assert_eq!(transport.peak(), 1);
    }

    #[tokio::test]
    async fn test_without_limit_requests_overlap() {
        let transport = Arc::new(InFlightTransport::new(Duration::from_millis(20)));
        let gateway = AiGateway::with_transport(transport.clone(), test_config());

        join_all((0..4).map(|i| gateway.complete(vec![ChatMessage::user(format!("hola {i}"))])))
            .await;

        assert!(transport.peak() > 1);
    }

    #[tokio::test]
    async fn test_request_carries_model_and_messages() {
        let transport = Arc::new(ScriptedTransport::replying("ok"));
        let gateway = AiGateway::with_transport(transport.clone(), test_config());

        gateway
            .complete(vec![
                ChatMessage::system("eres un estilista"),
                ChatMessage::user_with_image("describe", "https://img.example/1.jpg"),
            ])
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, DEFAULT_MODEL);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(
            requests[0].messages[1].image_url(),
            Some("https://img.example/1.jpg")
        );
    }

    #[test]
    fn test_image_message_wire_format() {
        let message = ChatMessage::user_with_image("analiza", "data:image/jpeg;base64,AAAA");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "analiza"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                ]
            })
        );
    }

    #[test]
    fn test_parse_completion_response() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Una camisa azul"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), Some("Una camisa azul"));
        assert_eq!(response.usage.unwrap().completion_tokens, 4);
    }

    #[test]
    fn test_blank_completion_is_an_empty_reply() {
        for body in [
            r#"{"choices":[{"message":{"content":""}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[]}"#,
        ] {
            let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
            assert_eq!(response.into_reply(), "");
        }
    }

    #[test]
    fn test_should_retry_classification() {
        assert!(GatewayError::Timeout.should_retry());
        assert!(GatewayError::RateLimited.should_retry());
        assert!(
            GatewayError::Http {
                status: 502,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !GatewayError::Http {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!GatewayError::MissingApiKey.should_retry());
    }
}
