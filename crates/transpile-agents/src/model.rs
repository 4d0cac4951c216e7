//! Model boundary: the capability trait, an OpenAI-compatible HTTP client,
//! and the timeout + bounded-retry wrapper every pipeline call goes through.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transpile_core::resilience::RetryPolicy;

use crate::config::TranslatorConfig;
use crate::errors::{ModelError, PipelineError};

/// Which prompt template a request was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    Summarize,
    Generate,
    Refine,
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summarize => write!(f, "summarize"),
            Self::Generate => write!(f, "generate"),
            Self::Refine => write!(f, "refine"),
        }
    }
}

/// A rendered request: template name plus system and user messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub template: Template,
    pub system: String,
    pub user: String,
}

/// Anything that can answer a rendered prompt with text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// `POST {api_base}/chat/completions` with an optional bearer key.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut http = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)
            .map(|c| c.message.content.unwrap_or_default())
    }
}

/// Applies a per-call timeout and the transport retry policy. Retries are
/// invisible to the refinement budget.
#[derive(Clone)]
pub struct RetryingModel {
    inner: Arc<dyn ModelClient>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn ModelClient>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub async fn call(&self, request: &ModelRequest) -> Result<String, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, self.inner.complete(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(self.timeout)),
            };

            match result {
                Ok(text) => {
                    debug!(template = %request.template, attempt, chars = text.len(), "Model replied");
                    return Ok(text);
                }
                Err(e) if e.is_retriable() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        template = %request.template,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Model call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(PipelineError::ModelCall {
                        template: request.template,
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> ModelRequest {
        ModelRequest {
            template: Template::Generate,
            system: "sys".into(),
            user: "user".into(),
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut mock = MockModelClient::new();
        mock.expect_complete().times(3).returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ModelError::Transport("reset".into()))
            } else {
                Ok("fn main() {}".into())
            }
        });

        let model = RetryingModel::new(Arc::new(mock), quick_policy(), Duration::from_secs(5));
        assert_eq!(model.call(&request()).await.unwrap(), "fn main() {}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_policy() {
        let mut mock = MockModelClient::new();
        mock.expect_complete()
            .times(3)
            .returning(|_| Err(ModelError::Status { status: 503, body: "busy".into() }));

        let model = RetryingModel::new(Arc::new(mock), quick_policy(), Duration::from_secs(5));
        match model.call(&request()).await {
            Err(PipelineError::ModelCall { attempts, template, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(template, Template::Generate);
            }
            other => panic!("expected ModelCall error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_status_not_retried() {
        let mut mock = MockModelClient::new();
        mock.expect_complete()
            .times(1)
            .returning(|_| Err(ModelError::Status { status: 400, body: "bad".into() }));

        let model = RetryingModel::new(Arc::new(mock), quick_policy(), Duration::from_secs(5));
        assert!(matches!(
            model.call(&request()).await,
            Err(PipelineError::ModelCall { attempts: 1, .. })
        ));
    }

    struct Stalled;

    #[async_trait]
    impl ModelClient for Stalled {
        async fn complete(&self, _: &ModelRequest) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transport_failure() {
        let model = RetryingModel::new(Arc::new(Stalled), quick_policy(), Duration::from_secs(1));
        match model.call(&request()).await {
            Err(PipelineError::ModelCall {
                attempts,
                source: ModelError::Timeout(_),
                ..
            }) => assert_eq!(attempts, 3),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
