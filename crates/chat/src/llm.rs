//! Chat-completion model client
//!
//! The caller's API credential is resolved per request and handed to
//! [`ChatModel::complete`]; the client itself holds no key.

use agentdesk_common::config::LlmConfig;
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::resilience::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a chat-completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// An agent owner's API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the assistant's reply text
    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<String>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Best description of an upstream failure from its response body
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// OpenAI-compatible `/chat/completions` client
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            retry,
        })
    }

    async fn call(&self, credential: &ApiCredential, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::ModelInvocation {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelInvocation {
                status: Some(status.as_u16()),
                message: upstream_message(&body),
            });
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|e| AppError::ModelInvocation {
                status: Some(status.as_u16()),
                message: format!("Failed to parse model response: {}", e),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::ModelInvocation {
                status: Some(status.as_u16()),
                message: "Empty response from model".to_string(),
            })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<String> {
        let reply = self
            .retry
            .run("chat_completion", || self.call(credential, request))
            .await?;

        debug!(reply_chars = reply.len(), "Model replied");
        Ok(reply)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use self::fixtures::ScriptedModel;

#[cfg(any(test, feature = "test-util"))]
mod fixtures {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};

    /// Replies from a script and records every request it receives
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<(ApiCredential, CompletionRequest)>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.push(Ok(text.to_string()));
            self
        }

        pub fn fail(self, status: u16, message: &str) -> Self {
            self.push(Err(AppError::ModelInvocation {
                status: Some(status),
                message: message.to_string(),
            }));
            self
        }

        fn push(&self, reply: Result<String>) {
            self.replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(reply);
        }

        pub fn requests(&self) -> Vec<(ApiCredential, CompletionRequest)> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            credential: &ApiCredential,
            request: &CompletionRequest,
        ) -> Result<String> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((credential.clone(), request.clone()));

            self.replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Ok("Scripted reply".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_parsing() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_message(body), "Incorrect API key provided");
        assert_eq!(upstream_message("<html>bad gateway</html>"), "Unknown error");
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::system("Be brief."), ChatMessage::user("Hi")],
            temperature: 0.7,
            max_tokens: 1000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert_eq!(json["max_tokens"], 1000);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = ApiCredential::new("sk-secret");
        assert!(!format!("{:?}", credential).contains("sk-secret"));
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = LlmConfig {
            api_base: "https://llm.internal/v1/".into(),
            ..LlmConfig::default()
        };
        let model = OpenAiChatModel::new(&config, RetryPolicy::none()).unwrap();
        assert_eq!(model.endpoint, "https://llm.internal/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_scripted_model_records_requests() {
        let model = ScriptedModel::new().fail(401, "bad key").reply("Hello!");
        let credential = ApiCredential::new("sk-test");
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("Hi")],
            temperature: 0.7,
            max_tokens: 1000,
        };

        assert!(model.complete(&credential, &request).await.is_err());
        assert_eq!(model.complete(&credential, &request).await.unwrap(), "Hello!");
        assert_eq!(model.requests().len(), 2);
    }
}
