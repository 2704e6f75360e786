//! Chat-completion handler

use crate::extract::ApiJson;
use crate::state::AppState;
use agentdesk_chat::{ChatReply, ChatRequest, VisitorIdentity};
use agentdesk_common::errors::{AppError, Result};
use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /chat-completion`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    pub agent_id: Uuid,

    #[validate(length(min = 1, max = 8000))]
    pub message: String,

    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub visitor_id: Option<String>,

    #[serde(default)]
    #[validate(length(max = 200))]
    pub visitor_name: Option<String>,

    #[serde(default)]
    #[validate(email)]
    pub visitor_email: Option<String>,
}

impl ChatCompletionRequest {
    /// Blank conversation ids mean "start a new conversation"
    fn conversation_id(&self) -> Result<Option<Uuid>> {
        match self.conversation_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Uuid::parse_str(raw)
                .map(Some)
                .map_err(|_| AppError::ConversationResolution {
                    message: format!("Invalid conversation id: {}", raw),
                }),
        }
    }
}

/// Answer a visitor's message
pub async fn chat_completion(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatCompletionRequest>,
) -> Result<Json<ChatReply>> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be blank".to_string(),
        });
    }

    let conversation_id = request.conversation_id()?;

    let reply = state
        .chat
        .handle(ChatRequest {
            agent_id: request.agent_id,
            message: request.message,
            conversation_id,
            visitor: VisitorIdentity {
                visitor_id: request.visitor_id,
                name: request.visitor_name,
                email: request.visitor_email,
            },
        })
        .await?;

    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(conversation_id: Option<&str>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            agent_id: Uuid::new_v4(),
            message: "Hi".into(),
            conversation_id: conversation_id.map(str::to_string),
            visitor_id: None,
            visitor_name: None,
            visitor_email: None,
        }
    }

    #[test]
    fn test_conversation_id_parsing() {
        assert_eq!(request(None).conversation_id().unwrap(), None);
        assert_eq!(request(Some("")).conversation_id().unwrap(), None);

        let id = Uuid::new_v4();
        assert_eq!(
            request(Some(&id.to_string())).conversation_id().unwrap(),
            Some(id)
        );
        assert!(matches!(
            request(Some("abc")).conversation_id(),
            Err(AppError::ConversationResolution { .. })
        ));
    }

    #[test]
    fn test_validation_rules() {
        let mut body = request(None);
        assert!(body.validate().is_ok());

        body.visitor_email = Some("not-an-email".into());
        assert!(body.validate().is_err());

        body.visitor_email = None;
        body.message = String::new();
        assert!(body.validate().is_err());
    }
}
