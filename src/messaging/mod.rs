//! Firebase Cloud Messaging, HTTP v1 API.

use crate::core::middleware::AuthMiddleware;
use crate::core::{authorized_client, parse_error_response};
use crate::messaging::models::{Message, SendResponse};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use thiserror::Error;

pub mod models;

const FCM_V1_API: &str = "https://fcm.googleapis.com/v1/projects/{project_id}/messages:send";

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    send_url: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: &'a Message,
}

impl FirebaseMessaging {
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        let send_url = FCM_V1_API.replace("{project_id}", &project_id);

        Self {
            client: authorized_client(middleware),
            send_url,
        }
    }

    /// Points the authorized client at another `messages:send` endpoint.
    pub fn new_with_url(middleware: AuthMiddleware, send_url: String) -> Self {
        Self {
            client: authorized_client(middleware),
            send_url,
        }
    }

    pub fn new_with_client(client: ClientWithMiddleware, send_url: String) -> Self {
        Self { client, send_url }
    }

    /// Sends the message and returns its id.
    pub async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        validate_message(message)?;
        self.send_request(message, false).await
    }

    /// Validates the message server-side without delivering it.
    pub async fn send_dry_run(&self, message: &Message) -> Result<String, MessagingError> {
        validate_message(message)?;
        self.send_request(message, true).await
    }

    async fn send_request(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        let request = SendRequest {
            validate_only: dry_run,
            message,
        };

        let response = self
            .client
            .post(&self.send_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MessagingError::ApiError(
                parse_error_response(response, "FCM send failed").await,
            ));
        }

        let result: SendResponse = response.json().await?;
        Ok(result.name)
    }
}

fn validate_message(message: &Message) -> Result<(), MessagingError> {
    let targets = [
        message.token.is_some(),
        message.topic.is_some(),
        message.condition.is_some(),
    ]
    .iter()
    .filter(|&&t| t)
    .count();

    if targets != 1 {
        return Err(MessagingError::InvalidMessage(
            "Message must have exactly one of token, topic, or condition.".to_string(),
        ));
    }

    Ok(())
}
