//! Firebase Authentication.
//!
//! Account lookups and updates go through the Identity Toolkit REST API.
//! ID tokens presented by app clients are checked locally by [`verifier::IdTokenVerifier`].

pub mod keys;
pub mod models;
pub mod verifier;

use crate::auth::models::{
    DeleteAccountRequest, GetAccountInfoRequest, GetAccountInfoResponse, UpdateUserRequest,
    UpdateUserResponse, UserRecord,
};
use crate::core::middleware::AuthMiddleware;
use crate::core::{authorized_client, FirebaseErrorResponse};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{Map, Value};
use thiserror::Error;


const IDENTITY_TOOLKIT_V1_API: &str = "https://identitytoolkit.googleapis.com/v1/projects";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseAuth {
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        let base_url = format!("{}/{}", IDENTITY_TOOLKIT_V1_API, project_id);

        Self {
            client: authorized_client(middleware),
            base_url,
        }
    }

    /// `base_url` is the project-scoped API root, e.g. `.../v1/projects/my-project`.
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn post<T: serde::Serialize>(
        &self,
        endpoint: &str,
        request: &T,
        what: &str,
    ) -> Result<reqwest::Response, AuthError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let api_message = serde_json::from_str::<FirebaseErrorResponse>(&text)
            .map(|e| e.error.message)
            .unwrap_or_default();

        // Identity Toolkit reports a missing account as 400 USER_NOT_FOUND.
        if api_message.starts_with("USER_NOT_FOUND") {
            return Err(AuthError::UserNotFound);
        }

        Err(AuthError::ApiError(format!("{} failed {}: {}", what, status, text)))
    }

    pub async fn update_user(&self, request: UpdateUserRequest) -> Result<String, AuthError> {
        let response = self.post("accounts:update", &request, "Update user").await?;
        let result: UpdateUserResponse = response.json().await?;
        Ok(result.local_id)
    }

    /// Deletes an account. A missing account surfaces as [`AuthError::UserNotFound`].
    pub async fn delete_user(&self, uid: &str) -> Result<(), AuthError> {
        let request = DeleteAccountRequest { local_id: uid.to_string() };
        self.post("accounts:delete", &request, "Delete user").await?;
        Ok(())
    }

    async fn get_account_info(&self, request: GetAccountInfoRequest) -> Result<UserRecord, AuthError> {
        let response = self.post("accounts:lookup", &request, "Get user").await?;
        let result: GetAccountInfoResponse = response.json().await?;

        result
            .users
            .and_then(|mut users| users.pop())
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        let request = GetAccountInfoRequest {
            local_id: Some(vec![uid.to_string()]),
            email: None,
        };
        self.get_account_info(request).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, AuthError> {
        let request = GetAccountInfoRequest {
            local_id: None,
            email: Some(vec![email.to_string()]),
        };
        self.get_account_info(request).await
    }

    /// Replaces the custom claims of a user. Clients see them after their next token refresh.
    pub async fn set_custom_user_claims(
        &self,
        uid: &str,
        claims: &Map<String, Value>,
    ) -> Result<(), AuthError> {
        let request = UpdateUserRequest {
            local_id: uid.to_string(),
            custom_attributes: Some(serde_json::to_string(claims)?),
            ..Default::default()
        };
        self.update_user(request).await?;
        Ok(())
    }
}
