//! Document triggers and the daily subscription check.
//!
//! Events arrive as CloudEvents (see [`events::DocumentEvent`]). [`handle_event`] matches the
//! document path against [`ROUTES`] and runs every handler registered for it. Handler errors
//! are logged at this boundary and never retried here.

pub mod chat;
pub mod events;
pub mod notifications;
pub mod subscriptions;
pub mod support;
pub mod templates;
pub mod users;

#[cfg(test)]
mod tests;

use crate::auth::{AuthError, FirebaseAuth};
use crate::config::MailConfig;
use crate::firestore::{FirebaseFirestore, FirestoreError};
use crate::mail::{MailError, Mailer};
use crate::messaging::{FirebaseMessaging, MessagingError};
use events::{match_pattern, DocumentEvent, EventKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use templates::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Invalid event: {0}")]
    Event(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a handler did when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Skipped(String),
}

impl Outcome {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped(reason.into())
    }
}

/// Clients and settings shared by every handler.
#[derive(Clone)]
pub struct Services {
    pub firestore: FirebaseFirestore,
    pub auth: FirebaseAuth,
    pub messaging: FirebaseMessaging,
    pub mailer: Arc<dyn Mailer>,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SupportRequestCreated,
    UserCreated,
    UserDeleted,
    ProfileVerified,
    SendPushNotification,
    NewChatMessage,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::SupportRequestCreated => "onSupportRequestCreated",
            Trigger::UserCreated => "onUserCreated",
            Trigger::UserDeleted => "onUserDeleted",
            Trigger::ProfileVerified => "onProfileVerified",
            Trigger::SendPushNotification => "sendPushNotification",
            Trigger::NewChatMessage => "onNewChatMessage",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const ROUTES: &[(Trigger, &str, EventKind)] = &[
    (Trigger::SupportRequestCreated, "supportRequests/{requestId}", EventKind::Created),
    (Trigger::UserCreated, "users/{userId}", EventKind::Created),
    (Trigger::UserDeleted, "users/{userId}", EventKind::Deleted),
    (Trigger::ProfileVerified, "users/{userId}", EventKind::Updated),
    (
        Trigger::SendPushNotification,
        "users/{userId}/notifications/{notificationId}",
        EventKind::Created,
    ),
    (Trigger::NewChatMessage, "chats/{chatId}/messages/{messageId}", EventKind::Created),
];

/// Handlers registered for this event, with the wildcards captured from its path.
pub fn routes_for(event: &DocumentEvent) -> Vec<(Trigger, HashMap<String, String>)> {
    ROUTES
        .iter()
        .filter(|(_, _, kind)| *kind == event.kind)
        .filter_map(|(trigger, pattern, _)| {
            match_pattern(pattern, &event.path).map(|params| (*trigger, params))
        })
        .collect()
}

/// Runs every handler registered for the event. Results are logged and returned.
pub async fn handle_event(
    services: &Services,
    event: &DocumentEvent,
) -> Vec<(Trigger, Result<Outcome, FunctionError>)> {
    let routes = routes_for(event);
    if routes.is_empty() {
        tracing::debug!(path = %event.path, kind = ?event.kind, "no handler for event");
    }

    let mut results = Vec::with_capacity(routes.len());
    for (trigger, params) in routes {
        let result = dispatch(services, trigger, &params, event).await;

        match &result {
            Ok(Outcome::Completed) => {
                tracing::info!(function = %trigger, path = %event.path, "handler completed")
            }
            Ok(Outcome::Skipped(reason)) => {
                tracing::info!(function = %trigger, path = %event.path, reason = %reason, "handler skipped")
            }
            Err(e) => {
                tracing::error!(function = %trigger, path = %event.path, error = %e, "handler failed")
            }
        }

        results.push((trigger, result));
    }

    results
}

async fn dispatch(
    services: &Services,
    trigger: Trigger,
    params: &HashMap<String, String>,
    event: &DocumentEvent,
) -> Result<Outcome, FunctionError> {
    let param = |name: &str| {
        params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| FunctionError::Event(format!("Missing path parameter {}", name)))
    };

    match trigger {
        Trigger::SupportRequestCreated => {
            support::on_support_request_created(services, param("requestId")?, &event.data()?).await
        }
        Trigger::UserCreated => users::on_user_created(services, param("userId")?, &event.data()?).await,
        Trigger::UserDeleted => {
            users::on_user_deleted(services, param("userId")?, &event.old_data()?).await
        }
        Trigger::ProfileVerified => {
            notifications::on_profile_verified(
                services,
                param("userId")?,
                &event.old_data()?,
                &event.data()?,
            )
            .await
        }
        Trigger::SendPushNotification => {
            notifications::send_push_notification(
                services,
                param("userId")?,
                param("notificationId")?,
                &event.data()?,
            )
            .await
        }
        Trigger::NewChatMessage => {
            chat::on_new_chat_message(services, param("chatId")?, &event.data()?).await
        }
    }
}
