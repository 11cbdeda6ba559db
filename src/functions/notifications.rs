//! In-app notifications.
//!
//! Notifications are queued as documents under `users/<uid>/notifications`; the
//! [`send_push_notification`] trigger then delivers each one over FCM.

use super::{FunctionError, Outcome, Services};
use crate::fields::{str_at, stringify, text, text_or};
use crate::firestore::data::DocumentData;
use crate::firestore::FirebaseFirestore;
use crate::messaging::models::{
    AndroidConfig, AndroidMessagePriority, AndroidNotification, ApnsConfig, ApnsPayload, Aps,
    Message, Notification,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const DEFAULT_CHANNEL_ID: &str = "nexus_default_channel";

/// What the app shows, and where tapping it leads.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub route: String,
    pub data: Map<String, Value>,
}

impl NotificationPayload {
    fn to_json(&self) -> Value {
        json!({
            "type": self.kind,
            "title": self.title,
            "body": self.body,
            "route": self.route,
            "data": self.data,
        })
    }
}

/// Writes a new unread notification for `user_id` and returns its id.
pub async fn queue_notification(
    firestore: &FirebaseFirestore,
    user_id: &str,
    payload: &NotificationPayload,
) -> Result<String, FunctionError> {
    let reference = firestore
        .doc(&format!("users/{}", user_id))
        .collection("notifications")
        .new_doc();
    let id = reference.id().to_string();

    let data = DocumentData::new()
        .field("id", id.clone())
        .field("userId", user_id)
        .field("payload", payload.to_json())
        .server_timestamp("createdAt")
        .field("isRead", false)
        .field("isSent", false);

    reference.set(data).await?;
    tracing::info!(user_id, notification_id = %id, kind = %payload.kind, "notification queued");
    Ok(id)
}

/// Queues a `profile_verified` notification when moderation moves `pending` to `verified`.
pub async fn on_profile_verified(
    services: &Services,
    user_id: &str,
    before: &Value,
    after: &Value,
) -> Result<Outcome, FunctionError> {
    let was_pending = str_at(before, "moderationStatus") == Some("pending");
    let is_verified = str_at(after, "moderationStatus") == Some("verified");

    if !(was_pending && is_verified) {
        return Ok(Outcome::skipped("moderation status did not move to verified"));
    }

    let payload = NotificationPayload {
        kind: "profile_verified".to_string(),
        title: "Profile Verified! ✓".to_string(),
        body: "Your profile has been verified and is now visible to other users in the dating section."
            .to_string(),
        route: "/dating".to_string(),
        data: Map::new(),
    };

    queue_notification(&services.firestore, user_id, &payload).await?;
    Ok(Outcome::Completed)
}

/// Builds the FCM message for a queued notification document.
pub fn build_push_message(token: &str, notification_id: &str, notification: &Value) -> Message {
    let payload = notification.get("payload").cloned().unwrap_or(Value::Null);

    let mut data = HashMap::new();
    if let Some(kind) = text(&payload, "type") {
        data.insert("type".to_string(), kind);
    }
    data.insert("route".to_string(), text_or(&payload, "route", "/"));
    data.insert("notificationId".to_string(), notification_id.to_string());
    if let Some(Value::Object(extra)) = payload.get("data") {
        for (key, value) in extra {
            data.insert(key.clone(), stringify(value));
        }
    }

    Message {
        token: Some(token.to_string()),
        notification: Some(Notification {
            title: Some(text_or(&payload, "title", "Nexus")),
            body: Some(text_or(&payload, "body", "")),
            image: None,
        }),
        data: Some(data),
        apns: Some(ApnsConfig {
            headers: None,
            payload: Some(ApnsPayload {
                aps: Some(Aps {
                    sound: Some("default".to_string()),
                    badge: Some(1),
                    ..Default::default()
                }),
                custom_data: HashMap::new(),
            }),
        }),
        android: Some(AndroidConfig {
            priority: Some(AndroidMessagePriority::High),
            notification: Some(AndroidNotification {
                sound: Some("default".to_string()),
                channel_id: Some(DEFAULT_CHANNEL_ID.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Delivers a queued notification to the user's device and marks the document sent or failed.
pub async fn send_push_notification(
    services: &Services,
    user_id: &str,
    notification_id: &str,
    notification: &Value,
) -> Result<Outcome, FunctionError> {
    let reference = services
        .firestore
        .doc(&format!("users/{}/notifications/{}", user_id, notification_id));

    match deliver(services, user_id, notification_id, notification).await {
        Ok(Some(message_id)) => {
            tracing::info!(user_id, notification_id, message_id = %message_id, "push notification sent");
            reference.update(DocumentData::new().field("isSent", true)).await?;
            Ok(Outcome::Completed)
        }
        Ok(None) => Ok(Outcome::skipped(format!("no FCM token for user {}", user_id))),
        Err(e) => {
            reference
                .update(
                    DocumentData::new()
                        .field("isSent", false)
                        .field("error", e.to_string()),
                )
                .await?;
            Err(e)
        }
    }
}

async fn deliver(
    services: &Services,
    user_id: &str,
    notification_id: &str,
    notification: &Value,
) -> Result<Option<String>, FunctionError> {
    let user = services
        .firestore
        .doc(&format!("users/{}", user_id))
        .get()
        .await?
        .data::<Value>()?
        .unwrap_or(Value::Null);

    let Some(token) = str_at(&user, "fcmToken.token") else {
        return Ok(None);
    };

    let message = build_push_message(token, notification_id, notification);
    Ok(Some(services.messaging.send(&message).await?))
}
