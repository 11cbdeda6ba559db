use super::notifications::{queue_notification, NotificationPayload};
use super::{FunctionError, Outcome, Services};
use crate::fields::{str_at, text_or};
use serde_json::{json, Map, Value};

const PREVIEW_CHARS: usize = 50;

/// First `PREVIEW_CHARS` characters of the message, with `...` when cut.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Queues a `chat_message` notification for the other participant of the chat.
pub async fn on_new_chat_message(
    services: &Services,
    chat_id: &str,
    message: &Value,
) -> Result<Outcome, FunctionError> {
    let Some(sender_id) = str_at(message, "senderId") else {
        return Ok(Outcome::skipped("message has no sender"));
    };
    let body = text_or(message, "text", "Sent a message");

    let chat = services
        .firestore
        .collection("chats")
        .doc(chat_id)
        .get()
        .await?
        .data::<Value>()?;

    let Some(Value::Array(participants)) = chat.as_ref().and_then(|c| c.get("participants")) else {
        return Ok(Outcome::skipped(format!("chat {} not found", chat_id)));
    };

    let Some(recipient_id) = participants
        .iter()
        .filter_map(Value::as_str)
        .find(|id| *id != sender_id)
    else {
        return Ok(Outcome::skipped("no recipient"));
    };

    let sender = services
        .firestore
        .collection("users")
        .doc(sender_id)
        .get()
        .await?
        .data::<Value>()?
        .unwrap_or(Value::Null);
    let sender_name = text_or(&sender, "firstName", "Someone");

    let mut data = Map::new();
    data.insert("chatId".to_string(), json!(chat_id));
    data.insert("senderId".to_string(), json!(sender_id));
    data.insert("senderName".to_string(), json!(sender_name));

    let payload = NotificationPayload {
        kind: "chat_message".to_string(),
        title: format!("Message from {}", sender_name),
        body: preview(&body),
        route: format!("/chats/{}", chat_id),
        data,
    };

    queue_notification(&services.firestore, recipient_id, &payload).await?;
    Ok(Outcome::Completed)
}
