use super::chat::preview;
use super::events::{match_pattern, DocumentEvent, EventKind};
use super::notifications::build_push_message;
use super::subscriptions::{check_expiring_subscriptions, days_left};
use super::templates::{deletion_html, format_submitted, welcome_html, SupportRequestView};
use super::*;
use crate::testing::{
    firestore_doc, services_for, RecordingMailer, COMMIT_PATH, DOCUMENTS_PATH, FCM_SEND_PATH,
    RUN_QUERY_PATH,
};
use chrono::{Duration, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;

fn created(path: &str, fields: serde_json::Value) -> DocumentEvent {
    let body = json!({ "value": firestore_doc(path, fields) });
    DocumentEvent::from_cloud_event(
        "google.cloud.firestore.document.v1.created",
        &format!("documents/{}", path),
        body.to_string().as_bytes(),
    )
    .unwrap()
}

fn commit_ok(then: httpmock::Then) {
    then.status(200).json_body(json!({ "writeResults": [{}] }));
}

#[test]
fn test_parse_cloud_event() {
    let body = json!({
        "value": firestore_doc("users/u1", json!({ "moderationStatus": "verified" })),
        "oldValue": firestore_doc("users/u1", json!({ "moderationStatus": "pending" })),
    });

    let event = DocumentEvent::from_cloud_event(
        "google.cloud.firestore.document.v1.updated",
        "documents/users/u1",
        body.to_string().as_bytes(),
    )
    .unwrap();

    assert_eq!(event.kind, EventKind::Updated);
    assert_eq!(event.path, "users/u1");
    assert_eq!(event.data().unwrap()["moderationStatus"], "verified");
    assert_eq!(event.old_data().unwrap()["moderationStatus"], "pending");
}

#[test]
fn test_deleted_event_without_new_value() {
    let body = json!({ "oldValue": firestore_doc("users/u1", json!({ "email": "a@b.c" })) });
    let event = DocumentEvent::from_cloud_event(
        "google.cloud.firestore.document.v1.deleted",
        "documents/users/u1",
        body.to_string().as_bytes(),
    )
    .unwrap();

    assert!(event.value.is_none());
    assert_eq!(event.data().unwrap(), json!({}));
    assert_eq!(event.old_data().unwrap()["email"], "a@b.c");
}

#[test]
fn test_reject_malformed_events() {
    assert!(DocumentEvent::from_cloud_event("google.cloud.pubsub.topic.v1.messagePublished", "documents/users/u1", b"{}").is_err());
    assert!(DocumentEvent::from_cloud_event("google.cloud.firestore.document.v1.created", "users/u1", b"{}").is_err());
    assert!(DocumentEvent::from_cloud_event("google.cloud.firestore.document.v1.created", "documents/users/u1", b"not json").is_err());
    assert!(DocumentEvent::from_cloud_event("google.cloud.firestore.document.v1.created", "documents/users/u1", b"").is_ok());
}

#[test]
fn test_match_pattern() {
    let params = match_pattern("chats/{chatId}/messages/{messageId}", "chats/c1/messages/m1").unwrap();
    assert_eq!(params["chatId"], "c1");
    assert_eq!(params["messageId"], "m1");

    assert!(match_pattern("users/{userId}", "users/u1/notifications/n1").is_none());
    assert!(match_pattern("users/{userId}", "chats/c1").is_none());
    assert!(match_pattern("users/{userId}", "users/").is_none());
}

#[test]
fn test_routes_for_events() {
    let triggers = |event: &DocumentEvent| -> Vec<Trigger> {
        routes_for(event).into_iter().map(|(t, _)| t).collect()
    };

    assert_eq!(triggers(&created("users/u1", json!({}))), vec![Trigger::UserCreated]);
    assert_eq!(
        triggers(&created("users/u1/notifications/n1", json!({}))),
        vec![Trigger::SendPushNotification]
    );
    assert_eq!(
        triggers(&created("supportRequests/r1", json!({}))),
        vec![Trigger::SupportRequestCreated]
    );
    assert!(triggers(&created("stories/s1", json!({}))).is_empty());

    let updated = DocumentEvent {
        kind: EventKind::Updated,
        ..created("users/u1", json!({}))
    };
    assert_eq!(triggers(&updated), vec![Trigger::ProfileVerified]);
}

#[test]
fn test_support_request_view() {
    let data = json!({
        "username": "ada",
        "userEmail": "ada@example.com",
        "category": "Billing",
        "subject": "Refund <now>",
        "message": "<script>alert(1)</script>",
        "appVersion": 12,
        "createdAt": "2024-03-04T17:05:00Z"
    });
    let view = SupportRequestView::new("r1", &data);

    assert_eq!(view.email_subject(), "[Nexus Support] Billing: Refund <now>");

    let html = view.html("help@example.com").unwrap();
    assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("Refund &lt;now&gt;"));
    assert!(html.contains(">A</div>"));
    assert!(html.contains("Monday, March 4, 2024 at 05:05 PM UTC"));

    let text = view.text();
    assert!(text.contains("Username: ada"));
    assert!(text.contains("Platform: N/A"));
    assert!(text.contains("App Version: 12"));
}

#[test]
fn test_support_request_defaults() {
    let view = SupportRequestView::new("r1", &json!({}));
    assert_eq!(view.email_subject(), "[Nexus Support] General: No subject");

    let html = view.html("help@example.com").unwrap();
    assert!(html.contains("Unknown User"));
    assert!(html.contains("No email provided"));
    assert!(html.contains(">U</div>"));
    assert!(view.text().contains("Category: N/A"));
}

#[test]
fn test_format_submitted() {
    assert_eq!(
        format_submitted(Some(&json!("2024-01-01T09:30:00.123456Z"))),
        "Monday, January 1, 2024 at 09:30 AM UTC"
    );
    assert_eq!(format_submitted(Some(&json!("yesterday"))), "N/A");
    assert_eq!(format_submitted(None), "N/A");
}

#[test]
fn test_templates_escape_user_text() {
    let view = SupportRequestView::new(
        "r1",
        &json!({ "username": "<b>ada</b>", "message": r#"a & "b" <c>"# }),
    );
    let html = view.html("help@example.com").unwrap();
    assert!(html.contains("a &amp; &quot;b&quot; &lt;c&gt;"));
    assert!(html.contains("&lt;b&gt;ada&lt;/b&gt;"));
    assert!(!html.contains("<b>ada"));

    let html = welcome_html(&json!({ "fullName": "<i>Ada</i> & co" }), 2024, "help@example.com").unwrap();
    assert!(html.contains("Hi &lt;i&gt;Ada&lt;/i&gt; &amp; co!"));
    assert!(html.contains("© 2024 Nexus"));

    let html = deletion_html("<help@example.com>").unwrap();
    assert!(html.contains("contact us at &lt;help@example.com&gt;."));
}

#[tokio::test]
async fn test_support_request_email_sent() {
    let server = MockServer::start_async().await;
    let mailer = RecordingMailer::default();
    let services = services_for(&server, mailer.clone());

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes("documents/supportRequests/r1")
                .body_includes(r#""emailSent":{"booleanValue":true}"#)
                .body_includes(r#""fieldPath":"emailSentAt""#);
            commit_ok(then);
        })
        .await;

    let data = json!({ "userEmail": "ada@example.com", "category": "Bug", "subject": "Crash" });
    let outcome = support::on_support_request_created(&services, "r1", &data).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
    mock.assert_async().await;

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "nexusgodlydating@gmail.com");
    assert_eq!(sent[0].from, "\"Nexus Support System\" <nexusgodlydating@gmail.com>");
    assert_eq!(sent[0].reply_to.as_deref(), Some("ada@example.com"));
    assert_eq!(sent[0].subject, "[Nexus Support] Bug: Crash");
    assert!(sent[0].text.is_some());
}

#[tokio::test]
async fn test_support_request_email_failure_is_recorded() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::failing("smtp down"));

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes(r#""emailSent":{"booleanValue":false}"#)
                .body_includes("smtp down");
            commit_ok(then);
        })
        .await;

    let result = support::on_support_request_created(&services, "r1", &json!({})).await;
    assert!(matches!(result, Err(FunctionError::Mail(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_welcome_email() {
    let server = MockServer::start_async().await;
    let mailer = RecordingMailer::default();
    let services = services_for(&server, mailer.clone());

    let data = json!({ "email": "ada@example.com", "fullName": "", "username": "ada_l" });
    let outcome = users::on_user_created(&services, "u1", &data).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Welcome to Nexus! 🎉");
    assert!(sent[0].html.contains("Hi ada_l!"));
    assert!(sent[0].html.contains(&format!("© {}", chrono::Datelike::year(&Utc::now()))));
}

#[tokio::test]
async fn test_welcome_email_skipped_without_address() {
    let server = MockServer::start_async().await;
    let mailer = RecordingMailer::default();
    let services = services_for(&server, mailer.clone());

    let outcome = users::on_user_created(&services, "u1", &json!({ "username": "ada" }))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped(_)));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_user_deleted_removes_auth_account_and_confirms() {
    let server = MockServer::start_async().await;
    let mailer = RecordingMailer::default();
    let services = services_for(&server, mailer.clone());

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/projects/test-project/accounts:delete")
                .json_body(json!({ "localId": "u1" }));
            then.status(200).json_body(json!({ "kind": "identitytoolkit#DeleteAccountResponse" }));
        })
        .await;

    let outcome = users::on_user_deleted(&services, "u1", &json!({ "email": "ada@example.com" }))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    mock.assert_async().await;

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Account Deletion Confirmation");
    assert_eq!(sent[0].from, "\"Nexus Team\" <nexusgodlydating@gmail.com>");
}

#[tokio::test]
async fn test_user_deleted_already_gone() {
    let server = MockServer::start_async().await;
    let mailer = RecordingMailer::default();
    let services = services_for(&server, mailer.clone());

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/projects/test-project/accounts:delete");
            then.status(400).json_body(json!({
                "error": { "code": 400, "message": "USER_NOT_FOUND" }
            }));
        })
        .await;

    let outcome = users::on_user_deleted(&services, "u1", &json!({ "email": "ada@example.com" }))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_user_deleted_auth_failure() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/projects/test-project/accounts:delete");
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "PERMISSION_DENIED" }
            }));
        })
        .await;

    let result = users::on_user_deleted(&services, "u1", &json!({})).await;
    assert!(matches!(result, Err(FunctionError::Auth(_))));
}

#[tokio::test]
async fn test_user_deleted_mail_failure_is_not_fatal() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::failing("bounced"));

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/projects/test-project/accounts:delete");
            then.status(200).json_body(json!({}));
        })
        .await;

    let outcome = users::on_user_deleted(&services, "u1", &json!({ "email": "ada@example.com" }))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
}

#[tokio::test]
async fn test_profile_verified_queues_notification() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes("documents/users/u1/notifications/")
                .body_includes(r#""type":{"stringValue":"profile_verified"}"#)
                .body_includes(r#""route":{"stringValue":"/dating"}"#)
                .body_includes(r#""isRead":{"booleanValue":false}"#)
                .body_includes(r#""fieldPath":"createdAt""#);
            commit_ok(then);
        })
        .await;

    let outcome = notifications::on_profile_verified(
        &services,
        "u1",
        &json!({ "moderationStatus": "pending" }),
        &json!({ "moderationStatus": "verified" }),
    )
    .await
    .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_profile_verified_ignores_other_transitions() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    for (before, after) in [("verified", "verified"), ("rejected", "verified"), ("pending", "rejected")] {
        let outcome = notifications::on_profile_verified(
            &services,
            "u1",
            &json!({ "moderationStatus": before }),
            &json!({ "moderationStatus": after }),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
    }
}

#[test]
fn test_build_push_message() {
    let notification = json!({
        "payload": {
            "type": "chat_message",
            "title": "Message from Ada",
            "body": "hi",
            "data": { "chatId": "c1", "count": 2, "route": "/override" }
        }
    });

    let message = build_push_message("tok-1", "n1", &notification);
    let value = serde_json::to_value(&message).unwrap();

    assert_eq!(value["token"], "tok-1");
    assert_eq!(value["notification"], json!({ "title": "Message from Ada", "body": "hi" }));
    assert_eq!(
        value["data"],
        json!({
            "type": "chat_message",
            "route": "/override",
            "notificationId": "n1",
            "chatId": "c1",
            "count": "2"
        })
    );
    assert_eq!(value["apns"]["payload"]["aps"], json!({ "sound": "default", "badge": 1 }));
    assert_eq!(value["android"]["priority"], "HIGH");
    assert_eq!(value["android"]["notification"]["channelId"], "nexus_default_channel");
}

#[test]
fn test_build_push_message_defaults() {
    let value = serde_json::to_value(build_push_message("t", "n1", &json!({}))).unwrap();
    assert_eq!(value["notification"], json!({ "title": "Nexus", "body": "" }));
    assert_eq!(value["data"], json!({ "route": "/", "notificationId": "n1" }));
}

#[tokio::test]
async fn test_push_notification_sent() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/users/u1", DOCUMENTS_PATH));
            then.status(200)
                .json_body(firestore_doc("users/u1", json!({ "fcmToken": { "token": "tok-1" } })));
        })
        .await;
    let fcm = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(FCM_SEND_PATH)
                .body_includes(r#""token":"tok-1""#)
                .body_includes(r#""validate_only":false"#);
            then.status(200).json_body(json!({ "name": "projects/test-project/messages/1" }));
        })
        .await;
    let mark_sent = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes("documents/users/u1/notifications/n1")
                .body_includes(r#""isSent":{"booleanValue":true}"#);
            commit_ok(then);
        })
        .await;

    let notification = json!({ "payload": { "type": "chat_message", "title": "Hi" } });
    let outcome = notifications::send_push_notification(&services, "u1", "n1", &notification)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    fcm.assert_async().await;
    mark_sent.assert_async().await;
}

#[tokio::test]
async fn test_push_notification_without_token() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/users/u1", DOCUMENTS_PATH));
            then.status(200).json_body(firestore_doc("users/u1", json!({ "fcmToken": {} })));
        })
        .await;

    let outcome = notifications::send_push_notification(&services, "u1", "n1", &json!({}))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped(_)));
}

#[tokio::test]
async fn test_push_notification_failure_is_recorded() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/users/u1", DOCUMENTS_PATH));
            then.status(200)
                .json_body(firestore_doc("users/u1", json!({ "fcmToken": { "token": "stale" } })));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(FCM_SEND_PATH);
            then.status(404).json_body(json!({
                "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" }
            }));
        })
        .await;
    let mark_failed = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes(r#""isSent":{"booleanValue":false}"#)
                .body_includes("Requested entity was not found.");
            commit_ok(then);
        })
        .await;

    let result = notifications::send_push_notification(&services, "u1", "n1", &json!({})).await;
    assert!(matches!(result, Err(FunctionError::Messaging(_))));
    mark_failed.assert_async().await;
}

#[test]
fn test_preview() {
    assert_eq!(preview("short"), "short");
    let exact = "x".repeat(50);
    assert_eq!(preview(&exact), exact);
    let long = "é".repeat(51);
    assert_eq!(preview(&long), format!("{}...", "é".repeat(50)));
}

#[tokio::test]
async fn test_chat_message_notifies_other_participant() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/chats/c1", DOCUMENTS_PATH));
            then.status(200)
                .json_body(firestore_doc("chats/c1", json!({ "participants": ["ada", "bob"] })));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/users/ada", DOCUMENTS_PATH));
            then.status(200).json_body(firestore_doc("users/ada", json!({ "firstName": "Ada" })));
        })
        .await;
    let queued = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes("documents/users/bob/notifications/")
                .body_includes(r#""title":{"stringValue":"Message from Ada"}"#)
                .body_includes(r#""route":{"stringValue":"/chats/c1"}"#)
                .body_includes(r#""body":{"stringValue":"Sent a message"}"#)
                .body_includes(r#""senderName":{"stringValue":"Ada"}"#);
            commit_ok(then);
        })
        .await;

    let event = created("chats/c1/messages/m1", json!({ "senderId": "ada" }));
    let results = handle_event(&services, &event).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, Trigger::NewChatMessage);
    assert_eq!(*results[0].1.as_ref().unwrap(), Outcome::Completed);
    queued.assert_async().await;
}

#[tokio::test]
async fn test_chat_message_for_missing_chat() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/chats/c1", DOCUMENTS_PATH));
            then.status(404).json_body(json!({ "error": { "code": 404, "message": "not found" } }));
        })
        .await;

    let outcome = chat::on_new_chat_message(&services, "c1", &json!({ "senderId": "ada", "text": "hey" }))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped(_)));
}

#[test]
fn test_days_left_rounds_up() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(days_left(now + Duration::days(3), now), 3);
    assert_eq!(days_left(now + Duration::days(2) + Duration::seconds(1), now), 3);
    assert_eq!(days_left(now + Duration::days(3) + Duration::seconds(1), now), 4);
    assert_eq!(days_left(now, now), 0);
    assert_eq!(days_left(now - Duration::hours(36), now), -1);
}

#[tokio::test]
async fn test_check_expiring_subscriptions() {
    let server = MockServer::start_async().await;
    let services = services_for(&server, RecordingMailer::default());
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let in_days = |days: i64| (now + Duration::days(days) - Duration::hours(2)).to_rfc3339();

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(RUN_QUERY_PATH)
                .body_includes(r#""fieldPath":"subscription.isActive""#);
            then.status(200).json_body(json!([
                { "document": firestore_doc("users/expiring", json!({
                    "subscription": { "isActive": true, "autoRenew": false, "expiryDate": in_days(3) }
                })) },
                { "document": firestore_doc("users/renewing", json!({
                    "subscription": { "isActive": true, "autoRenew": true, "expiryDate": in_days(3) }
                })) },
                { "document": firestore_doc("users/later", json!({
                    "subscription": { "isActive": true, "autoRenew": false, "expiryDate": in_days(5) }
                })) },
                { "document": firestore_doc("users/undated", json!({
                    "subscription": { "isActive": true, "autoRenew": false }
                })) }
            ]));
        })
        .await;
    let queued = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMMIT_PATH)
                .body_includes("documents/users/expiring/notifications/")
                .body_includes(r#""daysLeft":{"stringValue":"3"}"#)
                .body_includes("expires in 3 days");
            commit_ok(then);
        })
        .await;

    let count = check_expiring_subscriptions(&services, now).await.unwrap();
    assert_eq!(count, 1);
    queued.assert_async().await;
}
