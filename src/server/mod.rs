//! HTTP surface: the upload-URL endpoint, the trigger receiver and the scheduled task.


use crate::auth::verifier::IdTokenVerifier;
use crate::config::{HttpConfig, SpacesConfig};
use crate::functions::events::DocumentEvent;
use crate::functions::subscriptions::check_expiring_subscriptions;
use crate::functions::{handle_event, Services};
use crate::storage::{MediaKind, SpacesUploader};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

const CE_TYPE: &str = "ce-type";
const CE_SUBJECT: &str = "ce-subject";
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub verifier: Arc<IdTokenVerifier>,
    pub spaces: SpacesConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/getPresignedUploadUrl", any(presigned_upload_url))
        .route("/events", post(receive_event))
        .route("/tasks/checkExpiringSubscriptions", post(run_subscription_check))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn text(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn presigned_upload_url(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let Some(token) = bearer_token(&headers) else {
        return text(StatusCode::UNAUTHORIZED, "Missing auth token");
    };

    let uid = match state.verifier.verify_token(token).await {
        Ok(claims) => claims.sub,
        Err(e) => {
            tracing::warn!(error = %e, "rejected upload token");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate upload URL");
        }
    };

    // Bodies that are absent or not JSON read as `{}`.
    let request: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));

    let Some(kind) = request
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<MediaKind>().ok())
    else {
        return text(StatusCode::BAD_REQUEST, "Invalid type. Use 'photo' or 'audio'.");
    };

    let Some(content_type) = request
        .get("contentType")
        .and_then(Value::as_str)
        .filter(|ct| !ct.is_empty())
    else {
        return text(StatusCode::BAD_REQUEST, "Missing contentType.");
    };

    let settings = match state.spaces.settings() {
        Ok(settings) => settings,
        Err(presence) => {
            tracing::error!(
                key = presence.key,
                secret = presence.secret,
                endpoint = presence.endpoint,
                bucket = presence.bucket,
                region = presence.region,
                "missing Spaces configuration"
            );
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Missing Spaces configuration");
        }
    };

    let issued = SpacesUploader::new(&settings).and_then(|uploader| uploader.issue(&uid, kind, content_type));

    match issued {
        Ok(upload) => {
            tracing::info!(uid = %uid, kind = %kind, object_key = %upload.object_key, "issued presigned upload URL");
            Json(upload).into_response()
        }
        Err(e) => {
            tracing::error!(uid = %uid, error = %e, "failed to presign upload");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate upload URL")
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn receive_event(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event_type = header_str(&headers, CE_TYPE);
    let subject = header_str(&headers, CE_SUBJECT);

    let event = match DocumentEvent::from_cloud_event(event_type, subject, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "rejected event");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    handle_event(&state.services, &event).await;
    StatusCode::NO_CONTENT.into_response()
}

async fn run_subscription_check(State(state): State<AppState>) -> Response {
    match check_expiring_subscriptions(&state.services, Utc::now()).await {
        Ok(queued) => Json(json!({ "queued": queued })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "subscription check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Runs the expiring-subscription check once a day, the first run one day from now.
pub fn spawn_daily_subscription_check(services: Services) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + DAY, DAY);
        loop {
            interval.tick().await;
            match check_expiring_subscriptions(&services, Utc::now()).await {
                Ok(queued) => tracing::info!(queued, "daily subscription check finished"),
                Err(e) => tracing::error!(error = %e, "daily subscription check failed"),
            }
        }
    })
}

pub async fn serve(http: &HttpConfig, state: AppState) -> anyhow::Result<()> {
    let address = format!("{}:{}", http.host, http.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
