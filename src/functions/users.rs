use super::templates::{deletion_html, welcome_html, DELETION_SUBJECT, WELCOME_SUBJECT};
use super::{FunctionError, Outcome, Services};
use crate::auth::AuthError;
use crate::fields::str_at;
use crate::mail::Email;
use chrono::{Datelike, Utc};
use serde_json::Value;

fn team_sender(services: &Services) -> String {
    format!("\"Nexus Team\" <{}>", services.mail.sender_address)
}

pub async fn on_user_created(
    services: &Services,
    user_id: &str,
    data: &Value,
) -> Result<Outcome, FunctionError> {
    let Some(address) = str_at(data, "email") else {
        return Ok(Outcome::skipped(format!("no email for user {}", user_id)));
    };

    let email = Email {
        from: team_sender(services),
        to: address.to_string(),
        subject: WELCOME_SUBJECT.to_string(),
        html: welcome_html(data, Utc::now().year(), &services.mail.support_inbox)?,
        ..Default::default()
    };

    services.mailer.send(email).await?;
    tracing::info!(user_id, to = address, "welcome email sent");
    Ok(Outcome::Completed)
}

/// Keeps Auth in step with the users collection. `old_data` is the deleted document.
pub async fn on_user_deleted(
    services: &Services,
    user_id: &str,
    old_data: &Value,
) -> Result<Outcome, FunctionError> {
    let address = str_at(old_data, "email");
    tracing::info!(user_id, email = address.unwrap_or("no email"), "user document deleted");

    match services.auth.delete_user(user_id).await {
        Ok(()) => tracing::info!(user_id, "auth user deleted"),
        Err(AuthError::UserNotFound) => {
            tracing::info!(user_id, "auth user already deleted");
            return Ok(Outcome::Completed);
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(address) = address {
        match send_deletion_email(services, address).await {
            Ok(()) => tracing::info!(user_id, to = address, "deletion confirmation sent"),
            Err(e) => tracing::warn!(user_id, error = %e, "failed to send deletion email"),
        }
    }

    Ok(Outcome::Completed)
}

async fn send_deletion_email(services: &Services, address: &str) -> Result<(), FunctionError> {
    let email = Email {
        from: team_sender(services),
        to: address.to_string(),
        subject: DELETION_SUBJECT.to_string(),
        html: deletion_html(&services.mail.support_inbox)?,
        ..Default::default()
    };
    services.mailer.send(email).await?;
    Ok(())
}
