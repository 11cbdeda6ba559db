use super::templates::SupportRequestView;
use super::{FunctionError, Outcome, Services};
use crate::firestore::data::DocumentData;
use crate::mail::Email;
use serde_json::Value;

/// Emails a new support request to the support inbox and records whether that worked on the
/// request document.
pub async fn on_support_request_created(
    services: &Services,
    request_id: &str,
    data: &Value,
) -> Result<Outcome, FunctionError> {
    tracing::info!(request_id, "processing support request");

    let view = SupportRequestView::new(request_id, data);
    let mail = &services.mail;

    let email = Email {
        from: format!("\"Nexus Support System\" <{}>", mail.sender_address),
        to: mail.support_inbox.clone(),
        reply_to: Some(
            view.user_email
                .clone()
                .unwrap_or_else(|| mail.no_reply_address.clone()),
        ),
        subject: view.email_subject(),
        html: view.html(&mail.support_inbox)?,
        text: Some(view.text()),
    };

    let request = services
        .firestore
        .collection("supportRequests")
        .doc(request_id);

    match services.mailer.send(email).await {
        Ok(()) => {
            request
                .update(
                    DocumentData::new()
                        .field("emailSent", true)
                        .server_timestamp("emailSentAt"),
                )
                .await?;
            tracing::info!(request_id, "support email sent");
            Ok(Outcome::Completed)
        }
        Err(e) => {
            request
                .update(
                    DocumentData::new()
                        .field("emailSent", false)
                        .field("emailError", e.to_string()),
                )
                .await?;
            Err(e.into())
        }
    }
}
