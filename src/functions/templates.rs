//! Email bodies. The HTML parts are handlebars templates, which escape every `{{value}}`.

use crate::fields::{text, text_or};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

const SUPPORT_REQUEST: &str = "support_request";
const WELCOME: &str = "welcome";
const ACCOUNT_DELETED: &str = "account_deleted";

static TEMPLATES: Lazy<Result<Handlebars<'static>, String>> = Lazy::new(|| {
    let mut hbs = Handlebars::new();
    for (name, source) in [
        (SUPPORT_REQUEST, include_str!("templates/support_request.hbs")),
        (WELCOME, include_str!("templates/welcome.hbs")),
        (ACCOUNT_DELETED, include_str!("templates/account_deleted.hbs")),
    ] {
        hbs.register_template_string(name, source)
            .map_err(|e| format!("{}: {}", name, e))?;
    }
    Ok(hbs)
});

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("invalid email template {0}")]
    Register(String),
    #[error("failed to render email: {0}")]
    Render(#[from] handlebars::RenderError),
}

fn render<T: Serialize>(name: &str, context: &T) -> Result<String, TemplateError> {
    let hbs = TEMPLATES
        .as_ref()
        .map_err(|e| TemplateError::Register(e.clone()))?;
    Ok(hbs.render(name, context)?)
}

/// `Monday, January 1, 2024 at 09:30 AM UTC`, or `N/A` when absent or unparseable.
pub fn format_submitted(created_at: Option<&Value>) -> String {
    created_at
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| {
            dt.with_timezone(&Utc)
                .format("%A, %B %-d, %Y at %I:%M %p UTC")
                .to_string()
        })
        .unwrap_or_else(|| "N/A".to_string())
}

/// Support request fields as submitted, absent ones as `None`.
pub struct SupportRequestView {
    pub request_id: String,
    pub username: Option<String>,
    pub user_email: Option<String>,
    pub user_id: Option<String>,
    pub category: Option<String>,
    pub platform: Option<String>,
    pub app_version: Option<String>,
    pub submitted: String,
    pub subject: Option<String>,
    pub message: Option<String>,
}

impl SupportRequestView {
    pub fn new(request_id: &str, data: &Value) -> Self {
        Self {
            request_id: request_id.to_string(),
            username: text(data, "username"),
            user_email: text(data, "userEmail"),
            user_id: text(data, "userId"),
            category: text(data, "category"),
            platform: text(data, "platform"),
            app_version: text(data, "appVersion"),
            submitted: format_submitted(data.get("createdAt")),
            subject: text(data, "subject"),
            message: text(data, "message"),
        }
    }

    pub fn email_subject(&self) -> String {
        format!(
            "[Nexus Support] {}: {}",
            self.category.as_deref().unwrap_or("General"),
            self.subject.as_deref().unwrap_or("No subject")
        )
    }

    /// `contact` is the support address shown in the footer.
    pub fn html(&self, contact: &str) -> Result<String, TemplateError> {
        let or = |value: &Option<String>, default: &str| value.clone().unwrap_or_else(|| default.to_string());

        let initial: String = self
            .username
            .as_deref()
            .and_then(|name| name.chars().next())
            .unwrap_or('U')
            .to_uppercase()
            .collect();

        render(
            SUPPORT_REQUEST,
            &json!({
                "initial": initial,
                "username": or(&self.username, "Unknown User"),
                "email": or(&self.user_email, "No email provided"),
                "request_id": self.request_id,
                "user_id": or(&self.user_id, "N/A"),
                "category": or(&self.category, "General"),
                "platform": or(&self.platform, "N/A"),
                "app_version": or(&self.app_version, "N/A"),
                "submitted": self.submitted,
                "subject": or(&self.subject, "No subject"),
                "message": or(&self.message, "No message"),
                "support": contact,
            }),
        )
    }

    pub fn text(&self) -> String {
        let or = |value: &Option<String>, default: &str| value.clone().unwrap_or_else(|| default.to_string());

        format!(
            "NEW SUPPORT REQUEST
==================

Request ID: {request_id}
Username: {username}
Email: {email}
User ID: {user_id}
Category: {category}
Platform: {platform}
App Version: {app_version}
Submitted: {submitted}

SUBJECT
-------
{subject}

MESSAGE
-------
{message}

---
Reply to this email to respond to the user.
",
            request_id = self.request_id,
            username = or(&self.username, "N/A"),
            email = or(&self.user_email, "N/A"),
            user_id = or(&self.user_id, "N/A"),
            category = or(&self.category, "N/A"),
            platform = or(&self.platform, "N/A"),
            app_version = or(&self.app_version, "N/A"),
            submitted = self.submitted,
            subject = or(&self.subject, "No subject"),
            message = or(&self.message, "No message"),
        )
    }
}

pub const WELCOME_SUBJECT: &str = "Welcome to Nexus! 🎉";

#[derive(Serialize)]
struct WelcomeContext<'a> {
    name: String,
    support: &'a str,
    year: i32,
}

pub fn welcome_html(user: &Value, year: i32, contact: &str) -> Result<String, TemplateError> {
    let name = text(user, "fullName").unwrap_or_else(|| text_or(user, "username", "there"));
    render(
        WELCOME,
        &WelcomeContext {
            name,
            support: contact,
            year,
        },
    )
}

pub const DELETION_SUBJECT: &str = "Account Deletion Confirmation";

pub fn deletion_html(contact: &str) -> Result<String, TemplateError> {
    render(ACCOUNT_DELETED, &json!({ "support": contact }))
}
