use crate::auth::FirebaseAuth;
use crate::firestore::data::DocumentData;
use crate::firestore::FirebaseFirestore;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;

/// How the account to promote is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminTarget {
    Email(String),
    Uid(String),
}

impl AdminTarget {
    /// Anything containing `@` is treated as an email address.
    pub fn parse(value: &str) -> Self {
        if value.contains('@') {
            AdminTarget::Email(value.to_string())
        } else {
            AdminTarget::Uid(value.to_string())
        }
    }
}

impl fmt::Display for AdminTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminTarget::Email(email) => write!(f, "email {}", email),
            AdminTarget::Uid(uid) => write!(f, "uid {}", uid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReport {
    pub uid: String,
    pub email: Option<String>,
    pub admin: bool,
    /// False when the claim already had the requested value.
    pub changed: bool,
    /// Whether `users/<uid>` was updated with `isAdmin`.
    pub mirrored: bool,
}

impl fmt::Display for AdminReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self.email.as_deref().unwrap_or(&self.uid);
        if !self.changed {
            return write!(f, "{} ({}) already has admin = {}", who, self.uid, self.admin);
        }

        write!(f, "Set admin = {} for {} ({})", self.admin, who, self.uid)?;
        if self.mirrored {
            write!(f, "\nUpdated users/{} isAdmin", self.uid)?;
        } else {
            write!(f, "\nNo users/{} document; custom claim only", self.uid)?;
        }
        write!(f, "\nThe user must sign out and back in for the claim to apply")
    }
}

/// Sets the `admin` custom claim, keeping any other claims, and mirrors it to the user's
/// document when one exists.
pub async fn set_admin(
    auth: &FirebaseAuth,
    firestore: &FirebaseFirestore,
    target: &AdminTarget,
    admin: bool,
) -> Result<AdminReport> {
    let user = match target {
        AdminTarget::Email(email) => auth.get_user_by_email(email).await,
        AdminTarget::Uid(uid) => auth.get_user(uid).await,
    }
    .with_context(|| format!("no account for {}", target))?;

    let uid = user.uid().to_string();
    let mut claims = user
        .custom_claims()
        .with_context(|| format!("unreadable custom claims on {}", uid))?;

    let mut report = AdminReport {
        uid: uid.clone(),
        email: user.email.clone(),
        admin,
        changed: false,
        mirrored: false,
    };

    if claims.get("admin") == Some(&Value::Bool(admin)) {
        tracing::info!(uid = %uid, admin, "admin claim unchanged");
        return Ok(report);
    }

    claims.insert("admin".to_string(), Value::Bool(admin));
    auth.set_custom_user_claims(&uid, &claims)
        .await
        .with_context(|| format!("failed to set custom claims on {}", uid))?;
    report.changed = true;

    let doc = firestore.collection("users").doc(&uid);
    if doc.get().await?.exists() {
        doc.update(
            DocumentData::new()
                .field("isAdmin", admin)
                .server_timestamp("updatedAt"),
        )
        .await
        .with_context(|| format!("failed to mirror isAdmin on users/{}", uid))?;
        report.mirrored = true;
    }

    tracing::info!(uid = %uid, admin, mirrored = report.mirrored, "admin claim set");
    Ok(report)
}
