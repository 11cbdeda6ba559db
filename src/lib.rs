pub mod auth;
pub mod config;
pub mod core;
pub mod fields;
pub mod firestore;
pub mod functions;
pub mod jobs;
pub mod mail;
pub mod messaging;
pub mod server;
pub mod storage;

#[cfg(test)]
mod testing;

use auth::FirebaseAuth;
use config::MailConfig;
use core::middleware::AuthMiddleware;
use firestore::FirebaseFirestore;
use functions::Services;
use mail::Mailer;
use messaging::FirebaseMessaging;
use std::sync::Arc;
use yup_oauth2::ServiceAccountKey;

/// Entry point to the Google services of one project. Clients built from the same app share
/// one OAuth2 token cache.
pub struct FirebaseApp {
    middleware: AuthMiddleware,
}

impl FirebaseApp {
    pub fn new(service_account_key: ServiceAccountKey) -> Self {
        Self {
            middleware: AuthMiddleware::new(service_account_key),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.middleware.project_id()
    }

    pub fn auth(&self) -> FirebaseAuth {
        FirebaseAuth::new(self.middleware.clone())
    }

    pub fn messaging(&self) -> FirebaseMessaging {
        FirebaseMessaging::new(self.middleware.clone())
    }

    pub fn firestore(&self) -> FirebaseFirestore {
        FirebaseFirestore::new(self.middleware.clone())
    }

    /// Everything the trigger handlers need.
    pub fn services(&self, mailer: Arc<dyn Mailer>, mail: MailConfig) -> Services {
        Services {
            firestore: self.firestore(),
            auth: self.auth(),
            messaging: self.messaging(),
            mailer,
            mail,
        }
    }
}
