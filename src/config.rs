//! Runtime configuration.
//!
//! Sources, later ones winning: built-in defaults, a TOML file (`--config`, else `nexus.toml`
//! in the working directory, skipped when absent), the deployment's well-known environment
//! variables (`SPACES_*`, `GMAIL_APP_PASSWORD`, `GOOGLE_APPLICATION_CREDENTIALS`, `PORT`), and
//! finally `NEXUS_<SECTION>__<KEY>` variables.

use crate::storage::{SpacesSettings, DEFAULT_EXPIRES_IN_SECS};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use yup_oauth2::ServiceAccountKey;

pub const DEFAULT_CONFIG_FILE: &str = "nexus.toml";

const ENV_ALIASES: &[(&str, &str)] = &[
    ("SPACES_KEY", "spaces.key"),
    ("SPACES_SECRET", "spaces.secret"),
    ("SPACES_ENDPOINT", "spaces.endpoint"),
    ("SPACES_BUCKET", "spaces.bucket"),
    ("SPACES_REGION", "spaces.region"),
    ("GMAIL_APP_PASSWORD", "mail.password"),
    ("GOOGLE_APPLICATION_CREDENTIALS", "service_account"),
    ("PORT", "http.port"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("No service account configured; set GOOGLE_APPLICATION_CREDENTIALS or `service_account`")]
    MissingServiceAccount,
    #[error("Failed to read service account key {path}: {source}")]
    ServiceAccount {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the service account JSON key.
    pub service_account: Option<PathBuf>,
    /// Overrides the project id found in the service account key.
    pub project_id: Option<String>,
    pub http: HttpConfig,
    pub spaces: SpacesConfig,
    pub mail: MailConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Spaces settings are optional at startup; the upload endpoint reports what is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacesConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub expires_in_secs: u64,
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            key: None,
            secret: None,
            endpoint: None,
            bucket: None,
            region: None,
            expires_in_secs: DEFAULT_EXPIRES_IN_SECS,
        }
    }
}

/// Which Spaces settings are present. Never carries the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpacesPresence {
    pub key: bool,
    pub secret: bool,
    pub endpoint: bool,
    pub bucket: bool,
    pub region: bool,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl SpacesConfig {
    pub fn presence(&self) -> SpacesPresence {
        SpacesPresence {
            key: present(&self.key).is_some(),
            secret: present(&self.secret).is_some(),
            endpoint: present(&self.endpoint).is_some(),
            bucket: present(&self.bucket).is_some(),
            region: present(&self.region).is_some(),
        }
    }

    /// Complete settings, or which ones are missing.
    pub fn settings(&self) -> Result<SpacesSettings, SpacesPresence> {
        match (
            present(&self.key),
            present(&self.secret),
            present(&self.endpoint),
            present(&self.bucket),
            present(&self.region),
        ) {
            (Some(key), Some(secret), Some(endpoint), Some(bucket), Some(region)) => {
                Ok(SpacesSettings {
                    key,
                    secret,
                    endpoint,
                    bucket,
                    region,
                    expires_in_secs: self.expires_in_secs,
                })
            }
            _ => Err(self.presence()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_host: String,
    pub username: String,
    /// App password for the SMTP login.
    pub password: Option<String>,
    /// Where support requests are delivered.
    pub support_inbox: String,
    pub sender_address: String,
    /// Reply-to for support mail when the user gave no address.
    pub no_reply_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            username: "nexusgodlydating@gmail.com".to_string(),
            password: None,
            support_inbox: "nexusgodlydating@gmail.com".to_string(),
            sender_address: "nexusgodlydating@gmail.com".to_string(),
            no_reply_address: "noreply@nexusapp.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the expiring-subscription check every 24 hours inside `serve`.
    pub daily_subscription_check: bool,
}

impl Config {
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::raw().filter_map(|key| {
                ENV_ALIASES
                    .iter()
                    .find(|(env, _)| key.as_str().eq_ignore_ascii_case(env))
                    .map(|(_, path)| (*path).into())
            }))
            .merge(Env::prefixed("NEXUS_").split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path)
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// Reads the service account key, applying the `project_id` override.
    pub async fn service_account_key(&self) -> Result<ServiceAccountKey, ConfigError> {
        let path = self
            .service_account
            .as_ref()
            .ok_or(ConfigError::MissingServiceAccount)?;

        let mut key = yup_oauth2::read_service_account_key(path)
            .await
            .map_err(|source| ConfigError::ServiceAccount {
                path: path.clone(),
                source,
            })?;

        if let Some(project_id) = &self.project_id {
            key.project_id = Some(project_id.clone());
        }

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config: Config = Config::figment(None).extract()?;

            assert_eq!(config.http.port, 8080);
            assert_eq!(config.mail.smtp_host, "smtp.gmail.com");
            assert_eq!(config.spaces.expires_in_secs, 300);
            assert!(!config.scheduler.daily_subscription_check);
            assert!(config.service_account.is_none());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_aliases_then_prefixed_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nexus.toml",
                r#"
                project_id = "from-file"

                [http]
                port = 9000

                [spaces]
                bucket = "file-bucket"
                region = "nyc3"

                [mail]
                support_inbox = "help@example.com"
                "#,
            )?;
            jail.clear_env();
            jail.set_env("SPACES_KEY", "env-key");
            jail.set_env("SPACES_SECRET", "env-secret");
            jail.set_env("SPACES_ENDPOINT", "https://nyc3.digitaloceanspaces.com");
            jail.set_env("GMAIL_APP_PASSWORD", "app-password");
            jail.set_env("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/sa.json");
            jail.set_env("PORT", "7000");
            jail.set_env("NEXUS_SCHEDULER__DAILY_SUBSCRIPTION_CHECK", "true");

            let config: Config = Config::figment(None).extract()?;

            assert_eq!(config.project_id.as_deref(), Some("from-file"));
            assert_eq!(config.http.port, 7000);
            assert_eq!(config.mail.support_inbox, "help@example.com");
            assert_eq!(config.mail.password.as_deref(), Some("app-password"));
            assert_eq!(config.service_account, Some(PathBuf::from("/secrets/sa.json")));
            assert!(config.scheduler.daily_subscription_check);

            let settings = config.spaces.settings().unwrap();
            assert_eq!(settings.key, "env-key");
            assert_eq!(settings.bucket, "file-bucket");
            assert_eq!(settings.expires_in_secs, 300);
            Ok(())
        });
    }

    #[test]
    fn explicit_config_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[http]\nhost = \"127.0.0.1\"\n")?;

            let config: Config = Config::figment(Some(Path::new("custom.toml"))).extract()?;
            assert_eq!(config.http.host, "127.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn missing_spaces_settings_are_reported() {
        let spaces = SpacesConfig {
            key: Some("k".into()),
            secret: Some("  ".into()),
            region: Some("nyc3".into()),
            ..Default::default()
        };

        let missing = spaces.settings().unwrap_err();
        assert_eq!(
            missing,
            SpacesPresence {
                key: true,
                secret: false,
                endpoint: false,
                bucket: false,
                region: true,
            }
        );
    }
}
