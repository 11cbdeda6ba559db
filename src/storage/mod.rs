//! Presigned uploads to S3-compatible object storage (DigitalOcean Spaces).
//!
//! Clients ask for an upload slot, receive a short-lived signed PUT URL and upload the media
//! directly; the backend never proxies file bytes.

pub mod sigv4;


use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sigv4::SigV4Presigner;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum PresignError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// What the client is uploading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
        }
    }

    /// File extension for the object key, derived from the declared content type.
    pub fn extension(&self, content_type: &str) -> &'static str {
        match self {
            MediaKind::Photo if content_type.contains("png") => "png",
            MediaKind::Photo => "jpg",
            MediaKind::Audio if content_type.contains("mpeg") => "mp3",
            MediaKind::Audio => "m4a",
        }
    }
}

impl FromStr for MediaKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "audio" => Ok(MediaKind::Audio),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete Spaces credentials and location.
#[derive(Debug, Clone)]
pub struct SpacesSettings {
    pub key: String,
    pub secret: String,
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub public_url: String,
    pub object_key: String,
}

/// Issues presigned PUT URLs for user media.
#[derive(Clone)]
pub struct SpacesUploader {
    presigner: SigV4Presigner,
    endpoint: Url,
    bucket: String,
    expires_in_secs: u64,
}

impl SpacesUploader {
    pub fn new(settings: &SpacesSettings) -> Result<Self, PresignError> {
        Ok(Self {
            presigner: SigV4Presigner::new(&settings.key, &settings.secret, &settings.region),
            endpoint: Url::parse(&settings.endpoint)?,
            bucket: settings.bucket.clone(),
            expires_in_secs: settings.expires_in_secs,
        })
    }

    pub fn issue(
        &self,
        uid: &str,
        kind: MediaKind,
        content_type: &str,
    ) -> Result<PresignedUpload, PresignError> {
        let suffix = hex::encode(rand::thread_rng().gen::<[u8; 8]>());
        self.issue_at(uid, kind, content_type, Utc::now(), &suffix)
    }

    /// `issue` with the clock and random suffix supplied by the caller.
    pub fn issue_at(
        &self,
        uid: &str,
        kind: MediaKind,
        content_type: &str,
        now: DateTime<Utc>,
        suffix: &str,
    ) -> Result<PresignedUpload, PresignError> {
        let object_key = object_key(uid, kind, content_type, now, suffix);

        let base = self.endpoint.as_str().trim_end_matches('/');
        let object_url = Url::parse(&format!("{}/{}/{}", base, self.bucket, object_key))?;

        let upload_url = self.presigner.presign(
            "PUT",
            &object_url,
            &[("content-type", content_type)],
            &[("x-amz-acl", "public-read")],
            self.expires_in_secs,
            now,
        )?;

        Ok(PresignedUpload {
            upload_url,
            public_url: format!("{}/{}/{}", base, self.bucket, object_key),
            object_key,
        })
    }
}

/// `users/<uid>/<kind>s/<kind>_<unix-millis>_<suffix>.<ext>`
pub fn object_key(
    uid: &str,
    kind: MediaKind,
    content_type: &str,
    now: DateTime<Utc>,
    suffix: &str,
) -> String {
    format!(
        "users/{uid}/{kind}s/{kind}_{millis}_{suffix}.{ext}",
        uid = uid,
        kind = kind,
        millis = now.timestamp_millis(),
        suffix = suffix,
        ext = kind.extension(content_type),
    )
}
