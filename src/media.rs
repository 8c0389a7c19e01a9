//! Upload proxy to the external media host.
//!
//! `MediaStore::upload` is blocking; async callers run it under `spawn_blocking`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MediaConfig;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "application/pdf"];
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("File is empty")]
    Empty,

    #[error("File exceeds the 5 MiB limit")]
    TooLarge,

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Media host unreachable: {0}")]
    Connection(String),

    #[error("Media host rejected upload with status {status}")]
    Rejected { status: u16 },

    #[error("Media host response was malformed: {0}")]
    InvalidResponse(String),
}

/// Hosted location of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub url: String,
    pub public_id: String,
}

pub trait MediaStore: Send + Sync {
    fn upload(&self, filename: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredMedia, MediaError>;
}

/// Resolve and check the content type: the declared type when it is
/// specific, otherwise a guess from the filename.
pub fn validate_upload(filename: &str, declared: Option<&str>, len: usize) -> Result<String, MediaError> {
    if len == 0 {
        return Err(MediaError::Empty);
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(MediaError::TooLarge);
    }

    let declared = declared
        .map(|t| t.split(';').next().unwrap_or(t).trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty() && t != "application/octet-stream");
    let content_type = match declared {
        Some(t) => t,
        None => mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    };

    if ALLOWED_TYPES.contains(&content_type.as_str()) {
        Ok(content_type)
    } else {
        Err(MediaError::UnsupportedType(content_type))
    }
}

/// Unsigned multipart upload (`file`, `upload_preset`, `folder`).
pub struct HttpMediaStore {
    upload_url: String,
    upload_preset: Option<String>,
    folder: String,
}

#[derive(Deserialize)]
struct HostResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: Option<String>,
}

impl HttpMediaStore {
    pub fn new(upload_url: &str, upload_preset: Option<String>, folder: &str) -> Self {
        Self {
            upload_url: upload_url.to_string(),
            upload_preset,
            folder: folder.to_string(),
        }
    }
}

impl MediaStore for HttpMediaStore {
    fn upload(&self, filename: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredMedia, MediaError> {
        use reqwest::blocking::multipart::{Form, Part};

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| MediaError::UnsupportedType(e.to_string()))?;
        let mut form = Form::new().part("file", part).text("folder", self.folder.clone());
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| MediaError::Connection(e.to_string()))?;
        let response = client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .map_err(|e| MediaError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MediaError::Rejected {
                status: response.status().as_u16(),
            });
        }

        let body: HostResponse = response
            .json()
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;
        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| MediaError::InvalidResponse("missing url".into()))?;
        Ok(StoredMedia {
            public_id: body.public_id.unwrap_or_else(|| url.clone()),
            url,
        })
    }
}

/// Keeps uploads in memory under `memory://` URLs.
#[derive(Default)]
pub struct MemoryMediaStore {
    files: Mutex<HashMap<String, (String, usize)>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl MediaStore for MemoryMediaStore {
    fn upload(&self, filename: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredMedia, MediaError> {
        let public_id = format!("cdss/{}", uuid::Uuid::new_v4());
        let url = format!("memory://{public_id}/{filename}");
        if let Ok(mut files) = self.files.lock() {
            files.insert(public_id.clone(), (content_type.to_string(), bytes.len()));
        }
        Ok(StoredMedia { url, public_id })
    }
}

/// `None` when no media host is configured.
pub fn media_store_from_config(config: &MediaConfig) -> Option<Box<dyn MediaStore>> {
    config.upload_url.as_deref().map(|url| {
        Box::new(HttpMediaStore::new(url, config.upload_preset.clone(), &config.folder))
            as Box<dyn MediaStore>
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_declared_image_types() {
        assert_eq!(validate_upload("x.bin", Some("image/png"), 10).unwrap(), "image/png");
        assert_eq!(
            validate_upload("scan", Some("application/pdf; charset=binary"), 10).unwrap(),
            "application/pdf"
        );
    }

    #[test]
    fn guesses_from_filename_when_undeclared() {
        assert_eq!(validate_upload("rash.jpg", None, 10).unwrap(), "image/jpeg");
        assert_eq!(
            validate_upload("rash.webp", Some("application/octet-stream"), 10).unwrap(),
            "image/webp"
        );
    }

    #[test]
    fn rejects_bad_uploads() {
        assert!(matches!(validate_upload("a.png", None, 0), Err(MediaError::Empty)));
        assert!(matches!(
            validate_upload("a.png", None, MAX_UPLOAD_BYTES + 1),
            Err(MediaError::TooLarge)
        ));
        assert!(matches!(
            validate_upload("run.exe", None, 10),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            validate_upload("a.png", Some("text/html"), 10),
            Err(MediaError::UnsupportedType(_))
        ));
    }

    #[test]
    fn memory_store_returns_url() {
        let store = MemoryMediaStore::new();
        let stored = store.upload("a.png", "image/png", vec![1, 2, 3]).unwrap();
        assert!(stored.url.starts_with("memory://cdss/"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn unconfigured_host_disables_uploads() {
        assert!(media_store_from_config(&MediaConfig::default()).is_none());
    }
}
