use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CDSS";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database file name inside the data directory.
const DB_FILE_NAME: &str = "cdss.db";

/// Production PBKDF2 work factor.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 600_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Cannot determine a data directory; set CDSS_DATA_DIR")]
    NoDataDir,
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "cdss=info,cdss_lib=info,tower_http=warn"
}

/// Default data directory: `<platform data dir>/cdss`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("cdss"))
}

/// External diagnostic-AI endpoint (Ollama-compatible).
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Media host for upload proxying. `None` url disables uploads.
#[derive(Debug, Clone, Default)]
pub struct MediaConfig {
    pub upload_url: Option<String>,
    pub upload_preset: Option<String>,
    pub folder: String,
}

/// Transactional mail API. `None` url falls back to log-only delivery.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// Full server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// `None` means a random per-process secret is generated.
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub password_iterations: u32,
    pub require_verified_email: bool,
    pub ai: AiConfig,
    pub media: MediaConfig,
    pub mail: MailConfig,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    /// Defaults rooted at `data_dir`. Used by tests and as the base of `from_env`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: data_dir.to_path_buf(),
            session_secret: None,
            session_ttl_hours: 24,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            require_verified_email: false,
            ai: AiConfig {
                enabled: true,
                base_url: "http://localhost:11434".to_string(),
                model: "medgemma".to_string(),
                timeout_secs: 60,
            },
            media: MediaConfig {
                upload_url: None,
                upload_preset: None,
                folder: "cdss".to_string(),
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@cdss.local".to_string(),
            },
            admin_email: None,
            admin_password: None,
            cors_origin: None,
        }
    }

    /// Load configuration from `CDSS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = match get("CDSS_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };
        let mut config = Self::for_data_dir(&data_dir);

        if let Some(bind) = get("CDSS_BIND") {
            config.bind = parse_var("CDSS_BIND", &bind)?;
        }
        config.session_secret = get("CDSS_SESSION_SECRET");
        if let Some(v) = get("CDSS_SESSION_TTL_HOURS") {
            config.session_ttl_hours = parse_var("CDSS_SESSION_TTL_HOURS", &v)?;
            if config.session_ttl_hours <= 0 {
                return Err(ConfigError::InvalidValue {
                    var: "CDSS_SESSION_TTL_HOURS",
                    value: v,
                });
            }
        }
        if let Some(v) = get("CDSS_PASSWORD_ITERATIONS") {
            config.password_iterations = parse_var("CDSS_PASSWORD_ITERATIONS", &v)?;
        }
        if let Some(v) = get("CDSS_REQUIRE_VERIFIED_EMAIL") {
            config.require_verified_email = parse_bool("CDSS_REQUIRE_VERIFIED_EMAIL", &v)?;
        }

        if let Some(v) = get("CDSS_AI_ENABLED") {
            config.ai.enabled = parse_bool("CDSS_AI_ENABLED", &v)?;
        }
        if let Some(v) = get("CDSS_AI_URL") {
            config.ai.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("CDSS_AI_MODEL") {
            config.ai.model = v;
        }
        if let Some(v) = get("CDSS_AI_TIMEOUT_SECS") {
            config.ai.timeout_secs = parse_var("CDSS_AI_TIMEOUT_SECS", &v)?;
        }

        config.media.upload_url = get("CDSS_MEDIA_URL");
        config.media.upload_preset = get("CDSS_MEDIA_PRESET");
        if let Some(v) = get("CDSS_MEDIA_FOLDER") {
            config.media.folder = v;
        }

        config.mail.api_url = get("CDSS_MAIL_URL");
        config.mail.api_key = get("CDSS_MAIL_API_KEY");
        if let Some(v) = get("CDSS_MAIL_FROM") {
            config.mail.from = v;
        }

        config.admin_email = get("CDSS_ADMIN_EMAIL");
        config.admin_password = get("CDSS_ADMIN_PASSWORD");
        config.cors_origin = get("CDSS_CORS_ORIGIN");

        Ok(config)
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

/// Mask an email address for logs: `jane@example.com` → `j***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_only_data_dir_set() {
        let config = ServerConfig::from_lookup(lookup_from(&[("CDSS_DATA_DIR", "/tmp/cdss")])).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.session_ttl_hours, 24);
        assert_eq!(config.password_iterations, DEFAULT_PASSWORD_ITERATIONS);
        assert!(config.ai.enabled);
        assert_eq!(config.ai.model, "medgemma");
        assert!(config.media.upload_url.is_none());
        assert_eq!(config.db_path(), PathBuf::from("/tmp/cdss/cdss.db"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("CDSS_DATA_DIR", "/srv/cdss"),
            ("CDSS_BIND", "0.0.0.0:9000"),
            ("CDSS_AI_ENABLED", "false"),
            ("CDSS_AI_URL", "http://ai.internal:11434/"),
            ("CDSS_REQUIRE_VERIFIED_EMAIL", "yes"),
            ("CDSS_SESSION_TTL_HOURS", "8"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert!(!config.ai.enabled);
        assert_eq!(config.ai.base_url, "http://ai.internal:11434");
        assert!(config.require_verified_email);
        assert_eq!(config.session_ttl_hours, 8);
    }

    #[test]
    fn invalid_number_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[
            ("CDSS_DATA_DIR", "/tmp/cdss"),
            ("CDSS_AI_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { var: "CDSS_AI_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[
            ("CDSS_DATA_DIR", "/tmp/cdss"),
            ("CDSS_SESSION_TTL_HOURS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[
            ("CDSS_DATA_DIR", "/tmp/cdss"),
            ("CDSS_AI_ENABLED", "maybe"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn mask_email_hides_local_part() {
        assert_eq!(mask_email("jane@example.com"), "j***@example.com");
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn app_name_is_cdss() {
        assert_eq!(APP_NAME, "CDSS");
    }
}
