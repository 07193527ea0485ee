use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::digest::MailingList;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Mailman archive
    pub mailman_base_url: String,
    pub mailing_lists: Vec<String>,
    pub archive_period: String,
    pub archive_host: String,
    pub credentials: ArchiveCredentials,

    // Fetching
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay: Duration,
    pub http_timeout: Duration,

    // Parsing and dedup policy
    pub digest_window: usize,
    pub dedup_window_days: i64,
    pub redirect_hosts: Vec<String>,
    pub institution_marker: String,

    // Text-understanding collaborator
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub offer_check_enabled: bool,

    // Geocoding collaborator
    pub google_api_key: Option<String>,
    pub geocode_base_url: String,

    // Database
    pub database_path: PathBuf,

    // S3 Storage
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_prefix: String,
    pub s3_public_url: Option<String>,

    // Image relocation
    pub relocate_images: bool,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,

    // Scheduling
    pub ingest_interval: Duration,
}

/// Login form credentials for the private archive.
#[derive(Clone)]
pub struct ArchiveCredentials {
    pub username: String,
    pub password: String,
    pub submit_value: String,
}

impl std::fmt::Debug for ArchiveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("submit_value", &self.submit_value)
            .finish()
    }
}

/// One mailing list to ingest, with its endpoints resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSource {
    /// Archive directory name, e.g. `reuse`.
    pub name: String,
    pub list: MailingList,
    pub login_url: String,
    pub archive_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mailman_base_url = env_or_default(
            "MAILMAN_BASE_URL",
            "https://mailman.mit.edu/mailman/private",
        );
        let archive_host = optional_env("ARCHIVE_HOST")
            .or_else(|| host_of(&mailman_base_url))
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "MAILMAN_BASE_URL".to_string(),
                message: "must be an absolute URL with a host".to_string(),
            })?;

        Ok(Self {
            // Mailman archive
            mailman_base_url,
            mailing_lists: split_list(&env_or_default("MAILING_LISTS", "reuse,free-foods")),
            archive_period: optional_env("ARCHIVE_PERIOD").unwrap_or_else(current_archive_period),
            archive_host,
            credentials: ArchiveCredentials {
                username: required_env("ARCHIVE_USERNAME")?,
                password: required_env("ARCHIVE_PASSWORD")?,
                submit_value: env_or_default("LOGIN_SUBMIT_VALUE", "Let me in..."),
            },

            // Fetching
            fetch_max_attempts: parse_env_u32("FETCH_MAX_ATTEMPTS", 3)?,
            fetch_retry_delay: Duration::from_millis(parse_env_u64("FETCH_RETRY_DELAY_MS", 500)?),
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Parsing and dedup policy
            digest_window: parse_env_usize("DIGEST_WINDOW", 30)?,
            dedup_window_days: i64::from(parse_env_u32("DEDUP_WINDOW_DAYS", 7)?),
            redirect_hosts: split_list(&env_or_default("REDIRECT_HOSTS", "aka.ms")),
            institution_marker: env_or_default("INSTITUTION_MARKER", "mit").to_lowercase(),

            // Text-understanding collaborator
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or_default("OPENAI_MODEL", "gpt-4o"),
            offer_check_enabled: parse_env_bool("OFFER_CHECK_ENABLED", false)?,

            // Geocoding collaborator
            google_api_key: optional_env("GOOGLE_API_KEY"),
            geocode_base_url: env_or_default(
                "GEOCODE_BASE_URL",
                "https://maps.googleapis.com/maps/api/geocode/json",
            ),

            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/items.sqlite")),

            // S3 Storage
            s3_bucket: optional_env("S3_BUCKET"),
            s3_region: env_or_default("S3_REGION", "us-east-1"),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            s3_prefix: env_or_default("S3_PREFIX", "item-photos/"),
            s3_public_url: optional_env("S3_PUBLIC_URL"),

            // Image relocation
            relocate_images: parse_env_bool("RELOCATE_IMAGES", true)?,
            max_image_dimension: parse_env_u32("MAX_IMAGE_DIMENSION", 720)?,
            jpeg_quality: parse_env_u8("JPEG_QUALITY", 85)?,

            // Scheduling
            ingest_interval: Duration::from_secs(parse_env_u64("INGEST_INTERVAL_SECS", 0)?),
        })
    }

    /// A self-contained configuration for tests. Endpoints point nowhere useful;
    /// tests override the ones they exercise.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            mailman_base_url: "http://127.0.0.1:9/mailman/private".to_string(),
            mailing_lists: vec!["reuse".to_string()],
            archive_period: "2024-September".to_string(),
            archive_host: "mailman.example.edu".to_string(),
            credentials: ArchiveCredentials {
                username: "tester".to_string(),
                password: "hunter2".to_string(),
                submit_value: "Let me in...".to_string(),
            },
            fetch_max_attempts: 3,
            fetch_retry_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(10),
            digest_window: 30,
            dedup_window_days: 7,
            redirect_hosts: vec!["aka.ms".to_string()],
            institution_marker: "mit".to_string(),
            openai_api_key: None,
            openai_base_url: "http://127.0.0.1:9/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            offer_check_enabled: false,
            google_api_key: None,
            geocode_base_url: "http://127.0.0.1:9/geocode/json".to_string(),
            database_path: PathBuf::from(":memory:"),
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_prefix: "item-photos/".to_string(),
            s3_public_url: None,
            relocate_images: true,
            max_image_dimension: 720,
            jpeg_quality: 85,
            ingest_interval: Duration::ZERO,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailing_lists.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "MAILING_LISTS".to_string(),
                message: "at least one list is required".to_string(),
            });
        }
        for name in &self.mailing_lists {
            if MailingList::from_archive_name(name) == MailingList::Unknown {
                return Err(ConfigError::InvalidValue {
                    name: "MAILING_LISTS".to_string(),
                    message: format!("unrecognized list '{name}'"),
                });
            }
        }
        if self.fetch_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.digest_window == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DIGEST_WINDOW".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_image_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_IMAGE_DIMENSION".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                name: "JPEG_QUALITY".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        if self.credentials.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ARCHIVE_USERNAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the configured list names into fetchable sources.
    #[must_use]
    pub fn sources(&self) -> Vec<ListSource> {
        let base = self.mailman_base_url.trim_end_matches('/');
        self.mailing_lists
            .iter()
            .map(|name| ListSource {
                name: name.clone(),
                list: MailingList::from_archive_name(name),
                login_url: format!("{base}/{name}/"),
                archive_url: format!("{base}/{name}/{}.txt.gz", self.archive_period),
            })
            .collect()
    }

    /// Login endpoint for the source that carries `list`, if one is configured.
    #[must_use]
    pub fn login_url_for(&self, list: MailingList) -> Option<String> {
        self.sources()
            .into_iter()
            .find(|s| s.list == list)
            .map(|s| s.login_url)
    }
}

/// Monthly archive name as mailman writes it, e.g. `2024-September`.
fn current_archive_period() -> String {
    Utc::now().format("%Y-%B").to_string()
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u8(name: &str, default: u8) -> Result<u8, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
