//! Authenticated access to the private mailman archive.
//!
//! One [`ArchiveSession`] holds the cookie jar for a single login endpoint.
//! Sessions are never shared between sources.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ArchiveCredentials, Config, ListSource};
use crate::constants::USER_AGENT;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("login to {url} failed: {reason}")]
    LoginFailed { url: String, reason: String },
    #[error("download of {url} failed after {attempts} attempts")]
    DownloadFailed { url: String, attempts: u32 },
    #[error("archive body could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether this failure happened at the login step.
    #[must_use]
    pub fn is_login_failure(&self) -> bool {
        matches!(self, Self::LoginFailed { .. })
    }
}

/// Cookie-carrying HTTP session against one archive login endpoint.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    http: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ArchiveSession {
    /// Create an unauthenticated session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            max_attempts: config.fetch_max_attempts.max(1),
            retry_delay: config.fetch_retry_delay,
        })
    }

    /// Create a session and log in at `login_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the login fails.
    pub async fn open(config: &Config, login_url: &str) -> Result<Self, FetchError> {
        let session = Self::new(config)?;
        session.login(login_url, &config.credentials).await?;
        Ok(session)
    }

    /// Submit the archive login form. Cookies from the response stay in the
    /// session for later requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::LoginFailed`] on transport errors or a non-success status.
    pub async fn login(
        &self,
        login_url: &str,
        credentials: &ArchiveCredentials,
    ) -> Result<(), FetchError> {
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("submit", credentials.submit_value.as_str()),
        ];

        debug!(url = %login_url, "Logging in to archive");

        let response = self
            .http
            .post(login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| FetchError::LoginFailed {
                url: login_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::LoginFailed {
                url: login_url.to_string(),
                reason: format!("status {status}"),
            });
        }

        Ok(())
    }

    /// GET `url`, retrying until a 200 or the attempt budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::DownloadFailed`] once every attempt has failed.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        for attempt in 1..=self.max_attempts {
            match self.try_download(url).await {
                Ok(bytes) => {
                    debug!(url = %url, attempt, bytes = bytes.len(), "Download successful");
                    return Ok(bytes);
                }
                Err(reason) => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts = self.max_attempts,
                        reason = %reason,
                        "Download failed"
                    );
                }
            }

            if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        Err(FetchError::DownloadFailed {
            url: url.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn try_download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.http.get(url).send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("status {status}"));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// Log in for `source` and download its digest as text.
///
/// # Errors
///
/// Returns a [`FetchError`] if login, download or decoding fails. Callers
/// skip the source and continue with the others.
pub async fn fetch_digest(config: &Config, source: &ListSource) -> Result<String, FetchError> {
    let session = ArchiveSession::open(config, &source.login_url).await?;
    let bytes = session.download(&source.archive_url).await?;
    let text = decode_archive(&bytes)?;

    info!(list = %source.name, url = %source.archive_url, chars = text.len(), "Fetched digest");
    Ok(text)
}

/// Decode an archive body, gunzipping it first when it is still compressed.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if a gzip stream is corrupt.
pub fn decode_archive(bytes: &[u8]) -> Result<String, FetchError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut decoded)
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        return Ok(String::from_utf8_lossy(&decoded).into_owned());
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn test_decode_plain_text() {
        assert_eq!(decode_archive(b"From: a at mit.edu").unwrap(), "From: a at mit.edu");
    }

    #[test]
    fn test_decode_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Subject: [Reuse] Desk").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_archive(&compressed).unwrap(), "Subject: [Reuse] Desk");
    }

    #[test]
    fn test_decode_corrupt_gzip() {
        let result = decode_archive(&[0x1f, 0x8b, 0x00, 0x01]);
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }
}
