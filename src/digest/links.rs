use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;

/// Loose URL matcher for plain-text mail bodies.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_+.~#?&/=]*)",
    )
    .expect("Invalid URL regex")
});

/// Decides which URLs are kept on a posting.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    archive_host: String,
    redirect_hosts: Vec<String>,
}

impl LinkFilter {
    #[must_use]
    pub fn new(archive_host: impl Into<String>, redirect_hosts: Vec<String>) -> Self {
        Self {
            archive_host: archive_host.into(),
            redirect_hosts,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.archive_host.clone(), config.redirect_hosts.clone())
    }

    /// Whether `url` may appear in `links` / `attachment_links`.
    ///
    /// Archive pages (HTML) and redirector links are dropped; everything
    /// else, including archive-hosted assets, is kept.
    #[must_use]
    pub fn allows(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return true;
        };

        if host.eq_ignore_ascii_case(&self.archive_host) {
            let lower = url.to_ascii_lowercase();
            return !(lower.ends_with("htm") || lower.ends_with("html"));
        }

        !self
            .redirect_hosts
            .iter()
            .any(|redirect| domain_matches(&host, redirect))
    }

    /// Whether `url` points into the archive's private attachment storage.
    #[must_use]
    pub fn is_archive_asset(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| host.eq_ignore_ascii_case(&self.archive_host))
    }

    /// All allowed URLs in `text`, in order of appearance.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<String> {
        extract_urls(text)
            .into_iter()
            .filter(|url| self.allows(url))
            .collect()
    }
}

/// Every URL-looking substring of `text`.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}
