//! Re-hosting of images scrubbed into the private archive.
//!
//! Mailman replaces inline attachments with links into its authenticated
//! storage. Those links are useless to catalog readers, so each one is fetched
//! with the list's credentials, shrunk, re-encoded as JPEG and uploaded to
//! public storage. A link that cannot be relocated stays as it was.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::digest::{LinkFilter, MailingList, Posting};
use crate::mailman::{ArchiveSession, FetchError};

/// Durable public storage for relocated assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `data` under `key` and return the stored path.
    async fn upload_asset(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Public URL for a stored path.
    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("link is not a relocatable archive asset")]
    NotRelocatable,
    #[error("asset download failed: {0}")]
    Download(#[from] FetchError),
    #[error("asset is not a readable image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image re-encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("upload failed: {0:#}")]
    Upload(anyhow::Error),
}

/// Counts from relocating one posting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelocationOutcome {
    pub relocated: usize,
    pub failed: usize,
}

pub struct ImageRelocator {
    config: Config,
    store: Arc<dyn AssetStore>,
    link_filter: LinkFilter,
}

impl ImageRelocator {
    #[must_use]
    pub fn new(config: &Config, store: Arc<dyn AssetStore>) -> Self {
        Self {
            config: config.clone(),
            store,
            link_filter: LinkFilter::from_config(config),
        }
    }

    /// Whether `link` points into the archive's attachment storage.
    #[must_use]
    pub fn applies_to(&self, link: &str) -> bool {
        self.link_filter.is_archive_asset(link) && self.link_filter.allows(link)
    }

    /// Login endpoint that guards `link`.
    ///
    /// A link under a configured list's archive path uses that list's login,
    /// whatever its scheme; otherwise `fallback`'s login is tried.
    fn login_url_for(&self, link: &str, fallback: MailingList) -> Option<String> {
        let parsed = Url::parse(link).ok();
        self.config
            .sources()
            .into_iter()
            .find(|source| {
                parsed
                    .as_ref()
                    .is_some_and(|link| is_under_path(link, &source.login_url))
            })
            .map(|source| source.login_url)
            .or_else(|| self.config.login_url_for(fallback))
    }

    /// Fetch, shrink and republish one archive asset, returning its public URL.
    ///
    /// # Errors
    ///
    /// Returns a [`RelocationError`] for the step that failed. Callers keep the
    /// original link.
    pub async fn relocate(&self, link: &str, list: MailingList) -> Result<String, RelocationError> {
        if !self.applies_to(link) {
            return Err(RelocationError::NotRelocatable);
        }
        let login_url = self
            .login_url_for(link, list)
            .ok_or(RelocationError::NotRelocatable)?;

        // Fresh session per asset; login endpoints differ between lists.
        let session = ArchiveSession::open(&self.config, &login_url).await?;
        let original = session.download(link).await?;

        let jpeg = downsample(
            &original,
            self.config.max_image_dimension,
            self.config.jpeg_quality,
        )?;

        let key = asset_key(&self.config.s3_prefix, list);
        debug!(url = %link, key = %key, bytes = jpeg.len(), "Uploading relocated image");

        let path = self
            .store
            .upload_asset(&key, jpeg, "image/jpeg")
            .await
            .map_err(RelocationError::Upload)?;

        Ok(self.store.public_url(&path))
    }

    /// Relocate every archive asset linked from `posting`.
    ///
    /// Relocated links move from `links`/`attachment_links` into
    /// `relocated_image_urls`; failed ones are left where they were.
    /// `source_list` stands in when the subject carried no list tag.
    pub async fn relocate_posting(
        &self,
        posting: &mut Posting,
        source_list: MailingList,
    ) -> RelocationOutcome {
        let mut outcome = RelocationOutcome::default();
        let list = match posting.mailing_list {
            MailingList::Unknown => source_list,
            tagged => tagged,
        };

        let links = std::mem::take(&mut posting.links);
        let mut kept_links = Vec::with_capacity(links.len());
        for link in links {
            match self.relocate_one(&link, list, &mut outcome).await {
                Some(url) => posting.relocated_image_urls.push(url),
                None => kept_links.push(link),
            }
        }
        posting.links = kept_links;

        let attachments = std::mem::take(&mut posting.attachment_links);
        let mut kept_attachments = Vec::with_capacity(attachments.len());
        for link in attachments {
            match self.relocate_one(&link, list, &mut outcome).await {
                Some(url) => posting.relocated_image_urls.push(url),
                None => kept_attachments.push(link),
            }
        }
        posting.attachment_links = kept_attachments;

        if outcome.relocated > 0 || outcome.failed > 0 {
            info!(
                subject = %posting.subject,
                relocated = outcome.relocated,
                failed = outcome.failed,
                "Relocated posting images"
            );
        }
        outcome
    }

    async fn relocate_one(
        &self,
        link: &str,
        list: MailingList,
        outcome: &mut RelocationOutcome,
    ) -> Option<String> {
        if !self.applies_to(link) {
            return None;
        }
        match self.relocate(link, list).await {
            Ok(url) => {
                outcome.relocated += 1;
                Some(url)
            }
            Err(e) => {
                outcome.failed += 1;
                warn!(url = %link, list = %list, "Image relocation failed: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for ImageRelocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRelocator")
            .field("archive_host", &self.config.archive_host)
            .field("max_image_dimension", &self.config.max_image_dimension)
            .finish_non_exhaustive()
    }
}

/// Decode an image, shrink it to fit `max_dim` on both sides and re-encode as JPEG.
///
/// Images already within bounds keep their size.
///
/// # Errors
///
/// Returns [`RelocationError::Decode`] for unreadable input and
/// [`RelocationError::Encode`] if JPEG encoding fails.
pub fn downsample(bytes: &[u8], max_dim: u32, quality: u8) -> Result<Vec<u8>, RelocationError> {
    let img = image::load_from_memory(bytes).map_err(RelocationError::Decode)?;

    let (width, height) = img.dimensions();
    let img = if width > max_dim || height > max_dim {
        img.resize(max_dim, max_dim, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Vec::new();
    rgb.write_to(&mut out, ImageOutputFormat::Jpeg(quality))
        .map_err(RelocationError::Encode)?;
    Ok(out)
}

/// Whether `link` sits under `base` on the same host and port. The scheme is
/// ignored: archives often link `http://` assets behind an `https://` login.
fn is_under_path(link: &Url, base: &str) -> bool {
    let Ok(base) = Url::parse(base) else {
        return false;
    };
    let same_host = match (link.host_str(), base.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    same_host && link.port() == base.port() && link.path().starts_with(base.path())
}

/// Fresh object key, e.g. `item-photos/reuse/3f9a…c1.jpg`.
fn asset_key(prefix: &str, list: MailingList) -> String {
    let suffix: u128 = rand::thread_rng().gen();
    format!(
        "{prefix}{}/{suffix:032x}.jpg",
        list.as_str().to_lowercase()
    )
}
