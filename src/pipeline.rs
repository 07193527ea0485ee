//! Ingestion orchestration.
//!
//! One run fetches every configured list concurrently. Within a list, blocks
//! are parsed and filtered in digest order, then each surviving posting is
//! enriched, has its images relocated, and is inserted as a single row.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ListSource};
use crate::db::{insert_item, Database, NewItem};
use crate::dedup::{dedup_batch, seen_in_history};
use crate::digest::{parse_block, split_digest, MailingList, ParserOptions, Posting, RejectReason};
use crate::enrich::{enrich, is_new_offer, resolve_posting_sender, OpenAiClient, TextModel};
use crate::mailman::{fetch_digest, FetchError};
use crate::relocate::{AssetStore, ImageRelocator};
use crate::s3::S3Client;

/// External services the pipeline can call. Each one is optional; a missing
/// collaborator degrades the matching step instead of failing it.
#[derive(Default)]
pub struct Collaborators {
    pub text_model: Option<Arc<dyn TextModel>>,
    pub relocator: Option<ImageRelocator>,
}

impl Collaborators {
    /// Build collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be initialized.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let text_model = OpenAiClient::from_config(config)?
            .map(|client| Arc::new(client) as Arc<dyn TextModel>);
        if text_model.is_none() {
            warn!("OPENAI_API_KEY not set; locations will be recorded as not found");
        }

        let relocator = if config.relocate_images && config.s3_bucket.is_some() {
            let s3 = S3Client::new(config)
                .await
                .context("Failed to initialize S3 client")?;
            info!(bucket = %s3.bucket_name(), "Image relocation enabled");
            Some(ImageRelocator::new(config, Arc::new(s3)))
        } else {
            info!("Image relocation disabled");
            None
        };

        Ok(Self {
            text_model,
            relocator,
        })
    }

    #[must_use]
    pub fn with_text_model(mut self, model: Arc<dyn TextModel>) -> Self {
        self.text_model = Some(model);
        self
    }

    #[must_use]
    pub fn with_asset_store(mut self, config: &Config, store: Arc<dyn AssetStore>) -> Self {
        self.relocator = Some(ImageRelocator::new(config, store));
        self
    }

    fn model(&self) -> Option<&dyn TextModel> {
        self.text_model.as_deref()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("text_model", &self.text_model.is_some())
            .field("relocator", &self.relocator)
            .finish()
    }
}

/// What happened to one digest.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub source: String,
    /// Blocks in the digest before windowing.
    pub total_blocks: usize,
    /// Blocks considered after windowing.
    pub blocks: usize,
    pub parsed: usize,
    /// `(label, reason)` per dropped block or posting. The label is the
    /// subject when one was parsed.
    pub rejections: Vec<(String, RejectReason)>,
    pub inserted_ids: Vec<i64>,
    /// Inserted postings whose location is not the sentinel.
    pub located: usize,
    pub relocated: usize,
    pub relocation_failures: usize,
    pub enrichment_unavailable: usize,
    pub store_errors: usize,
}

impl IngestReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted_ids.len()
    }

    /// Number of rejections with the given reason.
    #[must_use]
    pub fn rejected(&self, reason: RejectReason) -> usize {
        self.rejections.iter().filter(|(_, r)| *r == reason).count()
    }

    fn reject(&mut self, label: impl Into<String>, reason: RejectReason) {
        let label = label.into();
        debug!(source = %self.source, label = %label, reason = reason.as_str(), "Rejected");
        self.rejections.push((label, reason));
    }
}

/// Run the pipeline over an already fetched digest.
///
/// Postings are independent: enrichment, relocation and store failures are
/// counted in the report and never abort the batch.
pub async fn ingest_digest(
    config: &Config,
    db: &Database,
    collaborators: &Collaborators,
    source: &str,
    list: MailingList,
    raw: &str,
) -> IngestReport {
    let mut report = IngestReport::new(source);
    let options = ParserOptions::from_config(config);
    let model = collaborators.model();

    let batch = split_digest(raw, list, config.digest_window);
    report.total_blocks = batch.total_blocks;
    report.blocks = batch.blocks.len();

    let mut candidates: Vec<Posting> = Vec::new();
    for (idx, block) in batch.blocks.iter().enumerate() {
        let mut posting = match parse_block(block, &options) {
            Ok(posting) => posting,
            Err(reason) => {
                report.reject(format!("block {idx}"), reason);
                continue;
            }
        };
        report.parsed += 1;

        match seen_in_history(
            db.pool(),
            &posting.subject,
            posting.timestamp,
            config.dedup_window_days,
        )
        .await
        {
            Ok(true) => {
                report.reject(posting.subject, RejectReason::DuplicateHistory);
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!(subject = %posting.subject, "History lookup failed: {e:#}");
                report.store_errors += 1;
                continue;
            }
        }

        resolve_posting_sender(model, &mut posting).await;
        candidates.push(posting);
    }

    let (kept, dropped) = dedup_batch(candidates);
    for posting in dropped {
        report.reject(posting.subject, RejectReason::DuplicateBatch);
    }

    for mut posting in kept {
        if config.offer_check_enabled && !is_new_offer(model, &posting.subject, &posting.body).await
        {
            report.reject(posting.subject, RejectReason::Claimed);
            continue;
        }

        let enrichment = enrich(model, &posting.subject, &posting.body).await;
        if !enrichment.is_available() {
            report.enrichment_unavailable += 1;
        }
        enrichment.apply(&mut posting);

        if let Some(relocator) = &collaborators.relocator {
            let outcome = relocator.relocate_posting(&mut posting, list).await;
            report.relocated += outcome.relocated;
            report.relocation_failures += outcome.failed;
        }

        match insert_item(db.pool(), &NewItem::from_posting(&posting)).await {
            Ok(id) => {
                info!(
                    source = %source,
                    id,
                    subject = %posting.subject,
                    location = %posting.location,
                    "Inserted item"
                );
                report.inserted_ids.push(id);
                if posting.has_location() {
                    report.located += 1;
                }
            }
            Err(e) => {
                error!(subject = %posting.subject, "Failed to insert item: {e:#}");
                report.store_errors += 1;
            }
        }
    }

    info!(
        source = %source,
        blocks = report.blocks,
        parsed = report.parsed,
        rejected = report.rejections.len(),
        inserted = report.inserted(),
        located = report.located,
        relocated = report.relocated,
        relocation_failures = report.relocation_failures,
        enrichment_unavailable = report.enrichment_unavailable,
        store_errors = report.store_errors,
        "Digest ingested"
    );
    report
}

/// Fetch one list's digest and ingest it.
///
/// # Errors
///
/// Returns a [`FetchError`] if the digest could not be fetched; the source is
/// skipped for this run.
pub async fn ingest_source(
    config: &Config,
    db: &Database,
    collaborators: &Collaborators,
    source: &ListSource,
) -> Result<IngestReport, FetchError> {
    let raw = fetch_digest(config, source).await?;
    Ok(ingest_digest(config, db, collaborators, &source.name, source.list, &raw).await)
}

/// Outcome of one run over every configured source.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<IngestReport>,
    pub failures: Vec<(String, FetchError)>,
}

impl RunSummary {
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.reports.iter().map(IngestReport::inserted).sum()
    }

    /// Whether every source failed at login. Nothing can be ingested until the
    /// credentials are fixed.
    #[must_use]
    pub fn all_logins_failed(&self) -> bool {
        self.reports.is_empty()
            && !self.failures.is_empty()
            && self.failures.iter().all(|(_, e)| e.is_login_failure())
    }
}

/// Ingest every configured source once, concurrently.
pub async fn run_once(config: &Config, db: &Database, collaborators: &Collaborators) -> RunSummary {
    let sources = config.sources();
    let results = join_all(
        sources
            .iter()
            .map(|source| ingest_source(config, db, collaborators, source)),
    )
    .await;

    let mut summary = RunSummary::default();
    for (source, result) in sources.into_iter().zip(results) {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(source = %source.name, url = %source.archive_url, "Skipping source: {e}");
                summary.failures.push((source.name, e));
            }
        }
    }
    summary
}

/// Run forever, ingesting every `config.ingest_interval`.
pub async fn run_loop(config: Config, db: Database, collaborators: Collaborators) {
    let interval = config.ingest_interval;

    loop {
        let summary = run_once(&config, &db, &collaborators).await;
        if summary.all_logins_failed() {
            error!(
                sources = summary.failures.len(),
                "Login failed for every source; check ARCHIVE_USERNAME/ARCHIVE_PASSWORD"
            );
        } else {
            info!(
                inserted = summary.inserted(),
                failed_sources = summary.failures.len(),
                "Ingest run complete"
            );
        }

        tokio::time::sleep(interval).await;
    }
}
