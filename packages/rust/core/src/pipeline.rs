//! End-to-end publish pipeline: catalog entry → recency gate → fetch → expand → store.

use std::time::{Duration, Instant};

use bytes::Bytes;
use sha1::{Digest, Sha1};
use tracing::{debug, info, instrument, warn};

use pomwatch_expander::Expander;
use pomwatch_github::GithubClient;
use pomwatch_shared::{CatalogEntry, PipelineConfig, PomwatchError, Result};
use pomwatch_store::BlobSink;

use crate::snapshot;

/// Ref used for snapshot clones when the catalog entry does not pin one.
const SNAPSHOT_DEFAULT_REF: &str = "master";

/// Outcome of a single catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Descriptor expanded in memory and stored.
    Published {
        key: String,
        version: Option<String>,
    },
    /// In-memory expansion failed; a repository snapshot was unpacked and
    /// expanded in place instead. Stored under the same key.
    PublishedViaSnapshot {
        key: String,
        version: Option<String>,
    },
    /// Repository untouched for longer than the recency window.
    Stale,
    /// Entry abandoned; the run moves on to the next one.
    Failed(String),
}

/// Result of one catalog run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Entries seen, including skipped and failed ones.
    pub entries: usize,
    /// Entries whose expanded descriptor was stored.
    pub published: usize,
    /// Entries skipped by the recency gate.
    pub skipped: usize,
    /// Entries abandoned with an error.
    pub failed: usize,
    /// (repository URL, reason) for every failed entry.
    pub errors: Vec<(String, String)>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when an entry starts processing.
    fn entry_started(&self, url: &str, index: usize);
    /// Called when an entry finishes, with its outcome.
    fn entry_finished(&self, url: &str, outcome: &EntryOutcome);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn entry_started(&self, _url: &str, _index: usize) {}
    fn entry_finished(&self, _url: &str, _outcome: &EntryOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Storage key for a descriptor: lowercase hex SHA-1 of its content.
///
/// Expanded output is stored under the hash of the *source* descriptor, so a
/// repository whose descriptor has not changed maps to the same object.
pub fn descriptor_key(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Drives catalog entries through the publish pipeline, one at a time.
pub struct Pipeline {
    github: GithubClient,
    expander: Expander,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(github: GithubClient, expander: Expander, config: PipelineConfig) -> Self {
        Self {
            github,
            expander,
            config,
        }
    }

    /// Run the pipeline over every catalog entry.
    ///
    /// Entries are processed strictly in order with a fixed pause between
    /// them. A failed entry is recorded and the run continues; the summary
    /// carries the per-entry errors.
    #[instrument(skip_all, fields(days = self.config.days, delay_ms = self.config.delay_ms))]
    pub async fn run<I>(
        &self,
        entries: I,
        sink: &dyn BlobSink,
        progress: &dyn ProgressReporter,
    ) -> RunSummary
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let start = Instant::now();
        let mut summary = RunSummary::default();
        let delay = Duration::from_millis(self.config.delay_ms);

        info!("starting catalog run");
        progress.phase("Publishing catalog descriptors");

        for entry in entries {
            if summary.entries > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            summary.entries += 1;
            progress.entry_started(&entry.url, summary.entries);

            let outcome = match self.publish_entry(&entry, sink).await {
                Ok(outcome) => outcome,
                Err(e) => EntryOutcome::Failed(e.to_string()),
            };

            match &outcome {
                EntryOutcome::Published { key, .. } => {
                    info!(url = %entry.url, key = %key, "published expanded descriptor");
                    summary.published += 1;
                }
                EntryOutcome::PublishedViaSnapshot { key, .. } => {
                    info!(url = %entry.url, key = %key, "published descriptor from snapshot");
                    summary.published += 1;
                }
                EntryOutcome::Stale => {
                    info!(url = %entry.url, days = self.config.days, "skipping stale repository");
                    summary.skipped += 1;
                }
                EntryOutcome::Failed(reason) => {
                    warn!(url = %entry.url, error = %reason, "entry failed, continuing run");
                    summary.failed += 1;
                    summary.errors.push((entry.url.clone(), reason.clone()));
                }
            }
            progress.entry_finished(&entry.url, &outcome);
        }

        summary.elapsed = start.elapsed();
        progress.done(&summary);

        info!(
            entries = summary.entries,
            published = summary.published,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis(),
            "catalog run complete"
        );

        summary
    }

    /// Process one entry end to end.
    async fn publish_entry(
        &self,
        entry: &CatalogEntry,
        sink: &dyn BlobSink,
    ) -> Result<EntryOutcome> {
        // --- Gate: recent activity ---
        if !self
            .github
            .is_recently_modified(&entry.url, self.config.days, None)
            .await?
        {
            return Ok(EntryOutcome::Stale);
        }

        // --- Fetch the descriptor at the pinned ref ---
        let content = self
            .github
            .fetch_file(&entry.url, &self.config.descriptor, entry.git_ref.as_deref())
            .await?;
        let key = descriptor_key(&content);
        debug!(url = %entry.url, key = %key, "computed storage key");

        // --- Expand in place ---
        let expansion = self.expander.expand(content.as_bytes()).await?;
        if expansion.succeeded() {
            let version = sink.store_blob(Bytes::from(expansion.output), &key).await?;
            return Ok(EntryOutcome::Published { key, version });
        }

        // --- Fallback: expand inside a full snapshot ---
        // Descriptors that inherit from a parent in the same repository only
        // resolve with the whole tree on disk.
        warn!(
            url = %entry.url,
            status = expansion.status,
            "expansion failed, retrying against a repository snapshot"
        );
        let version = self.publish_from_snapshot(entry, &key, sink).await?;
        Ok(EntryOutcome::PublishedViaSnapshot { key, version })
    }

    /// Clone a zip snapshot at the entry's ref, unpack it into a scratch
    /// directory, and expand the descriptor in place. The result lands under
    /// the same content key as the in-memory attempt would have used. The
    /// scratch directory is removed on every path out of this function.
    async fn publish_from_snapshot(
        &self,
        entry: &CatalogEntry,
        key: &str,
        sink: &dyn BlobSink,
    ) -> Result<Option<String>> {
        let git_ref = entry
            .git_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(SNAPSHOT_DEFAULT_REF);
        let (name, archive) = self.github.clone_snapshot(&entry.url, git_ref).await?;

        let scratch =
            tempfile::tempdir().map_err(|e| PomwatchError::io(std::env::temp_dir(), e))?;
        snapshot::unpack_archive(&archive, scratch.path())?;
        let root = snapshot::locate_root(scratch.path(), &name)?;

        let expansion = self.expander.expand_local(&root).await?;
        if !expansion.succeeded() {
            return Err(PomwatchError::Expansion(format!(
                "build tool exited with status {} for snapshot of {}",
                expansion.status, entry.url
            )));
        }
        sink.store_blob(Bytes::from(expansion.output), key).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
