//! Fetch orchestration: one pass from mailbox to cache to manifest.
//!
//! A run lists the cache, opens a session, describes every message, downloads
//! only messages that carry an eligible attachment not yet cached, stores those
//! attachments and finally rebuilds the manifest.
//!
//! Mailbox failures never leave [`AttachmentFetcher::run`]: a failed connect or
//! select ends the mailbox phase early, a failed describe or download skips
//! that one message, and all of them are logged. Only local storage failures
//! (listing the cache, rewriting the manifest) are returned as errors. The
//! manifest is rebuilt on every run, including runs whose mailbox phase failed.

use crate::cache::AttachmentCache;
use crate::config::FetchConfig;
use crate::error::Result;
use crate::filter::AttachmentFilter;
use crate::mailbox::{Connector, Mailbox, MailboxMessage};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Counters describing one fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Messages found in the folder.
    pub messages_scanned: usize,
    /// Messages with at least one eligible attachment missing from the cache.
    pub messages_to_download: usize,
    /// Attachment files written to the cache.
    pub files_written: usize,
    /// Messages that could not be described or downloaded.
    pub failed_messages: usize,
}

impl FetchReport {
    /// Returns `true` if the run added anything to the cache.
    #[must_use]
    pub fn new_content(&self) -> bool {
        self.files_written > 0
    }
}

/// Synchronizes one cache directory with a mailbox.
#[derive(Debug, Clone)]
pub struct AttachmentFetcher {
    cache: AttachmentCache,
    manifest_path: PathBuf,
    filter: AttachmentFilter,
}

impl AttachmentFetcher {
    /// Creates a fetcher for `config`.
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        Self {
            cache: AttachmentCache::new(config.cache_dir),
            manifest_path: config.manifest_path,
            filter: config.filter,
        }
    }

    /// Returns the cache this fetcher fills.
    #[must_use]
    pub fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Returns the attachment filter.
    #[must_use]
    pub fn filter(&self) -> &AttachmentFilter {
        &self.filter
    }

    /// Runs one fetch pass and reports whether new content was cached.
    ///
    /// "New content" means at least one attachment file was written
    /// ([`FetchReport::new_content`]). A run that found messages to download but
    /// failed to download all of them returns `false`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache directory cannot be listed or the
    /// manifest cannot be rewritten. Mailbox errors are logged, not returned.
    pub async fn run<C: Connector>(&self, connector: &C) -> Result<bool> {
        Ok(self.run_report(connector).await?.new_content())
    }

    /// Runs one fetch pass and returns its counters.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    #[instrument(
        name = "AttachmentFetcher::run",
        skip_all,
        fields(
            endpoint = %connector.endpoint(),
            cache_dir = %self.cache.dir().display()
        )
    )]
    pub async fn run_report<C: Connector>(&self, connector: &C) -> Result<FetchReport> {
        let mut cached = self.cache.list()?;
        let mut report = FetchReport::default();

        match connector.connect().await {
            Ok(mut mailbox) => {
                self.sync(&mut mailbox, &mut cached, &mut report).await;

                if let Err(e) = mailbox.logout().await {
                    warn!(error = %e, "Logout failed");
                }
            }
            Err(e) => {
                error!(error = %e, category = %e.category(), "Failed to connect to mailbox");
            }
        }

        let entries = self.cache.write_manifest(&self.manifest_path)?;

        info!(
            messages_scanned = report.messages_scanned,
            messages_to_download = report.messages_to_download,
            files_written = report.files_written,
            failed_messages = report.failed_messages,
            manifest_entries = entries,
            "Fetch run finished"
        );

        Ok(report)
    }

    /// Mailbox phase: select, search, describe, diff, download.
    async fn sync<M: Mailbox>(
        &self,
        mailbox: &mut M,
        cached: &mut BTreeSet<String>,
        report: &mut FetchReport,
    ) {
        if let Err(e) = mailbox.select_inbox().await {
            error!(error = %e, "Failed to select mailbox folder");
            return;
        }

        let ids = match mailbox.search_all().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to search mailbox");
                return;
            }
        };
        report.messages_scanned = ids.len();

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match mailbox.describe_message(id).await {
                Ok(message) => messages.push(message),
                Err(e) => {
                    error!(uid = id, error = %e, "Failed to describe message, skipping it");
                    report.failed_messages += 1;
                }
            }
        }

        let to_download = AttachmentCache::missing(cached, &messages, &self.filter);
        report.messages_to_download = to_download.len();
        info!(
            described = messages.len(),
            to_download = to_download.len(),
            "Compared mailbox with cache"
        );

        for message in messages.iter().filter(|m| to_download.contains(&m.id)) {
            if let Err(e) = self.download(mailbox, message, cached, report).await {
                error!(uid = message.id, error = %e, "Failed to download message");
                report.failed_messages += 1;
            }
        }
    }

    /// Downloads one message and stores its attachments that are not cached yet.
    async fn download<M: Mailbox>(
        &self,
        mailbox: &mut M,
        message: &MailboxMessage,
        cached: &mut BTreeSet<String>,
        report: &mut FetchReport,
    ) -> Result<()> {
        let attachments = mailbox.download_attachments(message.id, &self.filter).await?;

        for attachment in &attachments {
            let identity = message.identity(&attachment.filename);
            let token = identity.token();
            if cached.contains(&token) {
                debug!(uid = message.id, filename = %attachment.filename, "Already cached");
                continue;
            }

            let path = self.cache.store(&identity, attachment)?;
            info!(uid = message.id, path = %path.display(), "Cached attachment");
            cached.insert(token);
            report.files_written += 1;
        }

        Ok(())
    }
}
