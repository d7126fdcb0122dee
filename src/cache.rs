//! On-disk attachment cache and its manifest.
//!
//! The cache directory is the only durable state: one file per attachment,
//! named `<identity token>.<extension>`. There is no separate index, so
//! membership is whatever the directory listing says. The manifest is a derived
//! artifact, fully rebuilt from the listing after each run, one path per line,
//! newest first.
//!
//! Files and the manifest are written to a temporary sibling and renamed into
//! place; readers never see a partial file. Temporary files are hidden
//! (dot-prefixed) and excluded from listings.

use crate::error::{Error, Result};
use crate::filter::AttachmentFilter;
use crate::identity::AttachmentIdentity;
use crate::mailbox::{Attachment, MailboxMessage, MessageId};
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Common file name limit (`NAME_MAX`) of Linux and macOS filesystems.
const MAX_FILE_NAME_LEN: usize = 255;
use tracing::{debug, info, instrument, warn};

/// A directory of cached attachments.
#[derive(Debug, Clone)]
pub struct AttachmentCache {
    dir: PathBuf,
}

impl AttachmentCache {
    /// Creates a handle for `dir`. Nothing is touched until first use.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the identity tokens of every cached file, creating the directory if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheDir`] if the directory cannot be created or listed.
    #[instrument(name = "AttachmentCache::list", skip(self), fields(cache_dir = %self.dir.display()))]
    pub fn list(&self) -> Result<BTreeSet<String>> {
        let tokens: BTreeSet<String> = self
            .file_names()?
            .iter()
            .map(|name| token_of(name).to_string())
            .collect();

        info!(cached = tokens.len(), "Listed attachment cache");
        Ok(tokens)
    }

    /// Returns the ids of messages with at least one eligible attachment not in `cached`.
    ///
    /// A message appears once however many of its attachments are missing.
    #[must_use]
    pub fn missing(
        cached: &BTreeSet<String>,
        messages: &[MailboxMessage],
        filter: &AttachmentFilter,
    ) -> BTreeSet<MessageId> {
        messages
            .iter()
            .filter(|message| {
                message
                    .candidate_tokens(filter)
                    .iter()
                    .any(|token| !cached.contains(token))
            })
            .map(|message| message.id)
            .collect()
    }

    /// Returns the cache path for `identity`, keeping the lowercased extension of
    /// the original filename.
    #[must_use]
    pub fn entry_path(&self, identity: &AttachmentIdentity) -> PathBuf {
        let extension = Path::new(&identity.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let name = match extension {
            Some(ext) if !ext.is_empty() => format!("{}.{ext}", identity.token()),
            _ => identity.token(),
        };
        self.dir.join(name)
    }

    /// Writes `attachment` under `identity`, replacing any existing entry.
    ///
    /// Creates the cache directory if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheDir`] if the directory cannot be created, or
    /// [`Error::WriteEntry`] if the file cannot be written.
    pub fn store(&self, identity: &AttachmentIdentity, attachment: &Attachment) -> Result<PathBuf> {
        self.ensure_dir()?;

        let path = self.entry_path(identity);
        if let Some(len) = path.file_name().map(|name| name.len()) {
            if len > MAX_FILE_NAME_LEN {
                warn!(
                    filename = %attachment.filename,
                    name_len = len,
                    "Cache file name exceeds {MAX_FILE_NAME_LEN} bytes, most filesystems will reject it"
                );
            }
        }

        write_atomically(&self.dir, &path, &attachment.data).map_err(|source| Error::WriteEntry {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), bytes = attachment.data.len(), "Stored attachment");
        Ok(path)
    }

    /// Rebuilds the manifest at `manifest_path` from the current directory listing.
    ///
    /// Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheDir`] if the cache cannot be listed, or
    /// [`Error::Manifest`] if the manifest cannot be written.
    #[instrument(
        name = "AttachmentCache::write_manifest",
        skip(self),
        fields(cache_dir = %self.dir.display(), manifest = %manifest_path.display())
    )]
    pub fn write_manifest(&self, manifest_path: &Path) -> Result<usize> {
        let mut names = self.file_names()?;
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut contents = String::new();
        for name in &names {
            contents.push_str(&self.dir.join(name).to_string_lossy());
            contents.push('\n');
        }

        let parent = manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        write_atomically(parent, manifest_path, contents.as_bytes()).map_err(|source| {
            Error::Manifest {
                path: manifest_path.to_path_buf(),
                source,
            }
        })?;

        info!(entries = names.len(), "Manifest rebuilt");
        Ok(names.len())
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            info!(cache_dir = %self.dir.display(), "Cache directory does not exist, creating it");
            fs::create_dir_all(&self.dir).map_err(|source| Error::CacheDir {
                path: self.dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Names of the regular, non-hidden files in the cache directory.
    fn file_names(&self) -> Result<Vec<String>> {
        let cache_err = |source| Error::CacheDir {
            path: self.dir.clone(),
            source,
        };

        self.ensure_dir()?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(cache_err)? {
            let entry = entry.map_err(cache_err)?;
            if !entry.file_type().map_err(cache_err)?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        Ok(names)
    }
}

/// Reads up to `limit` manifest entries, newest first; `None` reads all.
///
/// A missing manifest reads as empty.
///
/// # Errors
///
/// Returns [`Error::Manifest`] if the manifest exists but cannot be read.
pub fn read_latest(manifest_path: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let contents = match fs::read_to_string(manifest_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::Manifest {
                path: manifest_path.to_path_buf(),
                source,
            })
        }
    };

    let mut entries: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    entries.sort_unstable_by(|a, b| b.cmp(a));

    Ok(entries
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(PathBuf::from)
        .collect())
}

/// The identity token part of a cache file name (everything before the first `.`).
fn token_of(file_name: &str) -> &str {
    file_name
        .split_once('.')
        .map_or(file_name, |(token, _)| token)
}

fn write_atomically(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
