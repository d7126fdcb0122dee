//! Attachment filtering rules.
//!
//! An attachment is eligible for caching when its filename ends with one of the
//! allowed extensions (case-insensitive) and the message was sent by an allowed
//! sender. The sender allow-list may contain [`ANY_SENDER`] to accept everyone.
//!
//! # Example
//!
//! ```
//! use mail_attachment_cache::filter::AttachmentFilter;
//!
//! let filter = AttachmentFilter::new(["jpg", ".PNG"], ["alice@example.com"]);
//! assert!(filter.accepts_filename("Holiday.JPG"));
//! assert!(filter.accepts_filename("scan.png"));
//! assert!(!filter.accepts_filename("virus.exe"));
//! assert!(filter.accepts_sender("alice@example.com"));
//! assert!(!filter.accepts_sender("mallory@example.com"));
//! ```

/// Sender allow-list entry that accepts every sender.
pub const ANY_SENDER: &str = "*";

/// Extension and sender allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFilter {
    extensions: Vec<String>,
    senders: Vec<String>,
}

impl AttachmentFilter {
    /// Creates a filter.
    ///
    /// Extensions are normalized to lowercase without a leading dot, so `"JPG"`,
    /// `".jpg"` and `"jpg"` are equivalent. Empty extension entries are dropped.
    /// Sender entries are kept verbatim apart from surrounding whitespace.
    #[must_use]
    pub fn new<E, S>(extensions: E, senders: S) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        let senders = senders
            .into_iter()
            .map(|sender| sender.as_ref().trim().to_string())
            .filter(|sender| !sender.is_empty())
            .collect();

        Self {
            extensions,
            senders,
        }
    }

    /// Returns the normalized extension allow-list.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Returns the sender allow-list.
    #[must_use]
    pub fn senders(&self) -> &[String] {
        &self.senders
    }

    /// Returns `true` if the allow-list contains the wildcard entry.
    #[must_use]
    pub fn accepts_any_sender(&self) -> bool {
        self.senders.iter().any(|s| s == ANY_SENDER)
    }

    /// Case-insensitive suffix match of `filename` against the allowed extensions.
    #[must_use]
    pub fn accepts_filename(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.extensions.iter().any(|ext| {
            lower
                .strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }

    /// Exact match of `sender` against the allow-list, or any sender under the wildcard.
    #[must_use]
    pub fn accepts_sender(&self, sender: &str) -> bool {
        self.accepts_any_sender() || self.senders.iter().any(|s| s == sender)
    }

    /// Returns `true` if an attachment named `filename` sent by `sender` passes both rules.
    #[must_use]
    pub fn accepts(&self, sender: &str, filename: &str) -> bool {
        self.accepts_sender(sender) && self.accepts_filename(filename)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}
