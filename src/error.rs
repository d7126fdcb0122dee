//! Error types for the mail-attachment-cache crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`].
//! The crate never retries on its own; re-invocation is up to the caller's scheduler.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching and caching attachments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid sender address in the allow-list.
    #[error("invalid sender address in allow-list: {sender}")]
    InvalidSender {
        /// The rejected entry.
        sender: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (session setup and teardown only)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {username} after {timeout:?}")]
    AuthTimeout {
        /// The login name used for authentication.
        username: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Mailbox selection timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {username}")]
    ImapLogin {
        /// The login name used.
        username: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed")]
    ImapSearch {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID {uid}")]
    ImapFetch {
        /// The message UID.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// The server answered a fetch without an item that was requested.
    #[error("fetch response for UID {uid} is missing {item}")]
    MissingFetchItem {
        /// The message UID.
        uid: u32,
        /// The absent fetch item (e.g. `INTERNALDATE`).
        item: &'static str,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Email parsing errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse email message or header block.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// The message carries no usable sender address.
    #[error("message UID {uid} has no sender address")]
    MissingSender {
        /// The message UID.
        uid: u32,
    },

    /// Failed to decode an attachment part.
    #[error("failed to decode attachment '{filename}'")]
    DecodeAttachment {
        /// Declared filename of the part.
        filename: String,
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// A cache file name is not a valid identity token.
    #[error("malformed identity token '{token}'")]
    MalformedToken {
        /// The offending token.
        token: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Local storage errors (NOT retryable by the scheduler alone)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to create or list the cache directory.
    #[error("failed to read cache directory {}", path.display())]
    CacheDir {
        /// The cache directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an attachment into the cache.
    #[error("failed to write cache entry {}", path.display())]
    WriteEntry {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write or read the manifest.
    #[error("failed to update manifest {}", path.display())]
    Manifest {
        /// The manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to inspect, create or remove a lock marker.
    #[error("lock operation failed on {}", path.display())]
    Lock {
        /// The lock directory or marker file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed
    /// on a later run.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // RETRYABLE errors: network, session setup timeouts, IMAP operations
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. } => true,

            // NOT retryable: config errors, logout, parsing, local storage
            Error::InvalidConfig { .. }
            | Error::InvalidSender { .. }
            | Error::InvalidDnsName { .. }
            | Error::LogoutTimeout { .. }
            | Error::MissingFetchItem { .. }
            | Error::ImapLogout { .. }
            | Error::ParseEmail { .. }
            | Error::MissingSender { .. }
            | Error::DecodeAttachment { .. }
            | Error::MalformedToken { .. }
            | Error::CacheDir { .. }
            | Error::WriteEntry { .. }
            | Error::Manifest { .. }
            | Error::Lock { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. }
            | Error::InvalidSender { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::MissingFetchItem { .. }
            | Error::ImapLogout { .. } => ErrorCategory::Protocol,

            Error::ParseEmail { .. }
            | Error::MissingSender { .. }
            | Error::DecodeAttachment { .. }
            | Error::MalformedToken { .. } => ErrorCategory::Parse,

            Error::CacheDir { .. }
            | Error::WriteEntry { .. }
            | Error::Manifest { .. }
            | Error::Lock { .. } => ErrorCategory::Storage,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Email parsing errors.
    Parse,
    /// Local filesystem errors (cache, manifest, lock).
    Storage,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Storage => write!(f, "storage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // Configuration errors are not retryable
        let err = Error::InvalidConfig {
            message: "bad".into(),
        };
        assert!(!err.is_retryable());

        // Network errors are retryable
        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        // A broken manifest will not fix itself on the next run
        let err = Error::Manifest {
            path: "cache.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidSender {
            sender: "nope".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::ConnectTimeout {
            target: "imap.example.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = Error::MissingFetchItem {
            uid: 7,
            item: "BODYSTRUCTURE",
        };
        assert_eq!(err.category(), ErrorCategory::Protocol);

        let err = Error::Lock {
            path: "/tmp".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.category().to_string(), "storage");
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::ImapFetch {
            uid: 42,
            source: async_imap::error::Error::Bad("boom".into()),
        };
        assert_eq!(err.to_string(), "IMAP fetch failed for UID 42");

        let err = Error::WriteEntry {
            path: PathBuf::from("/cache/x.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(err.to_string().contains("/cache/x.jpg"));
    }
}
