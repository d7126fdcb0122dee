//! Configuration for the mailbox connection and the fetch job.
//!
//! Use the builders to create configurations with sensible defaults:
//!
//! ```
//! use mail_attachment_cache::{FetchConfig, MailboxConfig};
//!
//! let mailbox = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("frame@example.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid mailbox config");
//!
//! let fetch = FetchConfig::builder()
//!     .cache_dir("/var/lib/frame/cache")
//!     .manifest_path("/var/lib/frame/cache.txt")
//!     .allowed_extensions(["jpg", "jpeg", "png"])
//!     .allowed_senders(["*"])
//!     .build()
//!     .expect("valid fetch config");
//! ```

use crate::error::{Error, Result};
use crate::filter::{AttachmentFilter, ANY_SENDER};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default IMAPS port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// The single monitored folder unless configured otherwise.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Configuration for connecting to an IMAP server.
///
/// Create using [`MailboxConfig::builder()`].
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials.
#[derive(Clone)]
pub struct MailboxConfig {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (default: 993 for IMAPS).
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password (protected from accidental logging).
    password: SecretString,
    /// Folder to monitor (default: `INBOX`).
    pub mailbox: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("mailbox", &self.mailbox)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl MailboxConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent accidental logging.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeouts for session setup and teardown.
///
/// Search, describe and body download calls are not bounded; a server that stops
/// answering mid-run blocks the run until the caller's supervision steps in.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            logout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`MailboxConfig`].
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    mailbox: Option<String>,
    timeouts: Option<TimeoutConfig>,
}

impl MailboxConfigBuilder {
    /// Sets the IMAP server hostname (required).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the IMAP server port.
    ///
    /// Default is 993 (IMAPS with TLS).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login name (required).
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the monitored folder.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .auth = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn build(self) -> Result<MailboxConfig> {
        let host = required(self.host, "host")?;
        let username = required(self.username, "username")?;
        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let mailbox = self.mailbox.unwrap_or_else(|| DEFAULT_MAILBOX.to_string());
        if mailbox.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "mailbox must not be empty".into(),
            });
        }

        Ok(MailboxConfig {
            host,
            port: self.port.unwrap_or(DEFAULT_IMAP_PORT),
            username,
            password: SecretString::from(password),
            mailbox,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

/// Where attachments are cached and which ones qualify.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Directory holding one file per cached attachment.
    pub cache_dir: PathBuf,
    /// Text file listing every cached file, rebuilt after each run.
    pub manifest_path: PathBuf,
    /// Extension and sender allow-lists.
    pub filter: AttachmentFilter,
}

impl FetchConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug, Default)]
pub struct FetchConfigBuilder {
    cache_dir: Option<PathBuf>,
    manifest_path: Option<PathBuf>,
    extensions: Vec<String>,
    senders: Vec<String>,
}

impl FetchConfigBuilder {
    /// Sets the cache directory (required). Created on first use if absent.
    #[must_use]
    pub fn cache_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the manifest path (required).
    #[must_use]
    pub fn manifest_path(mut self, path: impl AsRef<Path>) -> Self {
        self.manifest_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds allowed file extensions (at least one required).
    #[must_use]
    pub fn allowed_extensions<I>(mut self, extensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.extensions.extend(extensions.into_iter().map(Into::into));
        self
    }

    /// Adds allowed sender addresses (at least one required; `*` allows everyone).
    #[must_use]
    pub fn allowed_senders<I>(mut self, senders: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.senders.extend(senders.into_iter().map(Into::into));
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is missing, an allow-list is empty, or a sender
    /// entry is neither `*` nor a valid email address.
    pub fn build(self) -> Result<FetchConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| Error::InvalidConfig {
            message: "cache directory is required".into(),
        })?;
        let manifest_path = self.manifest_path.ok_or_else(|| Error::InvalidConfig {
            message: "manifest path is required".into(),
        })?;

        for sender in &self.senders {
            let sender = sender.trim();
            if sender != ANY_SENDER && !EmailAddress::is_valid(sender) {
                return Err(Error::InvalidSender {
                    sender: sender.to_string(),
                });
            }
        }

        let filter = AttachmentFilter::new(&self.extensions, &self.senders);
        if filter.extensions().is_empty() {
            return Err(Error::InvalidConfig {
                message: "at least one allowed extension is required".into(),
            });
        }
        if filter.senders().is_empty() {
            return Err(Error::InvalidConfig {
                message: "at least one allowed sender (or '*') is required".into(),
            });
        }

        Ok(FetchConfig {
            cache_dir,
            manifest_path,
            filter,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig {
            message: format!("{field} is required"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox_builder() -> MailboxConfigBuilder {
        MailboxConfig::builder()
            .host("imap.example.com")
            .username("frame@example.com")
            .password("secret")
    }

    #[test]
    fn test_builder_minimal() {
        let config = mailbox_builder().build().unwrap();

        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.username, "frame@example.com");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.port, 993);
        assert_eq!(config.mailbox, "INBOX");
    }

    #[test]
    fn test_builder_full() {
        let config = mailbox_builder()
            .port(994)
            .mailbox("Frames")
            .connect_timeout(Duration::from_secs(60))
            .auth_timeout(Duration::from_secs(15))
            .build()
            .unwrap();

        assert_eq!(config.port, 994);
        assert_eq!(config.mailbox, "Frames");
        assert_eq!(config.timeouts.connect, Duration::from_secs(60));
        assert_eq!(config.timeouts.auth, Duration::from_secs(15));
        assert_eq!(config.timeouts.select, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_missing_fields() {
        assert!(MailboxConfig::builder()
            .username("u")
            .password("p")
            .build()
            .is_err());
        assert!(MailboxConfig::builder()
            .host("h")
            .password("p")
            .build()
            .is_err());
        assert!(MailboxConfig::builder()
            .host("h")
            .username("u")
            .build()
            .is_err());
        assert!(mailbox_builder().host("  ").build().is_err());
        assert!(mailbox_builder().mailbox("").build().is_err());
    }

    #[test]
    fn test_server_address() {
        let config = mailbox_builder().port(143).build().unwrap();
        assert_eq!(config.server_address(), "imap.example.com:143");
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = mailbox_builder()
            .password("super-secret-password")
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_fetch_config_builds_filter() {
        let config = FetchConfig::builder()
            .cache_dir("/tmp/cache")
            .manifest_path("/tmp/cache.txt")
            .allowed_extensions([".JPG", "png"])
            .allowed_senders(["alice@example.com"])
            .build()
            .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert!(config.filter.accepts("alice@example.com", "a.jpg"));
        assert!(!config.filter.accepts("bob@example.com", "a.jpg"));
    }

    #[test]
    fn test_fetch_config_accepts_wildcard_sender() {
        let config = FetchConfig::builder()
            .cache_dir("c")
            .manifest_path("m")
            .allowed_extensions(["jpg"])
            .allowed_senders(["*"])
            .build()
            .unwrap();

        assert!(config.filter.accepts_any_sender());
    }

    #[test]
    fn test_fetch_config_rejects_invalid_sender() {
        let result = FetchConfig::builder()
            .cache_dir("c")
            .manifest_path("m")
            .allowed_extensions(["jpg"])
            .allowed_senders(["not an address"])
            .build();

        assert!(matches!(result, Err(Error::InvalidSender { .. })));
    }

    #[test]
    fn test_fetch_config_requires_allow_lists() {
        let no_extensions = FetchConfig::builder()
            .cache_dir("c")
            .manifest_path("m")
            .allowed_senders(["*"])
            .build();
        assert!(no_extensions.is_err());

        let no_senders = FetchConfig::builder()
            .cache_dir("c")
            .manifest_path("m")
            .allowed_extensions(["jpg"])
            .build();
        assert!(no_senders.is_err());

        let no_paths = FetchConfig::builder()
            .allowed_extensions(["jpg"])
            .allowed_senders(["*"])
            .build();
        assert!(no_paths.is_err());
    }
}
