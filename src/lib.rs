//! # mail-attachment-cache
//!
//! Polls a mailbox over IMAP and keeps a local cache of attachments that match
//! an extension and sender allow-list, for consumers such as a photo frame that
//! only ever reads the cache.
//!
//! The crate provides:
//! - [`AttachmentFetcher`]: one fetch pass from mailbox to cache to manifest
//! - [`AttachmentCache`]: the cache directory, its diff against the mailbox and
//!   the rebuilt manifest
//! - [`RunLock`]: marker-file mutual exclusion between overlapping invocations
//! - [`identity`]: the filesystem-safe token naming each cached attachment
//! - [`ImapConnector`]: the TLS IMAP implementation of the [`Connector`] and
//!   [`Mailbox`] traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_attachment_cache::{AttachmentFetcher, FetchConfig, ImapConnector, MailboxConfig, RunLock};
//!
//! # async fn example() -> mail_attachment_cache::Result<()> {
//! let mailbox = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("frame@example.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let fetch = FetchConfig::builder()
//!     .cache_dir("/var/lib/frame/images")
//!     .manifest_path("/var/lib/frame/images.txt")
//!     .allowed_extensions(["jpg", "jpeg", "png"])
//!     .allowed_senders(["grandma@example.com"])
//!     .build()?;
//!
//! let mut lock = RunLock::new("/var/lib/frame", RunLock::DEFAULT_TIMEOUT);
//! if lock.request()? {
//!     let new_content = AttachmentFetcher::new(fetch)
//!         .run(&ImapConnector::new(mailbox))
//!         .await?;
//!     println!("new content: {new_content}");
//!     lock.release()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. A fetch run
//! only returns local storage errors; mailbox errors are logged and folded into
//! the run outcome. [`Error::category`] and [`Error::is_retryable`] help callers
//! that drive the mailbox directly:
//!
//! ```
//! use mail_attachment_cache::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient {} error: {}", error.category(), error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Spans are named after the
//! operation:
//!
//! - `AttachmentFetcher::run` - One fetch pass
//! - `AttachmentCache::list` / `AttachmentCache::write_manifest` - Cache access
//! - `RunLock::request` - Lock acquisition
//! - `ImapConnector::connect` - Connection and login
//! - `ImapMailbox::describe_message` / `ImapMailbox::download_attachments` - Per message
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! Standard fields: `imap_host`, `mailbox`, `uid`, `cache_dir`, `lock_dir`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod identity;
pub mod lock;
pub mod mailbox;

// Internal modules
mod client;
mod connection;
mod parser;
mod session;

// Re-exports for ergonomic API
pub use cache::AttachmentCache;
pub use client::{ImapConnector, ImapMailbox};
pub use config::{FetchConfig, FetchConfigBuilder, MailboxConfig, MailboxConfigBuilder, TimeoutConfig};
pub use error::{Error, ErrorCategory, Result};
pub use fetcher::{AttachmentFetcher, FetchReport};
pub use filter::AttachmentFilter;
pub use identity::AttachmentIdentity;
pub use lock::RunLock;
pub use mailbox::{Attachment, Connector, Mailbox, MailboxMessage, MessageId};
pub use parser::{extract_attachments, sender_from_headers};
