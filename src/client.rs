//! IMAP implementation of [`Connector`] and [`Mailbox`].
//!
//! # Example
//!
//! ```no_run
//! use mail_attachment_cache::{Connector, ImapConnector, Mailbox, MailboxConfig};
//!
//! # async fn example() -> mail_attachment_cache::Result<()> {
//! let config = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("frame@example.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let mut mailbox = ImapConnector::new(config).connect().await?;
//! mailbox.select_inbox().await?;
//! for uid in mailbox.search_all().await? {
//!     let message = mailbox.describe_message(uid).await?;
//!     println!("{} from {}: {:?}", uid, message.sender, message.attachments);
//! }
//! mailbox.logout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::MailboxConfig;
use crate::connection;
use crate::error::{Error, Result};
use crate::filter::AttachmentFilter;
use crate::mailbox::{Attachment, Connector, Mailbox, MailboxMessage, MessageId};
use crate::parser;
use crate::session::{self, AuthConfig, ImapSession};
use chrono::Utc;
use tracing::{debug, instrument};

/// Opens TLS-secured, password-authenticated IMAP sessions.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: MailboxConfig,
}

impl ImapConnector {
    /// Creates a connector for `config`.
    #[must_use]
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Returns the connection configuration.
    #[must_use]
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }
}

impl Connector for ImapConnector {
    type Mailbox = ImapMailbox;

    /// Establishes a TLS connection and authenticates.
    ///
    /// Both steps are bounded by the configured connect and auth timeouts.
    #[instrument(
        name = "ImapConnector::connect",
        skip_all,
        fields(
            imap_host = %self.config.host,
            username = %self.config.username
        )
    )]
    async fn connect(&self) -> Result<ImapMailbox> {
        let config = &self.config;
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&config.host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let auth_config = AuthConfig {
            username: &config.username,
            password: config.password(),
        };

        let session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, &auth_config),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            username: config.username.clone(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        Ok(ImapMailbox {
            session: Box::new(session),
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}@{}", self.config.username, self.config.server_address())
    }
}

/// An authenticated IMAP session.
///
/// Created by [`ImapConnector::connect`](Connector::connect).
pub struct ImapMailbox {
    session: Box<ImapSession>,
    config: MailboxConfig,
}

impl Mailbox for ImapMailbox {
    #[instrument(
        name = "ImapMailbox::select_inbox",
        skip(self),
        fields(mailbox = %self.config.mailbox)
    )]
    async fn select_inbox(&mut self) -> Result<()> {
        let mailbox = &self.config.mailbox;
        let timeout = self.config.timeouts.select;

        tokio::time::timeout(timeout, session::select_mailbox(&mut self.session, mailbox))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: mailbox.clone(),
                timeout,
            })?
    }

    async fn search_all(&mut self) -> Result<Vec<MessageId>> {
        session::search_all(&mut self.session).await
    }

    #[instrument(name = "ImapMailbox::describe_message", skip(self))]
    async fn describe_message(&mut self, uid: MessageId) -> Result<MailboxMessage> {
        let fetch = session::fetch_description(&mut self.session, uid).await?;

        let received = fetch
            .internal_date()
            .ok_or(Error::MissingFetchItem {
                uid,
                item: "INTERNALDATE",
            })?
            .with_timezone(&Utc);

        let header = fetch.header().ok_or(Error::MissingFetchItem {
            uid,
            item: "BODY[HEADER]",
        })?;
        let sender = parser::sender_from_headers(header)?.ok_or(Error::MissingSender { uid })?;

        let structure = fetch.bodystructure().ok_or(Error::MissingFetchItem {
            uid,
            item: "BODYSTRUCTURE",
        })?;
        let attachments = parser::declared_attachments(structure);

        debug!(
            sender = %sender,
            received = %received,
            attachment_count = attachments.len(),
            "Described message"
        );

        Ok(MailboxMessage {
            id: uid,
            received,
            sender,
            attachments,
        })
    }

    #[instrument(name = "ImapMailbox::download_attachments", skip(self, filter))]
    async fn download_attachments(
        &mut self,
        uid: MessageId,
        filter: &AttachmentFilter,
    ) -> Result<Vec<Attachment>> {
        let body = session::fetch_body(&mut self.session, uid).await?;
        parser::extract_attachments(&body, |name| filter.accepts_filename(name))
    }

    #[instrument(name = "ImapMailbox::logout", skip(self))]
    async fn logout(&mut self) -> Result<()> {
        let timeout = self.config.timeouts.logout;

        tokio::time::timeout(timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("imap_host", &self.config.host)
            .field("username", &self.config.username)
            .field("mailbox", &self.config.mailbox)
            .finish_non_exhaustive()
    }
}
