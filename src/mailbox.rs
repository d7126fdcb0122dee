//! Message-oriented view of a remote mailbox.
//!
//! [`Connector`] opens an authenticated [`Mailbox`] session; the session exposes
//! the handful of operations the fetcher needs and never leaks raw protocol
//! traffic. The production implementation is
//! [`ImapConnector`](crate::ImapConnector); anything else that can list, describe
//! and download messages can drive [`AttachmentFetcher`](crate::AttachmentFetcher)
//! as well.

use crate::error::Result;
use crate::filter::AttachmentFilter;
use crate::identity::AttachmentIdentity;
use chrono::{DateTime, Utc};

/// Server-assigned message identifier, stable for the session.
pub type MessageId = u32;

/// Metadata of one remote message, fetched without its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Server identifier.
    pub id: MessageId,
    /// Receipt timestamp, second precision.
    pub received: DateTime<Utc>,
    /// Bare sender address, display name stripped.
    pub sender: String,
    /// Declared attachment filenames, in message order.
    pub attachments: Vec<String>,
}

impl MailboxMessage {
    /// Returns the identity of this message's attachment named `filename`.
    #[must_use]
    pub fn identity(&self, filename: &str) -> AttachmentIdentity {
        AttachmentIdentity::new(self.received, self.sender.as_str(), filename)
    }

    /// Returns the identity tokens of every attachment that passes `filter`.
    ///
    /// Empty if the sender is not allowed.
    #[must_use]
    pub fn candidate_tokens(&self, filter: &AttachmentFilter) -> Vec<String> {
        if !filter.accepts_sender(&self.sender) {
            return Vec::new();
        }
        self.attachments
            .iter()
            .filter(|name| filter.accepts_filename(name))
            .map(|name| self.identity(name).token())
            .collect()
    }
}

/// A downloaded attachment payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Declared filename.
    pub filename: String,
    /// Decoded content.
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("len", &self.data.len())
            .finish()
    }
}

/// An authenticated mailbox session.
///
/// A failed [`select_inbox`](Self::select_inbox) leaves the session unusable.
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// Selects the single monitored folder.
    async fn select_inbox(&mut self) -> Result<()>;

    /// Lists every message in the folder. Order carries no meaning.
    async fn search_all(&mut self) -> Result<Vec<MessageId>>;

    /// Fetches timestamp, sender and declared attachment names without the body.
    async fn describe_message(&mut self, id: MessageId) -> Result<MailboxMessage>;

    /// Downloads the message body and returns its attachment parts whose filename
    /// passes `filter`. Inline parts are never returned, and a message that is not
    /// multipart yields nothing.
    async fn download_attachments(
        &mut self,
        id: MessageId,
        filter: &AttachmentFilter,
    ) -> Result<Vec<Attachment>>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens [`Mailbox`] sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// The session type produced by [`connect`](Self::connect).
    type Mailbox: Mailbox;

    /// Establishes an encrypted, authenticated session.
    async fn connect(&self) -> Result<Self::Mailbox>;

    /// Short description of the remote end for logs.
    fn endpoint(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ANY_SENDER;
    use chrono::TimeZone;

    fn message() -> MailboxMessage {
        MailboxMessage {
            id: 1,
            received: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            sender: "alice@example.com".into(),
            attachments: vec!["photo.jpg".into(), "virus.exe".into(), "b.PNG".into()],
        }
    }

    #[test]
    fn test_candidate_tokens_apply_both_rules() {
        let filter = AttachmentFilter::new(["jpg", "png"], ["alice@example.com"]);
        let tokens = message().candidate_tokens(&filter);
        assert_eq!(
            tokens,
            vec![
                message().identity("photo.jpg").token(),
                message().identity("b.PNG").token()
            ]
        );

        let strangers_only = AttachmentFilter::new(["jpg"], ["bob@example.com"]);
        assert!(message().candidate_tokens(&strangers_only).is_empty());

        let anyone = AttachmentFilter::new(["exe"], [ANY_SENDER]);
        assert_eq!(message().candidate_tokens(&anyone).len(), 1);
    }

    #[test]
    fn test_attachment_debug_hides_payload() {
        let attachment = Attachment {
            filename: "a.jpg".into(),
            data: vec![0xff; 4096],
        };
        let debug = format!("{attachment:?}");
        assert!(debug.contains("4096"));
        assert!(!debug.contains("255"));
    }
}
