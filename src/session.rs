//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use async_imap::types::Fetch;
use async_imap::Session;
use futures::TryStreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Metadata fetched per message: receipt date, structure, and the header block
/// (for the sender). `PEEK` keeps the message unread.
const DESCRIBE_QUERY: &str = "(UID INTERNALDATE BODYSTRUCTURE BODY.PEEK[HEADER])";

/// Full message body, without setting `\Seen`.
const BODY_QUERY: &str = "(UID BODY.PEEK[])";

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(username = %config.username)
)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.username, config.password)
        .await
        .map_err(|e| Error::ImapLogin {
            username: config.username.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    let selected = session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    debug!(exists = selected.exists, "Mailbox selected");

    Ok(())
}

/// Lists the UIDs of every message in the selected mailbox, ascending.
#[instrument(name = "session::search_all", skip(session))]
pub(crate) async fn search_all(session: &mut ImapSession) -> Result<Vec<u32>> {
    let uids = session
        .uid_search("ALL")
        .await
        .map_err(|source| Error::ImapSearch { source })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Found emails");

    Ok(uids)
}

/// Fetches the metadata items of one message.
#[instrument(name = "session::fetch_description", skip(session))]
pub(crate) async fn fetch_description(session: &mut ImapSession, uid: u32) -> Result<Fetch> {
    fetch_one(session, uid, DESCRIBE_QUERY).await
}

/// Fetches the raw RFC 822 body of one message.
#[instrument(name = "session::fetch_body", skip(session))]
pub(crate) async fn fetch_body(session: &mut ImapSession, uid: u32) -> Result<Vec<u8>> {
    let fetch = fetch_one(session, uid, BODY_QUERY).await?;

    let body = fetch
        .body()
        .ok_or(Error::MissingFetchItem { uid, item: "BODY[]" })?;

    debug!(body_len = body.len(), "Fetched message body");

    Ok(body.to_vec())
}

/// Runs a UID FETCH for a single message and returns its response.
async fn fetch_one(session: &mut ImapSession, uid: u32, query: &str) -> Result<Fetch> {
    let fetches: Vec<Fetch> = session
        .uid_fetch(uid.to_string(), query)
        .await
        .map_err(|source| Error::ImapFetch { uid, source })?
        .try_collect()
        .await
        .map_err(|source| Error::ImapFetch { uid, source })?;

    // Servers may interleave unsolicited FETCH responses for other messages
    let position = fetches
        .iter()
        .position(|f| f.uid == Some(uid))
        .or(if fetches.len() == 1 { Some(0) } else { None });

    position
        .and_then(|i| fetches.into_iter().nth(i))
        .ok_or(Error::MissingFetchItem { uid, item: "FETCH response" })
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}
