//! Internal module for parsing message metadata and bodies.
//!
//! Both the cheap metadata pass (IMAP `BODYSTRUCTURE` plus the header block) and
//! the body download (full RFC 822 message) must agree on which parts are
//! attachments and what they are called, otherwise a part would be announced as
//! missing on every run. Both sides therefore select parts the same way:
//! disposition `attachment`, name from the disposition `filename` parameter with
//! the content-type `name` parameter as fallback, encoded words decoded, and
//! only below a multipart top level. `BODYSTRUCTURE` parameters are turned back
//! into header text and parsed by mailparse, so RFC 2231 charsets and
//! continuations decode the same way on both sides.

use crate::error::{Error, Result};
use crate::mailbox::Attachment;
use async_imap::imap_proto::{BodyContentCommon, BodyStructure};
use mailparse::{
    DispositionType, MailAddr, MailHeaderMap, ParsedContentDisposition, ParsedContentType,
    ParsedMail,
};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Key/value parameters as reported in a `BODYSTRUCTURE` response.
type BodyParams<'a> = [(Cow<'a, str>, Cow<'a, str>)];

/// Extracts the bare sender address from a raw header block.
///
/// Returns `Ok(None)` if there is no `From` header or it holds no address.
pub fn sender_from_headers(raw: &[u8]) -> Result<Option<String>> {
    let (headers, _) = mailparse::parse_headers(raw).map_err(|source| Error::ParseEmail { source })?;

    let Some(from) = headers.get_first_value("From") else {
        return Ok(None);
    };

    let addresses = mailparse::addrparse(&from).map_err(|source| Error::ParseEmail { source })?;

    Ok(addresses.iter().find_map(|addr| match addr {
        MailAddr::Single(info) => Some(info.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
    }))
}

/// Lists the filenames of attachment parts declared in a `BODYSTRUCTURE`.
///
/// Empty unless the top-level structure is multipart, matching what
/// [`extract_attachments`] returns for the downloaded body.
pub(crate) fn declared_attachments(structure: &BodyStructure<'_>) -> Vec<String> {
    let mut names = Vec::new();
    if matches!(structure, BodyStructure::Multipart { .. }) {
        collect_declared(structure, &mut names);
    }
    names
}

fn collect_declared(structure: &BodyStructure<'_>, names: &mut Vec<String>) {
    match structure {
        BodyStructure::Multipart { bodies, .. } => {
            for body in bodies {
                collect_declared(body, names);
            }
        }
        // An attached message/rfc822 is one attachment; its inner parts are not
        BodyStructure::Basic { common, .. }
        | BodyStructure::Text { common, .. }
        | BodyStructure::Message { common, .. } => {
            names.extend(declared_name(common));
        }
    }
}

fn declared_name(common: &BodyContentCommon<'_>) -> Option<String> {
    let disposition = common.disposition.as_ref()?;

    let disposition = mailparse::parse_content_disposition(&header_value(
        "Content-Disposition",
        &disposition.ty.to_ascii_lowercase(),
        disposition.params.as_deref(),
    ));
    let ctype = mailparse::parse_content_type(&header_value(
        "Content-Type",
        &format!("{}/{}", common.ty.ty, common.ty.subtype).to_ascii_lowercase(),
        common.ty.params.as_deref(),
    ));

    attachment_name(&disposition, &ctype)
}

/// Rebuilds a MIME header from `BODYSTRUCTURE` fields and returns its decoded
/// value, as mailparse would see it in the message itself.
fn header_value(name: &str, value: &str, params: Option<&BodyParams<'_>>) -> String {
    let mut line = format!("{name}: {value}");
    for (key, val) in params.into_iter().flatten() {
        let key = key.to_ascii_lowercase();
        // RFC 2231 extended values are tokens and must stay unquoted
        if key.ends_with('*') {
            line.push_str(&format!("; {key}={val}"));
        } else {
            line.push_str(&format!("; {key}=\"{val}\""));
        }
    }

    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => line[name.len() + 2..].to_string(),
    }
}

/// Filename of an attachment part, or `None` if the part is not an attachment.
///
/// Shared by the metadata and the download path.
fn attachment_name(
    disposition: &ParsedContentDisposition,
    ctype: &ParsedContentType,
) -> Option<String> {
    if !matches!(disposition.disposition, DispositionType::Attachment) {
        return None;
    }

    disposition
        .params
        .get("filename")
        .or_else(|| ctype.params.get("name"))
        .map(|name| normalize_filename(name))
}

/// Decodes RFC 2047 encoded words in a filename; plain names pass through.
pub(crate) fn normalize_filename(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.to_string();
    }

    let line = format!("X: {raw}");
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_string(),
    }
}

/// Extracts attachment parts from a raw RFC 822 message.
///
/// Only leaf parts with disposition `attachment` and a filename accepted by
/// `accept` are returned. A message whose top-level type is not multipart yields
/// nothing; that is logged, not an error.
pub fn extract_attachments(
    raw: &[u8],
    accept: impl Fn(&str) -> bool,
) -> Result<Vec<Attachment>> {
    let parsed = mailparse::parse_mail(raw).map_err(|source| Error::ParseEmail { source })?;

    if !is_multipart(&parsed) {
        warn!(
            content_type = %parsed.ctype.mimetype,
            "Message is not multipart, no attachments to extract"
        );
        return Ok(Vec::new());
    }

    let mut attachments = Vec::new();
    collect_parts(&parsed, &accept, &mut attachments)?;
    Ok(attachments)
}

fn collect_parts(
    part: &ParsedMail<'_>,
    accept: &impl Fn(&str) -> bool,
    out: &mut Vec<Attachment>,
) -> Result<()> {
    if is_multipart(part) {
        for sub in &part.subparts {
            collect_parts(sub, accept, out)?;
        }
        return Ok(());
    }

    let Some(filename) = attachment_name(&part.get_content_disposition(), &part.ctype) else {
        return Ok(());
    };

    // Re-checked here: one message may carry allowed and disallowed files
    if !accept(&filename) {
        debug!(filename = %filename, "Skipping attachment with disallowed name");
        return Ok(());
    }

    let data = part
        .get_body_raw()
        .map_err(|source| Error::DecodeAttachment {
            filename: filename.clone(),
            source,
        })?;

    out.push(Attachment { filename, data });
    Ok(())
}

fn is_multipart(part: &ParsedMail<'_>) -> bool {
    part.ctype.mimetype.to_ascii_lowercase().starts_with("multipart/")
}
