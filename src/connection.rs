//! Internal module for establishing TLS connections to IMAP servers.
//!
//! Certificates are validated against the bundled web PKI roots.

use crate::error::{Error, Result};
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Establishes a TLS connection to an IMAP server.
#[instrument(
    name = "connection::establish_tls",
    skip_all,
    fields(imap_host = %imap_host, target_addr = %target_addr)
)]
pub(crate) async fn establish_tls_connection(imap_host: &str, target_addr: &str) -> Result<TlsStream> {
    let connector = create_tls_connector();
    let server_name = parse_server_name(imap_host)?;

    debug!("Establishing TCP connection");

    let tcp_stream = TcpStream::connect(target_addr)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target_addr.to_string(),
            source,
        })?;

    debug!("Performing TLS handshake");

    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target_addr.to_string(),
            source,
        })
}

/// Creates a TLS connector with the web PKI root certificates.
fn create_tls_connector() -> TlsConnector {
    let mut root_cert_store = rustls::RootCertStore::empty();
    root_cert_store.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_server_name() {
        assert!(parse_server_name("imap.example.com").is_ok());
    }

    #[test]
    fn test_parse_invalid_server_name() {
        assert!(matches!(
            parse_server_name(""),
            Err(Error::InvalidDnsName { .. })
        ));
    }
}
