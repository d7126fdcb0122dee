//! Integration tests for mail-attachment-cache.
//!
//! The live tests require a real IMAP server and are ignored by default.
//! To run them:
//!
//! ```bash
//! # Set environment variables (or put them in a .env file)
//! export MAIL_CACHE_TEST_HOST="imap.example.com"
//! export MAIL_CACHE_TEST_USERNAME="your@email.com"
//! export MAIL_CACHE_TEST_PASSWORD="your-app-password"
//!
//! # Run with the integration-tests feature
//! cargo test --features integration-tests -- --ignored
//! ```

use mail_attachment_cache::{
    AttachmentFetcher, Connector, Error, ErrorCategory, FetchConfig, ImapConnector, Mailbox,
    MailboxConfig,
};
use std::env;
use std::time::Duration;
use tempfile::TempDir;

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_config() -> Option<MailboxConfig> {
    dotenvy::dotenv().ok();
    let host = env::var("MAIL_CACHE_TEST_HOST").ok()?;
    let username = env::var("MAIL_CACHE_TEST_USERNAME").ok()?;
    let password = env::var("MAIL_CACHE_TEST_PASSWORD").ok()?;

    MailboxConfig::builder()
        .host(host)
        .username(username)
        .password(password)
        .build()
        .ok()
}

fn get_fetch_config(root: &TempDir) -> FetchConfig {
    FetchConfig::builder()
        .cache_dir(root.path().join("cache"))
        .manifest_path(root.path().join("cache.txt"))
        .allowed_extensions(["jpg", "jpeg", "png", "gif"])
        .allowed_senders(["*"])
        .build()
        .expect("valid fetch config")
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_connect_select_and_logout() {
    let config = get_test_config().expect("Test config from environment variables");

    let mut mailbox = ImapConnector::new(config)
        .connect()
        .await
        .expect("Failed to connect");

    mailbox.select_inbox().await.expect("Failed to select");
    mailbox.logout().await.expect("Failed to logout");
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_describe_every_message() {
    let config = get_test_config().expect("Test config from environment variables");

    let mut mailbox = ImapConnector::new(config)
        .connect()
        .await
        .expect("Failed to connect");
    mailbox.select_inbox().await.expect("Failed to select");

    for uid in mailbox.search_all().await.expect("Failed to search") {
        match mailbox.describe_message(uid).await {
            Ok(message) => {
                assert_eq!(message.id, uid);
                assert!(message.sender.contains('@'));
                println!("{uid}: {} {:?}", message.sender, message.attachments);
            }
            Err(e) => println!("{uid}: could not describe: {e}"),
        }
    }

    mailbox.logout().await.expect("Failed to logout");
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_fetch_twice_is_idempotent() {
    let config = get_test_config().expect("Test config from environment variables");
    let root = TempDir::new().unwrap();
    let fetcher = AttachmentFetcher::new(get_fetch_config(&root));
    let connector = ImapConnector::new(config);

    let first = fetcher.run_report(&connector).await.expect("First run");
    println!("First run: {first:?}");

    let second = fetcher.run_report(&connector).await.expect("Second run");
    assert_eq!(second.files_written, 0);
    assert!(!second.new_content());
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires network access"]
async fn test_unreachable_server_is_contained() {
    let config = MailboxConfig::builder()
        .host("localhost")
        .port(1)
        .username("nobody")
        .password("wrong-password")
        .connect_timeout(Duration::from_secs(2))
        .build()
        .expect("valid config structure");

    let connector = ImapConnector::new(config);
    let err = connector.connect().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err.category(),
        ErrorCategory::Network | ErrorCategory::Timeout
    ));

    let root = TempDir::new().unwrap();
    let fetcher = AttachmentFetcher::new(get_fetch_config(&root));
    assert!(!fetcher.run(&connector).await.unwrap());
    assert!(root.path().join("cache.txt").exists());
}

#[tokio::test]
async fn test_invalid_sender_format() {
    let result = FetchConfig::builder()
        .cache_dir("/tmp/cache")
        .manifest_path("/tmp/cache.txt")
        .allowed_extensions(["jpg"])
        .allowed_senders(["not-an-email"])
        .build();

    assert!(matches!(result, Err(Error::InvalidSender { .. })));
}

#[tokio::test]
async fn test_missing_required_fields() {
    // Missing host
    let result = MailboxConfig::builder()
        .username("user")
        .password("password")
        .build();
    assert!(result.is_err());

    // Missing password
    let result = MailboxConfig::builder()
        .host("imap.example.com")
        .username("user")
        .build();
    assert!(result.is_err());

    // Missing allow-lists
    let result = FetchConfig::builder()
        .cache_dir("/tmp/cache")
        .manifest_path("/tmp/cache.txt")
        .build();
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}
