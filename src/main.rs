//! CLI entry point for `fetch-attachments`.
//!
//! Meant to be run periodically (cron, systemd timer). Exit status tells the
//! caller whether the cache changed: `0` nothing new, `10` new attachments,
//! `1` fatal error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mail_attachment_cache::{
    AttachmentFetcher, FetchConfig, ImapConnector, MailboxConfig, Result, RunLock,
};

const EXIT_NEW_CONTENT: u8 = 10;

#[derive(Parser)]
#[command(name = "fetch-attachments", version, about)]
struct Cli {
    /// IMAP server host name
    #[arg(long, env = "MAIL_CACHE_HOST")]
    host: String,

    /// IMAP server port (implicit TLS)
    #[arg(long, env = "MAIL_CACHE_PORT", default_value_t = mail_attachment_cache::config::DEFAULT_IMAP_PORT)]
    port: u16,

    /// Login user name
    #[arg(long, env = "MAIL_CACHE_USERNAME")]
    username: String,

    /// Login password
    #[arg(long, env = "MAIL_CACHE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Folder to scan
    #[arg(long, env = "MAIL_CACHE_MAILBOX", default_value = mail_attachment_cache::config::DEFAULT_MAILBOX)]
    mailbox: String,

    /// Directory holding the cached attachments
    #[arg(long, env = "MAIL_CACHE_DIR", value_name = "DIR")]
    cache_dir: PathBuf,

    /// Manifest file rebuilt after every run
    #[arg(long, env = "MAIL_CACHE_MANIFEST", value_name = "FILE")]
    manifest: PathBuf,

    /// Allowed attachment extension (repeatable or comma-separated)
    #[arg(
        long = "extension",
        env = "MAIL_CACHE_EXTENSIONS",
        value_delimiter = ',',
        required = true
    )]
    extensions: Vec<String>,

    /// Allowed sender address, `*` for anyone (repeatable or comma-separated)
    #[arg(
        long = "sender",
        env = "MAIL_CACHE_SENDERS",
        value_delimiter = ',',
        required = true
    )]
    senders: Vec<String>,

    /// Directory holding the run lock markers
    #[arg(long, env = "MAIL_CACHE_LOCK_DIR", value_name = "DIR")]
    lock_dir: PathBuf,

    /// Age after which a lock marker is considered stale
    #[arg(long, env = "MAIL_CACHE_LOCK_TIMEOUT_MINUTES", default_value_t = 30)]
    lock_timeout_minutes: u64,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mail_attachment_cache=debug,fetch_attachments=debug"
    } else {
        "mail_attachment_cache=info,fetch_attachments=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::from(EXIT_NEW_CONTENT),
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, category = %e.category(), "Fetch failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mailbox = MailboxConfig::builder()
        .host(cli.host)
        .port(cli.port)
        .username(cli.username)
        .password(cli.password)
        .mailbox(cli.mailbox)
        .build()?;

    let fetch = FetchConfig::builder()
        .cache_dir(&cli.cache_dir)
        .manifest_path(&cli.manifest)
        .allowed_extensions(cli.extensions)
        .allowed_senders(cli.senders)
        .build()?;

    let timeout = Duration::from_secs(cli.lock_timeout_minutes.saturating_mul(60));
    let mut lock = RunLock::new(&cli.lock_dir, timeout);
    if !lock.request()? {
        info!(lock_dir = %cli.lock_dir.display(), "Another run is active, skipping this cycle");
        return Ok(false);
    }

    let outcome = AttachmentFetcher::new(fetch)
        .run(&ImapConnector::new(mailbox))
        .await;
    lock.release()?;

    let new_content = outcome?;
    info!(new_content, "Done");
    Ok(new_content)
}
