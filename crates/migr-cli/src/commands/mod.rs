pub mod auth;
pub mod config;
pub mod import;
pub mod sync;
pub mod targets;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use migr_api::ApiClient;
use migr_auth::{resolve_token, CredentialStore, KeyringStore, PLATFORM_TOKEN_ENV, PLATFORM_TOKEN_KEY};
use migr_core::config::MigrConfig;
use migr_core::models::source::SourceType;
use migr_log::FileLogSink;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum Command {
    /// Initialize and show migr configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
    /// Store or remove API tokens in the OS keychain
    Auth {
        #[command(subcommand)]
        action: auth::AuthAction,
    },
    /// Import every target listed in an import file
    Import(import::ImportArgs),
    /// Reconcile monitored projects with their repositories
    Sync(sync::SyncArgs),
    /// Build import files from a host's repositories
    Targets {
        #[command(subcommand)]
        action: targets::TargetsAction,
    },
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Config { action } => config::run(action),
        Command::Auth { action } => auth::run(action),
        Command::Import(args) => import::run(args).await,
        Command::Sync(args) => sync::run(args).await,
        Command::Targets { action } => targets::run(action).await,
    }
}

/// Platform API token from `MIGR_TOKEN` or the keychain.
pub(crate) fn platform_token() -> anyhow::Result<String> {
    let store = KeyringStore::new();
    resolve_token(&store, PLATFORM_TOKEN_KEY, PLATFORM_TOKEN_ENV, |k| {
        std::env::var(k).ok()
    })?
    .ok_or_else(|| {
        anyhow::anyhow!("no API token: set {PLATFORM_TOKEN_ENV} or run `migr auth set platform`")
    })
}

/// Host token for `kind` from its environment variable or the keychain.
pub(crate) fn host_token(kind: SourceType) -> anyhow::Result<String> {
    let store = KeyringStore::new();
    resolve_token(&store, &kind.credential_key(), kind.token_env_var(), |k| {
        std::env::var(k).ok()
    })?
    .ok_or_else(|| {
        anyhow::anyhow!(
            "no {kind} token: set {} or run `migr auth set {kind}`",
            kind.token_env_var()
        )
    })
}

/// Create the log directory and an API client writing into it.
pub(crate) fn api_client(config: &MigrConfig) -> anyhow::Result<(ApiClient, PathBuf)> {
    let log_dir = config.resolved_log_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let sink = Arc::new(FileLogSink::new(log_dir.clone()));
    let api = ApiClient::from_config(config, &platform_token()?, sink)?;
    Ok((api, log_dir))
}

/// A token cancelled on the first ctrl-c. Running batches finish; later
/// batches are not started.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing the current batch...");
            trigger.cancel();
        }
    });
    cancel
}

pub(crate) fn batch_progress() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
