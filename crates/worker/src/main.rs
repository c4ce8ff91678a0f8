//! notary worker binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use notary_core::config::{AppConfig, InstitutionAccountConfig};
use notary_gateway::ChangeFeed;
use notary_worker::{AppState, DirLock, events, keys, poller, quota, sweep};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// notary - file timestamping and storage quota worker
#[derive(Parser, Debug)]
#[command(name = "notaryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "NOTARY_CONFIG", default_value = "config/notary.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll institutional accounts for changes once
    Poll {
        /// Only poll this account
        #[arg(long)]
        account: Option<String>,
        /// Wait for a held lease instead of skipping
        #[arg(long)]
        wait: bool,
    },
    /// Poll every configured account on the poller interval until Ctrl-C
    Run,
    /// Re-verify every file of a project
    Sweep {
        #[arg(long)]
        project: String,
        /// User the checks are performed as
        #[arg(long)]
        user: String,
    },
    /// Print unresolved ledger rows of a project
    Report {
        #[arg(long)]
        project: String,
    },
    /// Handle one storage gateway event payload
    Event {
        /// JSON payload file
        #[arg(long)]
        file: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        project: String,
    },
    /// Recount a user's quota from live files
    Recount {
        #[arg(long)]
        user: String,
    },
    /// Show a user's quota counters
    Quota {
        #[arg(long)]
        user: String,
    },
    /// Make sure a user has a key pair
    Keys {
        #[arg(long)]
        user: String,
    },
    /// Re-resolve a user's default storage region
    Region {
        #[arg(long)]
        user: String,
    },
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("NOTARY_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode output")?
    );
    Ok(())
}

/// Cancelled on the first Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current file");
            trigger.cancel();
        }
    });
    token
}

fn change_feeds(
    config: &AppConfig,
    only: Option<&str>,
) -> Result<Vec<(InstitutionAccountConfig, Arc<dyn ChangeFeed>)>> {
    let timeout = std::time::Duration::from_secs(config.gateway.timeout_secs);
    let mut feeds = Vec::new();
    for account in &config.poller.accounts {
        if only.is_some_and(|id| id != account.account_id) {
            continue;
        }
        let feed = notary_gateway::change_feed_for(account, timeout)
            .with_context(|| format!("failed to create change feed for {}", account.account_id))?;
        feeds.push((account.clone(), feed));
    }
    if let Some(id) = only
        && feeds.is_empty()
    {
        anyhow::bail!("no poller account named {id}");
    }
    Ok(feeds)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("notary v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let state = AppState::from_config(config)
        .await
        .context("failed to initialize worker state")?;

    match args.command {
        Command::Poll { account, wait } => {
            let feeds = change_feeds(&state.config, account.as_deref())?;
            let lock = DirLock::new(&state.config.poller.lock_dir);
            for (account, feed) in &feeds {
                if wait {
                    let stats =
                        poller::poll_account_blocking(&state, account, feed.as_ref(), &lock).await?;
                    print_json(&stats)?;
                } else {
                    match poller::poll_account(&state, account, feed.as_ref(), &lock).await? {
                        Some(stats) => print_json(&stats)?,
                        None => tracing::info!(account_id = %account.account_id, "Lease held, skipped"),
                    }
                }
            }
        }
        Command::Run => {
            let feeds = change_feeds(&state.config, None)?;
            if feeds.is_empty() {
                anyhow::bail!("no poller accounts configured");
            }
            let cancel = shutdown_token();
            poller::run(&state, &feeds, &cancel).await?;
        }
        Command::Sweep { project, user } => {
            let cancel = shutdown_token();
            let stats = sweep::verify_project(&state, &user, &project, &cancel)
                .await
                .context("verification sweep failed")?;
            print_json(&stats)?;
        }
        Command::Report { project } => {
            print_json(&sweep::error_report(&state, &project).await?)?;
        }
        Command::Event {
            file,
            user,
            project,
        } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read event payload {file}"))?;
            let summary = events::handle_payload(&state, &user, &project, &payload).await?;
            print_json(&summary)?;
        }
        Command::Recount { user } => {
            quota::recount_user(&state, &user).await?;
            print_json(&quota::quota_summary(&state, &user).await?)?;
        }
        Command::Quota { user } => {
            print_json(&quota::quota_summary(&state, &user).await?)?;
        }
        Command::Keys { user } => {
            let key_name = keys::ensure_keypair(&state, &user).await?;
            println!("{key_name}");
        }
        Command::Region { user } => {
            let region = quota::update_default_storage(&state, &user).await?;
            println!("{}", region.region_id);
        }
    }

    Ok(())
}
