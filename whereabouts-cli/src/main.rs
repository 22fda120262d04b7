//! Whereabouts CLI
//!
//! Looks up account location metadata, serves the lookup API and manages the
//! on-disk cache.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whereabouts_api::{build_coordinator, ApiConfig, ApiServer};
use whereabouts_cache::{FileStore, LookupCache};
use whereabouts_core::config::WhereaboutsConfig;
use whereabouts_core::traits::Notifier;
use whereabouts_core::types::{AccountLocation, Platform};
use whereabouts_dispatch::format_countdown;

/// Whereabouts - cached, rate-aware account location lookups
#[derive(Parser)]
#[command(name = "whereabouts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Cache file (memory-only when unset)
    #[arg(long, global = true, env = "WHEREABOUTS_CACHE_PATH")]
    cache_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more accounts
    Lookup {
        /// Account handles
        #[arg(required = true)]
        keys: Vec<String>,
        /// Bearer token for the remote API
        #[arg(long, env = "WHEREABOUTS_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: Option<String>,
        /// CSRF token for the remote API
        #[arg(long, env = "WHEREABOUTS_CSRF_TOKEN", hide_env_values = true)]
        csrf_token: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001", env = "WHEREABOUTS_PORT")]
        port: u16,
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0", env = "WHEREABOUTS_BIND")]
        bind: IpAddr,
        /// Bearer token for the remote API
        #[arg(long, env = "WHEREABOUTS_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: Option<String>,
        /// CSRF token for the remote API
        #[arg(long, env = "WHEREABOUTS_CSRF_TOKEN", hide_env_values = true)]
        csrf_token: Option<String>,
    },

    /// Inspect or clear the cache file
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove every cached entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "whereabouts=debug,info"
    } else {
        "whereabouts=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(cli.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    let mut config = WhereaboutsConfig::from_env();
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Lookup { keys, bearer_token, csrf_token, json } => {
            apply_credentials(&mut config, bearer_token, csrf_token)?;
            cmd_lookup(config, cli.cache_path, &keys, json).await
        }
        Commands::Serve { port, bind, bearer_token, csrf_token } => {
            apply_credentials(&mut config, bearer_token, csrf_token)?;
            cmd_serve(config, cli.cache_path, bind, port).await
        }
        Commands::Cache { action } => {
            let path = cli
                .cache_path
                .context("No cache file configured (use --cache-path or WHEREABOUTS_CACHE_PATH)")?;
            match action {
                CacheAction::Stats => cmd_cache_stats(config, path).await,
                CacheAction::Clear { yes } => cmd_cache_clear(config, path, yes).await,
            }
        }
    }
}

/// Installs credentials; lookups would queue forever without them.
fn apply_credentials(
    config: &mut WhereaboutsConfig,
    bearer_token: Option<String>,
    csrf_token: Option<String>,
) -> Result<()> {
    match (bearer_token, csrf_token) {
        (Some(bearer), Some(csrf)) => {
            config.client.bearer_token = Some(bearer);
            config.client.csrf_token = Some(csrf);
            Ok(())
        }
        _ => bail!("Missing credentials: set --bearer-token and --csrf-token (or WHEREABOUTS_BEARER_TOKEN / WHEREABOUTS_CSRF_TOKEN)"),
    }
}

/// Prints the rate-limit countdown to the terminal.
struct TerminalNotifier {
    progress: Option<ProgressBar>,
}

impl TerminalNotifier {
    fn print(&self, line: String) {
        match &self.progress {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn show(&self, reset_at: DateTime<Utc>) {
        let remaining = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.print(format!(
            "{} {}",
            "⏳ Rate limited.".yellow().bold(),
            format!("Retry in {}", format_countdown(remaining)).yellow()
        ));
    }

    fn hide(&self) {
        self.print(format!("{}", "Rate limit countdown cleared".dimmed()));
    }

    fn countdown(&self, remaining: Duration) {
        if let Some(pb) = &self.progress {
            pb.set_message(format!("rate limited, retry in {}", format_countdown(remaining)));
        }
    }
}

/// Look up accounts
async fn cmd_lookup(
    config: WhereaboutsConfig,
    cache_path: Option<PathBuf>,
    keys: &[String],
    json: bool,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("looking up {} account(s)", keys.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let notifier = Arc::new(TerminalNotifier {
        progress: Some(pb.clone()),
    });
    let coordinator = build_coordinator(&config, cache_path.as_deref(), notifier)
        .await
        .context("Failed to start lookup pipeline")?;

    let lookups = keys.iter().map(|key| coordinator.lookup(key));
    let results = futures::future::join_all(lookups).await;
    coordinator.shutdown().await;
    pb.finish_and_clear();
    info!(
        requested = keys.len(),
        found = results.iter().filter(|r| r.is_some()).count(),
        "Lookups finished"
    );

    if json {
        let out: Vec<_> = keys
            .iter()
            .zip(&results)
            .map(|(key, location)| serde_json::json!({ "key": key, "location": location }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (key, location) in keys.iter().zip(results) {
        print_location(key, location.as_ref());
    }
    Ok(())
}

fn print_location(key: &str, location: Option<&AccountLocation>) {
    let Some(location) = location else {
        println!("{} {}", format!("@{}", key).bold(), "no data".dimmed());
        return;
    };

    println!("{}", format!("@{}", key).cyan().bold());
    if let Some(based_in) = &location.account_based_in {
        println!("   {} {}", "Based in:".dimmed(), based_in.green());
    }
    if let Some(via) = &location.connected_via {
        let platform = match location.connection_platform() {
            Some(Platform::AppStore) => "App Store",
            Some(Platform::PlayStore) => "Play Store",
            _ => "Web",
        };
        println!("   {} {} ({})", "Connected via:".dimmed(), via, platform.yellow());
    }
    if let Some(created) = &location.created_at {
        println!("   {} {}", "Created:".dimmed(), created);
    }
}

/// Run API server
async fn cmd_serve(
    config: WhereaboutsConfig,
    cache_path: Option<PathBuf>,
    bind: IpAddr,
    port: u16,
) -> Result<()> {
    println!("{}", "🚀 Starting Whereabouts API server...".cyan().bold());
    println!("   {} http://{}:{}", "Listening on:".green(), bind, port);
    println!("   {} http://{}:{}/health", "Health check:".dimmed(), bind, port);
    println!("\n   Press Ctrl+C to stop.\n");

    let api_config = ApiConfig {
        bind,
        port,
        cache_path,
        lookup: config,
        ..ApiConfig::from_env()
    };
    let server = ApiServer::with_notifier(api_config, Arc::new(TerminalNotifier { progress: None }))
        .await
        .context("Failed to start API server")?;
    server.run().await?;

    Ok(())
}

async fn load_cache(config: WhereaboutsConfig, path: &Path) -> LookupCache {
    LookupCache::load(config.cache, Arc::new(FileStore::new(path))).await
}

/// Show cache statistics
async fn cmd_cache_stats(config: WhereaboutsConfig, path: PathBuf) -> Result<()> {
    let cache = load_cache(config, &path).await;
    let stats = cache.stats();

    println!("{} {}", "📦 Cache:".cyan().bold(), path.display());
    println!("   {} {}/{}", "Entries:".dimmed(), stats.total_entries, stats.capacity);
    println!("   {} {}", "Valid:".dimmed(), stats.valid_entries.to_string().green());
    println!("   {} {}", "Errors:".dimmed(), stats.error_entries.to_string().yellow());
    println!("   {} {}", "Expired:".dimmed(), stats.expired_entries);

    Ok(())
}

/// Clear the cache file
async fn cmd_cache_clear(config: WhereaboutsConfig, path: PathBuf, yes: bool) -> Result<()> {
    let cache = load_cache(config, &path).await;
    let count = cache.len();

    if count == 0 {
        println!("{}", "Cache is already empty.".yellow());
        return Ok(());
    }

    let confirmed = yes
        || dialoguer::Confirm::new()
            .with_prompt(format!("Remove {} cached entries from {}?", count, path.display()))
            .default(false)
            .interact()?;
    if !confirmed {
        println!("{}", "Aborted.".dimmed());
        return Ok(());
    }

    cache.clear();
    cache.flush().await;
    println!("{} {} entries removed", "✅".green(), count);

    Ok(())
}
