use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pmoconfig::{Config, MigrationOutcome, get_config};
use pmodlna::{
    DeviceIdentity, DlnaConfigExt, MediaDescriptor, NegotiationOptions, ProfileCatalogue,
    ProfileSource,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "DLNA playback negotiation", long_about = None)]
struct Args {
    /// Configuration directory (defaults to $PMODLNA_CONFIG or ~/.pmodlna)
    #[arg(short, long)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Negotiate one media item and print the decision as JSON
    Negotiate {
        /// Client identity, as JSON or @file
        #[arg(short, long)]
        identity: String,
        /// Media descriptor, as JSON or @file
        #[arg(short, long)]
        media: String,
    },
    /// List the loaded profiles
    Profiles,
    /// Read `{"identity": ..., "media": ...}` lines on stdin and answer one
    /// JSON negotiation per line. SIGHUP reloads the profiles.
    Serve,
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    identity: DeviceIdentity,
    media: MediaDescriptor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ========== PHASE 1 : Configuration ==========
    let config = match &args.config_dir {
        Some(dir) => Arc::new(Config::load_config(dir)?),
        None => get_config(),
    };
    init_logging(&config);

    match config.migrate_legacy_network() {
        MigrationOutcome::Migrated => info!("✅ network.xml migrated to the current schema"),
        MigrationOutcome::AlreadyMigrated => {}
        MigrationOutcome::Skipped { reason } => info!("network.xml not migrated: {}", reason),
    }

    // ========== PHASE 2 : Profils DLNA ==========
    info!("📺 Loading DLNA profiles...");
    let source = config.dlna_profile_source()?;
    let report = source.load()?;
    for error in &report.rejected {
        warn!("⚠️ {}", error);
    }
    let catalogue = Arc::new(ProfileCatalogue::new(report.set));
    let options = config.dlna_negotiation_options();

    // ========== PHASE 3 : Commande ==========
    match args.command {
        Command::Negotiate { identity, media } => {
            let identity: DeviceIdentity = read_json(&identity).context("invalid identity")?;
            let media: MediaDescriptor = read_json(&media).context("invalid media")?;
            let negotiation = catalogue.negotiate(&identity, &media, options);
            println!("{}", serde_json::to_string_pretty(&negotiation)?);
        }
        Command::Profiles => {
            let set = catalogue.snapshot();
            for profile in set.profiles() {
                println!("{}", profile.name);
            }
            println!("{} (default)", set.default_profile().name);
        }
        Command::Serve => serve(catalogue, source, options).await?,
    }

    Ok(())
}

fn init_logging(config: &Config) {
    // RUST_LOG prend le pas sur host.logger.min_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `@chemin` lit le JSON depuis un fichier
fn read_json<T: DeserializeOwned>(arg: &str) -> Result<T> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("cannot read {}", path))?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

async fn serve(
    catalogue: Arc<ProfileCatalogue>,
    source: ProfileSource,
    options: NegotiationOptions,
) -> Result<()> {
    #[cfg(unix)]
    reload_on_hangup(Arc::clone(&catalogue), source)?;
    #[cfg(not(unix))]
    let _ = source;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("✅ PMODlna is ready, reading requests on stdin");
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping...");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let answer = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let negotiation = catalogue.negotiate(&request.identity, &request.media, options);
                serde_json::to_string(&negotiation)?
            }
            Err(e) => {
                warn!("⚠️ Invalid request: {}", e);
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };

        stdout.write_all(answer.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

#[cfg(unix)]
fn reload_on_hangup(catalogue: Arc<ProfileCatalogue>, source: ProfileSource) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("🔄 SIGHUP received, reloading DLNA profiles...");
            match catalogue.reload(&source) {
                Ok(rejected) => {
                    for error in &rejected {
                        warn!("⚠️ {}", error);
                    }
                    info!("✅ DLNA profiles reloaded");
                }
                Err(e) => warn!("⚠️ Reload failed, keeping current profiles: {}", e),
            }
        }
    });
    Ok(())
}
