use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interface_resolver::core::auth::Credential;
use interface_resolver::core::downloader::{progress_channel, Downloader, ProgressReceiver};
use interface_resolver::core::http::build_http_client;
use interface_resolver::core::java::RuntimeProvisioner;
use interface_resolver::core::platform::{CpuArch, OsFamily};
use interface_resolver::core::version::MetadataStore;
use interface_resolver::{
    init_tracing, Environment, LaunchRequest, LauncherConfig, LauncherResult, Resolver,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "interface-resolver", version, about = "Resolve and acquire game versions")]
struct Cli {
    /// Launcher data directory. Defaults to the platform data dir.
    #[arg(long = "data-dir", value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    /// Explicit settings file; overrides the one in the data dir.
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Maximum simultaneous downloads.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List versions from the live index.
    Versions {
        /// Only stable releases.
        #[arg(long)]
        releases: bool,
    },
    /// List Java runtimes found on this machine and in the runtime cache.
    Runtimes,
    /// Resolve a version and download everything it needs.
    Resolve {
        version: String,
        /// Resolve for another OS (windows, linux, macos).
        #[arg(long)]
        os: Option<OsFamily>,
        /// Resolve for another architecture (x86, x86_64, arm, aarch64).
        #[arg(long)]
        arch: Option<CpuArch>,
        /// Offline player name; without it the launch is a demo.
        #[arg(long = "offline-name")]
        offline_name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        tracing::error!(error = %err, "resolution failed");
        std::process::exit(1);
    }
}

async fn run() -> LauncherResult<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling downloads");
                cancel.cancel();
            }
        });
    }

    let (progress_tx, progress_rx) = progress_channel();
    let downloader = Downloader::new(build_http_client()?)
        .with_concurrency(config.max_concurrent_downloads)
        .with_progress(progress_tx)
        .with_cancellation(cancel);
    tokio::spawn(render_progress(progress_rx));

    match cli.command {
        Command::Versions { releases } => {
            let store = MetadataStore::new(&config, downloader);
            let index = store.fetch_index().await?;
            let versions: Vec<_> = if releases {
                index.releases()
            } else {
                index.versions.iter().collect()
            };
            for version in versions {
                println!("{:<24} {}", version.id, version.release_type);
            }
        }
        Command::Runtimes => {
            let provisioner = RuntimeProvisioner::new(&config, downloader);
            for runtime in provisioner.detect_installations(OsFamily::current()).await {
                println!(
                    "Java {:<3} {:<14} {:<10} {:?}",
                    runtime.major,
                    runtime.version,
                    format!("{:?}", runtime.source),
                    runtime.executable
                );
            }
        }
        Command::Resolve {
            version,
            os,
            arch,
            offline_name,
        } => {
            let detected = Environment::detect();
            let environment = Environment::new(
                os.unwrap_or(detected.os),
                arch.unwrap_or(detected.arch),
            );
            let mut request = LaunchRequest::new(version).with_environment(environment);
            if let Some(name) = offline_name {
                request = request.with_credential(Credential::offline(&name)?);
            }

            let resolver = Resolver::new(config, downloader);
            let resolved = resolver.resolve_and_acquire(&request).await?;
            println!("{}", serde_json::to_string_pretty(&resolved.summary())?);
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> LauncherResult<LauncherConfig> {
    let mut config = match (&cli.config, &cli.data_dir) {
        (Some(path), data_dir) => {
            let mut config = LauncherConfig::load_file(path)?;
            if let Some(dir) = data_dir {
                config.data_dir = dir.clone();
            }
            config
        }
        (None, Some(dir)) => LauncherConfig::load_from_data_dir(dir)?,
        (None, None) => {
            let dir = interface_resolver::core::config::default_data_dir();
            LauncherConfig::load_from_data_dir(&dir)?
        }
    };
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrent_downloads = concurrency;
    }
    config.validate()?;
    info!("Using data dir {:?}", config.data_dir);
    Ok(config)
}

/// Log one line per finished item; intermediate chunks stay quiet.
async fn render_progress(mut rx: ProgressReceiver) {
    while let Some(event) = rx.recv().await {
        if event.bytes_total == Some(event.bytes_done) {
            tracing::debug!(item = %event.item, bytes = event.bytes_done, "downloaded");
        }
    }
}
