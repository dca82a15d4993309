use std::panic;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use backtrace::Backtrace;
use clap::Parser;
use metrics::counter;
use metrics::gauge;
use mimalloc::MiMalloc;
use stk_derive::StakingDerive;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing::span;
use tracing::warn;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::watcher::AccountWatcher;
use crate::watcher::SnapshotReloader;

mod config;
mod watcher;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Clone, Debug)]
struct Cli {
    /// Path to the configuration file.
    #[clap(short, long)]
    config: Option<String>,

    /// If set, output logs in JSON format.
    #[clap(short, long, action)]
    json: bool,
}

fn setup_logging(json: bool) {
    if json {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("Setting up logging failed");
    } else {
        let subscriber = tracing_subscriber::fmt()
            .pretty()
            .compact()
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .finish();
        tracing::subscriber::set_global_default(subscriber).expect("Setting up logging failed");
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.json);

    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => {
                match panic_info.payload().downcast_ref::<String>() {
                    Some(s) => &s[..],
                    None => "Box<dyn Any>",
                }
            },
        };
        let (file, lineno, col) = match panic_info.location() {
            Some(l) => (l.file(), l.line(), l.column()),
            None => ("<unknown>", 0, 0),
        };

        error!(
            msg,
            file,
            lineno,
            col,
            "Panic occurred: {:?}",
            Backtrace::new(),
        );
    }));

    if let Err(err) = run(cli).await {
        panic!("Watcher exited due to an error: {err:?}")
    } else {
        Ok(())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!("Starting watcher. version: {}", version);
    let config = Config::load(cli.config);
    config.validate();
    debug!("Loaded configuration: {:?}", config);

    let span = span!(
        Level::INFO,
        "Starting watcher",
        "version" = version,
        "accounts" = config.watcher.accounts.len(),
    );
    let _guard = span.enter();

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.prometheus.port))
        .install()
        .context("setting up Prometheus")?;

    run_watcher(&config).await
}

async fn run_watcher(config: &Config) -> anyhow::Result<()> {
    let mut reloader = SnapshotReloader::load(&config.watcher.snapshot_path)?;
    let derive = Arc::new(StakingDerive::new(
        Arc::new(reloader.state().clone()),
        config.watcher.derive_options(),
    ));

    let mut watcher = AccountWatcher::new(derive);
    if config.watcher.accounts.is_empty() {
        warn!("No account configured, only the snapshot will be reloaded");
    }
    for account in &config.watcher.accounts {
        watcher.watch(*account);
    }
    gauge!("stk_watcher_accounts").set(config.watcher.accounts.len() as f64);

    let mut reload = tokio::time::interval(Duration::from_secs(
        config.watcher.reload_interval_secs,
    ));
    // the first tick completes immediately
    reload.tick().await;

    loop {
        tokio::select! {
            _ = reload.tick() => {
                match reloader.reload() {
                    Ok(changed) => debug!("Snapshot reloaded. changed: {}", changed),
                    Err(err) => {
                        counter!("stk_watcher_error_total").increment(1);
                        warn!("Snapshot reload failed, keeping the previous state. err: {:?}", err);
                    },
                }
                watcher.retry_failed();
            }
            Some(account) = watcher.join_next(), if !watcher.is_empty() => {
                warn!("Stopped watching account, retrying on next reload. account: {}", account);
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    bail!("listening for shutdown signal: {err}");
                }
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
