use std::sync::Arc;

use anyhow::*;
use clap::Parser;
use stk_derive::MemoryState;
use stk_derive::StakingDerive;
use stk_types::AccountId;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Clone, Debug)]
/// Derive the staking view of a single account from the configured chain
/// snapshot and print it as JSON.
struct Cli {
    #[clap(short, long)]
    /// The config file.
    config: String,

    #[clap()]
    /// The account, stash or controller, as 0x prefixed hex.
    account: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
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
            backtrace::Backtrace::new(),
        );
    }));

    let subscriber = tracing_subscriber::fmt()
        .pretty()
        .compact()
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Setting up logging failed");

    let cli = Cli::parse();

    let config = config::Config::load(Some(cli.config));
    config.validate();

    let account: AccountId = cli
        .account
        .parse()
        .with_context(|| format!("invalid account `{}`", cli.account))?;

    let snapshot = MemoryState::read_snapshot(&config.watcher.snapshot_path)
        .context("loading chain snapshot")?;
    let derive = StakingDerive::new(
        Arc::new(MemoryState::from_snapshot(snapshot)),
        config.watcher.derive_options(),
    );

    let result = derive
        .info(&account)
        .first()
        .await
        .context("deriving staking info")?;

    println!("{}", serde_json::to_string_pretty(&*result)?);

    Ok(())
}
