use config::FileFormat;
use lazy_static_include::*;
use serde_derive::Deserialize;
use stk_derive::DeriveOptions;
use stk_types::AccountId;
use tracing::debug;

lazy_static_include_str! {
    DEFAULT_CONFIG => "src/config/default.toml",
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Config
{
    pub(crate) watcher: WatcherConfig,
    pub(crate) prometheus: PrometheusConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct WatcherConfig
{
    /// Accounts to follow, stashes or controllers.
    pub(crate) accounts: Vec<AccountId>,
    /// JSON chain snapshot backing the state queries.
    pub(crate) snapshot_path: String,
    /// How often the snapshot file is read again, in seconds.
    pub(crate) reload_interval_secs: u64,
    /// If set, an unbonded account owning a ledger is treated as a controller.
    pub(crate) ledger_fallback: bool,
}

impl WatcherConfig
{
    pub fn validate(&self)
    {
        assert!(
            !self
                .snapshot_path
                .is_empty(),
            "Snapshot path is required"
        );
        assert!(
            self.reload_interval_secs > 0,
            "Reload interval must be positive"
        );
    }

    pub fn derive_options(&self) -> DeriveOptions
    {
        DeriveOptions {
            ledger_fallback: self.ledger_fallback,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct PrometheusConfig
{
    pub(crate) port: u16,
}

impl Config
{
    pub fn load(local_file: Option<String>) -> Config
    {
        let mut config_builder = config::Config::builder();
        config_builder = config_builder.add_source(
            config::File::from_str(
                &DEFAULT_CONFIG,
                FileFormat::Toml,
            ),
        );

        if let Some(local_file) = local_file
        {
            debug!(
                "Loading local configuration from {}",
                local_file
            );
            config_builder = config_builder.add_source(config::File::with_name(&local_file));
        }

        let config_builder = config_builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()
            .expect("Could not load configuration");

        config_builder
            .try_deserialize()
            .expect("Could not deserialize configuration")
    }

    pub fn validate(&self)
    {
        self.watcher
            .validate();
    }
}
