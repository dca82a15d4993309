use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use metrics::counter;
use stk_derive::MemoryState;
use stk_derive::StakingDerive;
use stk_types::AccountId;
use stk_types::ChainSnapshot;
use stk_types::StakingQueryResult;
use tokio::task::Id;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Follows the staking view of a set of accounts, logging every new snapshot.
pub(crate) struct AccountWatcher {
    derive: Arc<StakingDerive>,
    tasks: JoinSet<bool>,
    accounts: HashMap<Id, AccountId>,
    failed: Vec<AccountId>,
}

impl AccountWatcher {
    pub(crate) fn new(derive: Arc<StakingDerive>) -> Self {
        Self {
            derive,
            tasks: JoinSet::new(),
            accounts: HashMap::new(),
            failed: Vec::new(),
        }
    }

    /// Starts following `account`.
    pub(crate) fn watch(
        &mut self,
        account: AccountId,
    ) {
        let mut updates = self.derive.info(&account).subscribe();
        info!("Watching account. account: {}", account);

        let task = self.tasks.spawn(async move {
            while let Some(update) = updates.next().await {
                match update {
                    Ok(result) => {
                        counter!("stk_watcher_snapshots_total").increment(1);
                        log_snapshot(&result);
                    },
                    Err(err) => {
                        counter!("stk_watcher_error_total").increment(1);
                        error!("derivation failed. account: {} err: {}", account, err);
                        return false;
                    },
                }
            }
            true
        });
        self.accounts.insert(task.id(), account);
    }

    /// Waits for a watch task to end, remembering failed or panicked accounts
    /// for [`Self::retry_failed`]. Returns `None` once nothing is watched.
    pub(crate) async fn join_next(&mut self) -> Option<AccountId> {
        loop {
            let (id, completed) = match self.tasks.join_next_with_id().await? {
                Ok((id, completed)) => (id, completed),
                Err(err) => {
                    error!("watch task aborted. err: {:?}", err);
                    (err.id(), false)
                },
            };

            if let Some(account) = self.accounts.remove(&id) {
                if !completed {
                    self.failed.push(account);
                }
                return Some(account);
            }
        }
    }

    /// Subscribes again to every account whose derivation failed.
    pub(crate) fn retry_failed(&mut self) {
        for account in std::mem::take(&mut self.failed) {
            counter!("stk_watcher_retries_total").increment(1);
            self.watch(account);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn log_snapshot(result: &StakingQueryResult) {
    match (&result.stash_id, &result.controller_id) {
        (Some(stash), Some(controller)) => {
            info!(
                "Staking snapshot. account: {} stash: {} controller: {} nominators: {} redeemable: {} session_keys: {}",
                result.account_id.short(),
                stash.short(),
                controller.short(),
                result.nominators.as_ref().map_or(0, Vec::len),
                result.redeemable.unwrap_or_default(),
                result.session_ids.len(),
            );
        },
        _ => info!("Account not bonded. account: {}", result.account_id.short()),
    }

    match serde_json::to_string(result) {
        Ok(json) => debug!("snapshot: {}", json),
        Err(err) => warn!("failed to encode snapshot. err: {:?}", err),
    }
}

/// Re-reads the chain snapshot file and pushes changes into the state.
pub(crate) struct SnapshotReloader {
    path: String,
    state: MemoryState,
    last: ChainSnapshot,
}

impl SnapshotReloader {
    /// Loads the initial snapshot from `path`.
    pub(crate) fn load(path: &str) -> anyhow::Result<Self> {
        let last = MemoryState::read_snapshot(path).context("loading chain snapshot")?;
        let state = MemoryState::from_snapshot(last.clone());

        Ok(Self {
            path: path.to_owned(),
            state,
            last,
        })
    }

    pub(crate) fn state(&self) -> &MemoryState {
        &self.state
    }

    /// Returns whether the state changed.
    pub(crate) fn reload(&mut self) -> anyhow::Result<bool> {
        let snapshot = MemoryState::read_snapshot(&self.path).context("reloading chain snapshot")?;
        if snapshot == self.last {
            return Ok(false);
        }

        info!("Chain snapshot changed. era: {}", snapshot.current_era);
        counter!("stk_watcher_reloads_total").increment(1);
        self.state.replace(snapshot.clone());
        self.last = snapshot;

        Ok(true)
    }
}
