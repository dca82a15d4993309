//! The staking account derivation.
use std::sync::Arc;

use futures_util::future;
use futures_util::stream;
use futures_util::StreamExt;
use futures_util::TryStreamExt;
use metrics::counter;
use stk_types::AccountId;
use stk_types::StakingQueryResult;
use tracing::debug;

use crate::combinators::combine_latest_all;
use crate::combinators::switch_map;
use crate::controller::ledger_info;
use crate::controller::resolve_controller;
use crate::controller::Bond;
use crate::fetch;
use crate::fetch::StashRow;
use crate::session::resolve_session_ids;
use crate::Memo;
use crate::QueryStream;
use crate::Shared;
use crate::StateQuery;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeriveOptions {
    /// Treat an unbonded account owning a ledger as the controller of the
    /// ledger's stash.
    pub ledger_fallback: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            ledger_fallback: true,
        }
    }
}

/// Derives the staking view of `account`, without any sharing.
///
/// First locates the controller, then reads the stash entries together with
/// the controller's ledger. Whenever the bonding changes the dependent read is
/// restarted for the new pair.
pub fn staking_info(
    api: Arc<dyn StateQuery>,
    options: DeriveOptions,
    account: AccountId,
) -> QueryStream<StakingQueryResult> {
    let bonding = fetch::bonding(api.as_ref(), &account);

    switch_map(bonding, move |row| {
        match resolve_controller(&account, &row, options.ledger_fallback) {
            Some(bond) => {
                debug!(
                    "resolved bond. account: {} stash: {} controller: {}",
                    account.short(),
                    bond.stash.short(),
                    bond.controller.short()
                );
                retrieve_info(api.as_ref(), account, bond)
            },
            None => {
                debug!("account is not bonded. account: {}", account.short());
                stream::once(future::ready(Ok(StakingQueryResult::empty(account)))).boxed()
            },
        }
    })
}

fn retrieve_info(
    api: &dyn StateQuery,
    account: AccountId,
    bond: Bond,
) -> QueryStream<StakingQueryResult> {
    fetch::stash(api, &bond.stash, &bond.controller)
        .map_ok(move |row| assemble(account, bond, row))
        .boxed()
}

fn assemble(
    account: AccountId,
    bond: Bond,
    row: StashRow,
) -> StakingQueryResult {
    let (session_ids, next_session_ids) =
        resolve_session_ids(&bond.stash, &row.queued_keys, row.next_keys.as_deref());

    let (redeemable, unlocking) = match &row.ledger {
        Some(ledger) => {
            let (redeemable, unlocking) = ledger_info(ledger, row.current_era);
            (Some(redeemable), Some(unlocking))
        },
        None => (None, None),
    };

    counter!("stk_derive_staking_results_total").increment(1);

    StakingQueryResult {
        account_id: account,
        controller_id: Some(bond.controller),
        stash_id: Some(bond.stash),
        exposure: Some(row.exposure),
        nominators: Some(row.nominators),
        reward_destination: Some(row.reward_destination),
        staking_ledger: row.ledger,
        validator_prefs: Some(row.validator_prefs),
        redeemable,
        unlocking,
        session_ids,
        next_session_ids,
    }
}

/// Entry point for the staking derivations, sharing one derivation per
/// account between all callers.
pub struct StakingDerive {
    info: Memo<AccountId, StakingQueryResult>,
}

impl StakingDerive {
    pub fn new(
        api: Arc<dyn StateQuery>,
        options: DeriveOptions,
    ) -> Self {
        let info = Memo::new("staking_info", move |account: &AccountId| {
            staking_info(Arc::clone(&api), options, *account)
        });

        Self { info }
    }

    /// The shared staking view of `account`.
    pub fn info(
        &self,
        account: &AccountId,
    ) -> Arc<Shared<StakingQueryResult>> {
        self.info.get(account)
    }

    /// The staking views of all `accounts`, in order, re-emitted whenever one
    /// of them changes.
    pub fn accounts(
        &self,
        accounts: &[AccountId],
    ) -> QueryStream<Vec<Arc<StakingQueryResult>>> {
        combine_latest_all(
            accounts
                .iter()
                .map(|account| self.info(account).subscribe())
                .collect(),
        )
    }

    /// Number of accounts currently derived.
    pub fn active(&self) -> usize {
        self.info.len()
    }
}
