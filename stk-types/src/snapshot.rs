//! A point-in-time dump of the staking related chain state.
use std::collections::BTreeMap;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::AccountId;
use crate::EraIndex;
use crate::Exposure;
use crate::RewardDestination;
use crate::SessionKey;
use crate::StakingLedger;
use crate::StorageKey;
use crate::StorageValue;
use crate::ValidatorPrefs;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainSnapshot {
    pub current_era: EraIndex,

    /// stash -> controller
    pub bonded: BTreeMap<AccountId, AccountId>,

    /// controller -> ledger
    pub ledger: BTreeMap<AccountId, StakingLedger>,

    pub payee: BTreeMap<AccountId, RewardDestination>,
    pub nominators: BTreeMap<AccountId, Vec<AccountId>>,
    pub stakers: BTreeMap<AccountId, Exposure>,
    pub validators: BTreeMap<AccountId, ValidatorPrefs>,
    pub queued_keys: Vec<(AccountId, Vec<SessionKey>)>,
    pub next_keys: BTreeMap<AccountId, Vec<SessionKey>>,
}

impl ChainSnapshot {
    /// Flattens the snapshot into storage entries.
    pub fn into_entries(self) -> Vec<(StorageKey, StorageValue)> {
        let mut entries = vec![
            (
                StorageKey::CurrentEra,
                StorageValue::CurrentEra(self.current_era),
            ),
            (
                StorageKey::QueuedKeys,
                StorageValue::QueuedKeys(self.queued_keys),
            ),
        ];

        entries.extend(
            self.bonded
                .into_iter()
                .map(|(stash, ctrl)| (StorageKey::Bonded(stash), StorageValue::Bonded(Some(ctrl)))),
        );
        entries.extend(
            self.ledger
                .into_iter()
                .map(|(ctrl, l)| (StorageKey::Ledger(ctrl), StorageValue::Ledger(Some(l)))),
        );
        entries.extend(
            self.payee
                .into_iter()
                .map(|(stash, p)| (StorageKey::Payee(stash), StorageValue::Payee(p))),
        );
        entries.extend(
            self.nominators
                .into_iter()
                .map(|(stash, n)| (StorageKey::Nominators(stash), StorageValue::Nominators(n))),
        );
        entries.extend(
            self.stakers
                .into_iter()
                .map(|(stash, e)| (StorageKey::Stakers(stash), StorageValue::Stakers(e))),
        );
        entries.extend(
            self.validators
                .into_iter()
                .map(|(stash, p)| (StorageKey::Validators(stash), StorageValue::Validators(p))),
        );
        entries.extend(
            self.next_keys
                .into_iter()
                .map(|(stash, k)| (StorageKey::NextKeys(stash), StorageValue::NextKeys(Some(k)))),
        );

        entries
    }
}
