//! Keyed multi-reads backing the staking derivation.
use std::vec;

use futures_util::StreamExt;
use stk_types::AccountId;
use stk_types::EraIndex;
use stk_types::Exposure;
use stk_types::RewardDestination;
use stk_types::SessionKey;
use stk_types::StakingLedger;
use stk_types::StorageKey;
use stk_types::StorageValue;
use stk_types::ValidatorPrefs;

use crate::QueryError;
use crate::QueryStream;
use crate::StateQuery;

/// Entries locating the controller of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BondingRow {
    /// The controller, when the account is a stash.
    pub bonded: Option<AccountId>,
    /// The ledger, when the account is a controller.
    pub ledger: Option<StakingLedger>,
}

/// Entries keyed on a stash, read in the same round as its controller's
/// ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StashRow {
    pub nominators: Vec<AccountId>,
    pub reward_destination: RewardDestination,
    pub exposure: Exposure,
    pub validator_prefs: ValidatorPrefs,
    pub queued_keys: Vec<(AccountId, Vec<SessionKey>)>,
    pub next_keys: Option<Vec<SessionKey>>,
    pub current_era: EraIndex,
    pub ledger: Option<StakingLedger>,
}

/// Iterates a tuple of values after checking its arity.
struct Values {
    values: vec::IntoIter<StorageValue>,
    expected: usize,
}

impl Values {
    fn new(
        values: Vec<StorageValue>,
        expected: usize,
    ) -> Result<Self, QueryError> {
        if values.len() != expected {
            return Err(QueryError::Arity {
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            values: values.into_iter(),
            expected,
        })
    }

    fn take(&mut self) -> Result<StorageValue, QueryError> {
        self.values.next().ok_or(QueryError::Arity {
            expected: self.expected,
            found: self.expected - 1,
        })
    }
}

impl TryFrom<Vec<StorageValue>> for BondingRow {
    type Error = QueryError;

    fn try_from(values: Vec<StorageValue>) -> Result<Self, Self::Error> {
        let mut values = Values::new(values, 2)?;
        Ok(Self {
            bonded: values.take()?.into_bonded()?,
            ledger: values.take()?.into_ledger()?,
        })
    }
}

impl TryFrom<Vec<StorageValue>> for StashRow {
    type Error = QueryError;

    fn try_from(values: Vec<StorageValue>) -> Result<Self, Self::Error> {
        let mut values = Values::new(values, 8)?;
        Ok(Self {
            nominators: values.take()?.into_nominators()?,
            reward_destination: values.take()?.into_payee()?,
            exposure: values.take()?.into_stakers()?,
            validator_prefs: values.take()?.into_validators()?,
            queued_keys: values.take()?.into_queued_keys()?,
            next_keys: values.take()?.into_next_keys()?,
            current_era: values.take()?.into_current_era()?,
            ledger: values.take()?.into_ledger()?,
        })
    }
}

fn decode<T>(
    api: &dyn StateQuery,
    keys: Vec<StorageKey>,
) -> QueryStream<T>
where
    T: TryFrom<Vec<StorageValue>, Error = QueryError> + Send + 'static,
{
    api.query_multi(keys)
        .map(|values| values.and_then(T::try_from))
        .boxed()
}

/// Reads `bonded(account)` and `ledger(account)`.
pub fn bonding(
    api: &dyn StateQuery,
    account: &AccountId,
) -> QueryStream<BondingRow> {
    decode(
        api,
        vec![
            StorageKey::Bonded(*account),
            StorageKey::Ledger(*account),
        ],
    )
}

/// Reads every stash keyed entry, the session and era globals and
/// `ledger(controller)` as a single multi-read, so a change touching several
/// of them is observed at once.
pub fn stash(
    api: &dyn StateQuery,
    stash: &AccountId,
    controller: &AccountId,
) -> QueryStream<StashRow> {
    decode(api, stash_keys(stash, controller))
}

fn stash_keys(
    stash: &AccountId,
    controller: &AccountId,
) -> Vec<StorageKey> {
    vec![
        StorageKey::Nominators(*stash),
        StorageKey::Payee(*stash),
        StorageKey::Stakers(*stash),
        StorageKey::Validators(*stash),
        StorageKey::QueuedKeys,
        StorageKey::NextKeys(*stash),
        StorageKey::CurrentEra,
        StorageKey::Ledger(*controller),
    ]
}
