//! The chain-state entries read by the staking derivations.
use std::fmt::Display;
use std::fmt::Formatter;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use thiserror::Error;

use crate::AccountId;
use crate::EraIndex;
use crate::Exposure;
use crate::RewardDestination;
use crate::SessionKey;
use crate::StakingLedger;
use crate::ValidatorPrefs;

/// Address of a single storage entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum StorageKey {
    /// `staking.bonded(stash)`: the controller of a stash.
    Bonded(AccountId),
    /// `staking.ledger(controller)`
    Ledger(AccountId),
    /// `staking.payee(stash)`
    Payee(AccountId),
    /// `staking.nominators(stash)`
    Nominators(AccountId),
    /// `staking.stakers(stash)`
    Stakers(AccountId),
    /// `staking.validators(stash)`
    Validators(AccountId),
    /// `session.queuedKeys()`
    QueuedKeys,
    /// `session.nextKeys(stash)`
    NextKeys(AccountId),
    /// `staking.currentEra()`
    CurrentEra,
}

impl StorageKey {
    /// The name of the entry, without its argument.
    pub fn name(&self) -> &'static str {
        match self {
            StorageKey::Bonded(_) => "bonded",
            StorageKey::Ledger(_) => "ledger",
            StorageKey::Payee(_) => "payee",
            StorageKey::Nominators(_) => "nominators",
            StorageKey::Stakers(_) => "stakers",
            StorageKey::Validators(_) => "validators",
            StorageKey::QueuedKeys => "queuedKeys",
            StorageKey::NextKeys(_) => "nextKeys",
            StorageKey::CurrentEra => "currentEra",
        }
    }

    /// The value the chain reports for an entry that was never written.
    pub fn default_value(&self) -> StorageValue {
        match self {
            StorageKey::Bonded(_) => StorageValue::Bonded(None),
            StorageKey::Ledger(_) => StorageValue::Ledger(None),
            StorageKey::Payee(_) => StorageValue::Payee(RewardDestination::default()),
            StorageKey::Nominators(_) => StorageValue::Nominators(Vec::new()),
            StorageKey::Stakers(_) => StorageValue::Stakers(Exposure::default()),
            StorageKey::Validators(_) => StorageValue::Validators(ValidatorPrefs::default()),
            StorageKey::QueuedKeys => StorageValue::QueuedKeys(Vec::new()),
            StorageKey::NextKeys(_) => StorageValue::NextKeys(None),
            StorageKey::CurrentEra => StorageValue::CurrentEra(0),
        }
    }

    /// Whether `value` has the shape this entry stores.
    pub fn accepts(
        &self,
        value: &StorageValue,
    ) -> bool {
        self.name() == value.name()
    }
}

impl Display for StorageKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            StorageKey::Bonded(id)
            | StorageKey::Ledger(id)
            | StorageKey::Payee(id)
            | StorageKey::Nominators(id)
            | StorageKey::Stakers(id)
            | StorageKey::Validators(id)
            | StorageKey::NextKeys(id) => write!(f, "{}({})", self.name(), id.short()),
            StorageKey::QueuedKeys | StorageKey::CurrentEra => write!(f, "{}()", self.name()),
        }
    }
}

/// A decoded storage value.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum StorageValue {
    Bonded(Option<AccountId>),
    Ledger(Option<StakingLedger>),
    Payee(RewardDestination),
    Nominators(Vec<AccountId>),
    Stakers(Exposure),
    Validators(ValidatorPrefs),
    QueuedKeys(Vec<(AccountId, Vec<SessionKey>)>),
    NextKeys(Option<Vec<SessionKey>>),
    CurrentEra(EraIndex),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("expected a `{expected}` value, got `{found}`")]
pub struct UnexpectedValue {
    pub expected: &'static str,
    pub found: &'static str,
}

macro_rules! into_variant {
    ($fn_name:ident, $variant:ident, $name:literal, $ty:ty) => {
        pub fn $fn_name(self) -> Result<$ty, UnexpectedValue> {
            match self {
                StorageValue::$variant(value) => Ok(value),
                other => Err(UnexpectedValue {
                    expected: $name,
                    found: other.name(),
                }),
            }
        }
    };
}

impl StorageValue {
    pub fn name(&self) -> &'static str {
        match self {
            StorageValue::Bonded(_) => "bonded",
            StorageValue::Ledger(_) => "ledger",
            StorageValue::Payee(_) => "payee",
            StorageValue::Nominators(_) => "nominators",
            StorageValue::Stakers(_) => "stakers",
            StorageValue::Validators(_) => "validators",
            StorageValue::QueuedKeys(_) => "queuedKeys",
            StorageValue::NextKeys(_) => "nextKeys",
            StorageValue::CurrentEra(_) => "currentEra",
        }
    }

    into_variant!(into_bonded, Bonded, "bonded", Option<AccountId>);
    into_variant!(into_ledger, Ledger, "ledger", Option<StakingLedger>);
    into_variant!(into_payee, Payee, "payee", RewardDestination);
    into_variant!(into_nominators, Nominators, "nominators", Vec<AccountId>);
    into_variant!(into_stakers, Stakers, "stakers", Exposure);
    into_variant!(into_validators, Validators, "validators", ValidatorPrefs);
    into_variant!(
        into_queued_keys,
        QueuedKeys,
        "queuedKeys",
        Vec<(AccountId, Vec<SessionKey>)>
    );
    into_variant!(into_next_keys, NextKeys, "nextKeys", Option<Vec<SessionKey>>);
    into_variant!(into_current_era, CurrentEra, "currentEra", EraIndex);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_their_keys() {
        let id = AccountId::new([3; 32]);
        let keys = [
            StorageKey::Bonded(id),
            StorageKey::Ledger(id),
            StorageKey::Payee(id),
            StorageKey::Nominators(id),
            StorageKey::Stakers(id),
            StorageKey::Validators(id),
            StorageKey::QueuedKeys,
            StorageKey::NextKeys(id),
            StorageKey::CurrentEra,
        ];

        for key in keys {
            assert!(key.accepts(&key.default_value()), "{key}");
        }
    }

    #[test]
    fn conversion_reports_the_mismatch() {
        let err = StorageValue::CurrentEra(4).into_bonded().unwrap_err();

        assert_eq!(
            err,
            UnexpectedValue {
                expected: "bonded",
                found: "currentEra",
            }
        );
        assert_eq!(StorageValue::CurrentEra(4).into_current_era(), Ok(4));
    }

    #[test]
    fn display_uses_short_ids() {
        let id = AccountId::new([0; 32]);

        assert_eq!(StorageKey::Ledger(id).to_string(), "ledger(0x0000..0000)");
        assert_eq!(StorageKey::QueuedKeys.to_string(), "queuedKeys()");
    }
}
