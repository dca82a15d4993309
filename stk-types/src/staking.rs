use derive_debug_plus::Dbg;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::AccountId;
use crate::Balance;
use crate::EraIndex;
use crate::Perbill;
use crate::SessionKey;

/// Where the payout of a stash goes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RewardDestination {
    /// Paid to the stash and added to the bonded amount.
    #[default]
    Staked,
    /// Paid to the stash, not bonded.
    Stash,
    /// Paid to the controller.
    Controller,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidatorPrefs {
    pub commission: Perbill,

    #[serde(default)]
    pub blocked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndividualExposure {
    pub who: AccountId,
    pub value: Balance,
}

/// The stake backing a validator for the current era.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Exposure {
    pub total: Balance,
    pub own: Balance,

    #[serde(default)]
    pub others: Vec<IndividualExposure>,
}

/// A chunk of funds scheduled to become free at `era`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnlockChunk {
    pub value: Balance,
    pub era: EraIndex,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StakingLedger {
    pub stash: AccountId,
    pub total: Balance,
    pub active: Balance,

    #[serde(default)]
    pub unlocking: Vec<UnlockChunk>,
}

/// An unlocking chunk relative to the current era.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockingInfo {
    pub value: Balance,
    pub remaining_eras: EraIndex,
}

/// The combined staking view of a single account.
///
/// Every field but the account and the two session lists is only populated
/// when a controller could be resolved for the account.
#[derive(Clone, Dbg, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingQueryResult {
    pub account_id: AccountId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<AccountId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash_id: Option<AccountId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<Exposure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominators: Option<Vec<AccountId>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_destination: Option<RewardDestination>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_ledger: Option<StakingLedger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_prefs: Option<ValidatorPrefs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemable: Option<Balance>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocking: Option<Vec<UnlockingInfo>>,

    #[dbg(formatter = crate::staking::keys_pretty)]
    pub session_ids: Vec<SessionKey>,

    #[dbg(formatter = crate::staking::keys_pretty)]
    pub next_session_ids: Vec<SessionKey>,
}

impl StakingQueryResult {
    /// The result for an account that is neither a stash nor a controller.
    pub fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            ..Default::default()
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.controller_id.is_some()
    }

    pub fn is_nominating(&self) -> bool {
        self.nominators
            .as_ref()
            .is_some_and(|nominators| !nominators.is_empty())
    }
}

#[allow(clippy::ptr_arg)]
pub fn keys_pretty(keys: &Vec<SessionKey>) -> String {
    format!("{} keys", keys.len())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_result_serializes_to_the_minimal_shape() {
        let account = AccountId::new([7; 32]);
        let value = serde_json::to_value(StakingQueryResult::empty(account)).unwrap();

        assert_eq!(
            value,
            json!({
                "accountId": account.to_string(),
                "nextSessionIds": [],
                "sessionIds": [],
            })
        );
    }

    #[test]
    fn ledger_accepts_missing_unlocking() {
        let stash = AccountId::new([1; 32]);
        let ledger: StakingLedger = serde_json::from_value(json!({
            "stash": stash.to_string(),
            "total": 100,
            "active": 100,
        }))
        .unwrap();

        assert!(ledger.unlocking.is_empty());
        assert_eq!(ledger.stash, stash);
    }

    #[test]
    fn debug_output_summarizes_session_keys() {
        let mut result = StakingQueryResult::empty(AccountId::default());
        result.session_ids = vec![SessionKey::new([1u8; 4]), SessionKey::new([2u8; 4])];

        let printed = format!("{result:?}");
        assert!(printed.contains("2 keys"), "{printed}");
    }
}
