//! Controller resolution and the ledger derived fields.
use stk_types::AccountId;
use stk_types::Balance;
use stk_types::EraIndex;
use stk_types::StakingLedger;
use stk_types::UnlockingInfo;

use crate::fetch::BondingRow;

/// The stash/controller pair an account belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bond {
    pub controller: AccountId,
    pub stash: AccountId,
}

/// Locates the controller for `account`.
///
/// A bonded account is a stash. Otherwise, when `ledger_fallback` is set and
/// the account owns a ledger, the account is treated as the controller of the
/// ledger's stash.
pub fn resolve_controller(
    account: &AccountId,
    row: &BondingRow,
    ledger_fallback: bool,
) -> Option<Bond> {
    match (&row.bonded, &row.ledger) {
        (Some(controller), _) => Some(Bond {
            controller: *controller,
            stash: *account,
        }),
        (None, Some(ledger)) if ledger_fallback => Some(Bond {
            controller: *account,
            stash: ledger.stash,
        }),
        _ => None,
    }
}

/// Splits the unlocking chunks of `ledger` at `current_era`.
///
/// Returns the redeemable balance and the chunks still locked, with the number
/// of eras left for each.
pub fn ledger_info(
    ledger: &StakingLedger,
    current_era: EraIndex,
) -> (Balance, Vec<UnlockingInfo>) {
    let (ready, locked): (Vec<_>, Vec<_>) = ledger
        .unlocking
        .iter()
        .partition(|chunk| chunk.era <= current_era);

    let redeemable = ready
        .iter()
        .fold(0 as Balance, |acc, chunk| acc.saturating_add(chunk.value));
    let unlocking = locked
        .into_iter()
        .map(|chunk| UnlockingInfo {
            value: chunk.value,
            remaining_eras: chunk.era - current_era,
        })
        .collect();

    (redeemable, unlocking)
}

#[cfg(test)]
mod tests {
    use stk_types::UnlockChunk;

    use super::*;

    fn ledger(stash: AccountId) -> StakingLedger {
        StakingLedger {
            stash,
            total: 100,
            active: 40,
            unlocking: vec![
                UnlockChunk { value: 10, era: 3 },
                UnlockChunk { value: 20, era: 5 },
                UnlockChunk { value: 30, era: 8 },
            ],
        }
    }

    #[test]
    fn bonded_account_is_a_stash() {
        let stash = AccountId::new([1; 32]);
        let ctrl = AccountId::new([2; 32]);
        let row = BondingRow {
            bonded: Some(ctrl),
            ledger: None,
        };

        assert_eq!(
            resolve_controller(&stash, &row, true),
            Some(Bond {
                controller: ctrl,
                stash
            })
        );
    }

    #[test]
    fn ledger_owner_is_a_controller_when_falling_back() {
        let stash = AccountId::new([1; 32]);
        let ctrl = AccountId::new([2; 32]);
        let row = BondingRow {
            bonded: None,
            ledger: Some(ledger(stash)),
        };

        assert_eq!(
            resolve_controller(&ctrl, &row, true),
            Some(Bond {
                controller: ctrl,
                stash
            })
        );
        assert_eq!(resolve_controller(&ctrl, &row, false), None);
    }

    #[test]
    fn unbonded_account_has_no_controller() {
        let row = BondingRow {
            bonded: None,
            ledger: None,
        };

        assert_eq!(resolve_controller(&AccountId::default(), &row, true), None);
    }

    #[test]
    fn chunks_split_at_the_current_era() {
        let (redeemable, unlocking) = ledger_info(&ledger(AccountId::default()), 5);

        assert_eq!(redeemable, 30);
        assert_eq!(
            unlocking,
            vec![UnlockingInfo {
                value: 30,
                remaining_eras: 3
            }]
        );
    }
}
