pub mod account;
pub mod snapshot;
pub mod staking;
pub mod storage;

pub use account::AccountId;
pub use account::ParseIdError;
pub use account::SessionKey;
pub use snapshot::ChainSnapshot;
pub use staking::Exposure;
pub use staking::IndividualExposure;
pub use staking::RewardDestination;
pub use staking::StakingLedger;
pub use staking::StakingQueryResult;
pub use staking::UnlockChunk;
pub use staking::UnlockingInfo;
pub use staking::ValidatorPrefs;
pub use storage::StorageKey;
pub use storage::StorageValue;
pub use storage::UnexpectedValue;

pub type Balance = u128;
pub type EraIndex = u32;

/// Commission expressed in parts per billion.
pub type Perbill = u32;
