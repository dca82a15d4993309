//! Reactive staking derivations composed over a chain-state query interface.
pub mod combinators;
pub mod controller;
pub mod fetch;
pub mod memo;
pub mod memory;
pub mod query;
pub mod session;
pub mod staking;

pub use memo::Memo;
pub use memo::Shared;
pub use memory::MemoryState;
pub use query::QueryError;
pub use query::QueryStream;
pub use query::StateQuery;
pub use staking::DeriveOptions;
pub use staking::StakingDerive;
