use futures_util::stream::BoxStream;
use stk_types::StorageKey;
use stk_types::StorageValue;
use stk_types::UnexpectedValue;
use thiserror::Error;

/// A stream of derived values, re-emitting whenever an input changes.
///
/// An `Err` item is terminal: the stream ends right after it.
pub type QueryStream<T> = BoxStream<'static, Result<T, QueryError>>;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("state backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    UnexpectedValue(#[from] UnexpectedValue),

    #[error("expected {expected} values, got {found}")]
    Arity { expected: usize, found: usize },
}

/// The chain-state interface the derivations are built upon.
pub trait StateQuery: Send + Sync + 'static {
    /// Reads all `keys` together and yields their values in the same order,
    /// once immediately and again every time one of them changes.
    fn query_multi(
        &self,
        keys: Vec<StorageKey>,
    ) -> QueryStream<Vec<StorageValue>>;
}
