use stk_types::AccountId;
use stk_types::SessionKey;

/// Resolves the current and next session keys of `stash`.
///
/// The current keys come from the queued keys table, the next keys from the
/// stash's `nextKeys` entry. Missing data resolves to an empty list.
pub fn resolve_session_ids(
    stash: &AccountId,
    queued_keys: &[(AccountId, Vec<SessionKey>)],
    next_keys: Option<&[SessionKey]>,
) -> (Vec<SessionKey>, Vec<SessionKey>) {
    let session_ids = queued_keys
        .iter()
        .find(|(id, _)| id == stash)
        .map(|(_, keys)| keys.clone())
        .unwrap_or_default();
    let next_session_ids = next_keys.map(<[SessionKey]>::to_vec).unwrap_or_default();

    (session_ids, next_session_ids)
}
