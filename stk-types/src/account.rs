//! Chain account identifiers and session keys.
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde_with::DeserializeFromStr;
use serde_with::SerializeDisplay;
use thiserror::Error;

const ACCOUNT_ID_LEN: usize = 32;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("missing `0x` prefix")]
    MissingPrefix,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {found}")]
    InvalidLength { expected: usize, found: usize },
}

fn decode_prefixed(s: &str) -> Result<Vec<u8>, ParseIdError> {
    let digits = s.strip_prefix("0x").ok_or(ParseIdError::MissingPrefix)?;
    hex::decode(digits).map_err(|err| ParseIdError::InvalidHex(err.to_string()))
}

/// An opaque 32 byte account identifier, rendered as `0x` prefixed hex.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct AccountId([u8; ACCOUNT_ID_LEN]);

impl AccountId {
    pub const fn new(bytes: [u8; ACCOUNT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LEN] {
        &self.0
    }

    /// Short form used in log lines, e.g. `0x0101..0101`.
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}..{}", &full[..4], &full[full.len() - 4..])
    }
}

impl From<[u8; ACCOUNT_ID_LEN]> for AccountId {
    fn from(bytes: [u8; ACCOUNT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Display for AccountId {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed(s)?;
        let bytes: [u8; ACCOUNT_ID_LEN] =
            bytes
                .try_into()
                .map_err(|bytes: Vec<u8>| ParseIdError::InvalidLength {
                    expected: ACCOUNT_ID_LEN,
                    found: bytes.len(),
                })?;
        Ok(Self(bytes))
    }
}

/// A session key as registered by a validator; the length depends on the key type.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for SessionKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl FromStr for SessionKey {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_display_roundtrips_through_parse() {
        let id = AccountId::new([0xab; 32]);
        let text = id.to_string();

        assert_eq!(text.len(), 2 + 64);
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.parse::<AccountId>().unwrap(), id);
    }

    #[test]
    fn account_id_rejects_bad_input() {
        assert_eq!(
            "abcd".parse::<AccountId>(),
            Err(ParseIdError::MissingPrefix)
        );
        assert!(matches!(
            "0xzz".parse::<AccountId>(),
            Err(ParseIdError::InvalidHex(_))
        ));
        assert_eq!(
            "0x0102".parse::<AccountId>(),
            Err(ParseIdError::InvalidLength {
                expected: 32,
                found: 2
            })
        );
    }

    #[test]
    fn account_id_serializes_as_string() {
        let id = AccountId::new([1; 32]);
        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<AccountId>(&json).unwrap(), id);
    }

    #[test]
    fn short_form_keeps_both_ends() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x12;
        bytes[31] = 0x34;

        assert_eq!(AccountId::new(bytes).short(), "0x1200..0034");
    }

    #[test]
    fn session_key_accepts_any_length() {
        let key: SessionKey = "0x010203".parse().unwrap();

        assert_eq!(key.as_bytes(), &[1, 2, 3]);
        assert_eq!(key.to_string(), "0x010203");
    }
}
