use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub const ACCOUNT_LEN: usize = 32;

/// Opaque account identifier, e.g. derived from a public key.
///
/// Human readable formats use the `0x` prefixed hex encoding, binary formats
/// the raw bytes. The all-zero identifier is [`Account::NULL`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Account([u8; ACCOUNT_LEN]);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccountParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, found {0}")]
    InvalidLength(usize),
}

impl Account {
    /// Stands for "no account": never a valid delegatee or transfer endpoint.
    pub const NULL: Account = Account([0; ACCOUNT_LEN]);

    pub const fn new(bytes: [u8; ACCOUNT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn from_hex(s: &str) -> Result<Self, AccountParseError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AccountParseError> {
        <[u8; ACCOUNT_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| AccountParseError::InvalidLength(bytes.len()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Account {
    type Err = AccountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self)
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(deser::AccountVisitor)
        } else {
            deserializer.deserialize_bytes(deser::AccountVisitor)
        }
    }
}

mod deser {
    use super::*;
    use serde::de::{self, Visitor};

    pub(super) struct AccountVisitor;

    impl<'de> Visitor<'de> for AccountVisitor {
        type Value = Account;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a 32 bytes account identifier")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Account::from_hex(v).map_err(|e| E::custom(format!("invalid account: {}", e)))
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Account::from_slice(v).map_err(|e| E::custom(format!("invalid account: {}", e)))
        }
    }
}

#[cfg(any(test, feature = "proptest"))]
mod arbitrary {
    use super::*;
    use proptest::prelude::*;

    impl Arbitrary for Account {
        type Parameters = ();
        type Strategy = BoxedStrategy<Account>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<[u8; ACCOUNT_LEN]>().prop_map(Account).boxed()
        }
    }
}
