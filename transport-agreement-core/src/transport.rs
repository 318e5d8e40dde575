// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a transport identifier in UTF-8 bytes.
pub const MAX_TRANSPORT_ID_LENGTH: usize = 100;

/// Name of a transport plugin, for example "tor" or "bluetooth".
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransportId(String);

impl TransportId {
    pub fn new(value: impl Into<String>) -> Result<Self, TransportIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TransportIdError::Empty);
        }
        if value.len() > MAX_TRANSPORT_ID_LENGTH {
            return Err(TransportIdError::TooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for TransportId {
    type Err = TransportIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportId").field(&self.0).finish()
    }
}

impl<'de> Deserialize<'de> for TransportId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum TransportIdError {
    #[error("transport id can not be empty")]
    Empty,

    #[error("transport id is {0} bytes long, maximum is {MAX_TRANSPORT_ID_LENGTH}")]
    TooLong(usize),
}

/// Handle of a set of transport keys held by the key lifecycle manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeySetId(u64);

impl KeySetId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeySetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_TRANSPORT_ID_LENGTH, TransportId, TransportIdError};

    #[test]
    fn length_bounds() {
        assert!(matches!(TransportId::new(""), Err(TransportIdError::Empty)));
        assert!(TransportId::new("x".repeat(MAX_TRANSPORT_ID_LENGTH)).is_ok());
        assert!(matches!(
            TransportId::new("x".repeat(MAX_TRANSPORT_ID_LENGTH + 1)),
            Err(TransportIdError::TooLong(101))
        ));

        // Bounds are measured in bytes, not characters.
        assert!(TransportId::new("ä".repeat(50)).is_ok());
        assert!(TransportId::new("ä".repeat(51)).is_err());
    }
}
