// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{HASH_LEN, Hash, HashError};

/// Local handle of a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(u32);

impl ContactId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Long-term identity of a peer, equal on both sides of a contact relationship.
///
/// Author ids are totally ordered by their bytes. The order decides which side of a relationship
/// takes the first role during key derivation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorId(Hash);

impl AuthorId {
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(Hash::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl TryFrom<&[u8]> for AuthorId {
    type Error = HashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(Hash::try_from(value)?))
    }
}

impl std::str::FromStr for AuthorId {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthorId").field(&self.0.to_hex()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    id: ContactId,
    author_id: AuthorId,
}

impl Contact {
    pub fn new(id: ContactId, author_id: AuthorId) -> Self {
        Self { id, author_id }
    }

    pub fn id(&self) -> ContactId {
        self.id
    }

    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }
}

#[cfg(test)]
mod tests {
    use super::AuthorId;

    #[test]
    fn authors_are_ordered_by_bytes() {
        let mut low = [0; 32];
        low[31] = 0xff;
        let mut high = [0; 32];
        high[0] = 0x01;
        assert!(AuthorId::from_bytes(low) < AuthorId::from_bytes(high));
    }
}
