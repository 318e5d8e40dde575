// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contact::AuthorId;
use crate::hash::{HASH_LEN, Hash, HashError};

/// Identifier of the client (application protocol) a group belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(Hash);

impl GroupId {
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

impl TryFrom<&[u8]> for GroupId {
    type Error = HashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(Hash::try_from(value)?))
    }
}

impl std::str::FromStr for GroupId {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GroupId").field(&self.0.to_hex()).finish()
    }
}

/// Group of messages belonging to one client.
///
/// The identifier is derived from the client, its major version and the descriptor. Peers who
/// compute the same descriptor share the group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    client_id: ClientId,
    major_version: u32,
    #[serde(with = "serde_bytes")]
    descriptor: Vec<u8>,
}

impl Group {
    pub fn new(client_id: &ClientId, major_version: u32, descriptor: Vec<u8>) -> Self {
        let id = GroupId(Hash::from_parts(&[
            b"group",
            client_id.as_str().as_bytes(),
            &major_version.to_be_bytes(),
            &descriptor,
        ]));
        Self {
            id,
            client_id: client_id.clone(),
            major_version,
            descriptor,
        }
    }

    /// Group holding only local state of a client, never shared with anyone.
    pub fn local(client_id: &ClientId, major_version: u32) -> Self {
        Self::new(client_id, major_version, Vec::new())
    }

    /// Group shared between two authors.
    ///
    /// Both author ids are placed into the descriptor in ascending order, so both sides of the
    /// contact relationship arrive at the same group.
    pub fn contact(
        client_id: &ClientId,
        major_version: u32,
        author_1: &AuthorId,
        author_2: &AuthorId,
    ) -> Self {
        let (first, second) = if author_1 <= author_2 {
            (author_1, author_2)
        } else {
            (author_2, author_1)
        };
        let mut descriptor = Vec::with_capacity(HASH_LEN * 2);
        descriptor.extend_from_slice(first.as_bytes());
        descriptor.extend_from_slice(second.as_bytes());
        Self::new(client_id, major_version, descriptor)
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }
}

/// Whether a group is shared with a contact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Messages are neither offered to nor accepted from the contact.
    #[default]
    Invisible,

    /// Messages are accepted from the contact, but local messages are not offered yet.
    Visible,

    /// Messages are exchanged in both directions.
    Shared,
}

impl Visibility {
    pub fn to_u8(self) -> u8 {
        match self {
            Visibility::Invisible => 0,
            Visibility::Visible => 1,
            Visibility::Shared => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Visibility::Invisible),
            1 => Some(Visibility::Visible),
            2 => Some(Visibility::Shared),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::contact::AuthorId;

    use super::{ClientId, Group};

    #[test]
    fn contact_group_is_symmetric() {
        let client_id = ClientId::new("test");
        let alice = AuthorId::from_bytes([1; 32]);
        let bob = AuthorId::from_bytes([2; 32]);
        let carol = AuthorId::from_bytes([3; 32]);

        let group_1 = Group::contact(&client_id, 0, &alice, &bob);
        let group_2 = Group::contact(&client_id, 0, &bob, &alice);
        assert_eq!(group_1.id(), group_2.id());
        assert_eq!(group_1.descriptor(), group_2.descriptor());

        assert_ne!(group_1.id(), Group::contact(&client_id, 0, &alice, &carol).id());
        assert_ne!(group_1.id(), Group::contact(&client_id, 1, &alice, &bob).id());
        assert_ne!(group_1.id(), Group::local(&client_id, 0).id());
    }
}
