// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::hash::{HASH_LEN, Hash, HashError};

/// Length in bytes of a message identifier.
pub const MESSAGE_ID_LENGTH: usize = HASH_LEN;

/// Identifier of a message, derived from its group, timestamp and body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Hash);

impl MessageId {
    pub const fn from_bytes(bytes: [u8; MESSAGE_ID_LENGTH]) -> Self {
        Self(Hash::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_LENGTH] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl TryFrom<&[u8]> for MessageId {
    type Error = HashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(Hash::try_from(value)?))
    }
}

impl std::str::FromStr for MessageId {
    type Err = HashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageId").field(&self.0.to_hex()).finish()
    }
}

/// Message sent into a group.
///
/// The body is opaque on this layer, clients define its format and validate it before any hook
/// processes the message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    group_id: GroupId,
    timestamp: u64,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

impl Message {
    /// Creates a message with an identifier derived from all of its fields.
    pub fn new(group_id: GroupId, timestamp: u64, body: Vec<u8>) -> Self {
        let id = MessageId(Hash::from_parts(&[
            b"message",
            group_id.as_bytes(),
            &timestamp.to_be_bytes(),
            &body,
        ]));
        Self {
            id,
            group_id,
            timestamp,
            body,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Milliseconds since the UNIX epoch, as claimed by the author.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use crate::group::{ClientId, Group};

    use super::{Message, MessageId};

    #[test]
    fn identifier_covers_all_fields() {
        let group_1 = Group::local(&ClientId::new("test"), 0);
        let group_2 = Group::local(&ClientId::new("test"), 1);

        let message = Message::new(group_1.id(), 1000, vec![1, 2, 3]);
        assert_eq!(message.id(), Message::new(group_1.id(), 1000, vec![1, 2, 3]).id());
        assert_ne!(message.id(), Message::new(group_2.id(), 1000, vec![1, 2, 3]).id());
        assert_ne!(message.id(), Message::new(group_1.id(), 1001, vec![1, 2, 3]).id());
        assert_ne!(message.id(), Message::new(group_1.id(), 1000, vec![1, 2]).id());
    }

    #[test]
    fn identifier_from_bytes() {
        let message = Message::new(Group::local(&ClientId::new("test"), 0).id(), 5, vec![]);
        let id = MessageId::try_from(&message.id().as_bytes()[..]).unwrap();
        assert_eq!(id, message.id());
        assert!(MessageId::try_from(&[0u8; 31][..]).is_err());
        assert_eq!(message.id().to_hex().parse::<MessageId>().unwrap(), id);
    }
}
