// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire format of the two agreement messages and the metadata attached to them.
//!
//! Bodies are CBOR arrays with the message type as first element:
//!
//! ```text
//! KEY:      [0, transport_id: text, public_key: bytes]
//! ACTIVATE: [1, transport_id: text, previous_message_id: bytes]
//! ```
use ciborium::Value;
use thiserror::Error;
use transport_agreement_core::cbor::{DecodeError, EncodeError, decode_cbor_exact, encode_cbor};
use transport_agreement_core::{
    Dictionary, GroupId, MESSAGE_ID_LENGTH, Message, MessageId, TransportId, TransportIdError,
};

use crate::crypto::PublicKey;

/// Maximum length in bytes of a public key carried in a KEY message.
pub const MAX_PUBLIC_KEY_BYTES: usize = 32;

pub const MSG_KEY_IS_SESSION: &str = "isSession";
pub const MSG_KEY_TRANSPORT_ID: &str = "transportId";
pub const MSG_KEY_MESSAGE_TYPE: &str = "messageType";
pub const MSG_KEY_LOCAL: &str = "local";
pub const MSG_KEY_PUBLIC_KEY: &str = "publicKey";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Key,
    Activate,
}

impl MessageType {
    pub fn value(&self) -> i64 {
        match self {
            MessageType::Key => 0,
            MessageType::Activate => 1,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(MessageType::Key),
            1 => Some(MessageType::Activate),
            _ => None,
        }
    }
}

/// Decoded body of a KEY or ACTIVATE message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    Key {
        transport_id: TransportId,
        public_key: Vec<u8>,
    },
    Activate {
        transport_id: TransportId,
        previous_message_id: MessageId,
    },
}

impl ProtocolMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ProtocolMessage::Key { .. } => MessageType::Key,
            ProtocolMessage::Activate { .. } => MessageType::Activate,
        }
    }

    pub fn transport_id(&self) -> &TransportId {
        match self {
            ProtocolMessage::Key { transport_id, .. } => transport_id,
            ProtocolMessage::Activate { transport_id, .. } => transport_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let last = match self {
            ProtocolMessage::Key { public_key, .. } => Value::Bytes(public_key.clone()),
            ProtocolMessage::Activate {
                previous_message_id,
                ..
            } => Value::Bytes(previous_message_id.as_bytes().to_vec()),
        };
        encode_cbor(&Value::Array(vec![
            Value::Integer(self.message_type().value().into()),
            Value::Text(self.transport_id().to_string()),
            last,
        ]))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let Value::Array(elements) = decode_cbor_exact::<Value>(bytes)? else {
            return Err(WireError::NotAList);
        };

        let message_type = match elements.first() {
            None => return Err(WireError::EmptyList),
            Some(Value::Integer(value)) => i64::try_from(*value)
                .ok()
                .and_then(MessageType::from_value)
                .ok_or(WireError::UnknownMessageType)?,
            Some(_) => return Err(WireError::UnexpectedType("message type", "integer")),
        };

        let [_, transport_id, last] = elements.as_slice() else {
            return Err(WireError::WrongLength(3, elements.len()));
        };

        let Value::Text(transport_id) = transport_id else {
            return Err(WireError::UnexpectedType("transport id", "text"));
        };
        let transport_id = TransportId::new(transport_id.as_str())?;

        let Value::Bytes(last) = last else {
            return Err(WireError::UnexpectedType(
                match message_type {
                    MessageType::Key => "public key",
                    MessageType::Activate => "previous message id",
                },
                "bytes",
            ));
        };

        match message_type {
            MessageType::Key => {
                if last.is_empty() || last.len() > MAX_PUBLIC_KEY_BYTES {
                    return Err(WireError::InvalidPublicKeyLength(last.len()));
                }
                Ok(ProtocolMessage::Key {
                    transport_id,
                    public_key: last.clone(),
                })
            }
            MessageType::Activate => {
                let previous_message_id = MessageId::try_from(last.as_slice())
                    .map_err(|_| WireError::InvalidMessageIdLength(last.len()))?;
                Ok(ProtocolMessage::Activate {
                    transport_id,
                    previous_message_id,
                })
            }
        }
    }
}

/// Creates a KEY message announcing our public key for a transport.
pub fn encode_key_message(
    group_id: GroupId,
    transport_id: &TransportId,
    public_key: &PublicKey,
    timestamp: u64,
) -> Result<Message, EncodeError> {
    let body = ProtocolMessage::Key {
        transport_id: transport_id.clone(),
        public_key: public_key.as_bytes().to_vec(),
    }
    .to_bytes()?;
    Ok(Message::new(group_id, timestamp, body))
}

/// Creates an ACTIVATE message which depends on our previous message in the session.
pub fn encode_activate_message(
    group_id: GroupId,
    transport_id: &TransportId,
    previous_message_id: MessageId,
    timestamp: u64,
) -> Result<Message, EncodeError> {
    let body = ProtocolMessage::Activate {
        transport_id: transport_id.clone(),
        previous_message_id,
    }
    .to_bytes()?;
    Ok(Message::new(group_id, timestamp, body))
}

pub fn encode_message_metadata(
    transport_id: &TransportId,
    message_type: MessageType,
    local: bool,
) -> Dictionary {
    let mut metadata = Dictionary::new();
    metadata
        .insert_bool(MSG_KEY_IS_SESSION, false)
        .insert_string(MSG_KEY_TRANSPORT_ID, transport_id.as_str())
        .insert_integer(MSG_KEY_MESSAGE_TYPE, message_type.value())
        .insert_bool(MSG_KEY_LOCAL, local);
    metadata
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("message body is not a list")]
    NotAList,

    #[error("message body is an empty list")]
    EmptyList,

    #[error("expected {0} elements in message body, got {1}")]
    WrongLength(usize, usize),

    #[error("unexpected value for {0}, expected {1}")]
    UnexpectedType(&'static str, &'static str),

    #[error("unknown message type")]
    UnknownMessageType,

    #[error(transparent)]
    InvalidTransportId(#[from] TransportIdError),

    #[error("public key has invalid length of {0} bytes")]
    InvalidPublicKeyLength(usize),

    #[error("message id has invalid length of {0} bytes, expected {MESSAGE_ID_LENGTH}")]
    InvalidMessageIdLength(usize),
}
