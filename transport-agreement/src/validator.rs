// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stateless validation of incoming agreement messages.
use thiserror::Error;
use transport_agreement_core::{Dictionary, Message, MessageId};

use crate::message::{MSG_KEY_PUBLIC_KEY, ProtocolMessage, WireError, encode_message_metadata};

/// Outcome of a successful validation.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageContext {
    /// Metadata to store alongside the message.
    pub metadata: Dictionary,

    /// Messages which need to be delivered before this one.
    pub dependencies: Vec<MessageId>,
}

/// Checks the structure of a message body and derives its metadata and dependencies.
///
/// KEY messages carry the contact's public key in their metadata. ACTIVATE messages depend on
/// the message the contact sent before them in the same session.
pub fn validate_message(message: &Message) -> Result<MessageContext, ValidationError> {
    let protocol_message = ProtocolMessage::from_bytes(message.body())?;
    let mut metadata = encode_message_metadata(
        protocol_message.transport_id(),
        protocol_message.message_type(),
        false,
    );

    let dependencies = match protocol_message {
        ProtocolMessage::Key { public_key, .. } => {
            metadata.insert_bytes(MSG_KEY_PUBLIC_KEY, public_key);
            Vec::new()
        }
        ProtocolMessage::Activate {
            previous_message_id,
            ..
        } => vec![previous_message_id],
    };

    Ok(MessageContext {
        metadata,
        dependencies,
    })
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid message body: {0}")]
    Body(#[from] WireError),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ciborium::Value;
    use transport_agreement_core::cbor::encode_cbor;
    use transport_agreement_core::{ClientId, Group, Message, MessageId, TransportId};

    use crate::crypto::PublicKey;
    use crate::message::{encode_activate_message, encode_key_message};

    use super::{ValidationError, validate_message};

    fn group() -> Group {
        Group::local(&ClientId::new("test"), 0)
    }

    fn message(elements: Vec<Value>) -> Message {
        Message::new(
            group().id(),
            1000,
            encode_cbor(&Value::Array(elements)).unwrap(),
        )
    }

    #[test]
    fn valid_key_message() {
        let transport_id = TransportId::new("tor").unwrap();
        let key_message = encode_key_message(
            group().id(),
            &transport_id,
            &PublicKey::from_bytes([5; 32]),
            1000,
        )
        .unwrap();

        let context = validate_message(&key_message).unwrap();
        assert!(context.dependencies.is_empty());
        assert!(!context.metadata.get_bool("isSession").unwrap());
        assert_eq!(context.metadata.get_string("transportId").unwrap(), "tor");
        assert_eq!(context.metadata.get_integer("messageType").unwrap(), 0);
        assert!(!context.metadata.get_bool("local").unwrap());
        assert_eq!(context.metadata.get_bytes("publicKey").unwrap(), &[5; 32]);
    }

    #[test]
    fn valid_activate_message() {
        let transport_id = TransportId::new("tor").unwrap();
        let previous = MessageId::from_bytes([8; 32]);
        let activate_message =
            encode_activate_message(group().id(), &transport_id, previous, 1000).unwrap();

        let context = validate_message(&activate_message).unwrap();
        assert_eq!(context.dependencies, vec![previous]);
        assert_eq!(context.metadata.get_integer("messageType").unwrap(), 1);
        assert!(!context.metadata.contains_key("publicKey"));
    }

    #[test]
    fn short_public_keys_pass_validation() {
        // Key length is only checked against its bounds here, parsing happens on delivery.
        let context = validate_message(&message(vec![
            Value::Integer(0.into()),
            Value::Text("tor".into()),
            Value::Bytes(vec![1]),
        ]))
        .unwrap();
        assert_eq!(context.metadata.get_bytes("publicKey").unwrap(), &[1]);
    }

    #[test]
    fn invalid_messages() {
        let long_transport = "x".repeat(101);
        let cases = vec![
            vec![],
            vec![Value::Null],
            vec![
                Value::Text("0".into()),
                Value::Text("tor".into()),
                Value::Bytes(vec![1]),
            ],
            vec![
                Value::Integer(0.into()),
                Value::Text(long_transport),
                Value::Bytes(vec![1]),
            ],
            vec![
                Value::Integer(0.into()),
                Value::Bytes(vec![1]),
                Value::Bytes(vec![1]),
            ],
            vec![
                Value::Integer(0.into()),
                Value::Text("tor".into()),
                Value::Bytes(vec![]),
            ],
            vec![
                Value::Integer(1.into()),
                Value::Text("tor".into()),
                Value::Bytes(vec![1; 33]),
            ],
            vec![
                Value::Integer(1.into()),
                Value::Text("tor".into()),
                Value::Text("not an id".into()),
            ],
        ];

        for elements in cases {
            assert_matches!(
                validate_message(&message(elements)),
                Err(ValidationError::Body(_))
            );
        }

        let not_cbor = Message::new(group().id(), 0, vec![0xff, 0x00]);
        assert!(validate_message(&not_cbor).is_err());
    }

    #[test]
    fn deterministic() {
        let message = message(vec![
            Value::Integer(0.into()),
            Value::Text("lan".into()),
            Value::Bytes(vec![3; 32]),
        ]);
        assert_eq!(
            validate_message(&message).unwrap(),
            validate_message(&message).unwrap()
        );
    }
}
