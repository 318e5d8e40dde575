// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-contact, per-transport protocol state and its persisted record layout.
use transport_agreement_core::{Dictionary, FormatError, KeySetId, MessageId, TransportId};

use crate::crypto::{KeyPair, PrivateKey, PublicKey};
use crate::message::{MSG_KEY_IS_SESSION, MSG_KEY_TRANSPORT_ID};

pub const SESSION_KEY_STATE: &str = "state";
pub const SESSION_KEY_LAST_LOCAL_MESSAGE_ID: &str = "lastLocalMessageId";
pub const SESSION_KEY_LOCAL_PUBLIC_KEY: &str = "localPublicKey";
pub const SESSION_KEY_LOCAL_PRIVATE_KEY: &str = "localPrivateKey";
pub const SESSION_KEY_LOCAL_TIMESTAMP: &str = "localTimestamp";
pub const SESSION_KEY_KEY_SET_ID: &str = "keySetId";

/// Progress of a key agreement. States only ever advance in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// We sent our public key and wait for the one of our contact.
    AwaitKey,

    /// Keys are derived and installed, we wait for our contact to confirm.
    AwaitActivate,

    /// Both sides derived the keys, they are ready for use.
    Activated,
}

impl State {
    pub fn value(&self) -> i64 {
        match self {
            State::AwaitKey => 0,
            State::AwaitActivate => 1,
            State::Activated => 2,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(State::AwaitKey),
            1 => Some(State::AwaitActivate),
            2 => Some(State::Activated),
            _ => None,
        }
    }
}

/// Immutable snapshot of a session.
///
/// Only the fields relevant to the state are set: the ephemeral key pair and the timestamp of
/// our KEY message while awaiting the contact's key, the installed key set while awaiting
/// activation. Transitions build a new value which replaces the stored one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    state: State,
    last_local_message_id: Option<MessageId>,
    local_key_pair: Option<KeyPair>,
    local_timestamp: Option<u64>,
    key_set_id: Option<KeySetId>,
}

impl Session {
    pub fn await_key(
        last_local_message_id: MessageId,
        local_key_pair: KeyPair,
        local_timestamp: u64,
    ) -> Self {
        Self {
            state: State::AwaitKey,
            last_local_message_id: Some(last_local_message_id),
            local_key_pair: Some(local_key_pair),
            local_timestamp: Some(local_timestamp),
            key_set_id: None,
        }
    }

    pub fn await_activate(last_local_message_id: MessageId, key_set_id: KeySetId) -> Self {
        Self {
            state: State::AwaitActivate,
            last_local_message_id: Some(last_local_message_id),
            local_key_pair: None,
            local_timestamp: None,
            key_set_id: Some(key_set_id),
        }
    }

    pub fn activated(last_local_message_id: Option<MessageId>) -> Self {
        Self {
            state: State::Activated,
            last_local_message_id,
            local_key_pair: None,
            local_timestamp: None,
            key_set_id: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn last_local_message_id(&self) -> Option<MessageId> {
        self.last_local_message_id
    }

    pub fn local_key_pair(&self) -> Option<&KeyPair> {
        self.local_key_pair.as_ref()
    }

    pub fn local_timestamp(&self) -> Option<u64> {
        self.local_timestamp
    }

    pub fn key_set_id(&self) -> Option<KeySetId> {
        self.key_set_id
    }
}

/// Metadata query matching the stored session of a transport.
pub fn session_query(transport_id: &TransportId) -> Dictionary {
    let mut query = Dictionary::new();
    query
        .insert_bool(MSG_KEY_IS_SESSION, true)
        .insert_string(MSG_KEY_TRANSPORT_ID, transport_id.as_str());
    query
}

/// Encodes a session into a metadata record. Every field is present, unused ones are null.
pub fn encode_session(session: &Session, transport_id: &TransportId) -> Dictionary {
    let mut record = session_query(transport_id);
    record.insert_integer(SESSION_KEY_STATE, session.state.value());

    match session.last_local_message_id {
        Some(id) => record.insert_bytes(SESSION_KEY_LAST_LOCAL_MESSAGE_ID, id.as_bytes().to_vec()),
        None => record.insert_null(SESSION_KEY_LAST_LOCAL_MESSAGE_ID),
    };

    match &session.local_key_pair {
        Some(key_pair) => record
            .insert_bytes(
                SESSION_KEY_LOCAL_PUBLIC_KEY,
                key_pair.public_key().as_bytes().to_vec(),
            )
            .insert_bytes(
                SESSION_KEY_LOCAL_PRIVATE_KEY,
                key_pair.private_key().as_bytes().to_vec(),
            ),
        None => record
            .insert_null(SESSION_KEY_LOCAL_PUBLIC_KEY)
            .insert_null(SESSION_KEY_LOCAL_PRIVATE_KEY),
    };

    match session.local_timestamp {
        Some(timestamp) => record.insert_unsigned(SESSION_KEY_LOCAL_TIMESTAMP, timestamp),
        None => record.insert_null(SESSION_KEY_LOCAL_TIMESTAMP),
    };

    match session.key_set_id {
        Some(key_set_id) => record.insert_unsigned(SESSION_KEY_KEY_SET_ID, key_set_id.as_u64()),
        None => record.insert_null(SESSION_KEY_KEY_SET_ID),
    };

    record
}

/// Decodes a session record, failing on anything [`encode_session`] would not produce.
pub fn parse_session(record: &Dictionary) -> Result<Session, FormatError> {
    let state = State::from_value(record.get_integer(SESSION_KEY_STATE)?).ok_or_else(|| {
        FormatError::InvalidValue(SESSION_KEY_STATE.into(), "unknown state".into())
    })?;

    let last_local_message_id = record
        .get_optional_bytes(SESSION_KEY_LAST_LOCAL_MESSAGE_ID)?
        .map(|bytes| {
            MessageId::try_from(bytes).map_err(|err| {
                FormatError::InvalidValue(SESSION_KEY_LAST_LOCAL_MESSAGE_ID.into(), err.to_string())
            })
        })
        .transpose()?;

    let public_key = record.get_optional_bytes(SESSION_KEY_LOCAL_PUBLIC_KEY)?;
    let private_key = record.get_optional_bytes(SESSION_KEY_LOCAL_PRIVATE_KEY)?;
    let local_key_pair = match (public_key, private_key) {
        (Some(public_key), Some(private_key)) => Some(parse_key_pair(public_key, private_key)?),
        (None, None) => None,
        _ => {
            return Err(FormatError::InvalidValue(
                SESSION_KEY_LOCAL_PRIVATE_KEY.into(),
                "incomplete key pair".into(),
            ));
        }
    };

    let local_timestamp = record.get_optional_unsigned(SESSION_KEY_LOCAL_TIMESTAMP)?;
    let key_set_id = record
        .get_optional_unsigned(SESSION_KEY_KEY_SET_ID)?
        .map(KeySetId::new);

    let consistent = match state {
        State::AwaitKey => {
            local_key_pair.is_some() && local_timestamp.is_some() && key_set_id.is_none()
        }
        State::AwaitActivate => {
            local_key_pair.is_none() && local_timestamp.is_none() && key_set_id.is_some()
        }
        State::Activated => {
            local_key_pair.is_none() && local_timestamp.is_none() && key_set_id.is_none()
        }
    };
    if !consistent {
        return Err(FormatError::InvalidValue(
            SESSION_KEY_STATE.into(),
            format!("fields do not match state {state:?}"),
        ));
    }

    Ok(Session {
        state,
        last_local_message_id,
        local_key_pair,
        local_timestamp,
        key_set_id,
    })
}

fn parse_key_pair(public_key: &[u8], private_key: &[u8]) -> Result<KeyPair, FormatError> {
    let invalid = |key: &str, err: crate::crypto::CryptoError| {
        FormatError::InvalidValue(key.into(), err.to_string())
    };
    let public_key =
        PublicKey::try_from(public_key).map_err(|err| invalid(SESSION_KEY_LOCAL_PUBLIC_KEY, err))?;
    let private_key = PrivateKey::try_from(private_key)
        .map_err(|err| invalid(SESSION_KEY_LOCAL_PRIVATE_KEY, err))?;
    KeyPair::from_parts(public_key, private_key)
        .map_err(|err| invalid(SESSION_KEY_LOCAL_PRIVATE_KEY, err))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use transport_agreement_core::{FormatError, KeySetId, MessageId, TransportId};

    use crate::crypto::{AgreementCrypto, Rng};

    use super::{
        SESSION_KEY_KEY_SET_ID, SESSION_KEY_LOCAL_PRIVATE_KEY, SESSION_KEY_STATE, Session, State,
        encode_session, parse_session, session_query,
    };

    fn transport() -> TransportId {
        TransportId::new("tor").unwrap()
    }

    fn sessions() -> Vec<Session> {
        let crypto = AgreementCrypto::new(Rng::from_seed([1; 32]));
        vec![
            Session::await_key(
                MessageId::from_bytes([1; 32]),
                crypto.generate_key_pair().unwrap(),
                1_700_000_000_000,
            ),
            Session::await_activate(MessageId::from_bytes([2; 32]), KeySetId::new(12)),
            Session::activated(Some(MessageId::from_bytes([3; 32]))),
            Session::activated(None),
        ]
    }

    #[test]
    fn decoding_inverts_encoding() {
        for session in sessions() {
            let record = encode_session(&session, &transport());
            assert_eq!(record.len(), 8);
            assert_eq!(parse_session(&record).unwrap(), session);
        }
    }

    #[test]
    fn full_integer_range_survives_encoding() {
        let crypto = AgreementCrypto::new(Rng::from_seed([2; 32]));
        let extremes = [
            Session::await_key(
                MessageId::from_bytes([4; 32]),
                crypto.generate_key_pair().unwrap(),
                u64::MAX,
            ),
            Session::await_activate(MessageId::from_bytes([5; 32]), KeySetId::new(u64::MAX)),
        ];
        for session in extremes {
            let record = encode_session(&session, &transport());
            assert_eq!(parse_session(&record).unwrap(), session);
        }

        // Negative values are never produced by the encoder.
        let mut record = encode_session(&sessions()[1], &transport());
        record.insert_integer(SESSION_KEY_KEY_SET_ID, -1);
        assert_matches!(parse_session(&record), Err(FormatError::OutOfRange(_)));
    }

    #[test]
    fn records_match_their_query() {
        for session in sessions() {
            let record = encode_session(&session, &transport());
            assert!(record.matches(&session_query(&transport())));
            assert!(!record.matches(&session_query(&TransportId::new("lan").unwrap())));
        }
    }

    #[test]
    fn state_values() {
        assert_eq!(State::from_value(0), Some(State::AwaitKey));
        assert_eq!(State::from_value(2), Some(State::Activated));
        assert_eq!(State::from_value(3), None);
        assert!(State::AwaitKey < State::AwaitActivate);
        assert!(State::AwaitActivate < State::Activated);
    }

    #[test]
    fn reject_inconsistent_records() {
        let sessions = sessions();
        let (await_key, await_activate) = (&sessions[0], &sessions[1]);

        // Unknown state.
        let mut record = encode_session(await_activate, &transport());
        record.insert_integer(SESSION_KEY_STATE, 7);
        assert_matches!(parse_session(&record), Err(FormatError::InvalidValue(_, _)));

        // Missing field.
        let mut record = encode_session(await_activate, &transport());
        record.insert_null(SESSION_KEY_KEY_SET_ID);
        assert_matches!(parse_session(&record), Err(FormatError::InvalidValue(_, _)));

        // Half of a key pair.
        let mut record = encode_session(await_key, &transport());
        record.insert_null(SESSION_KEY_LOCAL_PRIVATE_KEY);
        assert!(parse_session(&record).is_err());

        // Key pair where only the activation key set belongs.
        let mut record = encode_session(await_key, &transport());
        record.insert_integer(SESSION_KEY_STATE, State::AwaitActivate.value());
        assert!(parse_session(&record).is_err());

        // Wrong value type.
        let mut record = encode_session(await_activate, &transport());
        record.insert_string(SESSION_KEY_KEY_SET_ID, "12");
        assert_matches!(
            parse_session(&record),
            Err(FormatError::UnexpectedType(_, "integer"))
        );
    }
}
