// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination of key agreement sessions with all contacts.
use std::collections::HashMap;
use std::error::Error;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use transport_agreement_core::cbor::EncodeError;
use transport_agreement_core::{
    ClientId, Contact, ContactId, Dictionary, FormatError, Group, GroupId, KeySetId, Message,
    MessageId, TransportId, Visibility,
};
use transport_agreement_store::{
    ContactStore, GroupStore, MessageStore, Transaction, TransportKeyStore,
};

use crate::config::{Config, MAJOR_VERSION, client_id};
use crate::crypto::{AgreementCrypto, CryptoError, KeyPair, PublicKey, RootKey, Rng};
use crate::message::{
    MSG_KEY_IS_SESSION, MSG_KEY_MESSAGE_TYPE, MSG_KEY_PUBLIC_KEY, MSG_KEY_TRANSPORT_ID,
    MessageType, encode_activate_message, encode_key_message, encode_message_metadata,
};
use crate::session::{Session, State, encode_session, parse_session, session_query};
use crate::traits::{ClientVersioning, Clock, KeyManager};

/// Size of the random body of messages which only hold session records.
const STORAGE_MESSAGE_BODY_SIZE: usize = 32;

/// What should happen with an incoming message after it was processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryAction {
    /// The message was processed, it is stored but not offered to other peers.
    AcceptDoNotShare,

    /// The message is not acceptable in the current state and is discarded.
    Reject,

    /// The message can't be processed yet and should be delivered again later.
    Defer,
}

/// Errors of the key agreement manager, generic over the errors of its collaborators.
///
/// All of them abort the current unit of work. The caller is expected to roll back the
/// transaction.
#[derive(Debug, Error)]
pub enum ManagerError<SE, KE, VE>
where
    SE: Error,
    KE: Error,
    VE: Error,
{
    #[error("store error: {0}")]
    Store(SE),

    #[error("key manager error: {0}")]
    KeyManager(KE),

    #[error("client versioning error: {0}")]
    Versioning(VE),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A stored session record could not be decoded.
    #[error("corrupt session record: {0}")]
    CorruptSession(FormatError),

    #[error("found {0} session records for transport {1}")]
    MultipleSessions(usize, TransportId),

    /// Local state contradicts itself, continuing would risk inconsistent keys.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type AgreementError<S, K, V> = ManagerError<
    <S as Transaction>::Error,
    <K as KeyManager>::Error,
    <V as ClientVersioning>::Error,
>;

/// Session record together with the id of the message holding it.
#[derive(Clone, Debug)]
struct StoredSession {
    storage_id: MessageId,
    session: Session,
}

/// Agrees on transport keys with every contact for all locally supported transports.
///
/// Keys are usually derived when a contact gets added. Transports which were added later get
/// their keys through this manager: each side sends a KEY message with an ephemeral public key,
/// derives the root key as soon as it knows the other side's key, installs transport keys and
/// confirms with an ACTIVATE message. Keys are activated once the confirmation of the contact
/// arrives.
///
/// All hooks are expected to run inside of a transaction started by the caller. The manager
/// itself holds no mutable state, the store is the only source of truth.
#[derive(Debug)]
pub struct TransportKeyAgreementManager<S, K, V, C> {
    config: Config,
    store: S,
    key_manager: K,
    versioning: V,
    clock: C,
    crypto: AgreementCrypto,
    client_id: ClientId,
    local_group: Group,
}

impl<S, K, V, C> TransportKeyAgreementManager<S, K, V, C>
where
    S: ContactStore + GroupStore + MessageStore + TransportKeyStore,
    K: KeyManager,
    V: ClientVersioning,
    C: Clock,
{
    pub fn new(config: Config, store: S, key_manager: K, versioning: V, clock: C) -> Self {
        Self::new_with_rng(config, store, key_manager, versioning, clock, Rng::default())
    }

    pub fn new_with_rng(
        config: Config,
        store: S,
        key_manager: K,
        versioning: V,
        clock: C,
        rng: Rng,
    ) -> Self {
        let client_id = client_id();
        let local_group = Group::local(&client_id, MAJOR_VERSION);
        Self {
            config,
            store,
            key_manager,
            versioning,
            clock,
            crypto: AgreementCrypto::new(rng),
            client_id,
            local_group,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn local_group(&self) -> &Group {
        &self.local_group
    }

    /// Group shared with the given contact.
    pub fn contact_group(&self, contact: &Contact) -> Group {
        Group::contact(
            &self.client_id,
            MAJOR_VERSION,
            self.config.local_author(),
            contact.author_id(),
        )
    }

    /// Prepares local state and starts sessions for every transport we don't have keys for.
    ///
    /// Safe to run on every start, sessions are only started once.
    pub async fn on_database_opened(&self) -> Result<(), AgreementError<S, K, V>> {
        let contacts = self.store.contacts().await.map_err(ManagerError::Store)?;

        let added = self
            .store
            .add_group(&self.local_group)
            .await
            .map_err(ManagerError::Store)?;
        if added {
            debug!(contacts = contacts.len(), "created local group");
            for contact in &contacts {
                self.attach_contact(contact).await?;
            }
        }

        let transports_with_keys = self
            .store
            .transports_with_keys()
            .await
            .map_err(ManagerError::Store)?;
        for contact in &contacts {
            let with_keys = transports_with_keys
                .get(&contact.id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            self.start_missing_sessions(contact, with_keys).await?;
        }

        Ok(())
    }

    /// Creates the group shared with a new contact and starts sessions for transports lacking
    /// keys.
    pub async fn adding_contact(&self, contact: &Contact) -> Result<(), AgreementError<S, K, V>> {
        self.attach_contact(contact).await?;

        let mut with_keys = Vec::new();
        for transport_id in self.config.transports() {
            if self
                .store
                .contains_transport_keys(contact.id(), transport_id)
                .await
                .map_err(ManagerError::Store)?
            {
                with_keys.push(transport_id.clone());
            }
        }
        self.start_missing_sessions(contact, &with_keys).await
    }

    /// Removes the group shared with a contact and with it all sessions.
    pub async fn removing_contact(
        &self,
        contact: &Contact,
    ) -> Result<(), AgreementError<S, K, V>> {
        let group = self.contact_group(contact);
        self.store
            .remove_group(&group.id())
            .await
            .map_err(ManagerError::Store)?;
        debug!(contact_id = %contact.id(), "removed contact group");
        Ok(())
    }

    pub async fn on_client_visibility_changing(
        &self,
        contact: &Contact,
        visibility: Visibility,
    ) -> Result<(), AgreementError<S, K, V>> {
        let group = self.contact_group(contact);
        self.store
            .set_group_visibility(contact.id(), &group.id(), visibility)
            .await
            .map_err(ManagerError::Store)?;
        Ok(())
    }

    /// Processes a validated KEY or ACTIVATE message of a contact.
    pub async fn incoming_message(
        &self,
        message: &Message,
        metadata: &Dictionary,
    ) -> Result<DeliveryAction, AgreementError<S, K, V>> {
        let (message_type, transport_id) = match parse_message_metadata(metadata) {
            Ok(result) => result,
            Err(err) => {
                warn!(id = %message.id(), %err, "rejecting message with malformed metadata");
                return Ok(DeliveryAction::Reject);
            }
        };
        debug!(
            id = %message.id(),
            ?message_type,
            transport = %transport_id,
            "received message"
        );

        if !self.config.supports(&transport_id) {
            info!(transport = %transport_id, "deferring message for unsupported transport");
            return Ok(DeliveryAction::Defer);
        }

        let stored = self
            .load_session(&message.group_id(), &transport_id)
            .await?;

        match message_type {
            MessageType::Key => {
                self.handle_key_message(message, metadata, &transport_id, stored)
                    .await
            }
            MessageType::Activate => self.handle_activate_message(&transport_id, stored).await,
        }
    }

    /// All sessions held with a contact.
    pub async fn sessions(
        &self,
        contact: &Contact,
    ) -> Result<Vec<(TransportId, Session)>, AgreementError<S, K, V>> {
        let group = self.contact_group(contact);
        let records = self
            .store
            .messages_metadata(&group.id())
            .await
            .map_err(ManagerError::Store)?;

        let mut sessions = Vec::new();
        for (_, record) in records {
            if !matches!(record.get_bool(MSG_KEY_IS_SESSION), Ok(true)) {
                continue;
            }
            let transport_id = record
                .get_string(MSG_KEY_TRANSPORT_ID)
                .map_err(ManagerError::CorruptSession)
                .and_then(|value| {
                    TransportId::new(value).map_err(|err| {
                        ManagerError::CorruptSession(FormatError::InvalidValue(
                            MSG_KEY_TRANSPORT_ID.into(),
                            err.to_string(),
                        ))
                    })
                })?;
            let session = parse_session(&record).map_err(ManagerError::CorruptSession)?;
            sessions.push((transport_id, session));
        }
        Ok(sessions)
    }

    async fn attach_contact(&self, contact: &Contact) -> Result<(), AgreementError<S, K, V>> {
        let group = self.contact_group(contact);
        self.store
            .add_group(&group)
            .await
            .map_err(ManagerError::Store)?;
        self.store
            .set_group_contact(&group.id(), contact.id())
            .await
            .map_err(ManagerError::Store)?;

        let visibility = self
            .versioning
            .client_visibility(contact.id(), &self.client_id, MAJOR_VERSION)
            .await
            .map_err(ManagerError::Versioning)?;
        self.store
            .set_group_visibility(contact.id(), &group.id(), visibility)
            .await
            .map_err(ManagerError::Store)?;

        debug!(contact_id = %contact.id(), ?visibility, "attached contact group");
        Ok(())
    }

    async fn start_missing_sessions(
        &self,
        contact: &Contact,
        transports_with_keys: &[TransportId],
    ) -> Result<(), AgreementError<S, K, V>> {
        let group_id = self.contact_group(contact).id();
        for transport_id in self.config.transports() {
            if transports_with_keys.contains(transport_id) {
                continue;
            }
            if self.load_session(&group_id, transport_id).await?.is_some() {
                continue;
            }
            self.start_session(&group_id, transport_id).await?;
        }
        Ok(())
    }

    async fn start_session(
        &self,
        group_id: &GroupId,
        transport_id: &TransportId,
    ) -> Result<(), AgreementError<S, K, V>> {
        let key_pair = self.crypto.generate_key_pair()?;
        let key_message = self
            .send_key_message(group_id, transport_id, key_pair.public_key())
            .await?;
        let session = Session::await_key(key_message.id(), key_pair, key_message.timestamp());
        self.save_new_session(group_id, transport_id, &session)
            .await?;
        info!(transport = %transport_id, "started key agreement session");
        Ok(())
    }

    async fn handle_key_message(
        &self,
        message: &Message,
        metadata: &Dictionary,
        transport_id: &TransportId,
        stored: Option<StoredSession>,
    ) -> Result<DeliveryAction, AgreementError<S, K, V>> {
        let group_id = message.group_id();
        let contact_id = self.group_contact(&group_id).await?;
        let have_keys = self
            .store
            .contains_transport_keys(contact_id, transport_id)
            .await
            .map_err(ManagerError::Store)?;

        match stored {
            None if have_keys => {
                // Our contact started a session for a transport we already have keys for, for
                // example because we added the transport before adding the contact.
                self.handle_key_message_for_new_session(
                    message,
                    metadata,
                    contact_id,
                    transport_id,
                )
                .await
            }
            None => Err(invariant_violation(format!(
                "no session and no keys for transport {transport_id}"
            ))),
            Some(stored) if stored.session.state() != State::AwaitKey => {
                info!(
                    transport = %transport_id,
                    state = ?stored.session.state(),
                    "rejecting KEY message in unexpected state"
                );
                Ok(DeliveryAction::Reject)
            }
            Some(_) if have_keys => Err(invariant_violation(format!(
                "awaiting key while keys for transport {transport_id} exist"
            ))),
            Some(stored) => {
                self.handle_key_message_for_existing_session(
                    message,
                    metadata,
                    contact_id,
                    transport_id,
                    stored,
                )
                .await
            }
        }
    }

    async fn handle_key_message_for_new_session(
        &self,
        message: &Message,
        metadata: &Dictionary,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<DeliveryAction, AgreementError<S, K, V>> {
        let Some(remote_public_key) = self.remote_public_key(metadata) else {
            return Ok(DeliveryAction::Reject);
        };
        let alice = self.is_alice(contact_id).await?;

        let local_key_pair = self.crypto.generate_key_pair()?;
        let Some(root_key) = self.derive_root_key(&local_key_pair, &remote_public_key) else {
            return Ok(DeliveryAction::Reject);
        };

        let group_id = message.group_id();
        let key_message = self
            .send_key_message(&group_id, transport_id, local_key_pair.public_key())
            .await?;
        let epoch = key_message.timestamp().min(message.timestamp());

        let key_set_id = self
            .add_rotation_keys(contact_id, transport_id, &root_key, epoch, alice)
            .await?;
        let activate_message = self
            .send_activate_message(&group_id, transport_id, key_message.id())
            .await?;

        let session = Session::await_activate(activate_message.id(), key_set_id);
        self.save_new_session(&group_id, transport_id, &session)
            .await?;
        Ok(DeliveryAction::AcceptDoNotShare)
    }

    async fn handle_key_message_for_existing_session(
        &self,
        message: &Message,
        metadata: &Dictionary,
        contact_id: ContactId,
        transport_id: &TransportId,
        stored: StoredSession,
    ) -> Result<DeliveryAction, AgreementError<S, K, V>> {
        let session = &stored.session;
        let (Some(local_key_pair), Some(local_timestamp), Some(last_local_message_id)) = (
            session.local_key_pair(),
            session.local_timestamp(),
            session.last_local_message_id(),
        ) else {
            return Err(invariant_violation(format!(
                "incomplete session awaiting key for transport {transport_id}"
            )));
        };

        let Some(remote_public_key) = self.remote_public_key(metadata) else {
            return Ok(DeliveryAction::Reject);
        };
        let alice = self.is_alice(contact_id).await?;
        let Some(root_key) = self.derive_root_key(local_key_pair, &remote_public_key) else {
            return Ok(DeliveryAction::Reject);
        };

        let epoch = local_timestamp.min(message.timestamp());
        let key_set_id = self
            .add_rotation_keys(contact_id, transport_id, &root_key, epoch, alice)
            .await?;
        let activate_message = self
            .send_activate_message(&message.group_id(), transport_id, last_local_message_id)
            .await?;

        let session = Session::await_activate(activate_message.id(), key_set_id);
        self.save_session(stored.storage_id, transport_id, &session)
            .await?;
        Ok(DeliveryAction::AcceptDoNotShare)
    }

    async fn handle_activate_message(
        &self,
        transport_id: &TransportId,
        stored: Option<StoredSession>,
    ) -> Result<DeliveryAction, AgreementError<S, K, V>> {
        let Some(stored) = stored.filter(|stored| stored.session.state() == State::AwaitActivate)
        else {
            info!(transport = %transport_id, "rejecting ACTIVATE message in unexpected state");
            return Ok(DeliveryAction::Reject);
        };

        let Some(key_set_id) = stored.session.key_set_id() else {
            return Err(invariant_violation(format!(
                "session awaiting activation without key set for transport {transport_id}"
            )));
        };

        self.key_manager
            .activate_keys(&HashMap::from([(transport_id.clone(), key_set_id)]))
            .await
            .map_err(ManagerError::KeyManager)?;

        let session = Session::activated(stored.session.last_local_message_id());
        self.save_session(stored.storage_id, transport_id, &session)
            .await?;
        info!(transport = %transport_id, %key_set_id, "activated transport keys");
        Ok(DeliveryAction::AcceptDoNotShare)
    }

    fn remote_public_key(&self, metadata: &Dictionary) -> Option<PublicKey> {
        let bytes = match metadata.get_bytes(MSG_KEY_PUBLIC_KEY) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "KEY message without public key");
                return None;
            }
        };
        match self.crypto.parse_public_key(bytes) {
            Ok(public_key) => Some(public_key),
            Err(err) => {
                warn!(%err, "KEY message with invalid public key");
                None
            }
        }
    }

    fn derive_root_key(&self, local: &KeyPair, remote: &PublicKey) -> Option<RootKey> {
        match self.crypto.derive_root_key(local, remote) {
            Ok(root_key) => Some(root_key),
            Err(err) => {
                warn!(%err, "could not derive root key");
                None
            }
        }
    }

    async fn add_rotation_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        root_key: &RootKey,
        epoch: u64,
        alice: bool,
    ) -> Result<KeySetId, AgreementError<S, K, V>> {
        let key_set_id = self
            .key_manager
            .add_rotation_keys(contact_id, transport_id, root_key, epoch, alice, false)
            .await
            .map_err(ManagerError::KeyManager)?;
        info!(
            %contact_id,
            transport = %transport_id,
            %key_set_id,
            epoch,
            alice,
            "installed transport keys"
        );
        Ok(key_set_id)
    }

    /// Whether we take the first role in the key derivation with this contact.
    async fn is_alice(&self, contact_id: ContactId) -> Result<bool, AgreementError<S, K, V>> {
        let Some(contact) = self
            .store
            .contact(contact_id)
            .await
            .map_err(ManagerError::Store)?
        else {
            return Err(invariant_violation(format!("unknown contact {contact_id}")));
        };
        Ok(self.config.local_author() < contact.author_id())
    }

    async fn group_contact(&self, group_id: &GroupId) -> Result<ContactId, AgreementError<S, K, V>> {
        self.store
            .group_contact(group_id)
            .await
            .map_err(ManagerError::Store)?
            .ok_or_else(|| invariant_violation(format!("no contact bound to group {group_id}")))
    }

    async fn load_session(
        &self,
        group_id: &GroupId,
        transport_id: &TransportId,
    ) -> Result<Option<StoredSession>, AgreementError<S, K, V>> {
        let ids = self
            .store
            .message_ids(group_id, &session_query(transport_id))
            .await
            .map_err(ManagerError::Store)?;

        let storage_id = match ids.as_slice() {
            [] => {
                debug!(transport = %transport_id, "no session found");
                return Ok(None);
            }
            [storage_id] => *storage_id,
            _ => return Err(ManagerError::MultipleSessions(ids.len(), transport_id.clone())),
        };

        let Some(record) = self
            .store
            .message_metadata(&storage_id)
            .await
            .map_err(ManagerError::Store)?
        else {
            return Err(invariant_violation(format!(
                "session record {storage_id} vanished"
            )));
        };
        let session = parse_session(&record).map_err(ManagerError::CorruptSession)?;
        debug!(transport = %transport_id, state = ?session.state(), "loaded session");

        Ok(Some(StoredSession {
            storage_id,
            session,
        }))
    }

    async fn save_new_session(
        &self,
        group_id: &GroupId,
        transport_id: &TransportId,
        session: &Session,
    ) -> Result<(), AgreementError<S, K, V>> {
        let body = self
            .crypto
            .rng()
            .random_vec(STORAGE_MESSAGE_BODY_SIZE)
            .map_err(CryptoError::from)?;
        let storage_message = Message::new(*group_id, 0, body);
        self.store
            .insert_message(&storage_message, &Dictionary::new())
            .await
            .map_err(ManagerError::Store)?;
        self.save_session(storage_message.id(), transport_id, session)
            .await
    }

    async fn save_session(
        &self,
        storage_id: MessageId,
        transport_id: &TransportId,
        session: &Session,
    ) -> Result<(), AgreementError<S, K, V>> {
        let merged = self
            .store
            .merge_message_metadata(&storage_id, &encode_session(session, transport_id))
            .await
            .map_err(ManagerError::Store)?;
        if !merged {
            return Err(invariant_violation(format!(
                "session record {storage_id} vanished"
            )));
        }
        debug!(transport = %transport_id, state = ?session.state(), "saved session");
        Ok(())
    }

    async fn send_key_message(
        &self,
        group_id: &GroupId,
        transport_id: &TransportId,
        public_key: &PublicKey,
    ) -> Result<Message, AgreementError<S, K, V>> {
        let message = encode_key_message(*group_id, transport_id, public_key, self.clock.now())?;
        self.send_message(&message, MessageType::Key, transport_id)
            .await?;
        Ok(message)
    }

    async fn send_activate_message(
        &self,
        group_id: &GroupId,
        transport_id: &TransportId,
        previous_message_id: MessageId,
    ) -> Result<Message, AgreementError<S, K, V>> {
        let message = encode_activate_message(
            *group_id,
            transport_id,
            previous_message_id,
            self.clock.now(),
        )?;
        self.send_message(&message, MessageType::Activate, transport_id)
            .await?;
        Ok(message)
    }

    async fn send_message(
        &self,
        message: &Message,
        message_type: MessageType,
        transport_id: &TransportId,
    ) -> Result<(), AgreementError<S, K, V>> {
        let metadata = encode_message_metadata(transport_id, message_type, true);
        self.store
            .insert_message(message, &metadata)
            .await
            .map_err(ManagerError::Store)?;
        debug!(id = %message.id(), ?message_type, transport = %transport_id, "sent message");
        Ok(())
    }
}

fn parse_message_metadata(metadata: &Dictionary) -> Result<(MessageType, TransportId), FormatError> {
    let value = metadata.get_integer(MSG_KEY_MESSAGE_TYPE)?;
    let message_type = MessageType::from_value(value).ok_or_else(|| {
        FormatError::InvalidValue(MSG_KEY_MESSAGE_TYPE.into(), format!("unknown type {value}"))
    })?;
    let transport_id = TransportId::new(metadata.get_string(MSG_KEY_TRANSPORT_ID)?)
        .map_err(|err| FormatError::InvalidValue(MSG_KEY_TRANSPORT_ID.into(), err.to_string()))?;
    Ok((message_type, transport_id))
}

fn invariant_violation<SE, KE, VE>(reason: String) -> ManagerError<SE, KE, VE>
where
    SE: Error,
    KE: Error,
    VE: Error,
{
    error!(%reason, "invariant violated, aborting");
    ManagerError::InvariantViolation(reason)
}
