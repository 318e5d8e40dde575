// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data types shared between the transport key agreement protocol and its storage layer.
//!
//! Peers exchange [`Message`]s within [`Group`]s. Every contact relationship has its own group
//! whose identifier both sides derive from their [`AuthorId`]s, which means that both sides also
//! agree on the [`MessageId`] of every message sent into it. Local state attached to messages is
//! kept in [`Dictionary`] records, encoded as CBOR.
pub mod cbor;
mod contact;
pub mod dictionary;
mod group;
pub mod hash;
mod message;
mod transport;

pub use contact::{AuthorId, Contact, ContactId};
pub use dictionary::{Dictionary, FormatError};
pub use group::{ClientId, Group, GroupId, Visibility};
pub use hash::{HASH_LEN, Hash, HashError};
pub use message::{MESSAGE_ID_LENGTH, Message, MessageId};
pub use transport::{KeySetId, MAX_TRANSPORT_ID_LENGTH, TransportId, TransportIdError};
