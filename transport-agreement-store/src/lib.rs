// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backing the transport key agreement protocol.
//!
//! All stores implement [`Transaction`]. Every read and write of the domain traits
//! ([`GroupStore`], [`MessageStore`], [`ContactStore`], [`TransportKeyStore`]) runs inside the
//! currently open transaction and fails if none was started. The holder of the transaction permit
//! decides whether the work is committed or rolled back.
pub mod contacts;
pub mod groups;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod messages;
pub mod orderer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod traits;

pub use contacts::ContactStore;
pub use groups::GroupStore;
pub use keys::{TransportKeySet, TransportKeyStore};
pub use messages::MessageStore;
pub use orderer::OrdererStore;
pub use traits::Transaction;
