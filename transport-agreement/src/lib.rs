// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agreement of root keys for transports which were added after a contact was established.
//!
//! Both contacts exchange an ephemeral X25519 public key per transport in a KEY message. As soon
//! as a peer knows the key of its contact it derives the root key, hands it to the
//! [`KeyManager`](traits::KeyManager) and confirms with an ACTIVATE message. Keys become usable
//! for outgoing connections once the confirmation of the contact arrived.
//!
//! Messages travel asynchronously and may arrive out of order, [`Delivery`](delivery::Delivery)
//! makes sure that they reach the [`TransportKeyAgreementManager`] in causal order.
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod manager;
pub mod message;
pub mod session;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;
pub mod traits;
pub mod validator;

pub use config::Config;
pub use delivery::{Delivery, DeliveryState};
pub use manager::{AgreementError, DeliveryAction, ManagerError, TransportKeyAgreementManager};
pub use session::{Session, State};
