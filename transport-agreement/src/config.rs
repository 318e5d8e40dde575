// SPDX-License-Identifier: MIT OR Apache-2.0

use transport_agreement_core::{AuthorId, ClientId, TransportId};

/// Identifier of the key agreement client, scoping its groups.
pub const CLIENT_ID: &str = "transport-agreement";

/// Major version of the key agreement client. Peers only agree with peers of the same version.
pub const MAJOR_VERSION: u32 = 0;

pub fn client_id() -> ClientId {
    ClientId::new(CLIENT_ID)
}

/// Configuration for a key agreement manager.
#[derive(Clone, Debug)]
pub struct Config {
    /// Long-term identity of the local peer.
    pub(crate) local_author: AuthorId,

    /// Transports supporting connections in both directions.
    pub(crate) duplex_transports: Vec<TransportId>,

    /// Transports supporting connections in one direction only.
    pub(crate) simplex_transports: Vec<TransportId>,
}

impl Config {
    pub fn new(local_author: AuthorId) -> Self {
        Self {
            local_author,
            duplex_transports: Vec::new(),
            simplex_transports: Vec::new(),
        }
    }

    pub fn duplex_transport(mut self, transport_id: TransportId) -> Self {
        if !self.supports(&transport_id) {
            self.duplex_transports.push(transport_id);
        }
        self
    }

    pub fn simplex_transport(mut self, transport_id: TransportId) -> Self {
        if !self.supports(&transport_id) {
            self.simplex_transports.push(transport_id);
        }
        self
    }

    pub fn local_author(&self) -> &AuthorId {
        &self.local_author
    }

    /// All supported transports, duplex ones first.
    pub fn transports(&self) -> impl Iterator<Item = &TransportId> {
        self.duplex_transports
            .iter()
            .chain(self.simplex_transports.iter())
    }

    pub fn supports(&self, transport_id: &TransportId) -> bool {
        self.transports().any(|supported| supported == transport_id)
    }
}
