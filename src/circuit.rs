// Copyright 2025 Juan Miguel Giraldo
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::config::NetworkConfig;
use crate::crypto;
use crate::directory::RelayDirectory;
use crate::directory_protocol::RelayIdentity;
use crate::error::{OnionError, Result};
use crate::onion::{self, Hop};
use crate::protocol::{Destination, CIRCUIT_LENGTH};
use crate::transport::Transport;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// The relays a message travels through, entry hop first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    hops: Vec<RelayIdentity>,
}

impl Circuit {
    pub fn hops(&self) -> &[RelayIdentity] {
        &self.hops
    }

    pub fn entry(&self) -> Option<&RelayIdentity> {
        self.hops.first()
    }

    pub fn exit(&self) -> Option<&RelayIdentity> {
        self.hops.last()
    }

    pub fn relay_ids(&self) -> Vec<u32> {
        self.hops.iter().map(|r| r.id).collect()
    }
}

/// Picks `count` relays with distinct ids, uniformly at random.
///
/// When an id was registered more than once the latest registration is
/// used.
pub fn select_relays<R: Rng + ?Sized>(
    relays: Vec<RelayIdentity>,
    count: usize,
    rng: &mut R,
) -> Result<Vec<RelayIdentity>> {
    let mut by_id = BTreeMap::new();
    for relay in relays {
        by_id.insert(relay.id, relay);
    }

    if by_id.len() < count {
        return Err(OnionError::InsufficientRelays {
            available: by_id.len(),
            required: count,
        });
    }

    let mut candidates: Vec<RelayIdentity> = by_id.into_values().collect();
    candidates.shuffle(rng);
    candidates.truncate(count);
    Ok(candidates)
}

/// Sender side of the protocol: picks relays, layers the message and hands
/// it to the entry hop.
pub struct CircuitBuilder<D, T> {
    directory: D,
    transport: T,
    network: NetworkConfig,
}

impl<D, T> CircuitBuilder<D, T>
where
    D: RelayDirectory,
    T: Transport,
{
    pub fn new(directory: D, transport: T, network: NetworkConfig) -> Self {
        Self {
            directory,
            transport,
            network,
        }
    }

    /// Layers `message` over `selected` relays, given in build order.
    ///
    /// The returned circuit is the reverse of `selected`: the relay layered
    /// last is peeled first.
    pub fn build_onion(
        &self,
        recipient: Destination,
        message: &str,
        selected: Vec<RelayIdentity>,
    ) -> Result<(String, Circuit)> {
        let hops = selected
            .iter()
            .map(|relay| {
                Ok(Hop {
                    public_key: crypto::import_pub_key(&relay.public_key)?,
                    address: self.network.relay_destination(relay.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let onion = onion::wrap(recipient, message, &hops)?;

        let mut hops = selected;
        hops.reverse();
        Ok((onion, Circuit { hops }))
    }

    /// Fetches the relay list and builds an onion for `destination_user_id`.
    pub async fn build(&self, destination_user_id: u32, message: &str) -> Result<(String, Circuit)> {
        let recipient = self.network.user_destination(destination_user_id)?;

        let relays = self.directory.list_relays().await?;
        debug!("Fetched {} relays from directory", relays.len());

        let selected = select_relays(relays, CIRCUIT_LENGTH, &mut rand::thread_rng())?;
        self.build_onion(recipient, message, selected)
    }

    /// Builds a fresh circuit and delivers the onion to its entry hop.
    pub async fn send(&self, destination_user_id: u32, message: &str) -> Result<Circuit> {
        let (onion, circuit) = self.build(destination_user_id, message).await?;

        let entry = circuit.entry().ok_or(OnionError::InsufficientRelays {
            available: 0,
            required: CIRCUIT_LENGTH,
        })?;
        let entry_addr = self.network.relay_destination(entry.id)?;

        info!(circuit = ?circuit.relay_ids(), "Sending onion through circuit");
        self.transport.deliver(entry_addr, onion).await?;
        Ok(circuit)
    }
}
