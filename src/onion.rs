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

//! Building and peeling onion layers.
//!
//! A layer on the wire is `wrapped_key || body`, where `wrapped_key` is the
//! RSA-wrapped one-time AES key (exactly [`WRAPPED_KEY_WIDTH`] characters)
//! and `body` is `AES(destination || payload)`. The payload of every layer
//! but the innermost is itself a complete layer.

use crate::crypto;
use crate::error::{OnionError, Result};
use crate::protocol::{Destination, Layer, DESTINATION_WIDTH, WRAPPED_KEY_WIDTH};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

/// A relay as seen by the sender while layering.
#[derive(Debug, Clone)]
pub struct Hop {
    pub public_key: RsaPublicKey,
    pub address: Destination,
}

/// What a relay learns from its own layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeledLayer {
    pub destination: Destination,
    pub payload: String,
}

/// Wraps `message` for `recipient` in one layer per hop.
///
/// Hops are layered in the order given, so the first hop ends up innermost
/// (it reveals the recipient) and the last hop outermost (it must receive
/// the message first).
pub fn wrap(recipient: Destination, message: &str, hops: &[Hop]) -> Result<String> {
    if hops.is_empty() {
        return Err(OnionError::InsufficientRelays {
            available: 0,
            required: 1,
        });
    }

    let mut destination = recipient;
    let mut onion = message.to_string();

    for hop in hops {
        let layer_key = crypto::generate_sym_key();

        let mut plaintext = destination.encode();
        plaintext.push_str(&onion);
        let body = crypto::sym_encrypt(&layer_key, &plaintext)?;

        let wrapped_key = crypto::rsa_encrypt(&hop.public_key, &layer_key)?;
        if wrapped_key.len() != WRAPPED_KEY_WIDTH {
            return Err(OnionError::Crypto(format!(
                "wrapped key is {} characters, expected {}",
                wrapped_key.len(),
                WRAPPED_KEY_WIDTH
            )));
        }

        onion = Layer { wrapped_key, body }.into_wire();
        debug!(hop = %hop.address, next = %destination, len = onion.len(), "added onion layer");
        destination = hop.address;
    }

    Ok(onion)
}

/// Removes exactly one layer using this relay's private key.
pub fn peel(blob: &str, private_key: &RsaPrivateKey) -> Result<PeeledLayer> {
    let layer = Layer::split(blob)?;

    let key_bytes = crypto::rsa_decrypt(private_key, &layer.wrapped_key)
        .map_err(|e| OnionError::KeyRecoveryFailed(e.to_string()))?;
    let layer_key = crypto::sym_key_from_bytes(&key_bytes)
        .map_err(|e| OnionError::KeyRecoveryFailed(e.to_string()))?;

    let plaintext = crypto::sym_decrypt(&layer_key, &layer.body)
        .map_err(|e| OnionError::LayerDecryptionFailed(e.to_string()))?;

    let (destination, payload) = match (
        plaintext.get(..DESTINATION_WIDTH),
        plaintext.get(DESTINATION_WIDTH..),
    ) {
        (Some(destination), Some(payload)) => (destination, payload),
        _ => {
            return Err(OnionError::LayerDecryptionFailed(
                "layer too short to hold a destination".into(),
            ))
        }
    };

    let destination = Destination::decode(destination).ok_or_else(|| {
        OnionError::LayerDecryptionFailed(format!("invalid destination {:?}", destination))
    })?;

    Ok(PeeledLayer {
        destination,
        payload: payload.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn keys() -> &'static [RsaPrivateKey] {
        static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
        KEYS.get_or_init(|| {
            (0..4)
                .map(|_| crypto::generate_rsa_keys().unwrap())
                .collect()
        })
    }

    fn dest(address: u64) -> Destination {
        Destination::new(address).unwrap()
    }

    fn hops(addresses: &[u64]) -> Vec<Hop> {
        addresses
            .iter()
            .zip(keys())
            .map(|(address, key)| Hop {
                public_key: key.to_public_key(),
                address: dest(*address),
            })
            .collect()
    }

    #[test]
    fn test_three_hop_roundtrip() {
        let onion = wrap(dest(3002), "hello", &hops(&[4001, 4002, 4003])).unwrap();

        // Last hop layered is outermost.
        let third = peel(&onion, &keys()[2]).unwrap();
        assert_eq!(third.destination, dest(4002));

        let second = peel(&third.payload, &keys()[1]).unwrap();
        assert_eq!(second.destination, dest(4001));
        assert!(second.payload.len() < third.payload.len());

        let first = peel(&second.payload, &keys()[0]).unwrap();
        assert_eq!(first.destination, dest(3002));
        assert_eq!(first.payload, "hello");
    }

    #[test]
    fn test_scenario_recipient_4000() {
        let onion = wrap(dest(4000), "hello", &hops(&[1, 2, 3])).unwrap();

        let at_3 = peel(&onion, &keys()[2]).unwrap();
        assert_eq!(at_3.destination.address(), 2);
        let at_2 = peel(&at_3.payload, &keys()[1]).unwrap();
        assert_eq!(at_2.destination.address(), 1);
        let at_1 = peel(&at_2.payload, &keys()[0]).unwrap();
        assert_eq!(at_1.destination.address(), 4000);
        assert_eq!(at_1.payload, "hello");
    }

    #[test]
    fn test_roundtrip_preserves_unicode_and_empty() {
        for message in ["", "Hello 世界 🚀", "0000004000 looks like a destination"] {
            let onion = wrap(dest(3001), message, &hops(&[4001, 4002, 4003])).unwrap();
            let a = peel(&onion, &keys()[2]).unwrap();
            let b = peel(&a.payload, &keys()[1]).unwrap();
            let c = peel(&b.payload, &keys()[0]).unwrap();
            assert_eq!(c.payload, message);
        }
    }

    #[test]
    fn test_only_the_outer_relay_can_peel() {
        let onion = wrap(dest(3001), "hello", &hops(&[4001, 4002, 4003])).unwrap();

        for key in [&keys()[0], &keys()[1], &keys()[3]] {
            assert!(matches!(
                peel(&onion, key),
                Err(OnionError::KeyRecoveryFailed(_))
            ));
        }
    }

    #[test]
    fn test_swapped_body_fails_layer_decryption() {
        let a = wrap(dest(3001), "a", &hops(&[4001])).unwrap();
        let b = wrap(dest(3001), "b", &hops(&[4001])).unwrap();

        let own_key = Layer::split(&a).unwrap();
        let other_body = Layer::split(&b).unwrap();
        let spliced = Layer {
            wrapped_key: own_key.wrapped_key,
            body: other_body.body,
        }
        .into_wire();

        assert!(matches!(
            peel(&spliced, &keys()[0]),
            Err(OnionError::LayerDecryptionFailed(_))
        ));
    }

    #[test]
    fn test_other_relays_wrapped_key_fails_key_recovery() {
        let mine = wrap(dest(3001), "a", &hops(&[4001])).unwrap();
        let theirs = wrap(dest(3001), "b", &hops(&[4001, 4002])).unwrap();

        let spliced = Layer {
            wrapped_key: Layer::split(&theirs).unwrap().wrapped_key,
            body: Layer::split(&mine).unwrap().body,
        }
        .into_wire();

        assert!(matches!(
            peel(&spliced, &keys()[0]),
            Err(OnionError::KeyRecoveryFailed(_))
        ));
    }

    #[test]
    fn test_short_or_garbage_input_fails_key_recovery() {
        let short = "A".repeat(WRAPPED_KEY_WIDTH - 1);
        assert!(matches!(
            peel(&short, &keys()[0]),
            Err(OnionError::KeyRecoveryFailed(_))
        ));
        assert!(matches!(
            peel("hello", &keys()[0]),
            Err(OnionError::KeyRecoveryFailed(_))
        ));

        let garbage = "B".repeat(WRAPPED_KEY_WIDTH + 40);
        assert!(matches!(
            peel(&garbage, &keys()[0]),
            Err(OnionError::KeyRecoveryFailed(_))
        ));
    }

    #[test]
    fn test_nesting_depth_equals_hop_count() {
        let onion = wrap(dest(3001), "hello", &hops(&[4001, 4002, 4003])).unwrap();
        let a = peel(&onion, &keys()[2]).unwrap();
        let b = peel(&a.payload, &keys()[1]).unwrap();
        let c = peel(&b.payload, &keys()[0]).unwrap();

        // Plaintext is not another layer.
        assert!(peel(&c.payload, &keys()[0]).is_err());
    }

    #[test]
    fn test_wrap_rejects_empty_circuit() {
        assert!(matches!(
            wrap(dest(3001), "hello", &[]),
            Err(OnionError::InsufficientRelays { .. })
        ));
    }
}
