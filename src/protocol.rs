use crate::crypto;
use crate::error::{OnionError, Result};
use serde::{Deserialize, Serialize};

/// Width of the RSA-wrapped layer key on the wire. The only
/// self-describing boundary of an onion message.
pub const WRAPPED_KEY_WIDTH: usize = crypto::wrapped_key_width(crypto::RSA_BITS);

pub const DESTINATION_WIDTH: usize = 10;

pub const CIRCUIT_LENGTH: usize = 3;

const MAX_DESTINATION: u64 = 9_999_999_999;

/// Numeric endpoint address, encoded as a zero-padded decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(u64);

impl Destination {
    pub fn new(address: u64) -> Result<Self> {
        if address > MAX_DESTINATION {
            return Err(OnionError::DestinationOutOfRange(address));
        }
        Ok(Self(address))
    }

    pub fn address(&self) -> u64 {
        self.0
    }

    pub fn encode(&self) -> String {
        format!("{:0width$}", self.0, width = DESTINATION_WIDTH)
    }

    pub fn decode(text: &str) -> Option<Self> {
        if text.len() != DESTINATION_WIDTH || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse().ok().map(Self)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One onion layer: `wrapped_key || body` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub wrapped_key: String,
    pub body: String,
}

impl Layer {
    pub fn split(blob: &str) -> Result<Self> {
        match (blob.get(..WRAPPED_KEY_WIDTH), blob.get(WRAPPED_KEY_WIDTH..)) {
            (Some(wrapped_key), Some(body)) => Ok(Self {
                wrapped_key: wrapped_key.to_string(),
                body: body.to_string(),
            }),
            _ => Err(OnionError::KeyRecoveryFailed(format!(
                "message of {} bytes is shorter than the {}-character wrapped key",
                blob.len(),
                WRAPPED_KEY_WIDTH
            ))),
        }
    }

    pub fn into_wire(self) -> String {
        let mut wire = self.wrapped_key;
        wire.push_str(&self.body);
        wire
    }
}

/// Requests understood by relay and user processes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Message { message: String },
    SendMessage { message: String, destination_user_id: u32 },

    GetLastReceivedEncryptedMessage,
    GetLastReceivedDecryptedMessage,
    GetLastMessageDestination,
    GetPrivateKey,

    GetLastReceivedMessage,
    GetLastSentMessage,
    GetLastCircuit,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Live,
    Ack(String),
    Failed(String),
    Text(Option<String>),
    Destination(Option<u64>),
    Circuit(Vec<u32>),
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_key_width_matches_rsa_2048() {
        assert_eq!(WRAPPED_KEY_WIDTH, 344);
    }

    #[test]
    fn test_destination_encoding() {
        let dest = Destination::new(4000).unwrap();
        assert_eq!(dest.encode(), "0000004000");
        assert_eq!(Destination::decode("0000004000"), Some(dest));

        for address in [0, 1, 3001, 65535, MAX_DESTINATION] {
            let encoded = Destination::new(address).unwrap().encode();
            assert_eq!(encoded.len(), DESTINATION_WIDTH);
            assert_eq!(Destination::decode(&encoded).unwrap().address(), address);
        }
    }

    #[test]
    fn test_destination_out_of_range_is_rejected() {
        assert!(matches!(
            Destination::new(MAX_DESTINATION + 1),
            Err(OnionError::DestinationOutOfRange(10_000_000_000))
        ));
    }

    #[test]
    fn test_destination_decode_rejects_malformed() {
        assert_eq!(Destination::decode("4000"), None);
        assert_eq!(Destination::decode("00000040x0"), None);
        assert_eq!(Destination::decode("+000004000"), None);
        assert_eq!(Destination::decode("00000040000"), None);
    }

    #[test]
    fn test_layer_split_and_join() {
        let wrapped_key = "k".repeat(WRAPPED_KEY_WIDTH);
        let blob = format!("{}body", wrapped_key);
        let layer = Layer::split(&blob).unwrap();
        assert_eq!(layer.wrapped_key, wrapped_key);
        assert_eq!(layer.body, "body");
        assert_eq!(layer.into_wire(), blob);
    }

    #[test]
    fn test_layer_split_short_blob() {
        let blob = "k".repeat(WRAPPED_KEY_WIDTH - 1);
        assert!(matches!(
            Layer::split(&blob),
            Err(OnionError::KeyRecoveryFailed(_))
        ));
    }
}
