//! Error types shared by the directory, relays and users.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnionError {
    #[error("Key directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Not enough relays to build a circuit: {available} available, {required} required")]
    InsufficientRelays { available: usize, required: usize },

    #[error("Failed to recover the layer key: {0}")]
    KeyRecoveryFailed(String),

    #[error("Failed to decrypt the layer body: {0}")]
    LayerDecryptionFailed(String),

    #[error("Failed to forward message to {destination}: {reason}")]
    ForwardFailed { destination: u64, reason: String },

    #[error("Destination {0} does not fit in the fixed-width encoding")]
    DestinationOutOfRange(u64),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, OnionError>;
