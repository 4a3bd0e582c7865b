//! A three-hop onion routing overlay.
//!
//! A key directory publishes relay public keys, users layer a message once
//! per relay, and every relay removes exactly one layer before handing the
//! rest to the next hop.

pub mod circuit;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod directory_protocol;
pub mod error;
pub mod node;
pub mod onion;
pub mod protocol;
pub mod transport;
pub mod user;

pub use circuit::{Circuit, CircuitBuilder};
pub use directory::{DirectoryClient, KeyDirectory, RelayDirectory};
pub use error::{OnionError, Result};
pub use node::RelayNode;
pub use protocol::{Destination, CIRCUIT_LENGTH, DESTINATION_WIDTH, WRAPPED_KEY_WIDTH};
pub use transport::{TcpTransport, Transport};
pub use user::UserNode;
