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
use crate::directory::DirectoryClient;
use crate::directory_protocol::RelayIdentity;
use crate::error::Result;
use crate::onion::{self, PeeledLayer};
use crate::protocol::{Destination, Request, Response};
use crate::transport::{read_frame, write_frame, Transport, TcpTransport};
use rsa::RsaPrivateKey;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Last message seen by a relay. Debug inspection only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayObservation {
    pub last_received_encrypted_message: Option<String>,
    pub last_received_decrypted_message: Option<String>,
    pub last_message_destination: Option<u64>,
}

pub struct RelayNode<T> {
    id: u32,
    private_key: RsaPrivateKey,
    transport: T,
    observed: RwLock<RelayObservation>,
}

impl<T: Transport> RelayNode<T> {
    pub fn new(id: u32, private_key: RsaPrivateKey, transport: T) -> Self {
        Self {
            id,
            private_key,
            transport,
            observed: RwLock::new(RelayObservation::default()),
        }
    }

    /// Creates a relay with a freshly generated key pair.
    pub fn generate(id: u32, transport: T) -> Result<Self> {
        Ok(Self::new(id, crypto::generate_rsa_keys()?, transport))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn identity(&self) -> Result<RelayIdentity> {
        Ok(RelayIdentity {
            id: self.id,
            public_key: crypto::export_pub_key(&self.private_key.to_public_key())?,
        })
    }

    pub async fn observed(&self) -> RelayObservation {
        self.observed.read().await.clone()
    }

    /// Removes this relay's layer from `message` and records what it saw.
    pub async fn peel(&self, message: &str) -> Result<PeeledLayer> {
        let peeled = onion::peel(message, &self.private_key)?;

        let mut observed = self.observed.write().await;
        observed.last_received_encrypted_message = Some(message.to_string());
        observed.last_received_decrypted_message = Some(peeled.payload.clone());
        observed.last_message_destination = Some(peeled.destination.address());

        Ok(peeled)
    }

    pub async fn forward(&self, peeled: PeeledLayer) -> Result<()> {
        debug!(relay = self.id, next = %peeled.destination, "Forwarding payload");
        self.transport
            .deliver(peeled.destination, peeled.payload)
            .await
    }

    /// Peels one layer and forwards the rest. The observation survives a
    /// failed forward.
    pub async fn handle_message(&self, message: &str) -> Result<Destination> {
        let peeled = self.peel(message).await?;
        let destination = peeled.destination;
        self.forward(peeled).await?;
        Ok(destination)
    }

    async fn inspect(&self, request: Request) -> Response {
        let observed = self.observed.read().await;
        match request {
            Request::Status => Response::Live,
            Request::GetLastReceivedEncryptedMessage => {
                Response::Text(observed.last_received_encrypted_message.clone())
            }
            Request::GetLastReceivedDecryptedMessage => {
                Response::Text(observed.last_received_decrypted_message.clone())
            }
            Request::GetLastMessageDestination => {
                Response::Destination(observed.last_message_destination)
            }
            Request::GetPrivateKey => match crypto::export_prv_key(&self.private_key) {
                Ok(pem) => Response::Text(Some(pem)),
                Err(e) => Response::Failed(e.to_string()),
            },
            _ => Response::Unsupported,
        }
    }
}

pub async fn run(
    id: u32,
    directory_addr: &str,
    network: &NetworkConfig,
) -> Result<()> {
    let listen_addr = network.listen_addr(network.relay_destination(id)?);
    info!("Starting relay {} on {}...", id, listen_addr);

    let node = RelayNode::generate(id, TcpTransport::new(network.host.clone()))?;

    let listener = TcpListener::bind(&listen_addr).await?;

    let directory = DirectoryClient::new(directory_addr);
    match directory.register(node.identity()?).await {
        Ok(()) => info!("Relay {} registered with key directory at {}", id, directory_addr),
        Err(e) => error!("Error while registering relay {}: {}", id, e),
    }

    serve(listener, Arc::new(node)).await
}

pub async fn serve<T>(listener: TcpListener, node: Arc<RelayNode<T>>) -> Result<()>
where
    T: Transport + 'static,
{
    info!("Relay {} listening on {}", node.id(), listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let node_clone = node.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, node_clone).await {
                warn!("Relay connection from {} ended with error: {}", addr, e);
            }
        });
    }
}

async fn handle_connection<S, T>(mut stream: S, node: Arc<RelayNode<T>>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    T: Transport,
{
    let request: Request = read_frame(&mut stream).await?;

    let message = match request {
        Request::Message { message } => message,
        other => {
            let response = node.inspect(other).await;
            return write_frame(&mut stream, &response).await;
        }
    };

    let peeled = match node.peel(&message).await {
        Ok(peeled) => peeled,
        Err(e) => {
            warn!(relay = node.id(), "Rejecting message: {}", e);
            return write_frame(&mut stream, &Response::Failed(e.to_string())).await;
        }
    };

    // The hop has accepted the message once its layer is off.
    write_frame(&mut stream, &Response::Ack("Message received".into())).await?;
    drop(stream);

    let destination = peeled.destination;
    if let Err(e) = node.forward(peeled).await {
        error!(relay = node.id(), %destination, "Error while forwarding the message: {}", e);
        return Err(e);
    }
    info!(relay = node.id(), %destination, "Message forwarded");
    Ok(())
}
