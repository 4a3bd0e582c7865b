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

use crate::directory_protocol::{DirectoryRequest, DirectoryResponse, RelayIdentity};
use crate::error::{OnionError, Result};
use crate::transport::{self, read_frame, write_frame};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Anything the circuit builder can fetch the relay list from.
#[async_trait]
pub trait RelayDirectory: Send + Sync {
    async fn list_relays(&self) -> Result<Vec<RelayIdentity>>;
}

/// Append-only store of relay identities.
///
/// Duplicate ids are accepted and kept; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct KeyDirectory {
    relays: Arc<RwLock<Vec<RelayIdentity>>>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `identity` and returns the number of registrations held.
    pub async fn register(&self, identity: RelayIdentity) -> usize {
        let mut relays = self.relays.write().await;
        relays.push(identity);
        relays.len()
    }

    pub async fn list_all(&self) -> Vec<RelayIdentity> {
        self.relays.read().await.clone()
    }
}

#[async_trait]
impl RelayDirectory for KeyDirectory {
    async fn list_relays(&self) -> Result<Vec<RelayIdentity>> {
        Ok(self.list_all().await)
    }
}

pub async fn run(listen_addr: &str) -> Result<()> {
    info!("Starting key directory on {}", listen_addr);
    let listener = TcpListener::bind(listen_addr).await?;
    serve(listener, KeyDirectory::new()).await
}

pub async fn serve(listener: TcpListener, directory: KeyDirectory) -> Result<()> {
    info!("Key directory listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        let directory_clone = directory.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, directory_clone).await {
                error!("Error handling directory connection from {}: {}", addr, e);
            }
        });
    }
}

async fn handle_connection<S>(mut stream: S, directory: KeyDirectory) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request: DirectoryRequest = read_frame(&mut stream).await?;

    let response = match request {
        DirectoryRequest::Status => DirectoryResponse::Live,
        DirectoryRequest::Register { identity } => {
            let relay_id = identity.id;
            let total = directory.register(identity).await;
            info!(relay_id, total, "Relay registered");
            DirectoryResponse::Ack
        }
        DirectoryRequest::GetRelays => {
            let relays = directory.list_all().await;
            debug!("Sending list of {} relays", relays.len());
            DirectoryResponse::RelayList(relays)
        }
    };

    write_frame(&mut stream, &response).await
}

/// Talks to a remote key directory.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    addr: String,
}

impl DirectoryClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub async fn status(&self) -> Result<()> {
        match transport::request(&self.addr, &DirectoryRequest::Status).await {
            Ok(DirectoryResponse::Live) => Ok(()),
            Ok(other) => Err(OnionError::UnexpectedResponse(format!("{:?}", other))),
            Err(e) => Err(OnionError::DirectoryUnavailable(e.to_string())),
        }
    }

    pub async fn register(&self, identity: RelayIdentity) -> Result<()> {
        let request = DirectoryRequest::Register { identity };
        match transport::request(&self.addr, &request).await {
            Ok(DirectoryResponse::Ack) => Ok(()),
            Ok(other) => Err(OnionError::UnexpectedResponse(format!("{:?}", other))),
            Err(e) => Err(OnionError::DirectoryUnavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl RelayDirectory for DirectoryClient {
    async fn list_relays(&self) -> Result<Vec<RelayIdentity>> {
        match transport::request(&self.addr, &DirectoryRequest::GetRelays).await {
            Ok(DirectoryResponse::RelayList(relays)) => Ok(relays),
            Ok(other) => Err(OnionError::DirectoryUnavailable(format!(
                "unexpected response {:?}",
                other
            ))),
            Err(e) => Err(OnionError::DirectoryUnavailable(e.to_string())),
        }
    }
}
