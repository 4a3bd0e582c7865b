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

use crate::circuit::{Circuit, CircuitBuilder};
use crate::config::NetworkConfig;
use crate::directory::{DirectoryClient, RelayDirectory};
use crate::error::Result;
use crate::protocol::{Request, Response};
use crate::transport::{read_frame, write_frame, TcpTransport, Transport};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserObservation {
    pub last_received_message: Option<String>,
    pub last_sent_message: Option<String>,
    pub last_circuit: Vec<u32>,
}

/// An endpoint that sends onions and receives bare plaintext.
pub struct UserNode<D, T> {
    id: u32,
    builder: CircuitBuilder<D, T>,
    observed: RwLock<UserObservation>,
}

impl<D, T> UserNode<D, T>
where
    D: RelayDirectory,
    T: Transport,
{
    pub fn new(id: u32, builder: CircuitBuilder<D, T>) -> Self {
        Self {
            id,
            builder,
            observed: RwLock::new(UserObservation::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn observed(&self) -> UserObservation {
        self.observed.read().await.clone()
    }

    pub async fn send_message(&self, message: &str, destination_user_id: u32) -> Result<Circuit> {
        let circuit = self.builder.send(destination_user_id, message).await?;

        let mut observed = self.observed.write().await;
        observed.last_sent_message = Some(message.to_string());
        observed.last_circuit = circuit.relay_ids();
        Ok(circuit)
    }

    pub async fn receive(&self, message: String) {
        info!(user = self.id, len = message.len(), "Message received");
        self.observed.write().await.last_received_message = Some(message);
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Status => Response::Live,
            Request::Message { message } => {
                self.receive(message).await;
                Response::Ack("success".into())
            }
            Request::SendMessage {
                message,
                destination_user_id,
            } => match self.send_message(&message, destination_user_id).await {
                Ok(_) => Response::Ack("Message sent successfully".into()),
                Err(e) => {
                    error!(user = self.id, "Error sending message: {}", e);
                    Response::Failed(e.to_string())
                }
            },
            Request::GetLastReceivedMessage => {
                Response::Text(self.observed.read().await.last_received_message.clone())
            }
            Request::GetLastSentMessage => {
                Response::Text(self.observed.read().await.last_sent_message.clone())
            }
            Request::GetLastCircuit => {
                Response::Circuit(self.observed.read().await.last_circuit.clone())
            }
            _ => Response::Unsupported,
        }
    }
}

pub async fn run(id: u32, directory_addr: &str, network: &NetworkConfig) -> Result<()> {
    let listen_addr = network.listen_addr(network.user_destination(id)?);
    info!("Starting user {} on {}...", id, listen_addr);

    let builder = CircuitBuilder::new(
        DirectoryClient::new(directory_addr),
        TcpTransport::new(network.host.clone()),
        network.clone(),
    );
    let listener = TcpListener::bind(&listen_addr).await?;
    serve(listener, Arc::new(UserNode::new(id, builder))).await
}

pub async fn serve<D, T>(listener: TcpListener, user: Arc<UserNode<D, T>>) -> Result<()>
where
    D: RelayDirectory + 'static,
    T: Transport + 'static,
{
    info!("User {} listening on {}", user.id(), listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let user_clone = user.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, user_clone).await {
                warn!("User connection from {} ended with error: {}", addr, e);
            }
        });
    }
}

async fn handle_connection<S, D, T>(mut stream: S, user: Arc<UserNode<D, T>>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    D: RelayDirectory,
    T: Transport,
{
    let request: Request = read_frame(&mut stream).await?;
    let response = user.handle_request(request).await;
    write_frame(&mut stream, &response).await
}
