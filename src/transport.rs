//! Point-to-point delivery between processes.
//!
//! Every exchange is one request frame followed by one response frame on a
//! fresh TCP connection. A frame is a big-endian `u32` length followed by a
//! bincode payload.

use crate::error::{OnionError, Result};
use crate::protocol::{Destination, Request, Response};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub async fn write_frame<S, T>(stream: &mut S, msg: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serialize(msg)?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            OnionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds limit", bytes.len()),
            ))
        })?;
    stream.write_u32(len).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame<S, T>(stream: &mut S) -> Result<T>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let msg_len = stream.read_u32().await?;
    if msg_len > MAX_FRAME_LEN {
        return Err(OnionError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", msg_len),
        )));
    }
    let mut msg_buf = vec![0; msg_len as usize];
    stream.read_exact(&mut msg_buf).await?;
    Ok(bincode::deserialize(&msg_buf)?)
}

/// Sends one request to `addr` and waits for its response.
pub async fn request<Req, Resp>(addr: &str, req: &Req) -> Result<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, req).await?;
    read_frame(&mut stream).await
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands `message` to the process listening at `destination`.
    ///
    /// Succeeds once the receiver has accepted the message; there is no
    /// end-to-end acknowledgement.
    async fn deliver(&self, destination: Destination, message: String) -> Result<()>;
}

/// Resolves numeric destinations to `host:port` on a single host.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn endpoint(&self, destination: Destination) -> String {
        format!("{}:{}", self.host, destination.address())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn deliver(&self, destination: Destination, message: String) -> Result<()> {
        let addr = self.endpoint(destination);
        debug!(%addr, len = message.len(), "delivering message");

        let forward_failed = |reason: String| OnionError::ForwardFailed {
            destination: destination.address(),
            reason,
        };

        let response: Response = request(&addr, &Request::Message { message })
            .await
            .map_err(|e| forward_failed(e.to_string()))?;

        match response {
            Response::Ack(_) => Ok(()),
            Response::Failed(reason) => Err(forward_failed(reason)),
            other => Err(forward_failed(format!("unexpected response {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let req = Request::SendMessage {
            message: "hello".into(),
            destination_user_id: 2,
        };
        write_frame(&mut client, &req).await.unwrap();
        let received: Request = read_frame(&mut server).await.unwrap();
        assert_eq!(received, req);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(MAX_FRAME_LEN + 1).await.unwrap();
        let result: Result<Request> = read_frame(&mut server).await;
        assert!(matches!(result, Err(OnionError::Io(_))));
    }

    #[tokio::test]
    async fn test_deliver_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new("127.0.0.1");
        let dest = Destination::new(port as u64).unwrap();
        let err = transport.deliver(dest, "x".into()).await.unwrap_err();
        assert!(matches!(err, OnionError::ForwardFailed { destination, .. } if destination == port as u64));
    }

    #[tokio::test]
    async fn test_deliver_maps_failed_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _: Request = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &Response::Failed("nope".into()))
                .await
                .unwrap();
        });

        let transport = TcpTransport::new("127.0.0.1");
        let err = transport
            .deliver(Destination::new(port as u64).unwrap(), "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OnionError::ForwardFailed { reason, .. } if reason == "nope"));
    }
}
