//! # Newline-delimited JSON stream endpoint over TCP.
//!
//! Every accepted connection is one subscribe request. The server writes one
//! JSON object per line and never expects a request body:
//! ```text
//! {"is_leader":false}
//! {"is_leader":true}
//! ```
//! The peer closing its write half (EOF) counts as subscriber departure.
//!
//! Listeners made by [`bind`] use a small kernel send buffer, inherited by every
//! accepted socket. A peer that stops reading then blocks our writes after a few
//! messages instead of after the default buffer (hundreds of kilobytes), and
//! the gateway's write timeout evicts it.
//! The server closing the connection without an error line is the normal end
//! of stream; a handler failure writes `{"error":"internal server error"}`
//! before closing.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::core::Tracker;
use crate::error::{GatewayError, RuntimeError};
use crate::events::{Event, EventKind};
use crate::gateway::{Gateway, LeaderMessage, MessageSink};

/// Writes messages as JSON lines, flushing after each one.
pub struct JsonLines<W> {
    inner: BufWriter<W>,
}

impl<W> JsonLines<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(1024, inner),
        }
    }

    async fn write_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value).map_err(io::Error::other)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.inner.flush().await
    }

    /// Flushes and shuts down the write half.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl<W> MessageSink for JsonLines<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, msg: LeaderMessage) -> io::Result<()> {
        self.write_line(&msg).await
    }
}

#[derive(Serialize)]
struct ErrorLine<'a> {
    error: &'a str,
}

/// Kernel send buffer requested for stream sockets.
pub const SEND_BUFFER_SIZE: u32 = 1024;

const BACKLOG: u32 = 1024;

/// Binds the stream endpoint. Failure is fatal at startup.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, RuntimeError> {
    listen(addr).map_err(|source| RuntimeError::Bind { addr, source })
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

/// Accepts connections until `shutdown` fires; each one runs as a tracked task.
pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    tracker: Tracker,
    shutdown: CancellationToken,
) {
    loop {
        let (socket, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(target: "leadercast", err = %e, "accept failed");
                    continue;
                }
            },
        };

        gateway
            .sessions
            .bus()
            .publish(Event::new(EventKind::ConnectionAccepted).with_reason(peer.to_string()));

        let gw = gateway.clone();
        tracker.spawn(format!("conn-{peer}"), async move {
            // failures are reported through StreamClosed
            let _ = handle_connection(&gw, socket, peer).await;
        });
    }
}

async fn handle_connection(
    gateway: &Gateway,
    socket: TcpStream,
    peer: SocketAddr,
) -> Result<(), GatewayError> {
    let _ = socket.set_nodelay(true);
    let (read, write) = socket.into_split();
    let peer = peer.to_string();
    relay_stream(gateway, Some(&peer), read, write).await
}

/// Serves one subscription over an arbitrary byte stream pair.
pub async fn serve_stream<R, W>(gateway: &Gateway, read: R, write: W) -> Result<(), GatewayError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    relay_stream(gateway, None, read, write).await
}

async fn relay_stream<R, W>(
    gateway: &Gateway,
    peer: Option<&str>,
    read: R,
    write: W,
) -> Result<(), GatewayError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let caller = CancellationToken::new();
    let mut sink = JsonLines::new(write);

    let relay = async {
        let res = gateway.handle_from(peer, caller.clone(), &mut sink).await;
        caller.cancel();
        res
    };
    let departure = async {
        tokio::select! {
            _ = caller.cancelled() => {}
            _ = drain_until_eof(read) => caller.cancel(),
        }
    };

    let (res, ()) = tokio::join!(relay, departure);

    // A peer that stopped reading would block these forever.
    let write_timeout = gateway.sessions.broadcaster().slow_client_timeout();
    let finish = async {
        if matches!(res, Err(GatewayError::Internal)) {
            let _ = sink
                .write_line(&ErrorLine {
                    error: "internal server error",
                })
                .await;
        }
        let _ = sink.shutdown().await;
    };
    let _ = tokio::time::timeout(write_timeout, finish).await;
    res
}

async fn drain_until_eof<R: AsyncRead + Unpin>(mut read: R) {
    let mut buf = [0u8; 256];
    loop {
        match read.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_lines_format() {
        let mut out = Vec::new();
        {
            let mut sink = JsonLines::new(&mut out);
            sink.send(LeaderMessage { is_leader: true }).await.unwrap();
            sink.send(LeaderMessage { is_leader: false }).await.unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"is_leader\":true}\n{\"is_leader\":false}\n"
        );
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();
        let err = bind(addr).unwrap_err();
        assert_eq!(err.as_label(), "runtime_bind_failed");
    }

    #[tokio::test]
    async fn test_bind_caps_send_buffer() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let sock = TcpSocket::from_std_stream(server.into_std().unwrap());
        // the kernel may round the request up, never to the usual default
        assert!(sock.send_buffer_size().unwrap() < 64 * 1024);
        drop(client);
    }
}
