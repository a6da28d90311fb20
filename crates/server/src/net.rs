//! Length-prefixed JSON over TCP: a u32 big-endian byte count, then the
//! document. One request per frame, one response frame back, connection
//! loop until the client goes away.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tallybook_engine::Engine;

use crate::handlers;
use crate::protocol;

/// Upper bound on one frame's byte count. The length prefix is
/// client-controlled, so it is checked before any buffer is allocated.
const MAX_FRAME_LEN: usize = 10_000_000;

pub struct TcpServer {
    engine: Arc<Mutex<Engine>>,
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(engine: Engine, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            listener,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop; spawns one task per connection.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("listening on {}", self.local_addr()?);
        loop {
            let (socket, peer) = self.listener.accept().await?;
            info!("client connected: {peer}");
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, engine).await {
                    warn!("connection error: {err}");
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    engine: Arc<Mutex<Engine>>,
) -> std::io::Result<()> {
    loop {
        let frame_len = match socket.read_u32().await {
            Ok(len) => len as usize,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if frame_len > MAX_FRAME_LEN {
            warn!("oversized frame rejected: {frame_len} bytes");
            let response = protocol::error_response("", 400, "frame too large");
            write_frame(&mut socket, &response).await?;
            return Ok(());
        }
        let mut frame = vec![0u8; frame_len];
        socket.read_exact(&mut frame).await?;

        let response = respond(&frame, &engine).await;
        write_frame(&mut socket, &response).await?;
    }
}

async fn write_frame(socket: &mut TcpStream, response: &Value) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(response)?;
    socket.write_u32(bytes.len() as u32).await?;
    socket.write_all(&bytes).await?;
    Ok(())
}

async fn respond(frame: &[u8], engine: &Arc<Mutex<Engine>>) -> Value {
    let request = match protocol::parse_request(frame) {
        Ok(request) => request,
        Err(response) => return response,
    };
    debug!("request {}/{}", request.category, request.action);
    let mut engine = engine.lock().await;
    match handlers::dispatch(&mut engine, &request.category, &request.action, &request.payload) {
        Ok(data) => protocol::ok_response(&request.seq, data),
        Err(err) => {
            warn!(
                "{}/{} failed: {} ({})",
                request.category, request.action, err.message, err.code
            );
            protocol::error_response(&request.seq, err.code, &err.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_server() -> std::net::SocketAddr {
        let engine = Engine::open_in_memory().unwrap();
        let server = TcpServer::bind(engine, 0).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });
        addr
    }

    async fn read_frame(socket: &mut TcpStream) -> Value {
        let len = socket.read_u32().await.unwrap() as usize;
        let mut buf = vec![0u8; len];
        socket.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[tokio::test]
    async fn frames_round_trip_over_tcp() {
        let addr = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let request = br#"{"seq": "1", "category": "user", "action": "current"}"#;
        client.write_u32(request.len() as u32).await.unwrap();
        client.write_all(request).await.unwrap();

        let response = read_frame(&mut client).await;
        assert_eq!(response["status"], "ok");
        assert_eq!(response["seq"], "1");
        assert_eq!(response["data"]["logged_in"], false);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_without_a_buffer() {
        let addr = start_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_u32(u32::MAX).await.unwrap();

        let response = read_frame(&mut client).await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["code"], 400);
        assert_eq!(response["seq"], "");

        // The server hangs up after answering
        let mut byte = [0u8; 1];
        assert_eq!(client.read(&mut byte).await.unwrap(), 0);
    }
}
