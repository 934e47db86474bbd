//! SliceVault WebSocket server.
//!
//! Listens on a TCP address, upgrades each connection to WebSocket, and
//! serves every client independently.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use slicevault_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ServerError;
use crate::connection::{self, Connection, PeerMeta};
use crate::handler::Handler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind.
    pub address: String,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 0,
        }
    }
}

impl ServerConfig {
    fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// The SliceVault WebSocket server.
///
/// Serves any number of concurrent connections and dispatches their
/// messages to the shared [`Handler`].
pub struct FileServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    connections: Mutex<HashMap<String, Connection>>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: Handler> FileServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            connections: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the handler shared by every connection.
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of connections whose pumps are still running.
    pub async fn connection_count(&self) -> usize {
        let mut conns = self.connections.lock().await;
        conns.retain(|_, c| c.is_alive());
        conns.len()
    }

    /// Closes every open connection and waits for them to finish.
    pub async fn disconnect_all(&self) {
        let conns: Vec<Connection> = self.connections.lock().await.drain().map(|(_, c)| c).collect();
        for conn in conns {
            conn.close_and_wait().await;
        }
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    ///
    /// Binds to the configured address and accepts WebSocket connections.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("file server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    self.disconnect_all().await;
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Handles a single TCP connection: upgrades to WS and starts its pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        // WebSocket upgrade with size limits matching our protocol constants.
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let meta = PeerMeta {
            conn_id: uuid::Uuid::new_v4().to_string(),
            remote_addr: peer_addr.to_string(),
        };
        tracing::debug!(conn = %meta.conn_id, %peer_addr, "WebSocket connection established");

        let conn = connection::spawn_connection(
            ws_stream,
            meta,
            Arc::clone(&self.handler),
            self.cancel.clone(),
        );

        let mut conns = self.connections.lock().await;
        conns.retain(|_, c| c.is_alive());
        conns.insert(conn.meta.conn_id.clone(), conn);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Sender;
    use crate::handler::HandlerFuture;
    use futures_util::{SinkExt, StreamExt};
    use slicevault_protocol::constants::MessageType;
    use slicevault_protocol::envelope::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    /// Minimal test handler: counts connections, everything else defaults.
    #[derive(Default)]
    struct TestHandler {
        connected: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl Handler for TestHandler {
        fn on_list_files(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = sender.send_error(&msg, 418, "listing disabled");
            })
        }

        fn on_connected<'a>(&'a self, _peer: &'a PeerMeta) -> HandlerFuture<'a> {
            self.connected.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    async fn start() -> (Arc<FileServer<TestHandler>>, tokio::task::JoinHandle<()>, String) {
        let config = ServerConfig {
            address: "127.0.0.1".into(),
            port: 0,
        };
        let server = FileServer::new(config, TestHandler::default());
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            server2.run().await.unwrap();
        });

        // Wait for the server to bind.
        let mut port = 0;
        for _ in 0..100 {
            port = server.port().await;
            if port > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(port > 0, "should have bound to a dynamic port");
        (server, handle, format!("ws://127.0.0.1:{port}"))
    }

    async fn roundtrip(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        msg: serde_json::Value,
    ) -> Message {
        ws.send(WsMessage::Text(msg.to_string().into())).await.unwrap();
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn rejects_invalid_address() {
        let config = ServerConfig {
            address: "not-an-ip".into(),
            port: 0,
        };
        let server = FileServer::new(config, TestHandler::default());
        assert!(matches!(
            server.run().await,
            Err(ServerError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn serves_many_connections() {
        let (server, handle, url) = start().await;

        let (mut ws1, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut ws2, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let ping = serde_json::json!({"id": "p-1", "type": "ping"});
        let reply1 = roundtrip(&mut ws1, ping.clone()).await;
        let reply2 = roundtrip(&mut ws2, ping).await;
        assert_eq!(reply1.msg_type, MessageType::Pong);
        assert_eq!(reply1.id, "p-1");
        assert_eq!(reply2.msg_type, MessageType::Pong);

        // Give the server time to register both connections.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.connection_count().await, 2);
        assert_eq!(server.handler().connected.load(Ordering::SeqCst), 2);

        drop(ws1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.connection_count().await, 1);

        drop(ws2);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dispatches_to_handler_and_defaults() {
        let (server, handle, url) = start().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let reply = roundtrip(&mut ws, serde_json::json!({"id": "l-1", "type": "list_files"})).await;
        assert_eq!(reply.error.unwrap().code, 418);
        assert_eq!(server.handler().list_calls.load(Ordering::SeqCst), 1);

        let reply = roundtrip(
            &mut ws,
            serde_json::json!({"id": "b-1", "type": "begin_transfer", "payload": {}}),
        )
        .await;
        assert_eq!(reply.id, "b-1");
        assert_eq!(reply.error.unwrap().code, 501);

        let reply = roundtrip(&mut ws, serde_json::json!({"id": "u-1", "type": "reboot"})).await;
        assert_eq!(reply.msg_type, MessageType::Error);
        assert_eq!(reply.error.unwrap().code, 501);

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_clients() {
        let (server, handle, url) = start().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        roundtrip(&mut ws, serde_json::json!({"id": "p", "type": "ping"})).await;

        server.shutdown();
        handle.await.unwrap();

        // The client sees the stream end (close frame or EOF).
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
        assert_eq!(server.connection_count().await, 0);
    }
}
