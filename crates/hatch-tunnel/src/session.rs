//! The tunnel session: one persistent WebSocket connection to the relay.
//!
//! `TunnelSession::connect` dials the relay, performs the registration
//! handshake, then runs two background tasks: a read loop that routes
//! inbound frames (each MCP request is handled on its own task so slow
//! actions never stall the stream) and a keepalive loop. Every outbound
//! frame — responses, pongs, keepalive pings — goes through one shared
//! write gate so concurrent writers cannot interleave partial frames.
//!
//! There is no reconnect logic here: a dead connection terminates
//! `wait()`, and the hosting process decides whether to build a new
//! session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use hatch_core::envelope::{Envelope, FrameKind};
use hatch_core::error::{HatchError, HatchResult};
use hatch_core::rpc::{RpcRequest, RpcResponse, INTERNAL_ERROR, PARSE_ERROR};

use crate::dispatch::Dispatcher;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Observer invoked with the caller IP when the relay reports a client
/// connecting to the public URL.
pub type ClientConnectedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for establishing a tunnel session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Relay base URL, e.g. `wss://relay.hatch.sh`.
    pub relay_url: String,
    /// Client version advertised to the relay for compatibility checks.
    pub client_version: String,
    /// Number of loaded actions advertised to the relay.
    pub action_count: usize,
    /// Keepalive ping interval in seconds (0 disables the loop).
    pub ping_interval_secs: u64,
    /// Deadline for the dial + registration handshake, in seconds.
    pub connect_timeout_secs: u64,
    /// Optional observer for `client_connected` notices.
    pub on_client_connected: Option<ClientConnectedHook>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: "wss://relay.hatch.sh".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            action_count: 0,
            ping_interval_secs: 30,
            connect_timeout_secs: 10,
            on_client_connected: None,
        }
    }
}

/// An established tunnel to the relay.
///
/// Owns the connection exclusively; dropping the session aborts its
/// background tasks and releases the transport.
pub struct TunnelSession {
    sink: Arc<Mutex<WsSink>>,
    tunnel_url: String,
    read_handle: Mutex<Option<tokio::task::JoinHandle<HatchResult<()>>>>,
    keepalive_handle: Option<tokio::task::JoinHandle<()>>,
    closed: Mutex<bool>,
}

impl std::fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSession")
            .field("tunnel_url", &self.tunnel_url)
            .finish_non_exhaustive()
    }
}

impl TunnelSession {
    /// Dial the relay, perform the registration handshake, and start the
    /// background read and keepalive loops.
    ///
    /// Returns without waiting for those loops — only the handshake is
    /// synchronous. Both dial failures and a relay that rejects this
    /// client version are fatal to the attempt; no retry is made.
    pub async fn connect(config: SessionConfig, dispatcher: Dispatcher) -> HatchResult<Self> {
        let endpoint = format!("{}/tunnel", config.relay_url.trim_end_matches('/'));

        let mut request = endpoint
            .clone()
            .into_client_request()
            .map_err(|e| HatchError::Transport(format!("invalid relay URL: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(
            "X-Hatch-Version",
            HeaderValue::from_str(&config.client_version)
                .map_err(|e| HatchError::Transport(format!("invalid client version: {e}")))?,
        );
        headers.insert(
            "X-Hatch-Actions",
            HeaderValue::from_str(&config.action_count.to_string())
                .map_err(|e| HatchError::Transport(format!("invalid action count: {e}")))?,
        );

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let (ws, _response) = match time::timeout(timeout, connect_async(request)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(WsError::Http(response)))
                if response.status() == StatusCode::UPGRADE_REQUIRED =>
            {
                return Err(HatchError::VersionRejected(format!(
                    "client {} is too old for this relay, please update",
                    config.client_version
                )));
            }
            Ok(Err(e)) => return Err(HatchError::Transport(format!("relay unreachable: {e}"))),
            Err(_) => return Err(HatchError::Timeout),
        };

        debug!(url = %endpoint, "connected to relay, awaiting registration");

        let (sink, mut read) = ws.split();
        let sink = Arc::new(Mutex::new(sink));

        // The relay must answer with exactly one `registered` frame before
        // any traffic flows; anything else is a failed handshake.
        let frame = match time::timeout(timeout, read.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                return Err(HatchError::Transport(format!("read registration: {e}")))
            }
            Ok(None) => {
                return Err(HatchError::Handshake(
                    "connection closed before registration".into(),
                ))
            }
            Err(_) => return Err(HatchError::Timeout),
        };

        let envelope = match frame {
            Message::Text(text) => match Envelope::decode(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    Self::shutdown(&sink).await;
                    return Err(e);
                }
            },
            other => {
                Self::shutdown(&sink).await;
                return Err(HatchError::Handshake(format!(
                    "non-text registration frame ({} bytes)",
                    other.len()
                )));
            }
        };

        if envelope.kind != FrameKind::Registered {
            Self::shutdown(&sink).await;
            return Err(HatchError::Handshake(format!(
                "unexpected message type: {:?}",
                envelope.kind
            )));
        }

        let tunnel_url = envelope.tunnel_url.unwrap_or_default();
        info!(url = %tunnel_url, "tunnel registered");

        let read_handle = {
            let sink = sink.clone();
            let hook = config.on_client_connected.clone();
            tokio::spawn(async move { Self::read_loop(read, sink, dispatcher, hook).await })
        };

        let keepalive_handle = (config.ping_interval_secs > 0).then(|| {
            let sink = sink.clone();
            let interval = Duration::from_secs(config.ping_interval_secs);
            tokio::spawn(async move { Self::keepalive_loop(sink, interval).await })
        });

        Ok(Self {
            sink,
            tunnel_url,
            read_handle: Mutex::new(Some(read_handle)),
            keepalive_handle,
            closed: Mutex::new(false),
        })
    }

    /// The public tunnel URL assigned by the relay at registration.
    pub fn tunnel_url(&self) -> &str {
        &self.tunnel_url
    }

    /// Block until the read loop terminates — peer close, protocol
    /// violation, or transport failure. This is the session's only
    /// completion signal.
    pub async fn wait(&self) -> HatchResult<()> {
        let handle = self.read_handle.lock().await.take();
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(HatchError::Other(format!("read loop aborted: {e}"))),
            },
            None => Ok(()),
        }
    }

    /// Close the tunnel. Safe to call more than once; later calls are
    /// no-ops.
    pub async fn close(&self) -> HatchResult<()> {
        {
            let mut closed = self.closed.lock().await;
            if *closed {
                return Ok(());
            }
            *closed = true;
        }

        if let Some(handle) = &self.keepalive_handle {
            handle.abort();
        }
        Self::shutdown(&self.sink).await;
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// The read loop: decode one envelope at a time and route it by kind.
    ///
    /// Request frames are handed to their own task; control frames are
    /// handled inline. A malformed frame is fatal — a framed JSON stream
    /// cannot be resynchronized safely.
    async fn read_loop(
        mut read: WsRead,
        sink: Arc<Mutex<WsSink>>,
        dispatcher: Dispatcher,
        hook: Option<ClientConnectedHook>,
    ) -> HatchResult<()> {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    let clean = match &frame {
                        None => true,
                        Some(f) => matches!(f.code, CloseCode::Normal | CloseCode::Away),
                    };
                    if clean {
                        debug!("relay closed the tunnel");
                        return Ok(());
                    }
                    return Err(HatchError::Transport(format!(
                        "relay closed abnormally: {frame:?}"
                    )));
                }
                Ok(Message::Ping(payload)) => {
                    let mut sink = sink.lock().await;
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(_) => continue,
                Err(WsError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(HatchError::Transport(format!("tunnel read error: {e}"))),
            };

            let envelope = Envelope::decode(&text)?;

            match envelope.kind {
                FrameKind::Request => {
                    // Concurrent dispatch: the reader moves on immediately,
                    // responses come back through the write gate in
                    // whatever order handlers finish.
                    let sink = sink.clone();
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        Self::handle_request(envelope, dispatcher, sink).await;
                    });
                }
                FrameKind::Ping => {
                    // Liveness contract: answered inline, never queued
                    // behind request handling.
                    if let Err(e) = Self::write_envelope(&sink, &Envelope::pong()).await {
                        warn!(error = %e, "failed to answer relay ping");
                    }
                }
                FrameKind::ClientConnected => {
                    if let (Some(hook), Some(ip)) = (&hook, &envelope.client_ip) {
                        hook(ip);
                    }
                }
                other => debug!(kind = ?other, "ignoring frame"),
            }
        }

        debug!("tunnel stream ended");
        Ok(())
    }

    /// Handle one `request` frame: decode the MCP request from the
    /// payload, dispatch it, and send the correlated `response` frame.
    async fn handle_request(envelope: Envelope, dispatcher: Dispatcher, sink: Arc<Mutex<WsSink>>) {
        let request_id = envelope.request_id.unwrap_or_default();

        let response = match envelope
            .payload
            .ok_or(())
            .and_then(|payload| serde_json::from_value::<RpcRequest>(payload).map_err(|_| ()))
        {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(()) => RpcResponse::err(None, PARSE_ERROR, "Parse error"),
        };

        let payload = match serde_json::to_value(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, request_id = %request_id, "failed to encode response");
                serde_json::to_value(RpcResponse::err(None, INTERNAL_ERROR, e.to_string()))
                    .unwrap_or_default()
            }
        };

        let reply = Envelope::response(&request_id, payload);
        if let Err(e) = Self::write_envelope(&sink, &reply).await {
            warn!(error = %e, request_id = %request_id, "failed to send response");
        }
    }

    /// Periodic liveness pings through the shared write gate. A failed
    /// write means the connection is gone; the loop just stops — the read
    /// loop surfaces the loss to `wait()`.
    async fn keepalive_loop(sink: Arc<Mutex<WsSink>>, interval: Duration) {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip the immediate first tick

        loop {
            ticker.tick().await;
            let mut sink = sink.lock().await;
            if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                debug!(error = %e, "keepalive write failed, stopping");
                break;
            }
        }
    }

    /// Serialize one envelope and send it as a single frame. The gate
    /// guarantees whole-frame atomicity; waiting writers proceed in no
    /// particular order.
    async fn write_envelope(sink: &Arc<Mutex<WsSink>>, envelope: &Envelope) -> HatchResult<()> {
        let text = envelope.encode()?;
        let mut sink = sink.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| HatchError::Transport(format!("tunnel write error: {e}")))
    }

    /// Best-effort close of the underlying connection.
    async fn shutdown(sink: &Arc<Mutex<WsSink>>) {
        let mut sink = sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if let Some(handle) = self.read_handle.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.keepalive_handle.take() {
            handle.abort();
        }
    }
}
