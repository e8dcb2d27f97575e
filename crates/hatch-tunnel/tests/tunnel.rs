//! Tunnel session tests against an in-process fake relay.
//!
//! Each test binds a local TCP listener, accepts one WebSocket connection,
//! and plays the relay side of the protocol by hand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use hatch_core::action::{Action, ActionRegistry, ParamKind, Parameter, ProcessRunner, Runner};
use hatch_core::envelope::{Envelope, FrameKind};
use hatch_core::rpc::PARSE_ERROR;
use hatch_core::HatchError;
use hatch_tunnel::{Dispatcher, RegistryCell, SessionConfig, TunnelSession};

type Relay = WebSocketStream<TcpStream>;

/// Bind a local listener and run `handler` as the relay for exactly one
/// inbound connection. Returns the `ws://` URL to dial.
async fn spawn_relay<F, Fut>(handler: F) -> (String, tokio::task::JoinHandle<()>)
where
    F: FnOnce(Relay) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        handler(ws).await;
    });

    (format!("ws://{addr}"), handle)
}

async fn send_envelope(relay: &mut Relay, envelope: &Envelope) {
    relay
        .send(Message::Text(envelope.encode().unwrap()))
        .await
        .unwrap();
}

/// Read frames until the next envelope (skipping ping/pong control
/// frames), panicking on close or stream end.
async fn recv_envelope(relay: &mut Relay) -> Envelope {
    loop {
        match relay.next().await.expect("relay stream ended").unwrap() {
            Message::Text(text) => return Envelope::decode(&text).unwrap(),
            Message::Ping(payload) => {
                let _ = relay.send(Message::Pong(payload)).await;
            }
            Message::Pong(_) => {}
            other => panic!("unexpected frame from client: {other:?}"),
        }
    }
}

fn shell_action(name: &str, script: &str) -> Action {
    Action {
        name: name.to_string(),
        description: format!("test action {name}"),
        parameters: vec![Parameter {
            name: "name".into(),
            kind: ParamKind::String,
            description: "who to greet".into(),
            required: true,
            default: None,
        }],
        runner: Runner::Process(ProcessRunner {
            shell: Some(script.to_string()),
            ..Default::default()
        }),
        environment: HashMap::new(),
    }
}

fn dispatcher_with(actions: Vec<Action>) -> Dispatcher {
    Dispatcher::new(
        "test-server",
        "0.0.1",
        RegistryCell::new(ActionRegistry::from_actions(actions)),
    )
}

fn config_for(relay_url: &str) -> SessionConfig {
    SessionConfig {
        relay_url: relay_url.to_string(),
        ping_interval_secs: 0,
        connect_timeout_secs: 5,
        ..Default::default()
    }
}

fn call_request(request_id: &str, rpc_id: i64, name: &str, arguments: Value) -> Envelope {
    Envelope::request(
        request_id,
        json!({
            "jsonrpc": "2.0",
            "id": rpc_id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        }),
    )
}

#[tokio::test]
async fn handshake_yields_tunnel_url() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t1.relay.test")).await;
        // Hold the connection open until the client goes away.
        while ws.next().await.is_some() {}
    })
    .await;

    let session = TunnelSession::connect(config_for(&url), dispatcher_with(vec![]))
        .await
        .unwrap();
    assert_eq!(session.tunnel_url(), "https://t1.relay.test");

    session.close().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_unexpected_frame_kind() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        let mut envelope = Envelope::registered("unused");
        envelope.kind = FrameKind::Unknown;
        envelope.error = Some("tunnel limit reached".into());
        send_envelope(&mut ws, &envelope).await;

        // The client must close the connection on a failed handshake.
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                _ => {}
            }
        }
    })
    .await;

    let err = TunnelSession::connect(config_for(&url), dispatcher_with(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, HatchError::Handshake(_)));
    relay.await.unwrap();
}

#[tokio::test]
async fn requests_are_dispatched_and_correlated() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        send_envelope(
            &mut ws,
            &call_request("req-1", 1, "hello", json!({"name": "World"})),
        )
        .await;

        let response = recv_envelope(&mut ws).await;
        assert_eq!(response.kind, FrameKind::Response);
        assert_eq!(response.request_id.as_deref(), Some("req-1"));

        let payload = response.payload.unwrap();
        assert_eq!(payload["id"], 1);
        assert_eq!(
            payload["result"]["content"][0]["text"],
            "Hello, World!"
        );
        assert_eq!(payload["result"]["isError"], json!(false));

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let dispatcher = dispatcher_with(vec![shell_action("hello", "echo \"Hello, {{name}}!\"")]);
    let session = TunnelSession::connect(config_for(&url), dispatcher)
        .await
        .unwrap();

    session.wait().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn concurrent_requests_answer_in_completion_order() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        // Issue the slow call first; the fast one must overtake it.
        send_envelope(&mut ws, &call_request("req-slow", 1, "slow", json!({}))).await;
        send_envelope(&mut ws, &call_request("req-fast", 2, "fast", json!({}))).await;

        let first = recv_envelope(&mut ws).await;
        let second = recv_envelope(&mut ws).await;

        assert_eq!(first.request_id.as_deref(), Some("req-fast"));
        assert_eq!(second.request_id.as_deref(), Some("req-slow"));

        // Each response is correlated to its own request regardless of
        // arrival order.
        let by_id: HashMap<String, Value> = [first, second]
            .into_iter()
            .map(|env| (env.request_id.clone().unwrap(), env.payload.unwrap()))
            .collect();
        assert_eq!(
            by_id["req-slow"]["result"]["content"][0]["text"],
            "slow done"
        );
        assert_eq!(
            by_id["req-fast"]["result"]["content"][0]["text"],
            "fast done"
        );

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let mut slow = shell_action("slow", "sleep 0.5; echo slow done");
    slow.parameters.clear();
    let mut fast = shell_action("fast", "echo fast done");
    fast.parameters.clear();

    let session = TunnelSession::connect(config_for(&url), dispatcher_with(vec![slow, fast]))
        .await
        .unwrap();
    session.wait().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn relay_ping_is_answered_with_pong() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        let mut ping = Envelope::pong();
        ping.kind = FrameKind::Ping;
        send_envelope(&mut ws, &ping).await;

        let reply = recv_envelope(&mut ws).await;
        assert_eq!(reply.kind, FrameKind::Pong);

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let session = TunnelSession::connect(config_for(&url), dispatcher_with(vec![]))
        .await
        .unwrap();
    session.wait().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn undecodable_rpc_payload_yields_parse_error() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        // Valid envelope, but the payload is not an MCP request.
        send_envelope(&mut ws, &Envelope::request("req-9", json!({"bogus": true}))).await;

        let response = recv_envelope(&mut ws).await;
        assert_eq!(response.request_id.as_deref(), Some("req-9"));
        let payload = response.payload.unwrap();
        assert_eq!(payload["error"]["code"], PARSE_ERROR);

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let session = TunnelSession::connect(config_for(&url), dispatcher_with(vec![]))
        .await
        .unwrap();
    session.wait().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn client_connected_notice_reaches_observer() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        let mut notice = Envelope::pong();
        notice.kind = FrameKind::ClientConnected;
        notice.client_ip = Some("203.0.113.7".into());
        send_envelope(&mut ws, &notice).await;

        // The notice is handled inline before the next frame, so a
        // ping/pong round trip fences it.
        let mut ping = Envelope::pong();
        ping.kind = FrameKind::Ping;
        send_envelope(&mut ws, &ping).await;
        let reply = recv_envelope(&mut ws).await;
        assert_eq!(reply.kind, FrameKind::Pong);

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen_in_hook = seen.clone();

    let mut config = config_for(&url);
    config.on_client_connected = Some(Arc::new(move |ip: &str| {
        *seen_in_hook.lock().unwrap() = Some(ip.to_string());
    }));

    let session = TunnelSession::connect(config, dispatcher_with(vec![]))
        .await
        .unwrap();
    session.wait().await.unwrap();
    relay.await.unwrap();

    assert_eq!(seen.lock().unwrap().as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn registry_swap_is_visible_to_next_request() {
    let dispatcher = dispatcher_with(vec![shell_action("hello", "echo hi")]);
    let swapper = dispatcher.clone();

    let (url, relay) = spawn_relay(move |mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;

        let list = |id: &str| {
            Envelope::request(
                id,
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
            )
        };

        send_envelope(&mut ws, &list("req-before")).await;
        let before = recv_envelope(&mut ws).await.payload.unwrap();
        assert_eq!(before["result"]["tools"][0]["name"], "hello");

        // Hot-swap between the two requests; the very next call must see
        // exactly the new registry, never a mix.
        swapper.update_registry(ActionRegistry::from_actions(vec![shell_action(
            "goodbye",
            "echo bye",
        )]));

        send_envelope(&mut ws, &list("req-after")).await;
        let after = recv_envelope(&mut ws).await.payload.unwrap();
        let tools = after["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["goodbye"]);

        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let session = TunnelSession::connect(config_for(&url), dispatcher)
        .await
        .unwrap();
    session.wait().await.unwrap();
    relay.await.unwrap();
}

#[tokio::test]
async fn keepalive_survives_dead_connection() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;
        // Drop the connection immediately; the client's keepalive loop
        // must stop quietly once its write fails.
        let _ = ws.send(Message::Close(None)).await;
    })
    .await;

    let mut config = config_for(&url);
    config.ping_interval_secs = 1;

    let session = TunnelSession::connect(config, dispatcher_with(vec![]))
        .await
        .unwrap();

    // Clean close from the relay terminates wait() without error.
    session.wait().await.unwrap();
    relay.await.unwrap();

    // Give the keepalive a couple of intervals to hit the dead sink.
    tokio::time::sleep(Duration::from_millis(2500)).await;
}

#[tokio::test]
async fn abrupt_close_surfaces_as_transport_error() {
    let (url, relay) = spawn_relay(|mut ws| async move {
        send_envelope(&mut ws, &Envelope::registered("https://t.relay.test")).await;
        send_envelope(&mut ws, &Envelope::request("req-1", json!({"x": 1}))).await;
        // Kill the TCP stream without a close handshake.
        drop(ws);
    })
    .await;

    let session = TunnelSession::connect(config_for(&url), dispatcher_with(vec![]))
        .await
        .unwrap();
    let result = session.wait().await;
    assert!(matches!(result, Err(HatchError::Transport(_))));
    relay.await.unwrap();
}

#[tokio::test]
async fn dial_failure_reports_relay_unreachable() {
    // Bind-then-drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = TunnelSession::connect(
        config_for(&format!("ws://{addr}")),
        dispatcher_with(vec![]),
    )
    .await
    .unwrap_err();
    match err {
        HatchError::Transport(msg) => assert!(msg.contains("relay unreachable")),
        other => panic!("expected transport error, got {other:?}"),
    }
}
