use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::mcp::discovery::discover_tools;
use crate::mcp::error::{ConnectError, ListenError, SendError};
use crate::mcp::session::{CallbackPool, ConnectionConfig, InboundFrame, WsClient};

type ServerWs = WebSocketStream<TcpStream>;

/// Accept exactly one WebSocket connection and hand it to the handler.
async fn spawn_ws_server<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                handler(ws).await;
            }
        }
    });
    format!("ws://{addr}")
}

/// Scripted MCP endpoint: answers `initialize` and `tools/list` with the
/// given payloads, drops everything else, and reports when the client is
/// gone.
async fn serve_mcp_endpoint(
    mut ws: ServerWs,
    init_reply: Option<String>,
    tools_reply: Option<String>,
    done: mpsc::Sender<()>,
) {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
                    continue;
                };
                let reply = match value.get("method").and_then(|m| m.as_str()) {
                    Some("initialize") => init_reply.clone(),
                    Some("tools/list") => tools_reply.clone(),
                    _ => None,
                };
                if let Some(reply) = reply {
                    let _ = ws.send(Message::text(reply)).await;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }
    let _ = done.send(()).await;
}

fn test_config(address: &str) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(address);
    config.connect_timeout = Duration::from_secs(2);
    config.session_budget = Duration::from_secs(3);
    config
}

fn text_frame(frame: &InboundFrame) -> &str {
    match frame {
        InboundFrame::Text(text) => text,
        InboundFrame::Binary(_) => panic!("expected text frame"),
    }
}

#[tokio::test]
async fn listen_returns_minimal_prefix_in_arrival_order() {
    let address = spawn_ws_server(|mut ws| async move {
        for payload in ["one", "two", "three", "four"] {
            ws.send(Message::text(payload)).await.expect("server send");
        }
        // Stay open so trailing frames remain queued on the client side.
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let client = WsClient::connect(test_config(&address)).await.expect("connect");
    let collected = client
        .listen_keep_open(|frame| text_frame(frame) == "three")
        .await
        .expect("listen");

    let texts: Vec<&str> = collected.iter().map(text_frame).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    client.close().await;
}

#[tokio::test]
async fn listen_keep_open_supports_a_second_exchange() {
    let address = spawn_ws_server(|mut ws| async move {
        ws.send(Message::text("first")).await.expect("server send");
        // Second frame only after the client asks again.
        if let Some(Ok(Message::Text(_))) = ws.next().await {
            ws.send(Message::text("second")).await.expect("server send");
        }
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let client = WsClient::connect(test_config(&address)).await.expect("connect");

    let first = client
        .listen_keep_open(|frame| text_frame(frame) == "first")
        .await
        .expect("first listen");
    assert_eq!(first.len(), 1);
    assert!(!client.is_closed());

    client.send_text("more please").await.expect("send");
    let second = client
        .listen(|frame| text_frame(frame) == "second")
        .await
        .expect("second listen");
    assert_eq!(second.len(), 1);
    assert!(client.is_closed());
}

#[tokio::test]
async fn listen_times_out_close_to_the_budget() {
    let address = spawn_ws_server(|mut ws| async move {
        // Silent peer: read but never reply.
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let mut config = test_config(&address);
    config.session_budget = Duration::from_millis(300);
    let client = WsClient::connect(config).await.expect("connect");

    let start = std::time::Instant::now();
    let err = client
        .listen(|_| true)
        .await
        .expect_err("must time out");
    let elapsed = start.elapsed();

    assert!(matches!(err, ListenError::Timeout));
    assert!(elapsed >= Duration::from_millis(250), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned late: {elapsed:?}");
}

#[tokio::test]
async fn session_budget_is_shared_across_listen_calls() {
    let address = spawn_ws_server(|mut ws| async move {
        ws.send(Message::text("ack")).await.expect("server send");
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let mut config = test_config(&address);
    config.session_budget = Duration::from_millis(400);
    let client = WsClient::connect(config).await.expect("connect");

    client
        .listen_keep_open(|frame| text_frame(frame) == "ack")
        .await
        .expect("first listen");

    // The second wait draws on the same budget; it must not get a fresh
    // 400ms window measured from now.
    let start = std::time::Instant::now();
    let err = client
        .listen_keep_open(|_| false)
        .await
        .expect_err("budget exhausts");
    assert!(matches!(err, ListenError::Timeout));
    assert!(start.elapsed() < Duration::from_millis(600));
    client.close().await;
}

#[tokio::test]
async fn transport_loss_fails_current_and_future_listens() {
    let (dropped_tx, mut dropped_rx) = mpsc::channel::<()>(1);
    let address = spawn_ws_server(move |ws| async move {
        // Abrupt drop without a close handshake.
        drop(ws);
        let _ = dropped_tx.send(()).await;
    })
    .await;

    let client = WsClient::connect(test_config(&address)).await.expect("connect");
    dropped_rx.recv().await.expect("server dropped connection");

    let first = client
        .listen_keep_open(|_| false)
        .await
        .expect_err("transport failure");
    assert!(matches!(first, ListenError::Transport(_)), "got {first:?}");

    // Future waits fail immediately with the latched cause, not a timeout.
    let start = std::time::Instant::now();
    let second = client
        .listen_keep_open(|_| false)
        .await
        .expect_err("latched failure");
    assert!(matches!(second, ListenError::Transport(_)), "got {second:?}");
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn close_is_idempotent_and_race_safe() {
    let address = spawn_ws_server(|mut ws| async move {
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let client = WsClient::connect(test_config(&address)).await.expect("connect");

    tokio::join!(client.close(), client.close());
    client.close().await;
    assert!(client.is_closed());

    let err = client.send_text("late").await.expect_err("send after close");
    assert!(matches!(err, SendError::Closed(_)), "got {err:?}");
}

#[tokio::test]
async fn hooks_run_on_the_callback_pool() {
    let address = spawn_ws_server(|mut ws| async move {
        ws.send(Message::text("alpha")).await.expect("server send");
        ws.send(Message::text("omega")).await.expect("server send");
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;

    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(8);
    let mut config = test_config(&address);
    config.callback_pool = Some(CallbackPool::new(1, 8));
    config.on_text = Some(std::sync::Arc::new(move |text| {
        let _ = seen_tx.try_send(text);
    }));

    let client = WsClient::connect(config).await.expect("connect");
    client
        .listen(|frame| text_frame(frame) == "omega")
        .await
        .expect("listen");

    let first = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .expect("hook fired")
        .expect("channel open");
    let second = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .expect("hook fired")
        .expect("channel open");
    assert_eq!((first.as_str(), second.as_str()), ("alpha", "omega"));
}

#[tokio::test]
async fn connect_times_out_against_an_unresponsive_peer() {
    // Raw TCP listener that never answers the WebSocket handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _held = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut config = ConnectionConfig::new(format!("ws://{addr}"));
    config.connect_timeout = Duration::from_millis(200);

    let err = WsClient::connect(config).await.expect_err("must time out");
    assert!(matches!(err, ConnectError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn connect_reports_unreachable_addresses() {
    // Bind to learn a free port, then drop so the connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = WsClient::connect(test_config(&format!("ws://{addr}")))
        .await
        .expect_err("must be refused");
    assert!(matches!(err, ConnectError::Handshake(_)), "got {err:?}");
}

// End-to-end discovery scenarios.

fn init_ok() -> String {
    r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}"#
        .to_string()
}

#[tokio::test]
async fn discovery_returns_advertised_tool_names() {
    let (done_tx, _done_rx) = mpsc::channel(1);
    let address = spawn_ws_server(move |ws| {
        serve_mcp_endpoint(
            ws,
            Some(init_ok()),
            Some(
                r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"get_weather"},{"name":"play_music"}]}}"#
                    .to_string(),
            ),
            done_tx,
        )
    })
    .await;

    let names = discover_tools(test_config(&address)).await;
    assert_eq!(names, vec!["get_weather", "play_music"]);
}

#[tokio::test]
async fn discovery_degrades_to_empty_on_initialize_error() {
    let (done_tx, _done_rx) = mpsc::channel(1);
    let address = spawn_ws_server(move |ws| {
        serve_mcp_endpoint(
            ws,
            Some(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"bad client"}}"#
                    .to_string(),
            ),
            None,
            done_tx,
        )
    })
    .await;

    let start = std::time::Instant::now();
    let names = discover_tools(test_config(&address)).await;
    assert!(names.is_empty());
    // Error acks fail fast; they must not ride to the session timeout.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn discovery_degrades_to_empty_when_peer_never_answers() {
    let (done_tx, mut done_rx) = mpsc::channel(1);
    let address = spawn_ws_server(move |ws| serve_mcp_endpoint(ws, None, None, done_tx)).await;

    let mut config = test_config(&address);
    config.session_budget = Duration::from_millis(300);

    let names = discover_tools(config).await;
    assert!(names.is_empty());

    // The session must be torn down on the timeout path: the scripted peer
    // observes the connection going away.
    tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .expect("session was closed")
        .expect("server task finished");
}

#[tokio::test]
async fn discovery_skips_tools_without_a_name() {
    let (done_tx, _done_rx) = mpsc::channel(1);
    let address = spawn_ws_server(move |ws| {
        serve_mcp_endpoint(
            ws,
            Some(init_ok()),
            Some(
                r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"get_weather"},{"description":"nameless"},{"name":"play_music"}]}}"#
                    .to_string(),
            ),
            done_tx,
        )
    })
    .await;

    let names = discover_tools(test_config(&address)).await;
    assert_eq!(names, vec!["get_weather", "play_music"]);
}

#[tokio::test]
async fn discovery_ignores_interleaved_notifications() {
    let (done_tx, _done_rx) = mpsc::channel(1);
    let address = spawn_ws_server(move |mut ws| async move {
        // Unsolicited notification ahead of the ack must not confuse
        // correlation.
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str())
                    else {
                        continue;
                    };
                    match value.get("method").and_then(|m| m.as_str()) {
                        Some("initialize") => {
                            let notify =
                                r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#;
                            let _ = ws.send(Message::text(notify)).await;
                            let _ = ws.send(Message::text(init_ok())).await;
                        }
                        Some("tools/list") => {
                            let reply = r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"solo"}]}}"#;
                            let _ = ws.send(Message::text(reply)).await;
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
        let _ = done_tx.send(()).await;
    })
    .await;

    let names = discover_tools(test_config(&address)).await;
    assert_eq!(names, vec!["solo"]);
}
