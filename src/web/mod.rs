mod events_ws;
mod handlers;
mod relay_ws;
mod routes;

pub use events_ws::events_ws_handler;
pub use relay_ws::relay_ws_handler;
pub use routes::create_router;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use crate::config::{AppConfig, ConfigStore};
    use crate::events::EventBus;
    use crate::player::{HeadlessBuffer, HeadlessSurface, StreamClient, StreamEnd};
    use crate::protocol;
    use crate::state::AppState;
    use crate::transcode::shell_config;

    struct TestServer {
        addr: SocketAddr,
        state: Arc<AppState>,
        _dir: TempDir,
    }

    impl TestServer {
        fn ws_url(&self, query: &str) -> String {
            format!("ws://{}/{}", self.addr, query)
        }

        fn http_url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }

    async fn start_server(script: &str) -> TestServer {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.transcoder = shell_config(script);
        let store = ConfigStore::ephemeral(&dir.path().join("config.json"), config);

        let state = AppState::new(store, Arc::new(EventBus::new()));
        let router = create_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestServer {
            addr,
            state,
            _dir: dir,
        }
    }

    /// Payload bytes and close code of a connection the relay ends
    async fn read_until_close(url: &str) -> (Vec<u8>, Option<u16>) {
        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let mut payload = Vec::new();
        let read = async {
            while let Some(msg) = socket.next().await {
                match msg.unwrap() {
                    Message::Binary(data) => {
                        let frame = protocol::decode(&data).unwrap();
                        payload.extend_from_slice(frame.payload);
                    }
                    Message::Close(frame) => return frame.map(|f| u16::from(f.code)),
                    _ => {}
                }
            }
            None
        };
        let code = tokio::time::timeout(Duration::from_secs(10), read)
            .await
            .unwrap();
        (payload, code)
    }

    async fn next_json<S>(socket: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let read = async {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    other => panic!("unexpected message {:?}", other),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(10), read)
            .await
            .unwrap()
    }

    fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[tokio::test]
    async fn test_missing_stream_url_is_policy_violation() {
        let server = start_server("printf abc").await;

        let (payload, code) = read_until_close(&server.ws_url("")).await;
        assert!(payload.is_empty());
        assert_eq!(code, Some(1008));

        let (_, code) = read_until_close(&server.ws_url("?streamUrl=")).await;
        assert_eq!(code, Some(1008));

        assert_eq!(server.state.relay.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_frames_then_normal_close() {
        let server = start_server("printf abc").await;

        let (payload, code) = read_until_close(&server.ws_url("?streamUrl=rtsp%3A%2F%2Fcam1")).await;
        assert_eq!(payload, b"abc");
        assert_eq!(code, Some(1000));
        assert_eq!(server.state.relay.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_unstartable_transcoder_is_internal_error() {
        let server = start_server("").await;
        server
            .state
            .config
            .update(|c| {
                c.transcoder.binary = "/nonexistent/transcoder".into();
                c.transcoder.global_args.clear();
            })
            .await
            .unwrap();

        let (_, code) = read_until_close(&server.ws_url("?streamUrl=rtsp%3A%2F%2Fcam1")).await;
        assert_eq!(code, Some(1011));
    }

    #[tokio::test]
    async fn test_client_disconnect_kills_transcoder() {
        let server = start_server("printf abc; exec sleep 30").await;
        let (mut socket, _) =
            tokio_tungstenite::connect_async(server.ws_url("?streamUrl=rtsp%3A%2F%2Fcam1"))
                .await
                .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(first, Message::Binary(_)));

        let sessions: serde_json::Value = reqwest::get(server.http_url("/api/sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sessions["sessions"][0]["state"], "active");
        let pid = sessions["sessions"][0]["pid"].as_u64().unwrap() as u32;
        assert!(process_alive(pid));

        socket.close(None).await.unwrap();
        drop(socket);

        let registry = server.state.relay.registry().clone();
        tokio::time::timeout(Duration::from_secs(5), registry.wait_empty())
            .await
            .unwrap();
        assert!(!process_alive(pid));
    }

    #[tokio::test]
    async fn test_stream_client_end_to_end() {
        let server = start_server("printf abc").await;

        let buffer = Arc::new(HeadlessBuffer::new());
        let surface = Arc::new(HeadlessSurface::new());
        let mut client = StreamClient::new(&server.ws_url("")).unwrap();
        let latency = client
            .start_stream("rtsp://cam1", buffer.clone(), surface.clone())
            .await
            .unwrap();

        let end = tokio::time::timeout(Duration::from_secs(10), client.closed())
            .await
            .unwrap();
        assert!(matches!(
            end,
            Some(StreamEnd::Closed {
                code: Some(1000),
                ..
            })
        ));
        assert_eq!(buffer.appended_bytes(), 3);
        assert!(latency.borrow().unwrap() >= 0.0);
        assert!(surface.is_detached());
    }

    #[tokio::test]
    async fn test_health_and_config_endpoints() {
        let server = start_server("printf abc").await;
        let http = reqwest::Client::new();

        let health: serde_json::Value = http
            .get(server.http_url("/api/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["active_sessions"], 0);
        assert_eq!(health["event_listeners"], 0);

        let updated: serde_json::Value = http
            .post(server.http_url("/api/config/transcoder"))
            .json(&serde_json::json!({ "preset": "veryfast" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["preset"], "veryfast");

        let config: serde_json::Value = http
            .get(server.http_url("/api/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config["transcoder"]["preset"], "veryfast");
        assert!(config["catalog"].get("service_key").is_none());

        let rejected: serde_json::Value = http
            .post(server.http_url("/api/config/transcoder"))
            .json(&serde_json::json!({ "preset": "" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rejected["success"], false);
    }

    #[tokio::test]
    async fn test_transcoder_command_cannot_be_changed_over_http() {
        let server = start_server("printf abc").await;
        let http = reqwest::Client::new();

        let response = http
            .post(server.http_url("/api/config/transcoder"))
            .header("Origin", "http://elsewhere.example")
            .json(&serde_json::json!({
                "binary": "/usr/bin/env",
                "global_args": ["touch", "/tmp/should-not-exist"],
            }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        let config: serde_json::Value = http
            .get(server.http_url("/api/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config["transcoder"]["binary"], "/bin/sh");
        assert_eq!(config["transcoder"]["global_args"][0], "-c");
        assert_eq!(config["transcoder"]["global_args"][1], "printf abc");
    }

    #[tokio::test]
    async fn test_events_feed() {
        let server = start_server("printf abc").await;
        let (mut events, _) = tokio_tungstenite::connect_async(server.ws_url("api/ws/events"))
            .await
            .unwrap();
        events
            .send(Message::Text(
                r#"{"type":"subscribe","payload":{"topics":["session.*"]}}"#.to_string(),
            ))
            .await
            .unwrap();

        let snapshot = next_json(&mut events).await;
        assert_eq!(snapshot["event"], "sessions.snapshot");

        read_until_close(&server.ws_url("?streamUrl=rtsp%3A%2F%2Fcam1")).await;

        let opened = next_json(&mut events).await;
        assert_eq!(opened["event"], "session.opened");
        let closed = next_json(&mut events).await;
        assert_eq!(closed["event"], "session.closed");
        assert_eq!(closed["data"]["close_code"], 1000);
        assert_eq!(closed["data"]["transcoder_terminated"], true);
    }
}
