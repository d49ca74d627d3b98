//! Stream client: one relay connection feeding one decoder buffer

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::buffer::{DecoderBuffer, PlaybackSurface};
use super::corrector::LiveEdgeCorrector;
use super::feeder::{BufferFeeder, FeederStats, LatencyWatch};
use crate::protocol::STREAM_URL_PARAM;

/// Bound on sending our close frame during `stop_stream`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid relay URL: {0}")]
    InvalidRelayUrl(String),

    #[error("Failed to connect to relay: {0}")]
    Connect(String),
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Stopped locally
    Stopped,
    /// Relay closed the connection, with its close code if it sent one
    Closed { code: Option<u16>, reason: String },
    /// Connection failed
    Failed(String),
}

struct ActiveStream {
    cancel: CancellationToken,
    task: JoinHandle<StreamEnd>,
    surface: Arc<dyn PlaybackSurface>,
    stats: Arc<FeederStats>,
}

/// Client side of the relay protocol
///
/// At most one stream is active. Starting a new one stops the previous one
/// first, so late frames of an old stream never reach a new buffer.
pub struct StreamClient {
    relay_url: Url,
    corrector: LiveEdgeCorrector,
    active: Option<ActiveStream>,
}

impl StreamClient {
    /// `relay_url` is the relay endpoint, e.g. `ws://localhost:9999/`
    pub fn new(relay_url: &str) -> Result<Self, ClientError> {
        let relay_url =
            Url::parse(relay_url).map_err(|e| ClientError::InvalidRelayUrl(e.to_string()))?;
        if !matches!(relay_url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidRelayUrl(format!(
                "unsupported scheme '{}'",
                relay_url.scheme()
            )));
        }
        Ok(Self {
            relay_url,
            corrector: LiveEdgeCorrector::default(),
            active: None,
        })
    }

    pub fn with_corrector(mut self, corrector: LiveEdgeCorrector) -> Self {
        self.corrector = corrector;
        self
    }

    /// Connection URL for a source descriptor
    pub fn stream_url(&self, descriptor: &str) -> Url {
        let mut url = self.relay_url.clone();
        url.set_query(Some(&format!(
            "{}={}",
            STREAM_URL_PARAM,
            urlencoding::encode(descriptor)
        )));
        url
    }

    /// Open a relay connection for `descriptor` and feed it into `buffer`
    pub async fn start_stream(
        &mut self,
        descriptor: &str,
        buffer: Arc<dyn DecoderBuffer>,
        surface: Arc<dyn PlaybackSurface>,
    ) -> Result<LatencyWatch, ClientError> {
        self.stop_stream().await;

        let url = self.stream_url(descriptor);
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        info!("Streaming {} via {}", descriptor, self.relay_url);

        let feeder = BufferFeeder::new(buffer, surface.clone(), self.corrector);
        let latency = feeder.latency();
        let stats = feeder.stats();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(socket, feeder, cancel.clone()));

        self.active = Some(ActiveStream {
            cancel,
            task,
            surface,
            stats,
        });
        Ok(latency)
    }

    /// Stop the active stream
    ///
    /// On return the socket is closed, the decoder buffer released and the
    /// surface's data source detached.
    pub async fn stop_stream(&mut self) -> Option<StreamEnd> {
        let active = self.active.take()?;
        active.cancel.cancel();
        Some(finish(active).await)
    }

    /// Wait for the relay to end the active stream
    pub async fn closed(&mut self) -> Option<StreamEnd> {
        let active = self.active.take()?;
        Some(finish(active).await)
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Counters of the active stream
    pub fn stats(&self) -> Option<Arc<FeederStats>> {
        self.active.as_ref().map(|a| a.stats.clone())
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.surface.detach_source();
        }
    }
}

async fn finish(active: ActiveStream) -> StreamEnd {
    let end = match active.task.await {
        Ok(end) => end,
        Err(e) => StreamEnd::Failed(e.to_string()),
    };
    active.surface.detach_source();
    debug!("Stream finished: {:?}", end);
    end
}

async fn run_stream<S>(
    mut socket: tokio_tungstenite::WebSocketStream<S>,
    mut feeder: BufferFeeder,
    cancel: CancellationToken,
) -> StreamEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let end = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if tokio::time::timeout(CLOSE_TIMEOUT, socket.close(None)).await.is_err() {
                    debug!("Close frame not sent in time, dropping connection");
                }
                feeder.shutdown().await;
                return StreamEnd::Stopped;
            }

            msg = socket.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    feeder.feed(Bytes::from(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    break StreamEnd::Closed { code, reason };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Relay connection failed: {}", e);
                    break StreamEnd::Failed(e.to_string());
                }
                None => break StreamEnd::Closed { code: None, reason: String::new() },
            },
        }
    };

    // Let the last append land before releasing the buffer
    feeder.settle().await;
    feeder.shutdown().await;
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::headless::{HeadlessBuffer, HeadlessSurface};
    use crate::protocol;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    /// One-connection relay stand-in; returns its URL and the request URI
    async fn fake_relay<F, Fut>(serve: F) -> (String, Arc<Mutex<Option<String>>>)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let uri = Arc::new(Mutex::new(None));
        let seen = uri.clone();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket =
                tokio_tungstenite::accept_hdr_async(
                    stream,
                    |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        *seen.lock() = Some(req.uri().to_string());
                        Ok(resp)
                    },
                )
                .await
                .unwrap();
            serve(socket).await;
        });

        (format!("ws://{}/", addr), uri)
    }

    #[test]
    fn test_stream_url_encodes_descriptor() {
        let client = StreamClient::new("ws://localhost:9999/").unwrap();
        let url = client.stream_url("rtsp://cam1/live?channel=1&sub=0");
        assert_eq!(
            url.as_str(),
            "ws://localhost:9999/?streamUrl=rtsp%3A%2F%2Fcam1%2Flive%3Fchannel%3D1%26sub%3D0"
        );
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            StreamClient::new("http://localhost:9999/"),
            Err(ClientError::InvalidRelayUrl(_))
        ));
        assert!(StreamClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_stream_until_relay_closes() {
        let (url, uri) = fake_relay(|mut socket| async move {
            socket
                .send(Message::Binary(protocol::tag(b"ftyp")))
                .await
                .unwrap();
            socket
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Upstream terminated".into(),
                })))
                .await
                .unwrap();
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let buffer = Arc::new(HeadlessBuffer::new().keep_chunks());
        let surface = Arc::new(HeadlessSurface::new());
        let mut client = StreamClient::new(&url).unwrap();
        let latency = client
            .start_stream("rtsp://cam1", buffer.clone(), surface.clone())
            .await
            .unwrap();

        let end = tokio::time::timeout(Duration::from_secs(5), client.closed())
            .await
            .unwrap();
        assert_eq!(
            end,
            Some(StreamEnd::Closed {
                code: Some(1000),
                reason: "Upstream terminated".to_string()
            })
        );
        assert_eq!(buffer.chunks(), vec![Bytes::from_static(b"ftyp")]);
        assert!(latency.borrow().is_some());
        assert!(surface.is_detached());
        assert!(!client.is_streaming());
        assert_eq!(uri.lock().as_deref(), Some("/?streamUrl=rtsp%3A%2F%2Fcam1"));
    }

    #[tokio::test]
    async fn test_stop_stream_closes_socket() {
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
        let (url, _) = fake_relay(|mut socket| async move {
            let mut saw_close = false;
            while let Some(msg) = socket.next().await {
                if matches!(msg, Ok(Message::Close(_))) {
                    saw_close = true;
                }
                if msg.is_err() {
                    break;
                }
            }
            let _ = closed_tx.send(saw_close);
        })
        .await;

        let buffer = Arc::new(HeadlessBuffer::new());
        let surface = Arc::new(HeadlessSurface::new());
        let mut client = StreamClient::new(&url).unwrap();
        client
            .start_stream("rtsp://cam1", buffer.clone(), surface.clone())
            .await
            .unwrap();
        assert!(client.is_streaming());

        let end = client.stop_stream().await;
        assert_eq!(end, Some(StreamEnd::Stopped));
        assert!(surface.is_detached());
        assert_eq!(Arc::strong_count(&buffer), 1);

        let saw_close = tokio::time::timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(saw_close);
        assert_eq!(client.stop_stream().await, None);
    }
}
