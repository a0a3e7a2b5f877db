//! Transport seam for the live session and its WebSocket implementation.
//!
//! A [`LiveConnector`] opens a session and returns a [`LiveLink`] for
//! outbound messages. Everything that comes back from the server is pushed as
//! a [`LinkEvent`] into the unbounded queue handed to `connect`, in arrival
//! order, ending with exactly one `Closed` or `Error`.
//!
//! [`GeminiLiveConnector`] speaks the `BidiGenerateContent` protocol over
//! tokio-tungstenite: it sends the setup message, waits for `setupComplete`,
//! then splits the socket into a reader task and a writer task.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::error::LiveError;
use super::messages::{ClientMessage, ServerMessage, Setup};
use crate::config::{GeminiConfig, LiveConfig};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Something that happened on the link, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The remote session is established.
    Opened,
    /// A server message.
    Message(ServerMessage),
    /// A frame that could not be parsed as a server message.
    Malformed(String),
    /// The remote side closed the session, with its reason if it gave one.
    Closed(Option<String>),
    /// The transport failed.
    Error(String),
}

/// Outbound half of an open session.
pub trait LiveLink: Send + Sync {
    /// Queue `message` for sending. Never waits for the network.
    fn send(&self, message: ClientMessage) -> Result<(), LiveError>;

    /// Close the session. Safe to call more than once.
    fn close(&self);
}

/// Opens live sessions.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Establish a session configured by `setup`. Resolves once the server
    /// has acknowledged the setup.
    async fn connect(
        &self,
        setup: Setup,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn LiveLink>, LiveError>;
}

// ---------------------------------------------------------------------------
// GeminiLiveConnector
// ---------------------------------------------------------------------------

pub struct GeminiLiveConnector {
    ws_url: String,
    api_key: String,
}

impl GeminiLiveConnector {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Fails with [`LiveError::MissingApiKey`] when no key can be resolved.
    pub fn from_config(live: &LiveConfig, gemini: &GeminiConfig) -> Result<Self, LiveError> {
        let api_key = gemini.resolve_api_key().ok_or(LiveError::MissingApiKey)?;
        Ok(Self::new(&live.ws_url, api_key))
    }

    /// The WebSocket URL with the API key appended as `key`.
    pub fn endpoint(&self) -> Result<Url, LiveError> {
        let mut url = Url::parse(&self.ws_url).map_err(|e| {
            LiveError::Connection(format!("invalid live URL {:?}: {e}", self.ws_url))
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

/// Parse a text or binary frame; `None` for control frames.
fn parse_frame(msg: &Message) -> Option<Result<ServerMessage, String>> {
    match msg {
        Message::Text(text) => Some(ServerMessage::from_json(text).map_err(|e| e.to_string())),
        Message::Binary(data) => Some(serde_json::from_slice(data).map_err(|e| e.to_string())),
        _ => None,
    }
}

fn close_reason(frame: Option<&CloseFrame>) -> Option<String> {
    frame
        .map(|f| f.reason.to_string())
        .filter(|reason| !reason.is_empty())
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        setup: Setup,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Arc<dyn LiveLink>, LiveError> {
        let url = self.endpoint()?;
        log::info!(
            "live: connecting to {}{}",
            url.host_str().unwrap_or_default(),
            url.path()
        );

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;
        let (mut ws_sink, mut ws_stream) = ws.split();

        let setup_json = ClientMessage::Setup(setup).to_json()?;
        ws_sink
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;

        // Wait for the acknowledgement. Anything else that arrives first is
        // passed on unchanged.
        loop {
            match ws_stream.next().await {
                Some(Ok(Message::Close(frame))) => {
                    let reason = close_reason(frame.as_ref()).unwrap_or_else(|| "no reason".into());
                    return Err(LiveError::Connection(format!("closed during setup: {reason}")));
                }
                Some(Ok(msg)) => match parse_frame(&msg) {
                    Some(Ok(server)) if server.is_setup_complete() => break,
                    Some(Ok(server)) => {
                        let _ = events.send(LinkEvent::Message(server));
                    }
                    Some(Err(e)) => {
                        let _ = events.send(LinkEvent::Malformed(e));
                    }
                    None => {}
                },
                Some(Err(e)) => return Err(LiveError::Connection(e.to_string())),
                None => {
                    return Err(LiveError::Connection("connection ended during setup".into()));
                }
            }
        }

        log::info!("live: session open");
        let _ = events.send(LinkEvent::Opened);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        // Writer: drains the outbound queue until a Close frame goes out.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_sink.send(msg).await {
                    log::debug!("live: send failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader: forwards every frame as an event until the socket ends.
        let pong_tx = out_tx.clone();
        tokio::spawn(async move {
            let last = loop {
                match ws_stream.next().await {
                    Some(Ok(Message::Close(frame))) => {
                        break LinkEvent::Closed(close_reason(frame.as_ref()));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = pong_tx.send(Message::Pong(data));
                    }
                    Some(Ok(msg)) => match parse_frame(&msg) {
                        Some(Ok(server)) => {
                            let _ = events.send(LinkEvent::Message(server));
                        }
                        Some(Err(e)) => {
                            let _ = events.send(LinkEvent::Malformed(e));
                        }
                        None => {}
                    },
                    Some(Err(e)) => break LinkEvent::Error(e.to_string()),
                    None => break LinkEvent::Closed(None),
                }
            };
            let _ = events.send(last);
        });

        Ok(Arc::new(WsLink { out: out_tx }))
    }
}

// ---------------------------------------------------------------------------
// WsLink
// ---------------------------------------------------------------------------

struct WsLink {
    out: mpsc::UnboundedSender<Message>,
}

impl LiveLink for WsLink {
    fn send(&self, message: ClientMessage) -> Result<(), LiveError> {
        let json = message.to_json()?;
        self.out
            .send(Message::Text(json.into()))
            .map_err(|_| LiveError::LinkClosed)
    }

    fn close(&self) {
        let _ = self.out.send(Message::Close(None));
    }
}
