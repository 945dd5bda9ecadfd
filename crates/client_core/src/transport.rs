//! The remote boundary: request/response calls and pushed event channels.

use std::future::ready;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to connect event channel {channel}: {reason}")]
    Connect { channel: String, reason: String },
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A live event listener. Dropping `events` stops delivery; `unlisten`, when
/// present, releases whatever the transport holds for the listener.
pub struct EventSource {
    pub events: BoxStream<'static, Value>,
    pub unlisten: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSource {
    pub fn new(events: BoxStream<'static, Value>) -> Self {
        Self {
            events,
            unlisten: None,
        }
    }

    pub fn with_unlisten(mut self, unlisten: impl FnOnce() + Send + 'static) -> Self {
        self.unlisten = Some(Box::new(unlisten));
        self
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Calls a named remote operation; the raw answer is normalized by the caller.
    async fn call(&self, operation: &str, payload: Value) -> Result<Value, TransportError>;

    async fn listen(&self, channel: &str) -> Result<EventSource, TransportError>;
}

/// Talks to a backend exposing `POST /invoke/{operation}` and
/// `GET /events/{channel}` (websocket upgrade).
pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn invoke_url(&self, operation: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(&format!("invoke/{operation}"))?)
    }

    fn events_url(&self, channel: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.join(&format!("events/{channel}"))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| TransportError::Connect {
                channel: channel.to_string(),
                reason: format!("cannot derive websocket url from {}", self.base_url),
            })?;
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, operation: &str, payload: Value) -> Result<Value, TransportError> {
        let url = self.invoke_url(operation)?;
        debug!(operation, %url, "invoking remote operation");
        let response = self.http.post(url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn listen(&self, channel: &str) -> Result<EventSource, TransportError> {
        let url = self.events_url(channel)?;
        let (ws_stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|err| TransportError::Connect {
                    channel: channel.to_string(),
                    reason: err.to_string(),
                })?;
        let (_, reader) = ws_stream.split();

        let channel = channel.to_string();
        let events = reader
            .take_while(|frame| ready(!matches!(frame, Err(_) | Ok(Message::Close(_)))))
            .filter_map(move |frame| {
                let parsed = match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            warn!(channel = %channel, error = %err, "dropping non-JSON event frame");
                            None
                        }
                    },
                    _ => None,
                };
                ready(parsed)
            })
            .boxed();

        Ok(EventSource::new(events))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
