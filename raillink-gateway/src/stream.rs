use crate::app_config::{ApiConfig, StreamConfig};
use async_trait::async_trait;
use futures_util::StreamExt;
use raillink_shared::{CoachPositionEvent, LiveEvent, RouteDeviationEvent, TrainPositionEvent};
use reqwest::header::ACCEPT;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Live feed connection failed: {0}")]
    Connect(String),
}

/// Source of live train events. Receivers are broadcast subscriptions; slow
/// consumers may observe `Lagged` and should resync from the tracking
/// endpoint.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn subscribe(&self, train_id: i64) -> Result<broadcast::Receiver<LiveEvent>, FeedError>;
}

/// Server-sent-events client. One upstream connection per train is shared by
/// all local subscribers; the connection retries until the last receiver is
/// dropped.
pub struct SseFeedClient {
    http: reqwest::Client,
    base_url: String,
    reconnect: Duration,
    capacity: usize,
    channels: Mutex<HashMap<i64, broadcast::Sender<LiveEvent>>>,
}

impl SseFeedClient {
    pub fn new(api: &ApiConfig, stream: &StreamConfig) -> Result<Self, FeedError> {
        // No request timeout: the stream is expected to stay open.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(api.request_timeout_seconds))
            .build()
            .map_err(|error| FeedError::Connect(error.to_string()))?;
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            reconnect: Duration::from_secs(stream.reconnect_seconds),
            capacity: stream.channel_capacity,
            channels: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl LiveFeed for SseFeedClient {
    async fn subscribe(&self, train_id: i64) -> Result<broadcast::Receiver<LiveEvent>, FeedError> {
        let mut channels = self.channels.lock().await;
        if let Some(tx) = channels.get(&train_id) {
            if tx.receiver_count() > 0 {
                return Ok(tx.subscribe());
            }
        }

        let (tx, rx) = broadcast::channel(self.capacity);
        channels.insert(train_id, tx.clone());

        let http = self.http.clone();
        let url = format!("{}/api/trains/{}/stream", self.base_url, train_id);
        let reconnect = self.reconnect;
        tokio::spawn(async move {
            run_stream(http, url, tx, reconnect).await;
        });
        Ok(rx)
    }
}

/// Connect, parse and forward until every subscriber is gone.
async fn run_stream(
    http: reqwest::Client,
    url: String,
    tx: broadcast::Sender<LiveEvent>,
    reconnect: Duration,
) {
    loop {
        match http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Live feed connected: {}", url);
                let mut parser = SseParser::default();
                let mut body = response.bytes_stream();
                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for message in parser.push(&bytes) {
                                if let Some(event) = decode_event(&message) {
                                    if tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        Err(error) => {
                            tracing::warn!("Live feed read failed: {}", error);
                            break;
                        }
                    }
                }
            }
            Ok(response) => {
                tracing::warn!("Live feed rejected with status {}: {}", response.status(), url);
            }
            Err(error) => {
                tracing::warn!("Live feed connect failed: {}", error);
            }
        }

        if tx.receiver_count() == 0 {
            return;
        }
        tokio::time::sleep(reconnect).await;
    }
}

/// One parsed server-sent event.
#[derive(Debug, PartialEq)]
struct SseMessage {
    event: Option<String>,
    data: String,
}

/// Incremental SSE frame parser. Frames are blocks separated by a blank
/// line; chunk boundaries may fall anywhere.
#[derive(Default)]
struct SseParser {
    buffer: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer
            .push_str(&String::from_utf8_lossy(chunk).replace('\r', ""));

        let mut messages = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(message) = parse_block(block.trim_end_matches('\n')) {
                messages.push(message);
            }
        }
        messages
    }
}

fn parse_block(block: &str) -> Option<SseMessage> {
    let mut event = None;
    let mut data_lines = Vec::new();
    for line in block.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim().to_string());
        } else if let Some(payload) = line.strip_prefix("data:") {
            data_lines.push(payload.trim_start().to_string());
        }
        // Comment lines (leading ':') and unknown fields are skipped.
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(SseMessage {
        event,
        data: data_lines.join("\n"),
    })
}

/// Map a named frame onto the typed event model. Frames with no name or an
/// unrecognised name are dropped.
fn decode_event(message: &SseMessage) -> Option<LiveEvent> {
    let name = message.event.as_deref()?;
    let decoded = match name {
        "train_position" => serde_json::from_str::<TrainPositionEvent>(&message.data)
            .map(LiveEvent::TrainPosition),
        "coach_position_update" => serde_json::from_str::<CoachPositionEvent>(&message.data)
            .map(LiveEvent::CoachPosition),
        "route_deviation_alert" => serde_json::from_str::<RouteDeviationEvent>(&message.data)
            .map(LiveEvent::RouteDeviation),
        other => {
            tracing::debug!("Ignoring unknown live event '{}'", other);
            return None;
        }
    };
    match decoded {
        Ok(event) => Some(event),
        Err(error) => {
            tracing::warn!("Dropping malformed '{}' event: {}", name, error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_splits_frames_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser
            .push(b"event: train_position\ndata: {\"train_id\": 1,")
            .is_empty());
        let messages = parser.push(b" \"progress\": 42.5}\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("train_position"));
        assert_eq!(messages[0].data, "{\"train_id\": 1, \"progress\": 42.5}");
    }

    #[test]
    fn test_parser_yields_multiple_frames_from_one_chunk() {
        let mut parser = SseParser::default();
        let messages = parser.push(
            b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n",
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event.as_deref(), Some("a"));
        assert_eq!(messages[1].data, "2");
    }

    #[test]
    fn test_parser_strips_carriage_returns_and_comments() {
        let mut parser = SseParser::default();
        let messages = parser.push(b": keep-alive\r\n\r\nevent: x\r\ndata: y\r\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("x"));
        assert_eq!(messages[0].data, "y");
    }

    #[test]
    fn test_decode_named_events() {
        let position = decode_event(&SseMessage {
            event: Some("train_position".to_string()),
            data: r#"{"train_id": 12301, "progress": 61.0, "status": "On Time"}"#.to_string(),
        });
        assert!(matches!(
            position,
            Some(LiveEvent::TrainPosition(ref ev)) if ev.train_id == 12301
        ));

        let coach = decode_event(&SseMessage {
            event: Some("coach_position_update".to_string()),
            data: r#"{"train_id": 12301, "coach_number": "B4", "platform_number": 3}"#.to_string(),
        });
        assert!(matches!(
            coach,
            Some(LiveEvent::CoachPosition(ref ev)) if ev.coach_number == "B4"
        ));

        let deviation = decode_event(&SseMessage {
            event: Some("route_deviation_alert".to_string()),
            data: r#"{"train_id": 12301, "message": "Diverted via Itarsi", "created_at": 1756100000}"#
                .to_string(),
        });
        assert!(matches!(deviation, Some(LiveEvent::RouteDeviation(_))));
    }

    #[test]
    fn test_decode_drops_unknown_and_unnamed_events() {
        assert!(decode_event(&SseMessage {
            event: Some("heartbeat".to_string()),
            data: "{}".to_string(),
        })
        .is_none());
        assert!(decode_event(&SseMessage {
            event: None,
            data: r#"{"train_id": 1, "progress": 2.0}"#.to_string(),
        })
        .is_none());
    }

    #[test]
    fn test_decode_drops_malformed_payload() {
        assert!(decode_event(&SseMessage {
            event: Some("train_position".to_string()),
            data: "{ not json".to_string(),
        })
        .is_none());
    }
}
