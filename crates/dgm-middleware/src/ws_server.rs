//! WebSocket bridge exposing the bus to external clients.
//!
//! [`WsBridge`] serves a WebSocket endpoint where every connected client
//! receives the whole bus traffic as JSON text frames, one [`Event`] per
//! frame.  Clients may also inject samples into the graph with a
//! rosbridge-style publish request:
//!
//! ```json
//! {"op": "publish", "topic": "/dg__ctrl", "msg": {"type": "vector", "data": [0.1, 0.2]}}
//! ```
//!
//! The message is re-published on `topic`, where a
//! [`RosSubscribe`][crate::ros_subscribe::RosSubscribe] port picks it up at
//! its next trigger.

use std::net::SocketAddr;

use chrono::Utc;
use dgm_types::{DgmError, Event, EventPayload, TopicMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;

#[derive(Debug, Deserialize)]
struct PublishRequest {
    op: String,
    topic: String,
    msg: TopicMessage,
}

/// Bridge between the [`EventBus`] and WebSocket clients.
#[derive(Clone)]
pub struct WsBridge {
    bus: EventBus,
}

impl WsBridge {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Start a WebSocket server on `addr`.
    ///
    /// The server runs until it encounters a fatal bind error.
    ///
    /// # Errors
    ///
    /// Returns [`DgmError::Io`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), DgmError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DgmError::Io(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "websocket bridge listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), DgmError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| DgmError::Channel(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let json = serde_json::to_string(&event)
                                .map_err(|e| DgmError::Channel(e.to_string()))?;
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming_ws_message(text.as_str());
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }

    /// Parse a client frame and re-publish it on the bus.
    ///
    /// Returns `true` when the frame was a well-formed publish request.  Any
    /// other frame is ignored.
    fn handle_incoming_ws_message(&self, text: &str) -> bool {
        let Ok(request) = serde_json::from_str::<PublishRequest>(text) else {
            debug!("ignoring malformed ws frame");
            return false;
        };
        if request.op != "publish" {
            return false;
        }

        let event = Event {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: "dgm-middleware::ws".to_string(),
            payload: EventPayload::SignalSample {
                topic: request.topic.clone(),
                signal: String::new(),
                time: 0,
                message: request.msg,
            },
        };
        // Nobody listening on the topic yet is fine.
        let _ = self.bus.publish_to(&request.topic, event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_request_reaches_topic() {
        let bus = EventBus::default();
        let bridge = WsBridge::new(bus.clone());
        let mut rx = bus.subscribe_to("/dg__ctrl");

        let frame = r#"{"op":"publish","topic":"/dg__ctrl","msg":{"type":"vector","data":[0.1,0.2]}}"#;
        assert!(bridge.handle_incoming_ws_message(frame));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.source, "dgm-middleware::ws");
        let EventPayload::SignalSample { topic, message, .. } = event.payload;
        assert_eq!(topic, "/dg__ctrl");
        assert_eq!(message, TopicMessage::Vector(vec![0.1, 0.2]));
    }

    #[test]
    fn other_ops_and_garbage_are_ignored() {
        let bus = EventBus::default();
        let bridge = WsBridge::new(bus.clone());
        let mut global = bus.subscribe();

        assert!(!bridge.handle_incoming_ws_message(
            r#"{"op":"subscribe","topic":"/x","msg":{"type":"double","data":1.0}}"#
        ));
        assert!(!bridge.handle_incoming_ws_message("not json"));
        assert!(global.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_are_json_serialisable_for_clients() {
        let bus = EventBus::default();
        let bridge = WsBridge::new(bus.clone());
        let mut rx = bus.subscribe();

        bridge.handle_incoming_ws_message(
            r#"{"op":"publish","topic":"/dg__x","msg":{"type":"double","data":2.5}}"#,
        );

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("SignalSample"));
        assert!(json.contains("/dg__x"));
    }
}
