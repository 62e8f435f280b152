//! WebSocket stream bridge.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the client
//! - Open a WebSocket to the backend's streaming endpoint
//! - Relay frames in both directions, one message at a time
//! - Tear both legs down together
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Session States
//! ```text
//! Accepted → Connected → Relaying → Closing → Closed
//!     └──── connect failure ────────↗
//! ```
//!
//! # Design Decisions
//! - The two relay loops are raced; the first to finish cancels the other
//! - Close frames propagated in both directions
//! - Ping/pong forwarded as ordinary frames
//! - No buffering beyond the message in flight

use std::time::Duration;

use axum::extract::ws::{self, CloseFrame, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame as UpstreamCloseFrame},
};

use crate::net::connection::SessionGuard;

/// Close code sent to the client when the backend cannot be reached.
pub const CLOSE_BACKEND_UNAVAILABLE: u16 = 1011;

/// Lifecycle of one bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Accepted,
    Connected,
    Relaying,
    Closing,
    Closed,
}

/// Which relay loop ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

/// Why a relay loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The source sent a close frame or ended its stream.
    Closed,
    /// Reading the source failed.
    ReadError(String),
    /// Writing to the destination failed.
    WriteError(String),
}

/// One client connection paired with one backend connection.
pub struct BridgeSession {
    guard: SessionGuard,
    state: BridgeState,
    upstream_url: String,
    connect_timeout: Duration,
}

impl BridgeSession {
    pub fn new(guard: SessionGuard, upstream_url: String, connect_timeout: Duration) -> Self {
        let session = Self {
            guard,
            state: BridgeState::Accepted,
            upstream_url,
            connect_timeout,
        };
        tracing::debug!(session_id = %session.guard.id(), upstream = %session.upstream_url, "Bridge session accepted");
        session
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    fn transition(&mut self, next: BridgeState) {
        tracing::trace!(session_id = %self.guard.id(), from = ?self.state, to = ?next, "Bridge state change");
        self.state = next;
    }

    /// Run the session to completion. Consumes the client socket.
    pub async fn run(mut self, client: WebSocket) -> BridgeState {
        let session_id = self.guard.id();

        let connect = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.upstream_url.as_str()),
        )
        .await;

        let upstream = match connect {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                tracing::error!(session_id = %session_id, error = %e, "Backend WebSocket connect failed");
                self.transition(BridgeState::Closing);
                reject_client(client, format!("backend unavailable: {}", e)).await;
                self.transition(BridgeState::Closed);
                return self.state;
            }
            Err(_) => {
                tracing::error!(session_id = %session_id, "Backend WebSocket connect timed out");
                self.transition(BridgeState::Closing);
                reject_client(client, "backend connect timed out".to_string()).await;
                self.transition(BridgeState::Closed);
                return self.state;
            }
        };
        self.transition(BridgeState::Connected);

        let (mut client_tx, mut client_rx) = client.split();
        let (mut upstream_tx, mut upstream_rx) = upstream.split();

        self.transition(BridgeState::Relaying);
        let (direction, end) = tokio::select! {
            end = relay_client_to_backend(&mut client_rx, &mut upstream_tx) => (Direction::ClientToBackend, end),
            end = relay_backend_to_client(&mut upstream_rx, &mut client_tx) => (Direction::BackendToClient, end),
        };

        self.transition(BridgeState::Closing);
        match &end {
            RelayEnd::Closed => {
                tracing::debug!(session_id = %session_id, ?direction, "Bridge leg closed")
            }
            RelayEnd::ReadError(e) | RelayEnd::WriteError(e) => {
                tracing::warn!(session_id = %session_id, ?direction, error = %e, "Bridge leg failed")
            }
        }

        // Both sides get a close attempt; a side that already closed just errors.
        let _ = upstream_tx.close().await;
        let _ = client_tx.close().await;
        drop((client_tx, client_rx, upstream_tx, upstream_rx));

        self.transition(BridgeState::Closed);
        tracing::debug!(session_id = %session_id, "Bridge session closed");
        self.state
    }
}

async fn reject_client(mut client: WebSocket, reason: String) {
    let frame = CloseFrame {
        code: CLOSE_BACKEND_UNAVAILABLE,
        reason: truncate_reason(&reason).into(),
    };
    let _ = client.send(ws::Message::Close(Some(frame))).await;
    let _ = client.close().await;
}

/// Close reasons must fit in a control frame (125 bytes minus the code).
fn truncate_reason(reason: &str) -> &str {
    const MAX: usize = 123;
    if reason.len() <= MAX {
        return reason;
    }
    let mut end = MAX;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

async fn relay_client_to_backend<R, W>(source: &mut R, sink: &mut W) -> RelayEnd
where
    R: Stream<Item = Result<ws::Message, axum::Error>> + Unpin,
    W: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return RelayEnd::ReadError(e.to_string()),
            None => return RelayEnd::Closed,
        };
        let is_close = matches!(message, ws::Message::Close(_));
        if let Err(e) = sink.send(to_upstream(message)).await {
            return RelayEnd::WriteError(e.to_string());
        }
        if is_close {
            return RelayEnd::Closed;
        }
    }
}

async fn relay_backend_to_client<R, W>(source: &mut R, sink: &mut W) -> RelayEnd
where
    R: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    W: Sink<ws::Message, Error = axum::Error> + Unpin,
{
    loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return RelayEnd::ReadError(e.to_string()),
            None => return RelayEnd::Closed,
        };
        let is_close = matches!(message, tungstenite::Message::Close(_));
        let Some(message) = to_client(message) else {
            continue;
        };
        if let Err(e) = sink.send(message).await {
            return RelayEnd::WriteError(e.to_string());
        }
        if is_close {
            return RelayEnd::Closed;
        }
    }
}

/// Convert a client frame for the backend leg.
pub fn to_upstream(message: ws::Message) -> tungstenite::Message {
    match message {
        ws::Message::Text(text) => tungstenite::Message::Text(text.as_str().into()),
        ws::Message::Binary(data) => tungstenite::Message::Binary(data),
        ws::Message::Ping(data) => tungstenite::Message::Ping(data),
        ws::Message::Pong(data) => tungstenite::Message::Pong(data),
        ws::Message::Close(frame) => tungstenite::Message::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

/// Convert a backend frame for the client leg. Raw frames have no counterpart.
pub fn to_client(message: tungstenite::Message) -> Option<ws::Message> {
    let converted = match message {
        tungstenite::Message::Text(text) => ws::Message::Text(text.as_str().into()),
        tungstenite::Message::Binary(data) => ws::Message::Binary(data),
        tungstenite::Message::Ping(data) => ws::Message::Ping(data),
        tungstenite::Message::Pong(data) => ws::Message::Pong(data),
        tungstenite::Message::Close(frame) => ws::Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
        tungstenite::Message::Frame(_) => return None,
    };
    Some(converted)
}
