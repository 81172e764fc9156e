//! Frame helpers: close-code normalization and source socket adaptation.

use std::io;

use axum::extract::ws::{self, WebSocket};
use futures_util::{stream, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use super::{BoxSocket, Message, WsError};

/// Used when a peer reports no usable code, or on errors.
pub const INTERNAL_ERROR: u16 = 1011;
/// Sent to both sides when the proxy shuts down.
pub const GOING_AWAY: u16 = 1001;
/// Status reported for a close frame without a code.
pub const NO_STATUS: u16 = 1005;
/// Status reported when the peer vanished without a close frame.
pub const ABNORMAL: u16 = 1006;

/// Close reasons must fit a control frame (125 bytes minus the code).
const MAX_REASON_BYTES: usize = 123;

/// Map a close code to one that may be sent on the wire.
///
/// 1004, 1005 and 1006 are reserved and become `3000 + code`; a missing
/// code becomes 1011.
pub fn normalize(code: Option<u16>) -> u16 {
    match code {
        Some(code @ (1004 | 1005 | 1006)) => 3000 + code,
        Some(code) => code,
        None => INTERNAL_ERROR,
    }
}

/// A normalized close, applied identically to both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code: normalize(code),
            reason: truncate_reason(reason.into()),
        }
    }

    /// From a received close frame; a frame without a code counts as 1005.
    pub fn from_frame(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self::new(Some(u16::from(frame.code)), frame.reason.as_str()),
            None => Self::new(Some(NO_STATUS), ""),
        }
    }

    /// The peer disappeared without a close frame.
    pub fn abnormal() -> Self {
        Self::new(Some(ABNORMAL), "")
    }

    /// An error event: 1011 with the error message as reason.
    pub fn error(err: &dyn std::fmt::Display) -> Self {
        Self::new(Some(INTERNAL_ERROR), err.to_string())
    }

    pub fn going_away() -> Self {
        Self::new(Some(GOING_AWAY), "proxy shutting down")
    }

    pub fn to_message(&self) -> Message {
        Message::Close(Some(CloseFrame {
            code: CloseCode::from(self.code),
            reason: self.reason.clone().into(),
        }))
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_REASON_BYTES {
        let mut end = MAX_REASON_BYTES;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

/// Payload and binary flag of a data frame.
pub fn data_payload(message: &Message) -> Option<(&[u8], bool)> {
    match message {
        Message::Text(text) => Some((text.as_bytes(), false)),
        Message::Binary(data) => Some((data.as_ref(), true)),
        _ => None,
    }
}

/// Frame kind label for metrics.
pub fn kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

fn from_axum(message: ws::Message) -> Message {
    match message {
        ws::Message::Text(text) => Message::text(text.as_str().to_owned()),
        ws::Message::Binary(data) => Message::Binary(data),
        ws::Message::Ping(data) => Message::Ping(data),
        ws::Message::Pong(data) => Message::Pong(data),
        ws::Message::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

fn into_axum(message: Message) -> Option<ws::Message> {
    Some(match message {
        Message::Text(text) => ws::Message::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => ws::Message::Binary(data),
        Message::Ping(data) => ws::Message::Ping(data),
        Message::Pong(data) => ws::Message::Pong(data),
        Message::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
        Message::Frame(_) => return None,
    })
}

/// Adapt an accepted axum socket to the relay's socket type.
pub fn source_socket(socket: WebSocket) -> BoxSocket {
    let socket = socket
        .map(|item| item.map(from_axum).map_err(|e| WsError::Io(io::Error::other(e))))
        .sink_map_err(|e| WsError::Io(io::Error::other(e)))
        .with_flat_map(|message: Message| stream::iter(into_axum(message).map(Ok)));
    Box::new(socket)
}
