//! Wire payloads for the realtime session socket.
//!
//! This crate owns the JSON text-frame representation exchanged over the
//! session WebSocket. Outbound payloads are a closed set the client may
//! send; inbound payloads are decoded tolerantly — a frame that does not
//! parse is still delivered to the caller as raw text, since the server
//! may push informative plain text alongside structured frames.

use serde::{Deserialize, Serialize};

/// A payload the client sends over the session socket.
///
/// Serialized as a JSON object tagged by `type`, e.g.
/// `{"type":"POINT","lat":37.5,"lng":127.0,"ts":1700000000000}`.
/// Optional fields are omitted entirely rather than sent as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutFrame {
    /// A position sample, optionally annotated with text or a photo path.
    #[serde(rename = "POINT")]
    Point {
        lat: f64,
        lng: f64,
        /// Milliseconds since the Unix epoch.
        ts: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(rename = "photoPath", skip_serializing_if = "Option::is_none")]
        photo_path: Option<String>,
    },
    /// The sender confirms the couple has met at the given coordinates.
    #[serde(rename = "MEET_CONFIRM")]
    MeetConfirm { lat: f64, lng: f64, ts: i64 },
    /// The sender cancels the encounter.
    #[serde(rename = "CANCEL")]
    Cancel { ts: i64 },
}

/// A structured payload pushed by the server.
///
/// Every inbound frame carries at minimum a `type` discriminator. Broadcast
/// frames may carry a `userId` identifying the sender, which the store uses
/// to suppress echoes of its own outbound messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InFrame {
    /// A partner position broadcast, possibly annotated.
    #[serde(rename = "POINT")]
    Point {
        lat: f64,
        lng: f64,
        ts: Option<i64>,
        text: Option<String>,
        #[serde(rename = "photoPath")]
        photo_path: Option<String>,
        #[serde(rename = "userId")]
        user_id: Option<i64>,
    },
    /// A meet-confirmation broadcast.
    #[serde(rename = "MEET_CONFIRM")]
    MeetConfirm {
        lat: f64,
        lng: f64,
        ts: Option<i64>,
        #[serde(rename = "userId")]
        user_id: Option<i64>,
    },
    /// A cancellation broadcast.
    #[serde(rename = "CANCEL")]
    Cancel {
        ts: Option<i64>,
        #[serde(rename = "userId")]
        user_id: Option<i64>,
    },
    /// A server-side error report. Informative only; never fatal.
    #[serde(rename = "ERROR")]
    Error { message: String },
}

/// The result of decoding one inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// The frame parsed as a recognized [`InFrame`].
    Frame(InFrame),
    /// The frame was not recognized; the raw payload is preserved.
    Raw(String),
}

/// Serialize an outbound payload to its JSON text-frame form.
#[must_use]
pub fn encode(frame: &OutFrame) -> String {
    // Serializing a tagged enum of plain fields cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Decode one inbound text frame.
///
/// A payload that is not valid JSON, lacks a `type` tag, or carries an
/// unrecognized tag is returned as [`Incoming::Raw`] rather than dropped.
#[must_use]
pub fn decode(text: &str) -> Incoming {
    match serde_json::from_str::<InFrame>(text) {
        Ok(frame) => Incoming::Frame(frame),
        Err(_) => Incoming::Raw(text.to_owned()),
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
