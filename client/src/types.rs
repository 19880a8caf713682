//! Data model shared by the REST client and the session store.
//!
//! Field names follow the server's wire protocol: camelCase JSON keys,
//! numeric identifiers, RFC 3339 timestamps.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A pair of floating-point coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Lifecycle status of a session: `PENDING → ACTIVE → DONE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Active,
    Done,
}

impl SessionStatus {
    /// Whether the session can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEndReason {
    MeetConfirmed,
    Timeout,
    ManualCancel,
}

/// The kind of event a [`SessionPoint`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointKind {
    Photo,
    Memo,
    MeetDone,
    Point,
}

/// One time-bounded location-sharing encounter between two paired users.
/// Immutable once `DONE`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub couple_id: i64,
    pub request_user_id: i64,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    pub end_reason: Option<SessionEndReason>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub meet_at: Option<OffsetDateTime>,
    pub meet_lat: Option<f64>,
    pub meet_lng: Option<f64>,
}

/// One recorded event belonging to a session. Append-only; the
/// authoritative list lives server-side.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPoint {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: PointKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub photo_path: Option<String>,
    pub text: Option<String>,
}

impl SessionPoint {
    /// The point's coordinates, when both components are present.
    #[must_use]
    pub fn coords(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
            _ => None,
        }
    }
}

/// Response body of `GET /sessions/{id}/status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: i64,
    pub couple_id: i64,
    pub request_user_id: i64,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    pub end_reason: Option<SessionEndReason>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub meet_at: Option<OffsetDateTime>,
    pub meet_lat: Option<f64>,
    pub meet_lng: Option<f64>,
}

/// Response body of `GET /sessions/{id}/history`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    #[serde(default)]
    pub points: Vec<SessionPoint>,
}

/// Request body of `POST /sessions/{id}/finish`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FinishSessionRequest {
    pub reason: SessionEndReason,
}

/// A photo to upload, with optional accompanying text.
#[derive(Clone, Debug)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

// =============================================================================
// AUTH / USERS / COUPLES
// =============================================================================

/// An authenticated user.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub profile_image_url: Option<String>,
}

/// Request body of `POST /auth/login`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body of `POST /auth/signup`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

/// Response body of the auth endpoints. The token field is the one
/// snake_case exception in the protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

/// A couple pairing invite code.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub id: i64,
    pub inviter_user_id: i64,
    pub code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// STORY / HISTORY
// =============================================================================

/// One point on a recorded story path, as served by the history endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    #[serde(rename = "type")]
    pub kind: PointKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub lat: f64,
    pub lng: f64,
    pub photo_path: Option<String>,
    pub text: Option<String>,
}

impl HistoryPoint {
    #[must_use]
    pub fn coords(&self) -> LatLng {
        LatLng { lat: self.lat, lng: self.lng }
    }
}

/// Response body of `GET /history` and `GET /history/{sessionId}`:
/// both partners' recorded paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoupleHistoryResponse {
    #[serde(default)]
    pub user1: Vec<HistoryPoint>,
    #[serde(default)]
    pub user2: Vec<HistoryPoint>,
}

/// One row of `GET /history/list`: a finished encounter summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub id: i64,
    pub date: String,
    pub travel_minutes: f64,
    /// Meters.
    pub distance: f64,
}

/// Response body of `GET /history/list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListResponse {
    #[serde(default)]
    pub history_list: Vec<HistorySummary>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
