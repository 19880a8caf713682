//! # client
//!
//! Core client library for the couple location-sharing product: one partner
//! starts a timed session, both positions stream over a WebSocket while a
//! REST API persists session state, photos, and text annotations.
//!
//! ARCHITECTURE
//! ============
//! - `wire` (sibling crate) owns the socket payload shapes.
//! - `transport` owns exactly one WebSocket per handle and delivers inbound
//!   frames as a single ordered event queue.
//! - `position` owns the continuous-location subscription and coalesces
//!   fixes into a latest-value cell.
//! - `api` maps one REST resource action to one HTTP call.
//! - `store` is the state machine tying them together; its collaborators
//!   are constructor-injected traits so it can run against test doubles.
//! - `history` is the story/dashboard side: couple-wide history fetches and
//!   path statistics.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod position;
pub mod store;
pub mod transport;
pub mod types;

pub use error::ClientError;
