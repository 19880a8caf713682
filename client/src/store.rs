//! Session store — the client-side state machine.
//!
//! DESIGN
//! ======
//! The store is an explicit object with constructor-injected collaborators
//! (REST client, transport connector, position source), so it can run
//! against test doubles and multiple instances can coexist. Inbound socket
//! traffic arrives on a single ordered event queue; each event produces a
//! state transition plus an optional REST follow-up. The REST layer remains
//! the source of truth for durable state — the socket only carries events.
//!
//! LIFECYCLE
//! =========
//! `NO_SESSION → PENDING → ACTIVE → DONE`. Creating or accepting a session
//! adopts its id, refreshes status/history, and opens the transport. Any
//! non-terminal status observed while disconnected re-opens the connection;
//! `DONE` tears it down. Teardown is idempotent and all-or-nothing:
//! transport, position watch, and the periodic sender go together.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use wire::{InFrame, OutFrame};

use crate::api::SessionApi;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::position::{PositionSource, position_cell};
use crate::transport::{Connector, Transport, TransportEvent, now_ms};
use crate::types::{
    FinishSessionRequest, LatLng, PhotoUpload, Session, SessionEndReason, SessionPoint,
    SessionStatus,
};

/// Read-only view of the store for consumers.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub session_id: Option<i64>,
    pub status: Option<SessionStatus>,
    pub my_pos: Option<LatLng>,
    pub partner_pos: Option<LatLng>,
    pub history: Vec<SessionPoint>,
    pub connected: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

/// REST follow-up demanded by an inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reaction {
    None,
    ReloadHistory,
    ReloadStatusAndHistory,
}

enum Step {
    Tick,
    Event(Option<TransportEvent>),
}

/// Client-side session aggregate. Owned by exactly one consumer; all
/// mutation goes through its methods.
pub struct SessionStore {
    api: Arc<dyn SessionApi>,
    connector: Arc<dyn Connector>,
    position: Box<dyn PositionSource>,
    config: ClientConfig,
    /// Local user id, used to suppress echoes of our own broadcasts.
    user_id: Option<i64>,

    session_id: Option<i64>,
    status: Option<SessionStatus>,
    my_pos: Option<LatLng>,
    partner_pos: Option<LatLng>,
    history: Vec<SessionPoint>,
    connected: bool,
    loading: bool,
    last_error: Option<String>,

    transport: Option<Box<dyn Transport>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    pos_tx: watch::Sender<Option<LatLng>>,
    pos_rx: watch::Receiver<Option<LatLng>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn SessionApi>,
        connector: Arc<dyn Connector>,
        position: Box<dyn PositionSource>,
    ) -> Self {
        let (pos_tx, pos_rx) = position_cell();
        Self {
            api,
            connector,
            position,
            config,
            user_id: None,
            session_id: None,
            status: None,
            my_pos: None,
            partner_pos: None,
            history: Vec::new(),
            connected: false,
            loading: false,
            last_error: None,
            transport: None,
            events: None,
            pos_tx,
            pos_rx,
        }
    }

    /// Identify the local user so inbound echoes of our own broadcasts can
    /// be discarded.
    pub fn set_user_id(&mut self, user_id: i64) {
        self.user_id = Some(user_id);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            status: self.status,
            my_pos: self.my_pos,
            partner_pos: self.partner_pos,
            history: self.history.clone(),
            connected: self.connected,
            loading: self.loading,
            last_error: self.last_error.clone(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn status(&self) -> Option<SessionStatus> {
        self.status
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    /// Create a session, adopt it, fetch its history, and open the
    /// transport. If creation fails nothing is adopted and no connection is
    /// opened.
    ///
    /// # Errors
    ///
    /// Propagates REST failures after recording them in the error slot.
    pub async fn create_and_start(&mut self) -> Result<Session, ClientError> {
        self.begin();
        let session = match self.api.create_session().await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        self.session_id = Some(session.id);
        self.status = Some(session.status);
        if let Err(e) = self.reload_history().await {
            return Err(self.fail(e));
        }
        self.ensure_connected().await;
        self.loading = false;
        Ok(session)
    }

    /// Accept a pending session, adopt it, refresh status and history, and
    /// open the transport.
    ///
    /// # Errors
    ///
    /// Propagates REST failures after recording them in the error slot.
    pub async fn accept_and_start(&mut self, session_id: i64) -> Result<(), ClientError> {
        self.begin();
        if let Err(e) = self.api.accept_session(session_id).await {
            return Err(self.fail(e));
        }
        self.session_id = Some(session_id);
        if let Err(e) = self.reload_status().await {
            return Err(self.fail(e));
        }
        if let Err(e) = self.reload_history().await {
            return Err(self.fail(e));
        }
        self.ensure_connected().await;
        self.loading = false;
        Ok(())
    }

    /// Refresh the lifecycle status from the server and apply the
    /// connect/disconnect rules it implies.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoSession`] without an adopted session; otherwise the
    /// REST failure.
    pub async fn reload_status(&mut self) -> Result<(), ClientError> {
        let Some(session_id) = self.session_id else {
            return Err(ClientError::NoSession);
        };
        let response = self.api.session_status(session_id).await?;
        self.apply_status(response.status).await;
        Ok(())
    }

    /// Refresh the cached point history from the server.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoSession`] without an adopted session; otherwise the
    /// REST failure.
    pub async fn reload_history(&mut self) -> Result<(), ClientError> {
        let Some(session_id) = self.session_id else {
            return Err(ClientError::NoSession);
        };
        self.history = self.api.session_history(session_id).await?;
        Ok(())
    }

    /// Send a meet-confirmation over the socket (best-effort), commit the
    /// finish via REST, then tear everything down and refresh durable state.
    ///
    /// The broadcast is not un-sent when the REST call fails; that
    /// inconsistency window is an accepted, documented risk.
    ///
    /// # Errors
    ///
    /// Propagates the REST failure after recording it in the error slot.
    pub async fn meet_and_finish(&mut self, pos: LatLng) -> Result<(), ClientError> {
        let Some(session_id) = self.session_id else {
            return Err(ClientError::NoSession);
        };
        self.begin();
        self.send_meet_confirm(Some(pos));
        let request = FinishSessionRequest { reason: SessionEndReason::MeetConfirmed };
        if let Err(e) = self.api.finish_session(session_id, request).await {
            return Err(self.fail(e));
        }
        self.stop_sharing();
        if let Err(e) = self.reload_status().await {
            return Err(self.fail(e));
        }
        if let Err(e) = self.reload_history().await {
            return Err(self.fail(e));
        }
        self.loading = false;
        Ok(())
    }

    /// Upload a photo, broadcast the resulting point when it (or our last
    /// known position) yields usable coordinates, and refresh history.
    /// Always returns the created point.
    ///
    /// # Errors
    ///
    /// Propagates REST failures after recording them in the error slot.
    pub async fn upload_photo_and_broadcast(
        &mut self,
        upload: PhotoUpload,
    ) -> Result<SessionPoint, ClientError> {
        let Some(session_id) = self.session_id else {
            return Err(ClientError::NoSession);
        };
        self.begin();
        let point = match self.api.upload_photo(session_id, upload).await {
            Ok(point) => point,
            Err(e) => return Err(self.fail(e)),
        };

        let fallback = self.latest_pos();
        let lat = point.lat.or(fallback.map(|p| p.lat));
        let lng = point.lng.or(fallback.map(|p| p.lng));
        if let (Some(lat), Some(lng)) = (lat, lng) {
            self.send_ws(&OutFrame::Point {
                lat,
                lng,
                ts: now_ms(),
                text: point.text.clone(),
                photo_path: point.photo_path.clone(),
            });
        } else {
            tracing::warn!("photo point has no usable coordinates; broadcast skipped");
        }

        if let Err(e) = self.reload_history().await {
            return Err(self.fail(e));
        }
        self.loading = false;
        Ok(point)
    }

    /// Tear down transport, position watch, and the periodic sender. Safe
    /// to call any number of times.
    pub fn stop_sharing(&mut self) {
        self.disconnect_ws();
    }

    // =========================================================================
    // OUTBOUND MESSAGES
    // =========================================================================

    /// Record a manually supplied position and broadcast it immediately.
    pub fn send_my_location(&mut self, pos: LatLng) {
        self.my_pos = Some(pos);
        let _ = self.pos_tx.send(Some(pos));
        self.send_ws(&OutFrame::Point {
            lat: pos.lat,
            lng: pos.lng,
            ts: now_ms(),
            text: None,
            photo_path: None,
        });
    }

    /// Broadcast a text annotation at the latest known position. A benign
    /// no-op when no position is known.
    pub fn send_text_point(&mut self, text: &str) {
        let Some(pos) = self.latest_pos() else { return };
        self.send_ws(&OutFrame::Point {
            lat: pos.lat,
            lng: pos.lng,
            ts: now_ms(),
            text: Some(text.to_owned()),
            photo_path: None,
        });
    }

    /// Broadcast a meet-confirmation at `pos`, falling back to the latest
    /// known position. A benign no-op when neither is available.
    pub fn send_meet_confirm(&mut self, pos: Option<LatLng>) {
        let Some(pos) = pos.or_else(|| self.latest_pos()) else { return };
        self.send_ws(&OutFrame::MeetConfirm { lat: pos.lat, lng: pos.lng, ts: now_ms() });
    }

    /// Broadcast a cancellation. A benign no-op when no position is known.
    pub fn send_cancel(&mut self) {
        if self.latest_pos().is_none() {
            return;
        }
        self.send_ws(&OutFrame::Cancel { ts: now_ms() });
    }

    /// One beat of the periodic sender: emit the most recent known position
    /// as a `POINT`. Fixes between beats coalesce into that single value.
    pub fn tick_send(&mut self) {
        self.sync_my_pos();
        if !self.connected {
            return;
        }
        let Some(pos) = self.latest_pos() else { return };
        self.send_ws(&OutFrame::Point {
            lat: pos.lat,
            lng: pos.lng,
            ts: now_ms(),
            text: None,
            photo_path: None,
        });
    }

    fn send_ws(&self, frame: &OutFrame) {
        if !self.connected {
            return;
        }
        if let Some(transport) = &self.transport {
            transport.send(frame);
        }
    }

    fn latest_pos(&self) -> Option<LatLng> {
        (*self.pos_rx.borrow()).or(self.my_pos)
    }

    fn sync_my_pos(&mut self) {
        if let Some(pos) = *self.pos_rx.borrow() {
            self.my_pos = Some(pos);
        }
    }

    // =========================================================================
    // EVENT LOOP
    // =========================================================================

    /// Drive the store: process inbound events in order and pace the
    /// periodic sender. Returns once the session reaches `DONE` with the
    /// transport torn down.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.config.send_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let step = if let Some(events) = self.events.as_mut() {
                tokio::select! {
                    _ = ticker.tick() => Step::Tick,
                    event = events.recv() => Step::Event(event),
                }
            } else {
                ticker.tick().await;
                Step::Tick
            };

            match step {
                Step::Tick => self.tick_send(),
                Step::Event(Some(event)) => self.process_event(event).await,
                Step::Event(None) => {
                    self.events = None;
                    self.mark_disconnected();
                }
            }

            if self.status == Some(SessionStatus::Done) && !self.connected {
                break;
            }
        }
    }

    /// Drain any already-delivered events without blocking.
    pub async fn pump(&mut self) {
        loop {
            let Some(events) = self.events.as_mut() else { return };
            match events.try_recv() {
                Ok(event) => self.process_event(event).await,
                Err(mpsc::error::TryRecvError::Empty) => return,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.events = None;
                    self.mark_disconnected();
                    return;
                }
            }
        }
    }

    async fn process_event(&mut self, event: TransportEvent) {
        match self.handle_event(event) {
            Reaction::None => {}
            Reaction::ReloadHistory => {
                if let Err(e) = self.reload_history().await {
                    tracing::warn!(error = %e, "history refresh failed");
                }
            }
            Reaction::ReloadStatusAndHistory => {
                if let Err(e) = self.reload_status().await {
                    tracing::warn!(error = %e, "status refresh failed");
                }
                if let Err(e) = self.reload_history().await {
                    tracing::warn!(error = %e, "history refresh failed");
                }
            }
        }
    }

    /// Pure state transition for one inbound event. Must never panic or
    /// close the connection, whatever the payload.
    fn handle_event(&mut self, event: TransportEvent) -> Reaction {
        match event {
            TransportEvent::Opened => {
                self.connected = true;
                Reaction::None
            }
            TransportEvent::Frame(InFrame::Point { lat, lng, user_id, .. }) => {
                if user_id.is_some() && user_id == self.user_id {
                    // Echo of our own broadcast; partner position untouched.
                    return Reaction::None;
                }
                self.partner_pos = Some(LatLng { lat, lng });
                Reaction::ReloadHistory
            }
            TransportEvent::Frame(InFrame::MeetConfirm { .. } | InFrame::Cancel { .. }) => {
                Reaction::ReloadStatusAndHistory
            }
            TransportEvent::Frame(InFrame::Error { message }) => {
                tracing::error!(%message, "ws error frame");
                self.last_error = Some(message);
                Reaction::None
            }
            TransportEvent::Raw(raw) => {
                tracing::debug!(%raw, "unrecognized ws payload ignored");
                Reaction::None
            }
            TransportEvent::Closed => {
                self.mark_disconnected();
                Reaction::None
            }
            TransportEvent::Error(error) => {
                tracing::warn!(%error, "ws transport error");
                self.last_error = Some(error);
                self.mark_disconnected();
                Reaction::None
            }
        }
    }

    // =========================================================================
    // CONNECTION MANAGEMENT
    // =========================================================================

    async fn ensure_connected(&mut self) {
        if !self.connected {
            self.connect_ws().await;
        }
    }

    async fn apply_status(&mut self, status: SessionStatus) {
        self.status = Some(status);
        if status.is_terminal() {
            self.disconnect_ws();
        } else {
            self.ensure_connected().await;
        }
    }

    /// Open the session socket, tearing down any previous connection first.
    /// Missing token degrades silently: the attempt is skipped with a
    /// warning and the store stays disconnected.
    async fn connect_ws(&mut self) {
        self.disconnect_ws();

        let Some(session_id) = self.session_id else {
            tracing::warn!("ws connect skipped: no session adopted");
            return;
        };
        let url = match self.config.ws_session_url(session_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "ws connect skipped");
                return;
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match self.connector.connect(&url, events_tx).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.events = Some(events_rx);
                self.connected = true;
                self.position.start(self.pos_tx.clone());
            }
            Err(e) => {
                tracing::warn!(error = %e, "ws connect failed");
                self.last_error = Some(e.to_string());
                self.connected = false;
            }
        }
    }

    /// Idempotent teardown of transport, event queue, and position watch.
    fn disconnect_ws(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.events = None;
        self.position.stop();
        self.connected = false;
    }

    /// The connection is already gone; release the handle and stop the
    /// position watch without attempting another close.
    fn mark_disconnected(&mut self) {
        self.transport = None;
        self.position.stop();
        self.connected = false;
    }

    fn begin(&mut self) {
        self.loading = true;
        self.last_error = None;
    }

    fn fail(&mut self, e: ClientError) -> ClientError {
        self.loading = false;
        self.last_error = Some(e.to_string());
        e
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
