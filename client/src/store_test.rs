use super::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::types::{PointKind, SessionStatusResponse};

// =============================================================================
// DOUBLES
// =============================================================================

/// Shared call-order log so tests can assert cross-collaborator ordering
/// (e.g. the meet-confirm frame precedes the REST finish call).
#[derive(Default)]
struct OpLog(Mutex<Vec<String>>);

impl OpLog {
    fn push(&self, entry: &str) {
        self.0.lock().expect("op log lock").push(entry.to_owned());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("op log lock").clone()
    }
}

struct MockApiState {
    status: SessionStatus,
    history: Vec<SessionPoint>,
    photo_point: Option<SessionPoint>,
    create_fails: bool,
    finish_fails: bool,
    status_calls: usize,
    history_calls: usize,
    finish_calls: usize,
}

/// In-memory session resource following the `PENDING → ACTIVE → DONE`
/// lifecycle.
struct MockApi {
    log: Arc<OpLog>,
    state: Mutex<MockApiState>,
}

impl MockApi {
    fn new(log: Arc<OpLog>) -> Self {
        Self {
            log,
            state: Mutex::new(MockApiState {
                status: SessionStatus::Pending,
                history: Vec::new(),
                photo_point: None,
                create_fails: false,
                finish_fails: false,
                status_calls: 0,
                history_calls: 0,
                finish_calls: 0,
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockApiState) -> T) -> T {
        f(&mut self.state.lock().expect("mock api lock"))
    }

    fn api_error() -> ClientError {
        ClientError::Api { status: 500, body: "boom".to_owned() }
    }
}

#[async_trait]
impl SessionApi for MockApi {
    async fn create_session(&self) -> Result<Session, ClientError> {
        if self.with(|s| s.create_fails) {
            return Err(Self::api_error());
        }
        self.log.push("create");
        self.with(|s| s.status = SessionStatus::Pending);
        Ok(session(11, SessionStatus::Pending))
    }

    async fn accept_session(&self, session_id: i64) -> Result<Session, ClientError> {
        self.log.push("accept");
        self.with(|s| s.status = SessionStatus::Active);
        Ok(session(session_id, SessionStatus::Active))
    }

    async fn session_status(&self, session_id: i64) -> Result<SessionStatusResponse, ClientError> {
        let status = self.with(|s| {
            s.status_calls += 1;
            s.status
        });
        Ok(status_response(session_id, status))
    }

    async fn session_history(&self, _session_id: i64) -> Result<Vec<SessionPoint>, ClientError> {
        Ok(self.with(|s| {
            s.history_calls += 1;
            s.history.clone()
        }))
    }

    async fn finish_session(
        &self,
        _session_id: i64,
        _request: FinishSessionRequest,
    ) -> Result<(), ClientError> {
        self.log.push("finish");
        let fails = self.with(|s| {
            s.finish_calls += 1;
            s.finish_fails
        });
        if fails {
            return Err(Self::api_error());
        }
        self.with(|s| s.status = SessionStatus::Done);
        Ok(())
    }

    async fn upload_photo(
        &self,
        _session_id: i64,
        _upload: PhotoUpload,
    ) -> Result<SessionPoint, ClientError> {
        self.log.push("upload");
        self.with(|s| s.photo_point.clone()).ok_or_else(Self::api_error)
    }
}

struct MockTransport {
    sent: Arc<Mutex<Vec<OutFrame>>>,
    log: Arc<OpLog>,
    closed: Arc<AtomicBool>,
}

impl Transport for MockTransport {
    fn send(&self, frame: &OutFrame) {
        let tag = match frame {
            OutFrame::Point { .. } => "frame:POINT",
            OutFrame::MeetConfirm { .. } => "frame:MEET_CONFIRM",
            OutFrame::Cancel { .. } => "frame:CANCEL",
        };
        self.log.push(tag);
        self.sent.lock().expect("sent lock").push(frame.clone());
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockConnectorShared {
    connects: AtomicUsize,
    urls: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    closed: Mutex<Vec<Arc<AtomicBool>>>,
}

struct MockConnector {
    shared: Arc<MockConnectorShared>,
    sent: Arc<Mutex<Vec<OutFrame>>>,
    log: Arc<OpLog>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, ClientError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.urls.lock().expect("urls lock").push(url.to_owned());
        *self.shared.events.lock().expect("events lock") = Some(events);

        let closed = Arc::new(AtomicBool::new(false));
        self.shared.closed.lock().expect("closed lock").push(closed.clone());
        Ok(Box::new(MockTransport { sent: self.sent.clone(), log: self.log.clone(), closed }))
    }
}

struct FakePositionSource {
    running: bool,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl PositionSource for FakePositionSource {
    fn start(&mut self, _sink: watch::Sender<Option<LatLng>>) {
        if self.running {
            return;
        }
        self.running = true;
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// =============================================================================
// HARNESS
// =============================================================================

struct Harness {
    store: SessionStore,
    api: Arc<MockApi>,
    conn: Arc<MockConnectorShared>,
    sent: Arc<Mutex<Vec<OutFrame>>>,
    log: Arc<OpLog>,
    pos_starts: Arc<AtomicUsize>,
    pos_stops: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self::with_token(Some("jwt".to_owned()))
    }

    fn with_token(token: Option<String>) -> Self {
        let log = Arc::new(OpLog::default());
        let api = Arc::new(MockApi::new(log.clone()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let conn = Arc::new(MockConnectorShared::default());
        let connector =
            Arc::new(MockConnector { shared: conn.clone(), sent: sent.clone(), log: log.clone() });
        let pos_starts = Arc::new(AtomicUsize::new(0));
        let pos_stops = Arc::new(AtomicUsize::new(0));
        let position = Box::new(FakePositionSource {
            running: false,
            starts: pos_starts.clone(),
            stops: pos_stops.clone(),
        });

        let config = ClientConfig::new("http://127.0.0.1:3000", token);
        let store = SessionStore::new(config, api.clone(), connector, position);
        Self { store, api, conn, sent, log, pos_starts, pos_stops }
    }

    fn connects(&self) -> usize {
        self.conn.connects.load(Ordering::SeqCst)
    }

    fn sent_frames(&self) -> Vec<OutFrame> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn push_event(&self, event: TransportEvent) {
        self.conn
            .events
            .lock()
            .expect("events lock")
            .as_ref()
            .expect("no live transport")
            .send(event)
            .expect("event queue closed");
    }
}

fn session(id: i64, status: SessionStatus) -> Session {
    Session {
        id,
        couple_id: 1,
        request_user_id: 7,
        status,
        requested_at: OffsetDateTime::UNIX_EPOCH,
        start_at: None,
        end_at: None,
        end_reason: None,
        meet_at: None,
        meet_lat: None,
        meet_lng: None,
    }
}

fn status_response(session_id: i64, status: SessionStatus) -> SessionStatusResponse {
    SessionStatusResponse {
        session_id,
        couple_id: 1,
        request_user_id: 7,
        status,
        requested_at: OffsetDateTime::UNIX_EPOCH,
        start_at: None,
        end_at: None,
        end_reason: None,
        meet_at: None,
        meet_lat: None,
        meet_lng: None,
    }
}

fn photo_point(lat: Option<f64>, lng: Option<f64>, text: Option<&str>) -> SessionPoint {
    SessionPoint {
        id: 900,
        session_id: 11,
        user_id: 7,
        kind: PointKind::Photo,
        created_at: OffsetDateTime::UNIX_EPOCH,
        lat,
        lng,
        photo_path: Some("/photos/900.jpg".to_owned()),
        text: text.map(ToOwned::to_owned),
    }
}

const HERE: LatLng = LatLng { lat: 37.5, lng: 127.0 };

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn create_and_start_adopts_session_and_opens_transport() {
    let mut h = Harness::new();

    let session = h.store.create_and_start().await.expect("create");
    assert_eq!(session.id, 11);

    let snap = h.store.snapshot();
    assert_eq!(snap.session_id, Some(11));
    assert_eq!(snap.status, Some(SessionStatus::Pending));
    assert!(snap.connected);
    assert!(!snap.loading);
    assert_eq!(h.connects(), 1);
    assert_eq!(h.pos_starts.load(Ordering::SeqCst), 1);

    let urls = h.conn.urls.lock().expect("urls lock").clone();
    assert_eq!(urls[0], "ws://127.0.0.1:3000/ws/session?sessionId=11&token=jwt");
}

#[tokio::test]
async fn failed_create_leaves_no_partial_state() {
    let mut h = Harness::new();
    h.api.with(|s| s.create_fails = true);

    let result = h.store.create_and_start().await;
    assert!(matches!(result, Err(ClientError::Api { status: 500, .. })));

    let snap = h.store.snapshot();
    assert_eq!(snap.session_id, None);
    assert!(!snap.connected);
    assert!(snap.last_error.is_some());
    assert_eq!(h.connects(), 0);
}

#[tokio::test]
async fn accept_and_start_refreshes_then_connects_once() {
    let mut h = Harness::new();

    h.store.accept_and_start(42).await.expect("accept");

    let snap = h.store.snapshot();
    assert_eq!(snap.session_id, Some(42));
    assert_eq!(snap.status, Some(SessionStatus::Active));
    assert!(snap.connected);
    // The status refresh already auto-opened; the final open step must not
    // tear down and reconnect.
    assert_eq!(h.connects(), 1);
}

#[tokio::test]
async fn create_then_status_round_trip_is_pending_then_active() {
    let mut h = Harness::new();

    let session = h.store.create_and_start().await.expect("create");
    assert_eq!(session.status, SessionStatus::Pending);
    h.store.reload_status().await.expect("status");
    assert_eq!(h.store.status(), Some(SessionStatus::Pending));

    h.api.accept_session(11).await.expect("partner accepts");
    h.store.reload_status().await.expect("status");
    assert_eq!(h.store.status(), Some(SessionStatus::Active));
}

#[tokio::test]
async fn terminal_status_tears_the_connection_down() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    assert!(h.store.is_connected());

    h.api.with(|s| s.status = SessionStatus::Done);
    h.store.reload_status().await.expect("status");

    assert!(!h.store.is_connected());
    let closed = h.conn.closed.lock().expect("closed lock").clone();
    assert!(closed[0].load(Ordering::SeqCst));
    assert_eq!(h.pos_stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_terminal_status_while_disconnected_reconnects() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.store.stop_sharing();
    assert!(!h.store.is_connected());

    h.api.with(|s| s.status = SessionStatus::Active);
    h.store.reload_status().await.expect("status");

    assert!(h.store.is_connected());
    assert_eq!(h.connects(), 2);
}

#[tokio::test]
async fn stop_sharing_is_idempotent() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.store.stop_sharing();
    h.store.stop_sharing();
    h.store.stop_sharing();

    assert!(!h.store.is_connected());
    assert_eq!(h.pos_stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_token_skips_the_connection_attempt() {
    let mut h = Harness::with_token(None);

    h.store.create_and_start().await.expect("create");

    assert!(!h.store.is_connected());
    assert_eq!(h.connects(), 0);
}

// =============================================================================
// OUTBOUND MESSAGES
// =============================================================================

#[tokio::test]
async fn manual_actions_without_a_position_send_nothing() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.store.send_text_point("coffee?");
    h.store.send_meet_confirm(None);
    h.store.send_cancel();

    assert!(h.sent_frames().is_empty());
}

#[tokio::test]
async fn manual_actions_fall_back_to_the_latest_known_position() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.store.send_my_location(HERE);

    h.store.send_text_point("coffee?");

    let frames = h.sent_frames();
    assert_eq!(frames.len(), 2); // the immediate location broadcast + the memo
    match &frames[1] {
        OutFrame::Point { lat, lng, text, photo_path, .. } => {
            assert_eq!((*lat, *lng), (HERE.lat, HERE.lng));
            assert_eq!(text.as_deref(), Some("coffee?"));
            assert!(photo_path.is_none());
        }
        other => panic!("expected POINT, got {other:?}"),
    }
}

#[tokio::test]
async fn periodic_tick_coalesces_fixes_into_one_frame() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    // Three fixes land before the first tick.
    for fix in
        [LatLng { lat: 1.0, lng: 1.0 }, LatLng { lat: 2.0, lng: 2.0 }, LatLng { lat: 3.0, lng: 3.0 }]
    {
        h.store.pos_tx.send(Some(fix)).expect("watch receiver alive");
    }

    h.store.tick_send();

    let frames = h.sent_frames();
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        OutFrame::Point { lat, lng, text, photo_path, .. } => {
            assert_eq!((*lat, *lng), (3.0, 3.0));
            assert!(text.is_none() && photo_path.is_none());
        }
        other => panic!("expected POINT, got {other:?}"),
    }
}

#[tokio::test]
async fn tick_without_a_known_position_sends_nothing() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.store.tick_send();

    assert!(h.sent_frames().is_empty());
}

#[tokio::test]
async fn sends_while_disconnected_are_dropped() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.store.stop_sharing();

    h.store.send_my_location(HERE);
    h.store.tick_send();

    assert!(h.sent_frames().is_empty());
}

// =============================================================================
// INBOUND DISPATCH
// =============================================================================

#[tokio::test]
async fn partner_point_updates_partner_position_and_reloads_history() {
    let mut h = Harness::new();
    h.store.set_user_id(7);
    h.store.create_and_start().await.expect("create");
    let before = h.api.with(|s| s.history_calls);

    h.push_event(TransportEvent::Frame(InFrame::Point {
        lat: 35.1,
        lng: 129.0,
        ts: None,
        text: None,
        photo_path: None,
        user_id: Some(8),
    }));
    h.store.pump().await;

    assert_eq!(h.store.snapshot().partner_pos, Some(LatLng { lat: 35.1, lng: 129.0 }));
    assert_eq!(h.api.with(|s| s.history_calls), before + 1);
}

#[tokio::test]
async fn own_echo_is_suppressed() {
    let mut h = Harness::new();
    h.store.set_user_id(7);
    h.store.create_and_start().await.expect("create");

    h.push_event(TransportEvent::Frame(InFrame::Point {
        lat: 35.1,
        lng: 129.0,
        ts: None,
        text: None,
        photo_path: None,
        user_id: Some(7),
    }));
    h.store.pump().await;

    assert_eq!(h.store.snapshot().partner_pos, None);
}

#[tokio::test]
async fn meet_confirm_event_refetches_status_and_history() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    let (status_before, history_before) = h.api.with(|s| (s.status_calls, s.history_calls));

    h.push_event(TransportEvent::Frame(InFrame::MeetConfirm {
        lat: 1.0,
        lng: 2.0,
        ts: None,
        user_id: Some(8),
    }));
    h.store.pump().await;

    assert_eq!(h.api.with(|s| s.status_calls), status_before + 1);
    assert_eq!(h.api.with(|s| s.history_calls), history_before + 1);
}

#[tokio::test]
async fn error_and_unrecognized_frames_never_break_the_store() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.push_event(TransportEvent::Frame(InFrame::Error { message: "bad token".to_owned() }));
    h.push_event(TransportEvent::Raw("{\"type\":\"HEARTBEAT\"}".to_owned()));
    h.store.pump().await;

    let snap = h.store.snapshot();
    assert!(snap.connected);
    assert_eq!(snap.last_error.as_deref(), Some("bad token"));
}

#[tokio::test]
async fn transport_close_marks_disconnected_and_stops_the_watch() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.push_event(TransportEvent::Closed);
    h.store.pump().await;

    assert!(!h.store.is_connected());
    assert_eq!(h.pos_stops.load(Ordering::SeqCst), 1);
}

// =============================================================================
// MEET / FINISH / PHOTO
// =============================================================================

#[tokio::test]
async fn meet_and_finish_sends_one_confirm_before_one_finish() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");

    h.store.meet_and_finish(HERE).await.expect("finish");

    let entries = h.log.entries();
    let confirm_at =
        entries.iter().position(|e| e == "frame:MEET_CONFIRM").expect("confirm sent");
    let finish_at = entries.iter().position(|e| e == "finish").expect("finish called");
    assert!(confirm_at < finish_at);
    assert_eq!(entries.iter().filter(|e| *e == "frame:MEET_CONFIRM").count(), 1);
    assert_eq!(h.api.with(|s| s.finish_calls), 1);

    assert_eq!(h.store.status(), Some(SessionStatus::Done));
    assert!(!h.store.is_connected());
}

#[tokio::test]
async fn meet_and_finish_propagates_rest_failure_after_the_broadcast() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.api.with(|s| s.finish_fails = true);

    let result = h.store.meet_and_finish(HERE).await;
    assert!(matches!(result, Err(ClientError::Api { .. })));

    // The broadcast went out exactly once and is not compensated.
    let entries = h.log.entries();
    assert_eq!(entries.iter().filter(|e| *e == "frame:MEET_CONFIRM").count(), 1);
    assert_eq!(h.api.with(|s| s.finish_calls), 1);
    assert!(!h.store.snapshot().loading);
}

#[tokio::test]
async fn photo_with_server_coords_broadcasts_exactly_one_point() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.api.with(|s| s.photo_point = Some(photo_point(Some(37.5), Some(127.0), None)));

    let upload =
        PhotoUpload { file_name: "walk.jpg".to_owned(), bytes: vec![0xff, 0xd8], text: None };
    let point = h.store.upload_photo_and_broadcast(upload).await.expect("upload");
    assert_eq!(point.id, 900);

    let frames = h.sent_frames();
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        OutFrame::Point { lat, lng, text, photo_path, .. } => {
            assert_eq!((*lat, *lng), (37.5, 127.0));
            assert!(text.is_none());
            assert_eq!(photo_path.as_deref(), Some("/photos/900.jpg"));
        }
        other => panic!("expected POINT, got {other:?}"),
    }
}

#[tokio::test]
async fn photo_without_any_coords_skips_the_broadcast_but_returns_the_point() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.api.with(|s| s.photo_point = Some(photo_point(None, None, Some("us"))));

    let upload =
        PhotoUpload { file_name: "walk.jpg".to_owned(), bytes: vec![0xff, 0xd8], text: None };
    let point = h.store.upload_photo_and_broadcast(upload).await.expect("upload");

    assert_eq!(point.text.as_deref(), Some("us"));
    assert!(h.sent_frames().is_empty());
}

#[tokio::test]
async fn photo_falls_back_to_the_callers_last_known_position() {
    let mut h = Harness::new();
    h.store.create_and_start().await.expect("create");
    h.api.with(|s| s.photo_point = Some(photo_point(None, None, None)));
    h.store.pos_tx.send(Some(HERE)).expect("watch receiver alive");

    let upload =
        PhotoUpload { file_name: "walk.jpg".to_owned(), bytes: vec![0xff, 0xd8], text: None };
    h.store.upload_photo_and_broadcast(upload).await.expect("upload");

    let frames = h.sent_frames();
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        OutFrame::Point { lat, lng, .. } => assert_eq!((*lat, *lng), (HERE.lat, HERE.lng)),
        other => panic!("expected POINT, got {other:?}"),
    }
}
