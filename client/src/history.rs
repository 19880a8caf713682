//! Story/history side: couple-wide history fetches and path statistics.
//!
//! The history endpoints are read-only and the server stays the source of
//! truth; this store only caches responses and exposes loading flags plus
//! an error-message slot for the presentation layer to render.

use std::sync::Arc;

use crate::api::HistoryApi;
use crate::error::ClientError;
use crate::types::{CoupleHistoryResponse, HistoryPoint, HistorySummary, LatLng};

// =============================================================================
// PATH STATISTICS
// =============================================================================

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
#[must_use]
pub fn haversine_m(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Total length of a recorded path, in meters.
#[must_use]
pub fn path_distance_m(points: &[HistoryPoint]) -> f64 {
    points.windows(2).map(|pair| haversine_m(pair[0].coords(), pair[1].coords())).sum()
}

/// Elapsed minutes between the first and last point of a recorded path.
#[must_use]
pub fn path_minutes(points: &[HistoryPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => {
            (last.created_at - first.created_at).as_seconds_f64() / 60.0
        }
        _ => 0.0,
    }
}

/// Aggregates for the story dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DashboardStats {
    pub total_minutes: f64,
    pub total_distance_m: f64,
    pub avg_minutes: f64,
    pub avg_distance_m: f64,
    /// Shortest travel time of any finished encounter, if there is one.
    pub fastest_minutes: Option<f64>,
}

/// Fold encounter summaries into dashboard aggregates.
#[must_use]
pub fn summarize(rows: &[HistorySummary]) -> DashboardStats {
    if rows.is_empty() {
        return DashboardStats::default();
    }
    let total_minutes: f64 = rows.iter().map(|r| r.travel_minutes).sum();
    let total_distance_m: f64 = rows.iter().map(|r| r.distance).sum();
    #[allow(clippy::cast_precision_loss)]
    let count = rows.len() as f64;
    let fastest_minutes = rows.iter().map(|r| r.travel_minutes).fold(None, |best, m| match best {
        Some(b) if b <= m => Some(b),
        _ => Some(m),
    });
    DashboardStats {
        total_minutes,
        total_distance_m,
        avg_minutes: total_minutes / count,
        avg_distance_m: total_distance_m / count,
        fastest_minutes,
    }
}

// =============================================================================
// HISTORY STORE
// =============================================================================

/// Cached story/history state with per-fetch loading flags.
pub struct HistoryStore {
    api: Arc<dyn HistoryApi>,
    couple: Option<CoupleHistoryResponse>,
    session: Option<CoupleHistoryResponse>,
    list: Vec<HistorySummary>,
    loading: bool,
    error: Option<String>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(api: Arc<dyn HistoryApi>) -> Self {
        Self { api, couple: None, session: None, list: Vec::new(), loading: false, error: None }
    }

    /// `GET /history` — both partners' full recorded paths.
    ///
    /// # Errors
    ///
    /// Propagates the REST failure after recording it in the error slot.
    pub async fn fetch_couple_history(&mut self) -> Result<&CoupleHistoryResponse, ClientError> {
        self.begin();
        match self.api.couple_history().await {
            Ok(response) => {
                self.loading = false;
                Ok(self.couple.insert(response))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `GET /history/{sessionId}` — one encounter's recorded paths.
    ///
    /// # Errors
    ///
    /// Propagates the REST failure after recording it in the error slot.
    pub async fn fetch_session_history(
        &mut self,
        session_id: i64,
    ) -> Result<&CoupleHistoryResponse, ClientError> {
        self.begin();
        match self.api.session_couple_history(session_id).await {
            Ok(response) => {
                self.loading = false;
                Ok(self.session.insert(response))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `GET /history/list` — finished encounter summaries.
    ///
    /// # Errors
    ///
    /// Propagates the REST failure after recording it in the error slot.
    pub async fn fetch_list(&mut self) -> Result<&[HistorySummary], ClientError> {
        self.begin();
        match self.api.history_list().await {
            Ok(response) => {
                self.list = response.history_list;
                self.loading = false;
                Ok(&self.list)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Dashboard aggregates over the cached summary list.
    #[must_use]
    pub fn dashboard(&self) -> DashboardStats {
        summarize(&self.list)
    }

    #[must_use]
    pub fn couple_history(&self) -> Option<&CoupleHistoryResponse> {
        self.couple.as_ref()
    }

    #[must_use]
    pub fn session_history(&self) -> Option<&CoupleHistoryResponse> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn list(&self) -> &[HistorySummary] {
        &self.list
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear(&mut self) {
        self.couple = None;
        self.session = None;
        self.list.clear();
        self.error = None;
    }

    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn fail(&mut self, e: ClientError) -> ClientError {
        self.loading = false;
        self.error = Some(e.to_string());
        e
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
