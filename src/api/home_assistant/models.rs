use serde::Deserialize;
use serde_json::Value;

/// Upstream payloads are passed through as is: only counted, filtered and projected.
pub type HistoryPoint = Value;
pub type StatisticPoint = Value;
pub type LogbookEntry = Value;
pub type StateRecord = Value;

/// Response of `/api/history/period`: one list of state changes per requested entity.
#[must_use]
#[derive(Deserialize, derive_more::IntoIterator)]
pub struct EntitiesHistory(pub Vec<Vec<HistoryPoint>>);

impl EntitiesHistory {
    /// History of the first (and, when filtered, the only) entity.
    pub fn into_first(self) -> Vec<HistoryPoint> {
        self.into_iter().next().unwrap_or_default()
    }
}

/// Response of the API root.
#[must_use]
#[derive(Deserialize)]
pub struct ApiStatus {
    pub message: String,
}
