use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    api::home_assistant::LogbookEntry,
    prelude::*,
    tools::{QueryError, Tool, ToolError, Tools, Window, hours_ago, non_empty},
};

#[must_use]
#[derive(Args, Deserialize)]
pub struct LogbookRequest {
    /// Number of hours back from now, ignored when the start time is set.
    #[clap(long, default_value_t = 24, allow_negative_numbers = true)]
    #[serde(default = "default_hours_back")]
    pub hours_back: i64,

    /// Start time in `YYYY-MM-DD` or ISO format.
    #[clap(long)]
    #[serde(default)]
    pub start_time: Option<String>,

    /// End time in `YYYY-MM-DD` or ISO format.
    #[clap(long)]
    #[serde(default)]
    pub end_time: Option<String>,

    /// Only entries of this entity.
    #[clap(long)]
    #[serde(default)]
    pub entity_id: Option<String>,

    /// Maximum number of entries to return.
    #[clap(long, default_value_t = 50)]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_hours_back() -> i64 {
    24
}

const fn default_limit() -> usize {
    50
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct LogbookResponse {
    /// Number of the returned entries, that is after the limit is applied.
    pub entry_count: usize,

    pub start_time: String,
    pub end_time: String,
    pub entries: Vec<LogbookEntry>,
}

impl Tools {
    #[instrument(skip_all, fields(entity_id = ?request.entity_id))]
    pub async fn get_logbook_entries(
        &self,
        request: LogbookRequest,
    ) -> Result<LogbookResponse, ToolError> {
        self.try_get_logbook_entries(request)
            .await
            .map_err(|error| Tool::GetLogbookEntries.fail(error))
    }

    async fn try_get_logbook_entries(
        &self,
        request: LogbookRequest,
    ) -> Result<LogbookResponse, QueryError> {
        let window = Window::resolve(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            || hours_ago(request.hours_back),
        )?;
        let mut entries = self
            .api
            .get_logbook(
                Some(&window.start),
                window.end.as_deref(),
                non_empty(request.entity_id.as_deref()),
            )
            .await?;
        entries.truncate(request.limit);
        let (start_time, end_time) = window.into_bounds();
        Ok(LogbookResponse { entry_count: entries.len(), start_time, end_time, entries })
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hours_back": {
                "type": "integer",
                "default": default_hours_back(),
                "description": "Number of hours back from now, ignored if start_time provided",
            },
            "start_time": {
                "type": "string",
                "description": "Start time in YYYY-MM-DD or ISO format",
            },
            "end_time": {
                "type": "string",
                "description": "End time in YYYY-MM-DD or ISO format",
            },
            "entity_id": {
                "type": "string",
                "description": "Filter entries for specific entity",
            },
            "limit": {
                "type": "integer",
                "minimum": 0,
                "default": default_limit(),
                "description": "Maximum number of entries to return",
            },
        },
    })
}
