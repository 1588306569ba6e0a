use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    api::home_assistant::HistoryPoint,
    prelude::*,
    tools::{QueryError, Tool, ToolError, Tools, Window, ensure_entity_id, hours_ago},
};

#[must_use]
#[derive(Args, Deserialize)]
pub struct EntityHistoryRequest {
    /// The entity ID, for example: `sensor.temperature`.
    #[clap(long)]
    pub entity_id: String,

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

    /// Ask for the reduced-field history representation.
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    #[serde(default = "default_minimal_response")]
    pub minimal_response: bool,
}

const fn default_hours_back() -> i64 {
    24
}

const fn default_minimal_response() -> bool {
    true
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct EntityHistoryResponse {
    pub entity_id: String,
    pub data_points: usize,
    pub start_time: String,
    pub end_time: String,
    pub history: Vec<HistoryPoint>,
}

impl Tools {
    #[instrument(skip_all, fields(entity_id = %request.entity_id))]
    pub async fn get_entity_history(
        &self,
        request: EntityHistoryRequest,
    ) -> Result<EntityHistoryResponse, ToolError> {
        self.try_get_entity_history(request)
            .await
            .map_err(|error| Tool::GetEntityHistory.fail(error))
    }

    async fn try_get_entity_history(
        &self,
        request: EntityHistoryRequest,
    ) -> Result<EntityHistoryResponse, QueryError> {
        ensure_entity_id(&request.entity_id)?;
        let window = Window::resolve(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            || hours_ago(request.hours_back),
        )?;
        let history = self
            .api
            .get_history(
                &request.entity_id,
                Some(&window.start),
                window.end.as_deref(),
                request.minimal_response,
            )
            .await?;
        let (start_time, end_time) = window.into_bounds();
        Ok(EntityHistoryResponse {
            entity_id: request.entity_id,
            data_points: history.len(),
            start_time,
            end_time,
            history,
        })
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entity_id": {
                "type": "string",
                "description": "The Home Assistant entity ID (e.g., 'sensor.temperature')",
            },
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
            "minimal_response": {
                "type": "boolean",
                "default": default_minimal_response(),
                "description": "Return minimal data for better performance",
            },
        },
        "required": ["entity_id"],
    })
}
