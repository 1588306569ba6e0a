use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    api::home_assistant::{self, StatisticPoint},
    prelude::*,
    tools::{QueryError, Tool, ToolError, Tools, Window, days_ago, ensure_entity_id},
};

/// Aggregation granularities accepted by the long-term statistics.
const PERIODS: [&str; 4] = ["hour", "day", "week", "month"];

#[must_use]
#[derive(Args, Deserialize)]
pub struct EntityStatisticsRequest {
    /// The entity ID, for example: `sensor.energy_usage`.
    #[clap(long)]
    pub entity_id: String,

    /// Number of days back from now, ignored when the start time is set.
    #[clap(long, default_value_t = 7, allow_negative_numbers = true)]
    #[serde(default = "default_days_back")]
    pub days_back: i64,

    /// Start time in `YYYY-MM-DD` or ISO format.
    #[clap(long)]
    #[serde(default)]
    pub start_time: Option<String>,

    /// End time in `YYYY-MM-DD` or ISO format.
    #[clap(long)]
    #[serde(default)]
    pub end_time: Option<String>,

    /// Statistics period: `hour`, `day`, `week` or `month`.
    #[clap(long, default_value = "hour")]
    #[serde(default = "default_period")]
    pub period: String,
}

const fn default_days_back() -> i64 {
    7
}

fn default_period() -> String {
    PERIODS[0].to_owned()
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct EntityStatisticsResponse {
    pub entity_id: String,
    pub period: String,
    pub start_time: String,
    pub end_time: String,
    pub statistics: Vec<StatisticPoint>,
}

impl Tools {
    #[instrument(skip_all, fields(entity_id = %request.entity_id, period = %request.period))]
    pub async fn get_entity_statistics(
        &self,
        request: EntityStatisticsRequest,
    ) -> Result<EntityStatisticsResponse, ToolError> {
        self.try_get_entity_statistics(request)
            .await
            .map_err(|error| Tool::GetEntityStatistics.fail(error))
    }

    async fn try_get_entity_statistics(
        &self,
        request: EntityStatisticsRequest,
    ) -> Result<EntityStatisticsResponse, QueryError> {
        ensure_entity_id(&request.entity_id)?;
        if !PERIODS.contains(&request.period.as_str()) {
            return Err(QueryError::InvalidArgument(format!(
                "period must be one of: {}",
                PERIODS.join(", ")
            )));
        }
        let window = Window::resolve(
            request.start_time.as_deref(),
            request.end_time.as_deref(),
            || days_ago(request.days_back),
        )?;
        let mut statistics = self
            .api
            .get_statistics(&request.entity_id, &window.start, window.end.as_deref(), &request.period)
            .await?;
        let statistics = match statistics.remove(&request.entity_id) {
            Some(Value::Array(points)) => points,
            None => Vec::new(),
            Some(other) => {
                return Err(QueryError::Upstream(home_assistant::Error::UnexpectedError(format!(
                    "statistics of `{}` are not a list: {other}",
                    request.entity_id
                ))));
            }
        };
        let (start_time, end_time) = window.into_bounds();
        Ok(EntityStatisticsResponse {
            statistics,
            entity_id: request.entity_id,
            period: request.period,
            start_time,
            end_time,
        })
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entity_id": {
                "type": "string",
                "description": "The Home Assistant entity ID (e.g., 'sensor.energy_usage')",
            },
            "days_back": {
                "type": "integer",
                "default": default_days_back(),
                "description": "Number of days back from now, ignored if start_time provided",
            },
            "start_time": {
                "type": "string",
                "description": "Start time in YYYY-MM-DD or ISO format",
            },
            "end_time": {
                "type": "string",
                "description": "End time in YYYY-MM-DD or ISO format",
            },
            "period": {
                "type": "string",
                "enum": PERIODS,
                "default": default_period(),
                "description": "Statistics period",
            },
        },
        "required": ["entity_id"],
    })
}
