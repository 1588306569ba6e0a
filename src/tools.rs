//! Read-only query tools over the Home Assistant API.
//!
//! Every tool validates its arguments, performs exactly one upstream call and reshapes the
//! response into a fixed envelope. Any failure is flattened into [`ToolError::OperationFailed`].

mod entities;
mod history;
mod logbook;
mod statistics;

use std::{fmt::Display, str::FromStr};

use chrono::TimeDelta;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

pub use self::{
    entities::{AvailableEntitiesRequest, EntitySummary},
    history::EntityHistoryRequest,
    logbook::LogbookRequest,
    statistics::EntityStatisticsRequest,
};
use crate::{
    api::home_assistant::{self, Api},
    prelude::*,
    time::{InvalidTimeFormat, Timestamp, normalize_time},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub enum Tool {
    #[display("get_entity_history")]
    GetEntityHistory,

    #[display("get_entity_statistics")]
    GetEntityStatistics,

    #[display("get_available_entities")]
    GetAvailableEntities,

    #[display("get_logbook_entries")]
    GetLogbookEntries,
}

impl Tool {
    pub const ALL: [Self; 4] = [
        Self::GetEntityHistory,
        Self::GetEntityStatistics,
        Self::GetAvailableEntities,
        Self::GetLogbookEntries,
    ];

    /// Describe all the tools for advertising them to a tool-invocation runtime.
    pub fn descriptors() -> Vec<ToolDescriptor> {
        Self::ALL
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.to_string(),
                description: tool.description(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    const fn action(self) -> &'static str {
        match self {
            Self::GetEntityHistory => "get entity history",
            Self::GetEntityStatistics => "get entity statistics",
            Self::GetAvailableEntities => "get available entities",
            Self::GetLogbookEntries => "get logbook entries",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::GetEntityHistory => "Get historical data for a specific Home Assistant entity.",
            Self::GetEntityStatistics => {
                "Get long-term statistics for a Home Assistant entity."
            }
            Self::GetAvailableEntities => "Get list of available entities that have historical data.",
            Self::GetLogbookEntries => {
                "Get Home Assistant logbook entries (events and state changes)."
            }
        }
    }

    fn input_schema(self) -> Value {
        match self {
            Self::GetEntityHistory => history::input_schema(),
            Self::GetEntityStatistics => statistics::input_schema(),
            Self::GetAvailableEntities => entities::input_schema(),
            Self::GetLogbookEntries => logbook::input_schema(),
        }
    }

    /// Wrap any lower-level failure into the uniform outward error.
    fn fail(self, cause: impl Display) -> ToolError {
        let message = format!("Failed to {}: {cause}", self.action());
        error!("{message}");
        ToolError::OperationFailed { tool: self, message }
    }

    /// Missing arguments take their defaults, `null` means no arguments at all.
    fn parse_arguments<A: DeserializeOwned>(self, arguments: Value) -> Result<A, ToolError> {
        let arguments =
            if arguments.is_null() { Value::Object(serde_json::Map::new()) } else { arguments };
        serde_json::from_value(arguments)
            .map_err(|error| self.fail(format!("invalid arguments: {error}")))
    }

    fn envelope<R: Serialize>(self, response: &R) -> Result<Value, ToolError> {
        serde_json::to_value(response).map_err(|error| self.fail(error))
    }
}

impl FromStr for Tool {
    type Err = ToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.to_string() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_owned()))
    }
}

#[must_use]
#[derive(Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The only error shape the callers of the tools ever see.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{message}")]
    OperationFailed { tool: Tool, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Lower-level failure of a tool, before it gets flattened.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidArgument(String),

    /// Also an invalid argument, kept separately to preserve the offending input.
    #[error(transparent)]
    InvalidTimeFormat(#[from] InvalidTimeFormat),

    #[error(transparent)]
    Upstream(#[from] home_assistant::Error),
}

pub struct Tools {
    api: Api,
}

impl Tools {
    pub const fn new(api: Api) -> Self {
        Self { api }
    }

    /// Call the tool by its name with a JSON object of arguments.
    #[instrument(skip_all, fields(tool = name))]
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = name.parse::<Tool>()?;
        info!("calling…");
        match tool {
            Tool::GetEntityHistory => {
                tool.envelope(&self.get_entity_history(tool.parse_arguments(arguments)?).await?)
            }
            Tool::GetEntityStatistics => tool
                .envelope(&self.get_entity_statistics(tool.parse_arguments(arguments)?).await?),
            Tool::GetAvailableEntities => tool
                .envelope(&self.get_available_entities(tool.parse_arguments(arguments)?).await?),
            Tool::GetLogbookEntries => {
                tool.envelope(&self.get_logbook_entries(tool.parse_arguments(arguments)?).await?)
            }
        }
    }
}

const ENTITY_ID_FORMAT: &str = "entity_id must be in format 'domain.entity_name'";

fn ensure_entity_id(entity_id: &str) -> Result<(), QueryError> {
    if entity_id.contains('.') {
        Ok(())
    } else {
        Err(QueryError::InvalidArgument(ENTITY_ID_FORMAT.to_owned()))
    }
}

/// Empty strings mean «not specified».
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

fn hours_ago(hours: i64) -> Result<Timestamp, QueryError> {
    TimeDelta::try_hours(hours)
        .and_then(Timestamp::ago)
        .ok_or_else(|| QueryError::InvalidArgument(format!("hours_back is out of range: {hours}")))
}

fn days_ago(days: i64) -> Result<Timestamp, QueryError> {
    TimeDelta::try_days(days)
        .and_then(Timestamp::ago)
        .ok_or_else(|| QueryError::InvalidArgument(format!("days_back is out of range: {days}")))
}

/// Normalized query window.
///
/// An absent end means an unbounded upstream query.
struct Window {
    start: String,
    end: Option<String>,
}

impl Window {
    /// Explicit times override the relative default, which is only evaluated when needed.
    fn resolve(
        start_time: Option<&str>,
        end_time: Option<&str>,
        default_start: impl FnOnce() -> Result<Timestamp, QueryError>,
    ) -> Result<Self, QueryError> {
        let start = match non_empty(start_time) {
            Some(start_time) => normalize_time(start_time)?,
            None => default_start()?,
        };
        let end = non_empty(end_time).map(normalize_time).transpose()?;
        Ok(Self { start: start.to_string(), end: end.map(|end| end.to_string()) })
    }

    /// Bounds for the envelope: the end is always populated.
    fn into_bounds(self) -> (String, String) {
        (self.start, self.end.unwrap_or_else(|| Timestamp::now().to_string()))
    }
}

#[cfg(test)]
fn mock_tools(server: &mockito::ServerGuard) -> Result<Tools> {
    Ok(Tools::new(home_assistant::testing::api(server)?))
}

#[cfg(test)]
mod tests {
    use mockito::Server;
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_names_round_trip() -> Result {
        for tool in Tool::ALL {
            assert_eq!(tool.to_string().parse::<Tool>()?, tool);
        }
        Ok(())
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let error = "get_everything".parse::<Tool>().unwrap_err();
        assert!(matches!(error, ToolError::UnknownTool(ref name) if name == "get_everything"));
    }

    #[test]
    fn descriptors_ok() {
        let descriptors = Tool::descriptors();
        let names: Vec<_> = descriptors.iter().map(|descriptor| descriptor.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "get_entity_history",
                "get_entity_statistics",
                "get_available_entities",
                "get_logbook_entries"
            ]
        );
        for descriptor in &descriptors {
            assert_eq!(descriptor.input_schema["type"], "object");
        }
        assert_eq!(descriptors[0].input_schema["required"], json!(["entity_id"]));
        assert_eq!(descriptors[1].input_schema["required"], json!(["entity_id"]));
    }

    #[test]
    fn entity_id_requires_dot() {
        assert!(ensure_entity_id("sensor.temperature").is_ok());
        assert!(ensure_entity_id("sensor.living_room.temperature").is_ok());
        assert!(ensure_entity_id(".").is_ok());
        assert!(matches!(ensure_entity_id("sensor"), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(ensure_entity_id(""), Err(QueryError::InvalidArgument(_))));
    }

    #[test]
    fn window_explicit_times_override_default() -> Result {
        let window = Window::resolve(Some("2024-01-15"), Some("2024-01-16T10:00:00Z"), || {
            panic!("the default must not be evaluated")
        })?;
        assert_eq!(window.start, "2024-01-15T00:00:00");
        assert_eq!(window.end.as_deref(), Some("2024-01-16T10:00:00+00:00"));
        Ok(())
    }

    #[test]
    fn window_empty_strings_are_absent() -> Result {
        let window = Window::resolve(Some(""), Some(""), || hours_ago(1))?;
        assert!(window.end.is_none());
        let (start, end) = window.into_bounds();
        assert!(start < end);
        Ok(())
    }

    #[test]
    fn window_invalid_time_is_rejected() {
        let result = Window::resolve(Some("yesterday"), None, || hours_ago(24));
        assert!(matches!(result, Err(QueryError::InvalidTimeFormat(_))));
        let result = Window::resolve(None, Some("tomorrow"), || hours_ago(24));
        assert!(matches!(result, Err(QueryError::InvalidTimeFormat(_))));
    }

    #[test]
    fn lookback_out_of_range_is_rejected() {
        assert!(matches!(hours_ago(i64::MAX), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(days_ago(i64::MAX), Err(QueryError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn call_dispatches_by_name() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states")
            .with_status(200)
            .with_body(json!([{"entity_id": "sensor.temp", "state": "21.5"}]).to_string())
            .create_async()
            .await;

        let envelope = mock_tools(&server)?.call("get_available_entities", Value::Null).await?;

        assert_eq!(envelope["total_entities"], 1);
        assert_eq!(envelope["entities"][0]["domain"], "sensor");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn call_invalid_arguments_is_operation_failure() -> Result {
        let server = Server::new_async().await;

        let error = mock_tools(&server)?
            .call("get_entity_history", json!({"hours_back": "a day"}))
            .await
            .unwrap_err();

        assert!(matches!(error, ToolError::OperationFailed { tool: Tool::GetEntityHistory, .. }));
        assert!(error.to_string().starts_with("Failed to get entity history: invalid arguments: "));
        Ok(())
    }

    #[tokio::test]
    async fn call_unknown_tool_is_rejected() -> Result {
        let server = Server::new_async().await;
        let error = mock_tools(&server)?.call("set_entity_state", json!({})).await.unwrap_err();
        assert_eq!(error.to_string(), "Unknown tool: set_entity_state");
        Ok(())
    }
}
