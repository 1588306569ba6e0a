use clap::Args;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    api::home_assistant::StateRecord,
    prelude::*,
    tools::{QueryError, Tool, ToolError, Tools, non_empty},
};

#[must_use]
#[derive(Args, Deserialize)]
pub struct AvailableEntitiesRequest {
    /// Only entities of this domain, for example: `sensor`.
    #[clap(long)]
    #[serde(default)]
    pub domain_filter: Option<String>,

    /// Case-insensitive search in the entity IDs and friendly names.
    #[clap(long)]
    #[serde(default)]
    pub search_term: Option<String>,

    /// Maximum number of entities to return.
    #[clap(long, default_value_t = 100)]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    100
}

#[must_use]
#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub friendly_name: String,
    pub domain: String,
    pub state: String,
    pub unit_of_measurement: String,
}

impl From<&StateRecord> for EntitySummary {
    fn from(record: &StateRecord) -> Self {
        let entity_id = record.get("entity_id").and_then(Value::as_str).unwrap_or_default();
        let attribute = |name: &str| record.get("attributes")?.get(name)?.as_str();
        Self {
            entity_id: entity_id.to_owned(),
            friendly_name: attribute("friendly_name").unwrap_or(entity_id).to_owned(),
            domain: entity_id.split('.').next().unwrap_or_default().to_owned(),
            state: record.get("state").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
            unit_of_measurement: attribute("unit_of_measurement").unwrap_or_default().to_owned(),
        }
    }
}

/// Entity filter, applied in a single pass over the states.
struct Filter {
    /// `<domain>.`
    domain_prefix: Option<String>,

    /// Lower-cased search term.
    search_term: Option<String>,
}

impl Filter {
    fn new(domain: Option<&str>, search_term: Option<&str>) -> Self {
        Self {
            domain_prefix: non_empty(domain).map(|domain| format!("{domain}.")),
            search_term: non_empty(search_term).map(str::to_lowercase),
        }
    }

    /// The search term may match either the entity ID or the friendly name.
    fn matches(&self, entity: &EntitySummary) -> bool {
        if let Some(domain_prefix) = &self.domain_prefix
            && !entity.entity_id.starts_with(domain_prefix)
        {
            return false;
        }
        self.search_term.as_ref().is_none_or(|search_term| {
            entity.entity_id.to_lowercase().contains(search_term)
                || entity.friendly_name.to_lowercase().contains(search_term)
        })
    }
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct EntitiesListResponse {
    /// Number of the returned entities, that is after the limit is applied.
    pub total_entities: usize,

    pub entities: Vec<EntitySummary>,
}

impl Tools {
    #[instrument(
        skip_all,
        fields(domain_filter = ?request.domain_filter, search_term = ?request.search_term),
    )]
    pub async fn get_available_entities(
        &self,
        request: AvailableEntitiesRequest,
    ) -> Result<EntitiesListResponse, ToolError> {
        self.try_get_available_entities(request)
            .await
            .map_err(|error| Tool::GetAvailableEntities.fail(error))
    }

    async fn try_get_available_entities(
        &self,
        request: AvailableEntitiesRequest,
    ) -> Result<EntitiesListResponse, QueryError> {
        let filter = Filter::new(request.domain_filter.as_deref(), request.search_term.as_deref());
        let entities = self
            .api
            .get_states()
            .await?
            .iter()
            .map(EntitySummary::from)
            .filter(|entity| filter.matches(entity))
            .take(request.limit)
            .collect_vec();
        info!(n_entities = entities.len(), "filtered");
        Ok(EntitiesListResponse { total_entities: entities.len(), entities })
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "domain_filter": {
                "type": "string",
                "description": "Filter by entity domain (e.g., 'sensor', 'switch', 'light')",
            },
            "search_term": {
                "type": "string",
                "description": "Search entities by name or entity_id (case insensitive)",
            },
            "limit": {
                "type": "integer",
                "minimum": 0,
                "default": default_limit(),
                "description": "Maximum number of entities to return",
            },
        },
    })
}
