use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;
use serde_json::Value;

use crate::{
    api::home_assistant::{Api, ClientConfig},
    prelude::*,
    tools::{
        AvailableEntitiesRequest,
        EntityHistoryRequest,
        EntityStatisticsRequest,
        LogbookRequest,
        Tools,
    },
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the state history of a single entity.
    #[clap(name = "history")]
    History(Box<ToolArgs<EntityHistoryRequest>>),

    /// Print the long-term statistics of a single entity.
    #[clap(name = "statistics")]
    Statistics(Box<ToolArgs<EntityStatisticsRequest>>),

    /// Print the current entities, optionally filtered.
    #[clap(name = "entities")]
    Entities(Box<ToolArgs<AvailableEntitiesRequest>>),

    /// Print the logbook entries.
    #[clap(name = "logbook")]
    Logbook(Box<ToolArgs<LogbookRequest>>),

    /// Call a tool by its name with JSON arguments, and print the JSON envelope.
    #[clap(name = "call")]
    Call(Box<CallArgs>),

    /// Print the tool descriptors.
    #[clap(name = "tools")]
    Tools,

    /// Test the connection and the access token.
    #[clap(name = "check")]
    Check(Box<HomeAssistantArgs>),
}

#[derive(Parser)]
pub struct ToolArgs<R: clap::Args> {
    #[clap(flatten)]
    pub home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    pub request: R,
}

#[derive(Parser)]
pub struct CallArgs {
    #[clap(flatten)]
    pub home_assistant: HomeAssistantArgs,

    /// Tool name, for example: `get_entity_history`.
    pub tool: String,

    /// Tool arguments as a JSON object.
    #[clap(default_value = "{}", value_parser = parse_json_object)]
    pub arguments: Value,
}

fn parse_json_object(input: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(input).context("the arguments are not valid JSON")?;
    ensure!(value.is_object(), "the arguments must be a JSON object");
    Ok(value)
}

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// Home Assistant base URL. For example: `http://localhost:8123`.
    #[clap(long = "home-assistant-url", env = "HA_URL")]
    pub base_url: Url,

    /// Home Assistant long-lived access token.
    #[clap(long = "home-assistant-token", env = "HA_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// Timeout of a single upstream request.
    #[clap(long = "request-timeout-secs", default_value = "30", env = "REQUEST_TIMEOUT")]
    pub request_timeout_secs: u64,
}

impl HomeAssistantArgs {
    pub fn try_new_api(self) -> Result<Api> {
        Api::try_new(
            ClientConfig::builder()
                .base_url(self.base_url)
                .access_token(self.access_token)
                .timeout(Duration::from_secs(self.request_timeout_secs))
                .build(),
        )
    }

    pub fn try_new_tools(self) -> Result<Tools> {
        Ok(Tools::new(self.try_new_api()?))
    }
}
