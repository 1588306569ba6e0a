#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod prelude;
mod tables;
mod time;
mod tools;

use std::io::stderr;

use clap::{Parser, crate_version};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    cli::{Args, Command, HomeAssistantArgs},
    prelude::*,
    tables::build_entities_table,
    tools::{EntitySummary, Tool},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(stderr).without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::History(args) => {
            let tools = args.home_assistant.try_new_tools()?;
            print_json(&tools.get_entity_history(args.request).await?)?;
        }
        Command::Statistics(args) => {
            let tools = args.home_assistant.try_new_tools()?;
            print_json(&tools.get_entity_statistics(args.request).await?)?;
        }
        Command::Entities(args) => {
            let tools = args.home_assistant.try_new_tools()?;
            print_json(&tools.get_available_entities(args.request).await?)?;
        }
        Command::Logbook(args) => {
            let tools = args.home_assistant.try_new_tools()?;
            print_json(&tools.get_logbook_entries(args.request).await?)?;
        }
        Command::Call(args) => {
            let tools = args.home_assistant.try_new_tools()?;
            print_json(&tools.call(&args.tool, args.arguments).await?)?;
        }
        Command::Tools => {
            print_json(&Tool::descriptors())?;
        }
        Command::Check(args) => {
            check(*args).await?;
        }
    }

    info!("done!");
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result {
    println!("{}", serde_json::to_string_pretty(value).context("failed to serialize the output")?);
    Ok(())
}

/// Number of entities shown by the connectivity check.
const N_SAMPLE_ENTITIES: usize = 5;

async fn check(args: HomeAssistantArgs) -> Result {
    let api = args.try_new_api()?;
    let status = api.check().await.context("the API is not reachable")?;
    info!(upstream = %status.message, "connected");
    let states = api.get_states().await.context("failed to fetch the states")?;
    info!(n_entities = states.len(), "fetched the states");
    let entities = states.iter().take(N_SAMPLE_ENTITIES).map(EntitySummary::from).collect_vec();
    println!("{}", build_entities_table(&entities));
    Ok(())
}
