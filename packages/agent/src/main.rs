use std::sync::Arc;

use clap::Parser;
use silo_agent::{builtin_registry, Agent, AgentConfig, AgentState, HttpTaskApi};
use silo_core::TaskId;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::parse();

    let state = match run(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!(task_id = %config.task_id, error = %e, "agent failed");
            AgentState::Failed
        }
    };
    std::process::exit(state.exit_code());
}

async fn run(config: &AgentConfig) -> silo_agent::Result<AgentState> {
    let api = HttpTaskApi::new(&config.host_link, config.timeout())?;
    let agent = Agent::new(
        TaskId::from(config.task_id.as_str()),
        Arc::new(api),
        builtin_registry(),
    );
    Ok(agent.run().await?.state)
}
