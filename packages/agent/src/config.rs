use std::time::Duration;

use clap::Parser;

/// Silo worker agent - runs one task and reports its result
#[derive(Parser, Debug, Clone)]
#[command(name = "silo-agent")]
#[command(author, version, about, long_about = None)]
pub struct AgentConfig {
    /// Base URL of the Host Task API
    #[arg(long, env = "HOST_LINK")]
    pub host_link: String,

    /// Identifier of the task to execute
    #[arg(long, env = "TASK_ID")]
    pub task_id: String,

    /// Timeout for each request to the host, in seconds
    #[arg(long, env = "SILO_AGENT_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let config = AgentConfig::try_parse_from([
            "silo-agent",
            "--host-link",
            "http://host:8080",
            "--task-id",
            "abc",
        ])
        .unwrap();
        assert_eq!(config.host_link, "http://host:8080");
        assert_eq!(config.task_id, "abc");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn custom_timeout() {
        let config = AgentConfig::try_parse_from([
            "silo-agent",
            "--host-link",
            "http://host",
            "--task-id",
            "abc",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
