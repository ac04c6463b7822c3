use clap::Parser;

/// Silo compute endpoint - serves execution requests and the Host Task API
#[derive(Parser, Debug, Clone)]
#[command(name = "silo-endpoint")]
#[command(author, version, about, long_about = None)]
pub struct EndpointConfig {
    /// Address to listen on
    #[arg(long, env = "SILO_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Key callers must send in the x-api-key header
    #[arg(long, env = "SILO_API_KEY")]
    pub api_key: Option<String>,

    /// Base URL of the blob service; without it packages are kept in memory
    #[arg(long, env = "SILO_STORE_URL")]
    pub store_url: Option<String>,
}
