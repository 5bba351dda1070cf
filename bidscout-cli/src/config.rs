//! Command-line arguments and environment handling.

use clap::Parser;
use std::path::PathBuf;

/// Bidscout - procurement signal discovery
#[derive(Parser, Debug, Clone)]
#[command(name = "bidscout")]
#[command(about = "Discover and validate procurement signals for tracked entities")]
pub struct Args {
    /// Engine configuration (YAML); defaults apply when omitted
    #[arg(long, env = "BIDSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Entities to discover (YAML list of id, name, cluster, priority_tier)
    #[arg(long, env = "BIDSCOUT_ENTITIES")]
    pub entities: PathBuf,

    /// Search provider endpoint
    #[arg(long, env = "SEARCH_URL")]
    pub search_url: String,

    /// Search provider API key
    #[arg(long, env = "SEARCH_API_KEY")]
    pub search_api_key: Option<String>,

    /// OpenAI-compatible LLM endpoint
    #[arg(long, env = "LLM_BASE_URL", default_value = "http://localhost:11434/v1")]
    pub llm_base_url: String,

    /// Model used for evaluation and re-validation
    #[arg(long, env = "LLM_MODEL", default_value = "llama3.1")]
    pub llm_model: String,

    /// LLM API key
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Episode log written by the JSONL knowledge sink
    #[arg(long, env = "BIDSCOUT_EPISODES", default_value = "episodes.jsonl")]
    pub episodes: PathBuf,

    /// Write the discovery report here instead of stdout
    #[arg(long, env = "BIDSCOUT_REPORT")]
    pub report: Option<PathBuf>,

    /// Override pool.max_workers from the config file
    #[arg(long, env = "BIDSCOUT_WORKERS")]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Validate arguments that clap cannot check on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.search_url.trim().is_empty() {
            return Err("SEARCH_URL must not be empty".to_string());
        }
        if !self.search_url.starts_with("http://") && !self.search_url.starts_with("https://") {
            return Err(format!("SEARCH_URL must be an http(s) URL, got {}", self.search_url));
        }
        if self.workers == Some(0) {
            return Err("BIDSCOUT_WORKERS must be positive".to_string());
        }
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(format!("Unknown log level {}", self.log_level));
        }
        Ok(())
    }
}
