use anyhow::{Context, Result};
use std::path::PathBuf;

/// File accumulating chat records pending evaluation, relative to home
pub const QUEUE_FILE_NAME: &str = "chat_eval_data.jsonl";
/// File the evaluation run writes its full result object to, relative to home
pub const RESULTS_FILE_NAME: &str = "myevalresults.json";

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

/// Service configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted project endpoint
    pub connection_string: String,
    /// API key for the chat-completion endpoint
    pub api_key: String,
    /// Chat model deployment name
    pub chat_model: String,
    /// Judge model deployment name used for evaluation
    pub evaluation_model: String,
    /// Name of the evaluator connection, resolved to `<NAME>_ENDPOINT` /
    /// `<NAME>_API_KEY` at evaluation time
    pub eval_connection_name: String,
    /// Temperature for response generation (0.0 to 1.0)
    pub temperature: f64,
    /// Maximum tokens for response generation
    pub max_tokens: u32,
    /// Queue file accumulating records pending evaluation
    pub queue_path: PathBuf,
    /// Output file for evaluation results
    pub results_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |name: &str| {
            lookup(name).with_context(|| format!("Environment variable {} not found", name))
        };

        let home = PathBuf::from(require("HOME")?);

        let temperature = match lookup("CHAT_TEMPERATURE") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid CHAT_TEMPERATURE value: {}", raw))?,
            None => default_temperature(),
        };
        let max_tokens = match lookup("CHAT_MAX_TOKENS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid CHAT_MAX_TOKENS value: {}", raw))?,
            None => default_max_tokens(),
        };

        Ok(Self {
            connection_string: require("PROJECT_CONNECTION_STRING")?,
            api_key: require("PROJECT_API_KEY")?,
            chat_model: require("CHAT_MODEL")?,
            evaluation_model: require("EVALUATION_MODEL")?,
            eval_connection_name: require("EVAL_CONNECTION_NAME")?,
            temperature,
            max_tokens,
            queue_path: home.join(QUEUE_FILE_NAME),
            results_path: home.join(RESULTS_FILE_NAME),
        })
    }
}
