use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where interview questions are retrieved from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrievalSource {
    /// An external similarity-search service.
    Http(String),
    /// A JSON question bank searched in-process.
    QuestionBank(PathBuf),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub guided_model: String,
    pub direct_model: String,
    pub graph_path: PathBuf,
    pub prompts_path: PathBuf,
    pub retrieval: RetrievalSource,
    pub stt_url: Option<String>,
    pub tts_url: Option<String>,
    pub keyword_threshold: usize,
    pub session_capacity: usize,
    pub session_idle: Duration,
    pub call_timeout: Duration,
    pub memory_window: usize,
    pub question_prefix: String,
    pub answer_marker: String,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn at_least(name: &str, value: usize, min: usize) -> Result<usize, ConfigError> {
    if value < min {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("must be at least {}", min),
        ));
    }
    Ok(value)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let retrieval = match optional_var("RETRIEVAL_URL") {
            Some(url) => RetrievalSource::Http(url),
            None => RetrievalSource::QuestionBank(PathBuf::from(var_or(
                "QUESTION_BANK_PATH",
                "./data/question_bank.json",
            ))),
        };

        // One outline entry would end the interview before its first question.
        let keyword_threshold =
            at_least("KEYWORD_THRESHOLD", parse_var("KEYWORD_THRESHOLD", 2)?, 2)?;
        let session_capacity =
            at_least("SESSION_CAPACITY", parse_var("SESSION_CAPACITY", 1024)?, 1)?;
        let session_idle = Duration::from_secs(parse_var("SESSION_IDLE_SECS", 3600)?);
        let call_timeout = Duration::from_secs(
            at_least("CALL_TIMEOUT_SECS", parse_var("CALL_TIMEOUT_SECS", 60)?, 1)? as u64,
        );
        let memory_window = parse_var("MEMORY_WINDOW", 100)?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            llm_base_url: var_or("LLM_BASE_URL", "http://localhost:11434/v1"),
            llm_api_key: optional_var("LLM_API_KEY"),
            guided_model: var_or("GUIDED_MODEL", "qwen3:8b"),
            direct_model: var_or("DIRECT_MODEL", "interviewer-qwen3"),
            graph_path: PathBuf::from(var_or("GRAPH_PATH", "./data/knowledge_graph.json")),
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "./prompts")),
            retrieval,
            stt_url: optional_var("STT_URL"),
            tts_url: optional_var("TTS_URL"),
            keyword_threshold,
            session_capacity,
            session_idle,
            call_timeout,
            memory_window,
            question_prefix: var_or("QUESTION_PREFIX", "Interview question:"),
            answer_marker: var_or("ANSWER_MARKER", "Reference answer:"),
            log_level,
        })
    }
}
