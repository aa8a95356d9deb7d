use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chatgpt_api_key: String,
    pub chatgpt_timeout: Duration,
    pub questions_file: PathBuf,
    pub results_file: PathBuf,
    pub dialogue_db: String,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_err() {
            log::debug!("No .env file loaded");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chatgpt_api_key = lookup("CHATGPT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?;

        let chatgpt_timeout = match lookup("CHATGPT_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    name: "CHATGPT_TIMEOUT_SECS",
                    value,
                })?,
            None => Duration::from_secs(30),
        };

        Ok(Self {
            chatgpt_api_key,
            chatgpt_timeout,
            questions_file: lookup("QUIZ_QUESTIONS_FILE")
                .unwrap_or_else(|| "questions.json".to_string())
                .into(),
            results_file: lookup("QUIZ_RESULTS_FILE")
                .unwrap_or_else(|| "results.txt".to_string())
                .into(),
            dialogue_db: lookup("QUIZ_DIALOGUE_DB").unwrap_or_else(|| "db.sqlite".to_string()),
        })
    }
}
