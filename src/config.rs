use anyhow::{Context, Result};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Number of chunks the query engine retrieves per query
pub const SIMILARITY_TOP_K: usize = 3;

/// Subdirectory of the storage root holding the persisted index
pub const INDEX_DIR_NAME: &str = "index";

/// Load credentials into the process environment.
///
/// Reads `.env` if present, then exports an explicitly supplied key as
/// `OPENAI_API_KEY`. Must run before any client is constructed. Returns
/// whether a `.env` file was found.
pub fn load_credentials(api_key: Option<&str>) -> bool {
    let loaded = dotenv().is_ok();
    if let Some(key) = api_key {
        env::set_var("OPENAI_API_KEY", key);
    }
    loaded
}

/// Configuration for the OpenAI API
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub assistant_model: String,
    pub completion_model: String,
    pub embedding_model: String,
}

impl OpenAiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;

        Ok(OpenAiConfig {
            api_key,
            base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            assistant_model: env_or("OPENAI_ASSISTANT_MODEL", DEFAULT_ASSISTANT_MODEL),
            completion_model: env_or("OPENAI_COMPLETION_MODEL", DEFAULT_COMPLETION_MODEL),
            embedding_model: env_or("OPENAI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Settings for a newly created assistant
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// Delay between run status checks while the assistant works
    pub poll_interval: Duration,
}

impl AgentSettings {
    /// Settings used by the web UI
    pub fn document_answer(model: impl Into<String>) -> Self {
        AgentSettings {
            name: "Document Answer".to_string(),
            instructions: "You are a QA assistant designed to retrieve relevant information from documents and give straightforward, precise answers. If you do not know the answer based on the context do not give a false answer.".to_string(),
            model: model.into(),
            poll_interval: Duration::from_secs_f64(1.0),
        }
    }

    /// Settings used by the one-shot `ask` command
    pub fn one_shot(model: impl Into<String>) -> Self {
        AgentSettings {
            instructions: "You are a QA assistant designed to retrieve relevant information from documents and give straightforward, precise answers.".to_string(),
            ..Self::document_answer(model)
        }
    }
}

/// Where uploads and the persisted index live
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub storage_dir: PathBuf,
}

impl StorageSettings {
    pub fn index_dir(&self) -> PathBuf {
        self.storage_dir.join(INDEX_DIR_NAME)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            upload_dir: PathBuf::from("."),
            storage_dir: PathBuf::from("./storage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_dir_is_under_storage_root() {
        let settings = StorageSettings {
            upload_dir: PathBuf::from("uploads"),
            storage_dir: PathBuf::from("/tmp/storage"),
        };
        assert_eq!(settings.index_dir(), PathBuf::from("/tmp/storage/index"));
    }

    #[test]
    fn test_agent_settings() {
        let ui = AgentSettings::document_answer("gpt-test");
        assert_eq!(ui.name, "Document Answer");
        assert_eq!(ui.poll_interval, Duration::from_secs(1));
        assert!(ui.instructions.contains("do not give a false answer"));

        let one_shot = AgentSettings::one_shot("gpt-test");
        assert_eq!(one_shot.model, "gpt-test");
        assert!(!one_shot.instructions.contains("false answer"));
    }
}
