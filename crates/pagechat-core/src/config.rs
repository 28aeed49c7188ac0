use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PageChatError, Result};

const DATABASE_FILE: &str = "pagechat.db";

/// Top-level configuration for the pagechat service.
///
/// Loaded from a TOML file; every section falls back to its defaults when
/// absent. Credentials may also come from the environment, see
/// [`PageChatConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl PageChatConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PageChatConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.memory.max_history_length == 0 {
            return Err(PageChatError::Config(
                "memory.max_history_length must be at least 1".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(PageChatError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.upload.max_file_size == 0 {
            return Err(PageChatError::Config(
                "upload.max_file_size must be positive".to_string(),
            ));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(PageChatError::Config(
                "upload.allowed_extensions must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PageChatError::Config(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(PageChatError::Config(
                "llm.max_tokens must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("retrieval.request_timeout_secs", self.retrieval.request_timeout_secs),
            ("retrieval.poll_interval_ms", self.retrieval.poll_interval_ms),
            ("retrieval.index_timeout_secs", self.retrieval.index_timeout_secs),
        ] {
            if value == 0 {
                return Err(PageChatError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// SQLite database location: `memory.database_path` if set, otherwise
    /// `pagechat.db` inside `general.data_dir`.
    pub fn database_path(&self) -> PathBuf {
        if self.memory.database_path.is_empty() {
            Path::new(&self.general.data_dir).join(DATABASE_FILE)
        } else {
            PathBuf::from(&self.memory.database_path)
        }
    }

    /// Fill credentials and endpoints from the process environment.
    ///
    /// Recognised variables: `URL_CUSTOM_LLM`, `TOKEN_CUSTOM_LLM`,
    /// `PAGEINDEX_API_KEY`, `PAGEINDEX_URL`. Non-empty values win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("URL_CUSTOM_LLM") {
            self.llm.endpoint = v;
        }
        if let Some(v) = get("TOKEN_CUSTOM_LLM") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("PAGEINDEX_API_KEY") {
            self.retrieval.api_key = v;
        }
        if let Some(v) = get("PAGEINDEX_URL") {
            self.retrieval.endpoint = v;
        }
    }

    /// Log which external credentials are configured, never their values.
    pub fn log_credential_status(&self) {
        if self.llm.endpoint.is_empty() {
            warn!("LLM endpoint not configured (set llm.endpoint or URL_CUSTOM_LLM)");
        } else {
            info!("LLM endpoint configured");
        }
        if self.llm.api_key.is_empty() {
            warn!("LLM token not configured (set llm.api_key or TOKEN_CUSTOM_LLM)");
        } else {
            info!("LLM token loaded");
        }
        if self.retrieval.api_key.is_empty() {
            warn!("Retrieval API key not configured (set retrieval.api_key or PAGEINDEX_API_KEY)");
        } else {
            info!("Retrieval API key loaded");
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display name used in the welcome message.
    pub app_name: String,
    /// Directory holding the SQLite database unless `memory.database_path`
    /// names one explicitly.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "PageIndex RAG Chatbot".to_string(),
            data_dir: "./data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Upload boundary constraints and raw PDF storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory where raw PDF bytes are stored.
    pub storage_path: String,
    /// Maximum accepted upload size in bytes.
    pub max_file_size: usize,
    /// Accepted filename extensions, lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            storage_path: "./uploaded_pdfs".to_string(),
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of most recent turns included in the prompt.
    pub max_history_length: usize,
    /// SQLite database holding documents and conversation history. Empty
    /// means `<general.data_dir>/pagechat.db`.
    pub database_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_length: 10,
            database_path: String::new(),
        }
    }
}

/// Language model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions URL of the model service.
    pub endpoint: String,
    /// Sent as the `x-api-key` header.
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: "telkom-ai-instruct".to_string(),
            temperature: 0.0,
            max_tokens: 3000,
            timeout_secs: 120,
        }
    }
}

/// Document retrieval service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Maximum number of context snippets per query.
    pub top_k: usize,
    /// Upper bound on a single query, including result polling.
    pub request_timeout_secs: u64,
    /// Delay between readiness checks while indexing or querying.
    pub poll_interval_ms: u64,
    /// Upper bound on indexing one document.
    pub index_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pageindex.ai".to_string(),
            api_key: String::new(),
            top_k: 5,
            request_timeout_secs: 60,
            poll_interval_ms: 2000,
            index_timeout_secs: 900,
        }
    }
}

/// Chat turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Extra attempts after a transient generation failure.
    pub generation_retries: u32,
    /// Static framing placed at the top of every prompt.
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            generation_retries: 1,
            system_prompt: "You are a helpful assistant answering questions about an uploaded \
                            document. Answer based only on the provided context. If the context \
                            does not contain the answer, say so."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_service_defaults() {
        let config = PageChatConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.upload.allowed_extensions, vec!["pdf".to_string()]);
        assert_eq!(config.memory.max_history_length, 10);
        assert_eq!(config.llm.max_tokens, 3000);
        assert_eq!(config.llm.temperature, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config: PageChatConfig = toml::from_str(
            r#"
            [server]
            port = 9100

            [retrieval]
            top_k = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.poll_interval_ms, 2000);
        assert_eq!(config.memory.max_history_length, 10);
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = PageChatConfig::default();
        config.memory.max_history_length = 0;
        assert!(matches!(config.validate(), Err(PageChatError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = PageChatConfig::default();
        config.llm.temperature = 3.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = PageChatConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = PageChatConfig::default();
        config.retrieval.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retrieval.poll_interval_ms"));

        let mut config = PageChatConfig::default();
        config.retrieval.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = PageChatConfig::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_follows_data_dir() {
        let mut config = PageChatConfig::default();
        assert_eq!(config.database_path(), Path::new("./data").join("pagechat.db"));

        config.general.data_dir = "/srv/pagechat".to_string();
        assert_eq!(config.database_path(), Path::new("/srv/pagechat/pagechat.db"));

        config.memory.database_path = "/var/lib/chat.db".to_string();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/chat.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagechat.toml");
        std::fs::write(&path, "[llm]\nmodel = \"local-model\"\nmax_tokens = 512\n").unwrap();

        let config = PageChatConfig::load(&path).unwrap();
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.max_tokens, 512);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagechat.toml");
        std::fs::write(&path, "[memory]\nmax_history_length = 0\n").unwrap();
        assert!(PageChatConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PageChatConfig::load_or_default(Path::new("/nonexistent/pagechat.toml"));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("URL_CUSTOM_LLM", "https://llm.example/v1/chat/completions"),
            ("TOKEN_CUSTOM_LLM", "llm-token"),
            ("PAGEINDEX_API_KEY", "pi-key"),
            ("PAGEINDEX_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = PageChatConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.endpoint, "https://llm.example/v1/chat/completions");
        assert_eq!(config.llm.api_key, "llm-token");
        assert_eq!(config.retrieval.api_key, "pi-key");
        // Blank values do not clobber the file/default value.
        assert_eq!(config.retrieval.endpoint, "https://api.pageindex.ai");
    }
}
