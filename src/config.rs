use serde::Deserialize;
use std::time::Duration;

use crate::services::agent::{AgentError, ProviderConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub server_workers: usize,
    pub llm_provider: String,
    pub llm_model: Option<String>,
    pub llm_temperature: f32,
    pub llm_timeout_secs: u64,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub census_api_key: Option<String>,
    pub zipcode_api_url: String,
    pub geocoder_api_url: String,
    pub census_api_url: String,
    pub serper_api_url: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub agent_max_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            server_workers: 4,
            llm_provider: "gemini".to_string(),
            llm_model: None,
            llm_temperature: 0.0,
            llm_timeout_secs: 120,
            gemini_api_key: None,
            anthropic_api_key: None,
            openai_api_key: None,
            serper_api_key: None,
            census_api_key: None,
            zipcode_api_url: "https://api.zippopotam.us".to_string(),
            geocoder_api_url: "https://nominatim.openstreetmap.org".to_string(),
            census_api_url: "https://api.census.gov".to_string(),
            serper_api_url: "https://google.serper.dev".to_string(),
            http_timeout_secs: 15,
            http_max_retries: 2,
            agent_max_iterations: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server_host = host;
        }

        if let Ok(port) = std::env::var("SERVER_PORT") {
            if let Ok(port_val) = port.parse() {
                config.server_port = port_val;
            }
        }

        if let Ok(workers) = std::env::var("SERVER_WORKERS") {
            if let Ok(workers_val) = workers.parse() {
                config.server_workers = workers_val;
            }
        }

        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm_provider = provider.to_lowercase();
        }

        config.llm_model = non_empty_var("LLM_MODEL");

        if let Ok(temperature) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(temperature_val) = temperature.parse() {
                config.llm_temperature = temperature_val;
            }
        }

        if let Ok(timeout) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(timeout_val) = timeout.parse() {
                config.llm_timeout_secs = timeout_val;
            }
        }

        config.gemini_api_key = non_empty_var("GEMINI_API_KEY");
        config.anthropic_api_key = non_empty_var("ANTHROPIC_API_KEY");
        config.openai_api_key = non_empty_var("OPENAI_API_KEY");
        config.serper_api_key = non_empty_var("SERPER_API_KEY");
        config.census_api_key = non_empty_var("CENSUS_API_KEY");

        if let Some(url) = non_empty_var("ZIPCODE_API_URL") {
            config.zipcode_api_url = url;
        }

        if let Some(url) = non_empty_var("GEOCODER_API_URL") {
            config.geocoder_api_url = url;
        }

        if let Some(url) = non_empty_var("CENSUS_API_URL") {
            config.census_api_url = url;
        }

        if let Some(url) = non_empty_var("SERPER_API_URL") {
            config.serper_api_url = url;
        }

        if let Ok(timeout) = std::env::var("HTTP_TIMEOUT_SECS") {
            if let Ok(timeout_val) = timeout.parse() {
                config.http_timeout_secs = timeout_val;
            }
        }

        if let Ok(retries) = std::env::var("HTTP_MAX_RETRIES") {
            if let Ok(retries_val) = retries.parse() {
                config.http_max_retries = retries_val;
            }
        }

        if let Ok(iterations) = std::env::var("AGENT_MAX_ITERATIONS") {
            if let Ok(iterations_val) = iterations.parse() {
                config.agent_max_iterations = iterations_val;
            }
        }

        config
    }

    /// `LLM_MODEL` when set, otherwise the default model of the chosen provider.
    pub fn model_name(&self) -> String {
        self.llm_model
            .clone()
            .unwrap_or_else(|| default_model(&self.llm_provider).to_string())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Select the LLM backend. Fails when the chosen provider has no API key.
    pub fn provider_config(&self) -> Result<ProviderConfig, AgentError> {
        let missing = |var: &str| AgentError::MissingCredentials(format!("{} is not set", var));

        match self.llm_provider.as_str() {
            "gemini" => Ok(ProviderConfig::Gemini {
                api_key: self.gemini_api_key.clone().ok_or_else(|| missing("GEMINI_API_KEY"))?,
                model: self.model_name(),
                temperature: self.llm_temperature,
            }),
            "anthropic" => Ok(ProviderConfig::Anthropic {
                api_key: self.anthropic_api_key.clone().ok_or_else(|| missing("ANTHROPIC_API_KEY"))?,
                model: self.model_name(),
                temperature: self.llm_temperature,
            }),
            "openai" => Ok(ProviderConfig::OpenAI {
                api_key: self.openai_api_key.clone().ok_or_else(|| missing("OPENAI_API_KEY"))?,
                model: self.model_name(),
                temperature: self.llm_temperature,
            }),
            other => Err(AgentError::MissingCredentials(format!(
                "Unsupported LLM provider '{}'",
                other
            ))),
        }
    }
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-3-5-haiku-latest",
        "openai" => "gpt-4o-mini",
        _ => "gemini-2.0-flash-lite",
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
