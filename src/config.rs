//! # Configuration Management
//!
//! This module loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` / `GROQ_API_KEY` (deployment platform conventions)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_GENERATOR__MODEL`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Why a double underscore:
//! Several keys contain underscores themselves (`max_tokens`, `timeout_secs`), so a
//! single `_` cannot separate the section from the key.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - `server`: where the HTTP/WebSocket listener binds
/// - `generator`: the language model that writes interviewer replies
/// - `session`: per-connection behavior (greeting, fallback, limits, heartbeat)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub generator: GeneratorConfig,
    pub session: SessionConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Language model client settings.
///
/// ## Fields:
/// - `api_base`: Base URL of an OpenAI-compatible API (`/chat/completions` is appended)
/// - `api_key`: Bearer token; falls back to the `GROQ_API_KEY` environment variable
/// - `model`: Model name sent with every request
/// - `temperature`: Sampling temperature (lower = more formal and focused)
/// - `max_tokens`: Reply length cap, kept small so replies can be spoken aloud
/// - `timeout_secs`: Upper bound on one generation; expiry counts as a failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Interview session settings.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Upgrades beyond this are refused with 503
/// - `greeting`: First interviewer turn of every session
/// - `fallback_reply`: Sent in place of a reply when the generator fails or times out
/// - `heartbeat_interval_secs`: How often the server pings the client
/// - `client_timeout_secs`: Silence after which the connection is dropped
/// - `archive_capacity`: How many finished transcripts are kept for scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_concurrent_sessions: usize,
    pub greeting: String,
    pub fallback_reply: String,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub archive_capacity: usize,
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

pub const DEFAULT_GREETING: &str =
    "Hello! I'm your interviewer today. Let's start with a simple question: Tell me about yourself.";

pub const DEFAULT_FALLBACK_REPLY: &str =
    "I apologize, but I am having trouble processing that right now.";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            generator: GeneratorConfig {
                api_base: "https://api.groq.com/openai/v1".to_string(),
                api_key: None,
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.6,
                max_tokens: 150,
                timeout_secs: 30,
            },
            session: SessionConfig {
                max_concurrent_sessions: 100,
                greeting: DEFAULT_GREETING.to_string(),
                fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
                heartbeat_interval_secs: 15,
                client_timeout_secs: 60,
                archive_capacity: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_GENERATOR__TIMEOUT_SECS=10`: Tighter generation bound
    /// - `APP_SESSION__MAX_CONCURRENT_SESSIONS=20`: Lower the session limit
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    /// - `GROQ_API_KEY`: Used when no `generator.api_key` is configured
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let mut config: AppConfig = settings.build()?.try_deserialize()?;

        if config.generator.api_key.is_none() {
            config.generator.api_key = env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
        }

        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.generator.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Generator timeout must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(anyhow::anyhow!(
                "Generator temperature must be between 0.0 and 2.0, got {}",
                self.generator.temperature
            ));
        }

        if self.generator.max_tokens == 0 {
            return Err(anyhow::anyhow!("Generator max_tokens must be greater than 0"));
        }

        if self.session.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.session.greeting.trim().is_empty() {
            return Err(anyhow::anyhow!("Session greeting cannot be empty"));
        }

        if self.session.fallback_reply.trim().is_empty() {
            return Err(anyhow::anyhow!("Session fallback reply cannot be empty"));
        }

        if self.session.heartbeat_interval_secs == 0
            || self.session.heartbeat_interval_secs >= self.session.client_timeout_secs
        {
            return Err(anyhow::anyhow!(
                "Heartbeat interval must be non-zero and shorter than the client timeout"
            ));
        }

        Ok(())
    }
}
