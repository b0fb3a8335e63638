//! Service configuration
//!
//! Loaded from a TOML file. Secrets are never stored in the file itself: each
//! secret is referenced by the name of the environment variable that holds it
//! and resolved when the owning component is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub research: ResearchSection,
    #[serde(default = "default_tools")]
    pub tools: HashMap<String, ToolConfig>,
    #[serde(default)]
    pub payments: PaymentsSection,
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub cron: CronSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            auth: AuthSection::default(),
            llm: LlmSection::default(),
            agent: AgentSection::default(),
            research: ResearchSection::default(),
            tools: default_tools(),
            payments: PaymentsSection::default(),
            discord: DiscordSection::default(),
            cron: CronSection::default(),
        }
    }
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used in log lines and links
    pub public_base_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Token signing section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_jwt_secret_env() -> String {
    "JWT_SECRET".to_string()
}

fn default_token_ttl() -> u64 {
    60 * 60 * 24 * 7
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name, only "openai" is supported
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model used for final synthesis
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for instructions, classification and the tool-calling agent
    pub agent_model: Option<String>,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_base")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            agent_model: None,
            api_key_env: default_llm_key_env(),
            base_url: default_openai_base(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmSection {
    /// Model for agent-side calls: `agent_model` wins over `model`
    pub fn effective_agent_model(&self) -> &str {
        self.agent_model.as_deref().unwrap_or(&self.model)
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    60
}

/// How a task is fulfilled
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Fixed stage sequence followed by a synthesis call
    #[default]
    Pipeline,
    /// Tool-calling loop driven by the model
    Autonomous,
}

/// Agent section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_label_max")]
    pub label_max_chars: usize,
    #[serde(default = "default_true")]
    pub x402_demo: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            mode: AgentMode::default(),
            max_iterations: default_max_iterations(),
            label_max_chars: default_label_max(),
            x402_demo: true,
        }
    }
}

fn default_agent_name() -> String {
    "AgenX".to_string()
}

fn default_max_iterations() -> usize {
    10
}

fn default_label_max() -> usize {
    60
}

fn default_true() -> bool {
    true
}

/// Research vendors section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchSection {
    #[serde(default = "default_perplexity_env")]
    pub perplexity_api_key_env: String,
    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,
    #[serde(default = "default_perplexity_base")]
    pub perplexity_base_url: String,
    #[serde(default = "default_tavily_env")]
    pub tavily_api_key_env: String,
    #[serde(default = "default_tavily_base")]
    pub tavily_base_url: String,
    #[serde(default = "default_tavily_max")]
    pub tavily_max_results: usize,
    #[serde(default = "default_text_max")]
    pub text_max_chars: usize,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            perplexity_api_key_env: default_perplexity_env(),
            perplexity_model: default_perplexity_model(),
            perplexity_base_url: default_perplexity_base(),
            tavily_api_key_env: default_tavily_env(),
            tavily_base_url: default_tavily_base(),
            tavily_max_results: default_tavily_max(),
            text_max_chars: default_text_max(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_perplexity_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}

fn default_perplexity_model() -> String {
    "sonar-pro".to_string()
}

fn default_perplexity_base() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_tavily_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_tavily_base() -> String {
    "https://api.tavily.com".to_string()
}

fn default_tavily_max() -> usize {
    5
}

fn default_text_max() -> usize {
    6000
}

fn default_http_timeout() -> u64 {
    30
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolConfig {
    /// Simple form: tool_name = "builtin"
    Simple(String),
    /// Complex form: tool_name = { impl = "builtin", config = { ... } }
    Complex {
        #[serde(rename = "impl")]
        implementation: String,
        #[serde(default)]
        config: HashMap<String, serde_json::Value>,
    },
}

/// Tools the agent gets when `[tools]` is omitted
pub const DEFAULT_AGENT_TOOLS: [&str; 5] = [
    "fetch_url_text_url",
    "fetch_url_text",
    "research_perplexity",
    "research_tavily",
    "x402_demo_call",
];

fn default_tools() -> HashMap<String, ToolConfig> {
    DEFAULT_AGENT_TOOLS
        .iter()
        .map(|name| (name.to_string(), ToolConfig::Simple("builtin".to_string())))
        .collect()
}

/// Solana cluster names accepted by the payment layer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Cluster {
    #[default]
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "testnet")]
    Testnet,
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
}

impl Cluster {
    /// Parse a cluster name; anything unrecognised is devnet
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "testnet" => Cluster::Testnet,
            "mainnet-beta" => Cluster::MainnetBeta,
            _ => Cluster::Devnet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::MainnetBeta => "mainnet-beta",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

/// Payments section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentsSection {
    /// Cluster name; unknown values fall back to devnet
    #[serde(default = "default_network")]
    pub network: String,
    pub rpc_url: Option<String>,
    #[serde(default = "default_keypair_json_env")]
    pub keypair_json_env: String,
    #[serde(default = "default_keypair_b64_env")]
    pub keypair_b64_env: String,
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,
    pub usdc_mint: Option<String>,
    #[serde(default = "default_agent_pubkey_env")]
    pub agent_public_key_env: String,
    #[serde(default)]
    pub payout_sol: f64,
    #[serde(default)]
    pub payout_usd: f64,
    #[serde(default = "default_price_api")]
    pub price_api_url: String,
    #[serde(default = "default_x402_demo_url")]
    pub x402_demo_url: String,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
}

impl Default for PaymentsSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            rpc_url: None,
            keypair_json_env: default_keypair_json_env(),
            keypair_b64_env: default_keypair_b64_env(),
            keypair_path: default_keypair_path(),
            usdc_mint: None,
            agent_public_key_env: default_agent_pubkey_env(),
            payout_sol: 0.0,
            payout_usd: 0.0,
            price_api_url: default_price_api(),
            x402_demo_url: default_x402_demo_url(),
            confirm_timeout_secs: default_confirm_timeout(),
        }
    }
}

impl PaymentsSection {
    pub fn cluster(&self) -> Cluster {
        Cluster::parse_lenient(&self.network)
    }

    pub fn effective_rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.cluster().default_rpc_url().to_string())
    }
}

fn default_network() -> String {
    "devnet".to_string()
}

fn default_keypair_json_env() -> String {
    "PAYER_KEYPAIR_JSON".to_string()
}

fn default_keypair_b64_env() -> String {
    "PAYER_KEYPAIR_B64".to_string()
}

fn default_keypair_path() -> PathBuf {
    PathBuf::from("./secrets/agenx-wallet.json")
}

fn default_agent_pubkey_env() -> String {
    "AGENT_PUBLIC_KEY".to_string()
}

fn default_price_api() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_x402_demo_url() -> String {
    "https://triton.api.corbits.dev".to_string()
}

fn default_confirm_timeout() -> u64 {
    60
}

/// Discord section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordSection {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_channel_env")]
    pub fallback_channel_env: String,
    #[serde(default = "default_app_id_env")]
    pub app_id_env: String,
    #[serde(default = "default_discord_api")]
    pub api_base_url: String,
    /// Log skipped and failed notifications at warn instead of debug
    #[serde(default)]
    pub debug: bool,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            fallback_channel_env: default_channel_env(),
            app_id_env: default_app_id_env(),
            api_base_url: default_discord_api(),
            debug: false,
        }
    }
}

fn default_bot_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

fn default_channel_env() -> String {
    "DISCORD_CHANNEL_ID".to_string()
}

fn default_app_id_env() -> String {
    "DISCORD_APP_ID".to_string()
}

fn default_discord_api() -> String {
    "https://discord.com/api/v10".to_string()
}

/// Scheduled agent tick section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronSection {
    #[serde(default = "default_cron_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds between in-process ticks, 0 disables the ticker
    #[serde(default)]
    pub interval_secs: u64,
}

impl Default for CronSection {
    fn default() -> Self {
        Self {
            secret_env: default_cron_secret_env(),
            batch_size: default_batch_size(),
            interval_secs: 0,
        }
    }
}

fn default_cron_secret_env() -> String {
    "CRON_SECRET".to_string()
}

fn default_batch_size() -> usize {
    3
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Files tried, in order, when no path is given
pub const CONFIG_SEARCH_PATHS: [&str; 2] = ["agenx.toml", "config/agenx.toml"];

impl AppConfig {
    /// The explicit file, else the first of [`CONFIG_SEARCH_PATHS`] under
    /// `base`, else defaults. A missing explicit file is an error.
    pub fn discover(explicit: Option<&Path>, base: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        for candidate in CONFIG_SEARCH_PATHS {
            let path = base.join(candidate);
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(&path);
            }
        }

        warn!("No configuration file found, using defaults");
        Self::from_toml_str("")
    }

    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.llm.provider != "openai" {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider: {}",
                self.llm.provider
            )));
        }
        if self.cron.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "cron.batch_size must be at least 1".to_string(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.payments.payout_sol < 0.0 || self.payments.payout_usd < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "payout amounts must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Read an optional secret; empty values count as unset
    pub fn env_optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Read a required secret
    pub fn env_required(name: &str) -> Result<String, ConfigError> {
        Self::env_optional(name).ok_or_else(|| ConfigError::EnvVarNotFound(name.to_string()))
    }

    pub fn llm_api_key(&self) -> Option<String> {
        Self::env_optional(&self.llm.api_key_env)
    }

    pub fn jwt_secret(&self) -> String {
        Self::env_optional(&self.auth.jwt_secret_env).unwrap_or_else(|| "dev_secret".to_string())
    }

    pub fn perplexity_api_key(&self) -> Option<String> {
        Self::env_optional(&self.research.perplexity_api_key_env)
    }

    pub fn tavily_api_key(&self) -> Option<String> {
        Self::env_optional(&self.research.tavily_api_key_env)
    }

    pub fn discord_bot_token(&self) -> Option<String> {
        Self::env_optional(&self.discord.bot_token_env)
    }

    pub fn discord_fallback_channel(&self) -> Option<String> {
        Self::env_optional(&self.discord.fallback_channel_env)
    }

    pub fn discord_app_id(&self) -> Option<String> {
        Self::env_optional(&self.discord.app_id_env)
    }

    pub fn agent_public_key(&self) -> Option<String> {
        Self::env_optional(&self.payments.agent_public_key_env)
    }

    pub fn cron_secret(&self) -> Option<String> {
        Self::env_optional(&self.cron.secret_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[server]
port = 3999

[llm]
api_key_env = "AGENX_TEST_UNSET_OPENAI_KEY"

[research]
perplexity_api_key_env = "AGENX_TEST_UNSET_PERPLEXITY_KEY"
tavily_api_key_env = "AGENX_TEST_UNSET_TAVILY_KEY"

[discord]
bot_token_env = "AGENX_TEST_UNSET_DISCORD_TOKEN"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.agent.mode, AgentMode::Pipeline);
        assert_eq!(config.research.text_max_chars, 6000);
        assert_eq!(config.cron.batch_size, 3);
        assert_eq!(config.tools.len(), DEFAULT_AGENT_TOOLS.len());
        assert!(config.tools.contains_key("research_tavily"));
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[server]
bind = "127.0.0.1"
port = 8080
public_base_url = "https://agenx.example"

[llm]
provider = "openai"
model = "gpt-4o"
agent_model = "gpt-4o-mini"
temperature = 0.4

[agent]
mode = "autonomous"
max_iterations = 6

[tools]
fetch_url_text_url = "builtin"
web_search = { impl = "builtin", config = { max_results = 3 } }

[payments]
network = "mainnet-beta"
payout_usd = 0.5

[cron]
batch_size = 5
interval_secs = 60
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.llm.effective_agent_model(), "gpt-4o-mini");
        assert_eq!(config.agent.mode, AgentMode::Autonomous);
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.payments.cluster(), Cluster::MainnetBeta);
        assert_eq!(
            config.payments.effective_rpc_url(),
            "https://api.mainnet-beta.solana.com"
        );
        assert_eq!(config.cron.interval_secs, 60);
    }

    #[test]
    fn test_agent_model_falls_back_to_model() {
        let config = AppConfig::from_toml_str("[llm]\nmodel = \"gpt-4o\"\n").unwrap();
        assert_eq!(config.llm.effective_agent_model(), "gpt-4o");
    }

    #[test]
    fn test_unknown_network_is_devnet() {
        assert_eq!(Cluster::parse_lenient("localnet"), Cluster::Devnet);
        assert_eq!(Cluster::parse_lenient("testnet"), Cluster::Testnet);
        assert_eq!(Cluster::Devnet.as_str(), "devnet");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            AppConfig::from_toml_str("[llm]\nprovider = \"anthropic\"\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[cron]\nbatch_size = 0\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[server]\nport = 0\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[payments]\npayout_sol = -1.0\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_agent_mode_fails_to_parse() {
        let result = AppConfig::from_toml_str("[agent]\nmode = \"swarm\"\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_env_required_reports_missing_name() {
        let err = AppConfig::env_required("AGENX_DEFINITELY_NOT_SET_123").unwrap_err();
        assert!(err.to_string().contains("AGENX_DEFINITELY_NOT_SET_123"));
    }

    #[test]
    fn test_jwt_secret_defaults_to_dev_secret() {
        let mut config = AppConfig::test_config();
        config.auth.jwt_secret_env = "AGENX_TEST_UNSET_JWT".to_string();
        assert_eq!(config.jwt_secret(), "dev_secret");
    }
}
