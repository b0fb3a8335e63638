//! Content gathering: page fetch and the research vendors
//!
//! Every request goes through the shared [`PaidFetcher`], so a paywalled page
//! or vendor answering with an x402 challenge is paid for transparently when a
//! treasury is configured.

pub mod fetch;
pub mod html;
pub mod perplexity;
pub mod tavily;

pub use tavily::SearchResult;

use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, ResearchSection};
use crate::payments::{PaidFetcher, PaymentError};

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("{0} API key not configured")]
    NotConfigured(&'static str),
    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },
    #[error("{0} returned no content")]
    Empty(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<PaymentError> for ResearchError {
    fn from(e: PaymentError) -> Self {
        ResearchError::Http(e.to_string())
    }
}

/// Vendor keys and limits, resolved once
#[derive(Debug, Clone, Default)]
pub struct ResearchSettings {
    pub perplexity_api_key: Option<String>,
    pub perplexity_model: String,
    pub perplexity_base_url: String,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
    pub tavily_max_results: usize,
    pub text_max_chars: usize,
}

impl ResearchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let section: &ResearchSection = &config.research;
        Self {
            perplexity_api_key: config.perplexity_api_key(),
            perplexity_model: section.perplexity_model.clone(),
            perplexity_base_url: section.perplexity_base_url.trim_end_matches('/').to_string(),
            tavily_api_key: config.tavily_api_key(),
            tavily_base_url: section.tavily_base_url.trim_end_matches('/').to_string(),
            tavily_max_results: section.tavily_max_results,
            text_max_chars: section.text_max_chars,
        }
    }
}

#[derive(Clone)]
pub struct ResearchClient {
    fetcher: Arc<PaidFetcher>,
    settings: ResearchSettings,
}

impl ResearchClient {
    pub fn new(fetcher: Arc<PaidFetcher>, settings: ResearchSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn fetcher(&self) -> &Arc<PaidFetcher> {
        &self.fetcher
    }
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> ResearchClient {
    ResearchClient::new(
        Arc::new(PaidFetcher::new(reqwest::Client::new())),
        ResearchSettings {
            perplexity_api_key: Some("pplx-test".to_string()),
            perplexity_model: "sonar-pro".to_string(),
            perplexity_base_url: base_url.to_string(),
            tavily_api_key: Some("tvly-test".to_string()),
            tavily_base_url: base_url.to_string(),
            tavily_max_results: 5,
            text_max_chars: 6000,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_trim_base_urls() {
        let mut config = AppConfig::test_config();
        config.research.tavily_base_url = "https://api.tavily.com/".to_string();
        let settings = ResearchSettings::from_config(&config);
        assert_eq!(settings.tavily_base_url, "https://api.tavily.com");
        assert!(settings.perplexity_api_key.is_none());
        assert_eq!(settings.text_max_chars, 6000);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ResearchError::NotConfigured("Tavily").to_string(),
            "Tavily API key not configured"
        );
        let status = ResearchError::Status {
            source_name: "Perplexity".to_string(),
            status: 429,
        };
        assert_eq!(status.to_string(), "Perplexity returned HTTP 429");
    }
}
