use tracing::debug;

use super::html::{extract_readable, html_to_flat_text, truncate_chars};
use super::{ResearchClient, ResearchError};
use crate::payments::PaidRequest;

impl ResearchClient {
    /// Readable text of a page, truncated to `text_max_chars`
    pub async fn fetch_url_text(&self, url: &str) -> Result<String, ResearchError> {
        let response = self.fetcher.send(PaidRequest::get(url)).await?;
        if !response.is_success() {
            return Err(ResearchError::Status {
                source_name: url.to_string(),
                status: response.status.as_u16(),
            });
        }

        let raw = response.text();
        let text = if response.is_html() || looks_like_html(&raw) {
            extract_readable(&raw, url).await
        } else {
            raw.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        let text = truncate_chars(text.trim(), self.settings.text_max_chars);
        if text.is_empty() {
            return Err(ResearchError::Empty(url.to_string()));
        }
        debug!(url, length = text.len(), paid = response.paid, "Fetched page text");
        Ok(text)
    }

    /// Tag-stripped text without Readability, capped at `max_chars`
    pub async fn fetch_plain_text(&self, url: &str, max_chars: usize) -> Result<String, ResearchError> {
        let response = self.fetcher.send(PaidRequest::get(url)).await?;
        if !response.is_success() {
            return Err(ResearchError::Status {
                source_name: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(truncate_chars(&html_to_flat_text(&response.text()), max_chars))
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<') && head.contains('>')
}
