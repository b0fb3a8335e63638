//! HTML to readable text

use article_scraper::Readability;
use tracing::{debug, warn};
use url::Url;

/// Extract the main article text with Readability, falling back to [`html_to_text`]
pub async fn extract_readable(html: &str, url: &str) -> String {
    let Ok(parsed_url) = Url::parse(url) else {
        debug!(url, "Unparseable URL, using simple extraction");
        return html_to_text(html);
    };

    // article_scraper can panic on malformed markup
    let html_owned = html.to_string();
    let result = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::runtime::Handle::current()
                .block_on(async { Readability::extract(&html_owned, Some(parsed_url)).await })
        }))
    })
    .await;

    match result {
        Ok(Ok(Ok(article))) => {
            let text = html_to_text(&article);
            if text.is_empty() {
                html_to_text(html)
            } else {
                text
            }
        }
        Ok(Ok(Err(e))) => {
            debug!(url, error = %e, "Readability failed, using simple extraction");
            html_to_text(html)
        }
        Ok(Err(_panic)) => {
            warn!(url, "Readability panicked on this page, using simple extraction");
            html_to_text(html)
        }
        Err(e) => {
            warn!(url, error = %e, "Extraction task failed");
            html_to_text(html)
        }
    }
}

/// Strip tags, drop `<script>`/`<style>` bodies, collapse whitespace
pub fn html_to_text(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_name.clear();
            }
            '>' if in_tag => {
                let tag = tag_name
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_lowercase();
                match tag.as_str() {
                    "script" => in_script = true,
                    "/script" => in_script = false,
                    "style" => in_style = true,
                    "/style" => in_style = false,
                    _ => {}
                }
                if is_block_tag(tag.trim_start_matches('/')) {
                    result.push('\n');
                } else if !result.ends_with(' ') && !result.ends_with('\n') {
                    result.push(' ');
                }
                in_tag = false;
                tag_name.clear();
            }
            _ if in_tag => tag_name.push(ch),
            _ if in_script || in_style => {}
            _ if ch.is_whitespace() => {
                if !result.ends_with(' ') && !result.ends_with('\n') {
                    result.push(' ');
                }
            }
            _ => result.push(ch),
        }
    }

    result
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same as [`html_to_text`] but on a single line
pub fn html_to_flat_text(html: &str) -> String {
    html_to_text(html).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "div" | "p" | "br" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr" | "section"
            | "article" | "header" | "footer"
    )
}

/// First `max` chars of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_html_to_text() {
        let html = "<html><body><h1>Title</h1><p>Paragraph</p><script>code</script></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Paragraph"));
        assert!(!text.contains("code"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn test_scripts_and_styles_removed() {
        let html = r#"
            <html>
            <head><style type="text/css">body { color: red; }</style></head>
            <body>
                <h1>Title</h1>
                <p>Content   with    gaps</p>
                <script src="x.js">console.log("test");</script>
            </body>
            </html>
        "#;
        let result = html_to_text(html);
        assert!(result.contains("Content with gaps"));
        assert!(!result.contains("color: red"));
        assert!(!result.contains("console.log"));
    }

    #[test]
    fn test_inline_tags_keep_words_apart() {
        assert_eq!(html_to_flat_text("<span>one</span><span>two</span>"), "one two");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_readability_extracts_article() {
        let html = r#"
            <!DOCTYPE html>
            <html>
            <head><title>Test Article</title></head>
            <body>
                <header>Navigation stuff</header>
                <article>
                    <h1>Main Article Title</h1>
                    <p>This is the main content of the article. It has enough words to look like prose.</p>
                    <p>It should extract this text cleanly, leaving the chrome behind.</p>
                </article>
                <aside>Advertisement</aside>
                <footer>Footer content</footer>
            </body>
            </html>
        "#;
        let result = extract_readable(html, "https://example.com/article").await;
        assert!(result.contains("main content"));
    }

    #[tokio::test]
    async fn test_bad_url_uses_simple_extraction() {
        let result = extract_readable("<html><body><p>Content</p></body></html>", "not-a-url").await;
        assert_eq!(result, "Content");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    proptest! {
        #[test]
        fn prop_truncate_respects_limit(text in ".{0,200}", max in 0usize..100) {
            let cut = truncate_chars(&text, max);
            prop_assert!(cut.chars().count() <= max);
            prop_assert!(text.starts_with(&cut));
        }
    }
}
