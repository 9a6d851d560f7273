//! Web scraping collaborator: port, typed errors, and the bundled
//! reqwest + `scraper` implementation.
//!
//! The pipeline only depends on the [`Scraper`] trait; the concrete HTML
//! extraction routine is replaceable.

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info};

/// Minimum extracted text length for a page to count as content.
const MIN_CONTENT_CHARS: usize = 100;

/// Extraction result for one page.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    /// Normalized extracted text.
    pub text: String,
    /// Best-effort page title.
    pub title: String,
}

/// Typed scraping failure.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The URL could not be parsed or has no http(s) scheme.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Network-level failure or non-success HTTP status.
    #[error("request failed: {0}")]
    Request(String),

    /// The page yielded fewer than the minimum content characters.
    #[error("insufficient content extracted ({got} chars, need {min})")]
    InsufficientContent { got: usize, min: usize },
}

/// URL → `{text, title}` capability consumed by the ingestion pipeline.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, ScrapeError>;
}

/// Bundled implementation: plain GET plus DOM text extraction.
pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    /// Builds the scraper with a browser-like user agent.
    pub fn new() -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ScrapeError::Request(format!("client build: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScrapeError::InvalidUrl(url.to_string()));
        }

        debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Request(format!(
                "HTTP {} from {url}",
                resp.status()
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        let page = extract(&html)?;
        info!("Scraped {url} ({} chars)", page.text.len());
        Ok(page)
    }
}

/// Extracts normalized text and a title from an HTML document.
///
/// Title fallbacks: `<title>` → `og:title` → first `<h1>` → "Untitled
/// Document". Text comes from paragraph-level nodes with script/style/nav
/// chrome skipped; lines are whitespace-trimmed and blank lines dropped.
fn extract(html: &str) -> Result<ScrapedPage, ScrapeError> {
    let doc = Html::parse_document(html);

    let title = select_first_text(&doc, "title")
        .or_else(|| {
            Selector::parse(r#"meta[property="og:title"]"#)
                .ok()
                .and_then(|sel| {
                    doc.select(&sel)
                        .next()
                        .and_then(|el| el.value().attr("content"))
                        .map(|s| s.trim().to_string())
                })
        })
        .or_else(|| select_first_text(&doc, "h1"))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Document".to_string());

    let body_sel = Selector::parse("article p, main p, body p, article li, main li")
        .expect("static selector");
    let mut lines: Vec<String> = Vec::new();
    for el in doc.select(&body_sel) {
        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            lines.push(text);
        }
    }
    let text = lines.join("\n");

    if text.chars().count() < MIN_CONTENT_CHARS {
        return Err(ScrapeError::InsufficientContent {
            got: text.chars().count(),
            min: MIN_CONTENT_CHARS,
        });
    }

    Ok(ScrapedPage { text, title })
}

fn select_first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, paragraphs: usize) -> String {
        let body: String = (0..paragraphs)
            .map(|i| format!("<p>Paragraph {i} with enough words to count as real content.</p>"))
            .collect();
        format!("<html><head><title>{title}</title></head><body><article>{body}</article></body></html>")
    }

    #[test]
    fn extracts_title_and_text() {
        let html = page("A Fine Page", 5);
        let page = extract(&html).unwrap();
        assert_eq!(page.title, "A Fine Page");
        assert!(page.text.contains("Paragraph 3"));
        assert_eq!(page.text.lines().count(), 5);
    }

    #[test]
    fn rejects_thin_pages() {
        let html = "<html><head><title>t</title></head><body><p>too short</p></body></html>";
        match extract(html) {
            Err(ScrapeError::InsufficientContent { got, min }) => {
                assert!(got < min);
            }
            other => panic!("expected InsufficientContent, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_h1_title() {
        let body: String = (0..5)
            .map(|i| format!("<p>Paragraph {i} with enough words to count as real content.</p>"))
            .collect();
        let html =
            format!("<html><body><h1>Heading Title</h1><article>{body}</article></body></html>");
        let page = extract(&html).unwrap();
        assert_eq!(page.title, "Heading Title");
    }

    #[tokio::test]
    async fn invalid_scheme_is_rejected() {
        let scraper = HttpScraper::new().unwrap();
        match scraper.fetch("ftp://example.com/x").await {
            Err(ScrapeError::InvalidUrl(_)) => {}
            other => panic!("expected InvalidUrl, got {other:?}"),
        }
    }
}
