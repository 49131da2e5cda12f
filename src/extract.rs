//! Generic, site-agnostic content extraction for enrichment.
//!
//! The aggregator uses [`ContentExtractor`] on a handful of outbound links
//! found in the results. It knows nothing about any particular site: it tries
//! an ordered list of selectors per field and keeps the first non-empty hit.

use crate::error::ParseError;
use crate::models::PageContent;
use crate::parser::selector;
use crate::utils::{collapse_whitespace, truncate_chars};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::instrument;

/// Default character budget for extracted bodies.
pub const DEFAULT_BODY_CHARS: usize = 2000;

/// Heuristic extractor for title, author, publication date, description and
/// body text.
pub struct ContentExtractor {
    body_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    author_selectors: Vec<Selector>,
    date_selectors: Vec<Selector>,
    description_selectors: Vec<Selector>,
    max_body_chars: usize,
}

impl ContentExtractor {
    /// Build the extractor with its default selector lists.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Selector`] if a selector fails to compile.
    pub fn new(max_body_chars: usize) -> Result<Self, ParseError> {
        let compile = |list: &[&str]| -> Result<Vec<Selector>, ParseError> {
            list.iter().map(|css| selector(css)).collect()
        };

        Ok(Self {
            body_selectors: compile(&[
                "article p, article li",
                "main p, main li",
                "div.content p, div.post-content p, div.entry-content p",
                "div.markdown-body p",
                "p",
            ])?,
            title_selectors: compile(&[
                "meta[property='og:title']",
                "meta[name='twitter:title']",
                "h1",
                "title",
            ])?,
            author_selectors: compile(&[
                "meta[name='author']",
                "meta[property='article:author']",
                "[rel='author']",
                ".author, .byline",
            ])?,
            date_selectors: compile(&[
                "meta[property='article:published_time']",
                "meta[name='date'], meta[name='pubdate']",
                "time[datetime]",
                "time",
            ])?,
            description_selectors: compile(&[
                "meta[name='description']",
                "meta[property='og:description']",
            ])?,
            max_body_chars,
        })
    }

    /// Extract what can be found from `html`.
    ///
    /// # Errors
    ///
    /// [`ParseError::Missing`] when the page has neither a title nor any body
    /// text.
    #[instrument(level = "debug", skip(self, html), fields(html_length = html.len()))]
    pub fn extract(&self, html: &str, url: &str) -> Result<PageContent, ParseError> {
        let document = Html::parse_document(html);

        let title = first_value(&document, &self.title_selectors);
        let body = self.extract_body(&document);
        if title.is_none() && body.is_empty() {
            return Err(ParseError::Missing("readable content".to_string()));
        }

        Ok(PageContent {
            url: url.to_string(),
            title,
            author: first_value(&document, &self.author_selectors),
            published: first_value(&document, &self.date_selectors),
            description: first_value(&document, &self.description_selectors),
            body,
            retrieved_at: Utc::now(),
        })
    }

    fn extract_body(&self, document: &Html) -> String {
        for selector in &self.body_selectors {
            let text = document
                .select(selector)
                .map(element_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if !text.is_empty() {
                return truncate_chars(&text, self.max_body_chars);
            }
        }
        String::new()
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// First non-empty value across `selectors`: `content`, then `datetime`
/// attribute, then text.
fn first_value(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document.select(selector).find_map(|element| {
            let value = element
                .value()
                .attr("content")
                .or_else(|| element.value().attr("datetime"))
                .map(collapse_whitespace)
                .unwrap_or_else(|| element_text(element));
            (!value.is_empty()).then_some(value)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(DEFAULT_BODY_CHARS).unwrap()
    }

    #[test]
    fn test_extracts_article_fields() {
        let html = r#"
            <!DOCTYPE html>
            <html>
                <head>
                    <title>Fallback Title</title>
                    <meta property="og:title" content="Async Rust in 2024">
                    <meta name="author" content="Ferris Crab">
                    <meta name="description" content="Where async stands">
                    <meta property="article:published_time" content="2024-03-01T09:00:00Z">
                </head>
                <body>
                    <nav><p>Menu</p></nav>
                    <article>
                        <h1>Async Rust in 2024</h1>
                        <p>Async functions in traits are stable.</p>
                        <p>Executors remain pluggable.</p>
                    </article>
                </body>
            </html>
        "#;

        let page = extractor().extract(html, "https://blog.example.com/async").unwrap();
        assert_eq!(page.title.as_deref(), Some("Async Rust in 2024"));
        assert_eq!(page.author.as_deref(), Some("Ferris Crab"));
        assert_eq!(page.published.as_deref(), Some("2024-03-01T09:00:00Z"));
        assert_eq!(page.description.as_deref(), Some("Where async stands"));
        assert!(page.body.contains("Async functions in traits are stable."));
        assert!(!page.body.contains("Menu"));
    }

    #[test]
    fn test_time_element_and_byline() {
        let html = r#"
            <html><body>
                <h1>Release notes</h1>
                <span class="byline">by  Jane   Doe</span>
                <time datetime="2024-02-02">Feb 2</time>
                <p>Body text.</p>
            </body></html>
        "#;
        let page = extractor().extract(html, "https://example.org/notes").unwrap();
        assert_eq!(page.author.as_deref(), Some("by Jane Doe"));
        assert_eq!(page.published.as_deref(), Some("2024-02-02"));
        assert_eq!(page.body, "Body text.");
    }

    #[test]
    fn test_body_is_truncated() {
        let html = format!("<html><body><p>{}</p></body></html>", "x".repeat(50));
        let page = ContentExtractor::new(10).unwrap().extract(&html, "u").unwrap();
        assert_eq!(page.body.chars().count(), 11);
    }

    #[test]
    fn test_empty_page_is_missing_content() {
        let err = extractor()
            .extract("<html><body></body></html>", "https://example.com")
            .unwrap_err();
        assert!(matches!(err, ParseError::Missing(_)));
    }
}
