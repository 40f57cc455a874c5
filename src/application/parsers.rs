//! Per-source parser strategies and their registry
//!
//! One scraping strategy per external source, all behind the
//! `SourceScraper` capability trait: given a part number and an HTTP
//! client already routed through a leased proxy, produce one scraped
//! result. Strategies are registered in a lookup keyed by source name;
//! there is no runtime type discovery. The HTML extraction inside each
//! strategy is site-specific and intentionally shallow.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::domain::normalize;

/// Failure of one source invocation.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("invalid selector: {0}")]
    Selector(String),
}

/// Raw per-source scrape result before it becomes an `Observation`.
///
/// An all-empty value is a valid outcome: the source responded but had
/// no data for the part.
#[derive(Debug, Clone, Default)]
pub struct ScrapedPart {
    pub name: Option<String>,
    pub replaces: Vec<String>,
    pub picture_urls: Vec<String>,
    /// Lookup attempts the strategy needed (some sites require a search
    /// hop before the detail page).
    pub attempts: u32,
}

/// One source's scraping capability.
#[async_trait]
pub trait SourceScraper: Send + Sync {
    /// Source name this strategy is registered under.
    fn source_name(&self) -> &'static str;

    /// Look up `part_number` on the source through `client` (already
    /// bound to a leased proxy) and return one scraped result.
    async fn scrape(
        &self,
        part_number: &str,
        base_url: &str,
        client: &reqwest::Client,
    ) -> Result<ScrapedPart, ScrapeError>;
}

/// Lookup of scraping strategies keyed by source name.
pub struct ParserRegistry {
    strategies: HashMap<&'static str, Arc<dyn SourceScraper>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with every built-in strategy installed.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(XPartSupplyScraper));
        registry.register(Arc::new(PartsDrScraper));
        registry.register(Arc::new(PartSelectScraper));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn SourceScraper>) {
        self.strategies.insert(strategy.source_name(), strategy);
    }

    pub fn get(&self, source_name: &str) -> Option<Arc<dyn SourceScraper>> {
        self.strategies.get(source_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, ScrapeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(ScrapeError::Http {
            status: response.status(),
            url: url.to_string(),
        });
    }
    response.text().await.map_err(|source| ScrapeError::Transport {
        url: url.to_string(),
        source,
    })
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector(format!("{css}: {e}")))
}

/// Shared extraction shape for product detail pages: a title node, an
/// optional replaces list, and product images.
fn extract_detail(
    body: &str,
    base_url: &str,
    name_css: &str,
    replaces_css: &str,
    image_css: &str,
) -> Result<ScrapedPart, ScrapeError> {
    let name_sel = selector(name_css)?;
    let replaces_sel = selector(replaces_css)?;
    let image_sel = selector(image_css)?;

    let document = Html::parse_document(body);

    let name = document
        .select(&name_sel)
        .next()
        .map(|n| normalize::text(&n.text().collect::<String>()))
        .filter(|n| !n.is_empty());

    let mut replaces = Vec::new();
    for node in document.select(&replaces_sel) {
        let raw = normalize::text(&node.text().collect::<String>());
        // Replace lists come both as one comma-joined blob and as one
        // node per number.
        for piece in raw.split(',') {
            let number = piece.trim().to_string();
            if !number.is_empty() && !replaces.contains(&number) {
                replaces.push(number);
            }
        }
    }

    let mut picture_urls = Vec::new();
    for node in document.select(&image_sel) {
        let Some(src) = node
            .value()
            .attr("src")
            .or_else(|| node.value().attr("data-src"))
        else {
            continue;
        };
        let absolute = normalize::image_url(src.trim(), base_url);
        if !picture_urls.contains(&absolute) {
            picture_urls.push(absolute);
        }
    }

    Ok(ScrapedPart {
        name,
        replaces,
        picture_urls,
        attempts: 1,
    })
}

/// xpartsupply.com: part detail lives directly under a search-by-number
/// path.
pub struct XPartSupplyScraper;

#[async_trait]
impl SourceScraper for XPartSupplyScraper {
    fn source_name(&self) -> &'static str {
        "XPartSupply"
    }

    async fn scrape(
        &self,
        part_number: &str,
        base_url: &str,
        client: &reqwest::Client,
    ) -> Result<ScrapedPart, ScrapeError> {
        let number = normalize::part_number(part_number);
        let url = format!("{base_url}/parts/{number}");
        let body = fetch_page(client, &url).await?;
        extract_detail(
            &body,
            base_url,
            "h1.product-title",
            "div.replaces-list li",
            "div.product-gallery img",
        )
    }
}

/// partsdr.com: search page links to the detail page; a miss on the
/// search page is a valid empty result.
pub struct PartsDrScraper;

#[async_trait]
impl SourceScraper for PartsDrScraper {
    fn source_name(&self) -> &'static str {
        "PartsDr"
    }

    async fn scrape(
        &self,
        part_number: &str,
        base_url: &str,
        client: &reqwest::Client,
    ) -> Result<ScrapedPart, ScrapeError> {
        let number = normalize::part_number(part_number);
        let search_url = format!("{base_url}/search?q={number}");
        let search_body = fetch_page(client, &search_url).await?;

        let Some(detail_href) = first_result_href(&search_body)? else {
            return Ok(ScrapedPart {
                attempts: 1,
                ..ScrapedPart::default()
            });
        };

        let detail_url = normalize::image_url(&detail_href, base_url);
        let body = fetch_page(client, &detail_url).await?;
        let mut scraped = extract_detail(
            &body,
            base_url,
            "h1.part-title",
            "section#replaces span.part-number",
            "img.part-photo",
        )?;
        scraped.attempts = 2;
        Ok(scraped)
    }
}

fn first_result_href(search_body: &str) -> Result<Option<String>, ScrapeError> {
    let link_sel = selector("div.search-results a.part-link")?;
    let document = Html::parse_document(search_body);
    Ok(document
        .select(&link_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

/// partselect.com: detail page keyed by manufacturer number.
pub struct PartSelectScraper;

#[async_trait]
impl SourceScraper for PartSelectScraper {
    fn source_name(&self) -> &'static str {
        "PartSelect"
    }

    async fn scrape(
        &self,
        part_number: &str,
        base_url: &str,
        client: &reqwest::Client,
    ) -> Result<ScrapedPart, ScrapeError> {
        let number = normalize::part_number(part_number);
        let url = format!("{base_url}/Models/{number}/");
        let body = fetch_page(client, &url).await?;
        extract_detail(
            &body,
            base_url,
            "h1[itemprop=name]",
            "div.pd__crossref li",
            "div.pd__img img",
        )
    }
}
