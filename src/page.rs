use crate::http::{CRAWLER_USER_AGENT, build_client};
use crate::models::ProductRecord;
use once_cell::sync::Lazy;
use reqwest::{Client, Url, header};
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Could not fetch page ({0})")]
    Status(u16),
    #[error("Failed to fetch URL: {0}")]
    Fetch(String),
}

/// Where a field value may come from, tried in list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// `<meta {attr}="{key}" content="...">`, key compared case-insensitively.
    Meta {
        attr: &'static str,
        key: &'static str,
    },
    /// Text content of the first matching element.
    Text(&'static str),
}

pub const IMAGE_SOURCES: &[FieldSource] = &[FieldSource::Meta {
    attr: "property",
    key: "og:image",
}];

pub const TITLE_SOURCES: &[FieldSource] = &[
    FieldSource::Meta {
        attr: "property",
        key: "og:title",
    },
    FieldSource::Text("title"),
];

pub const PRICE_SOURCES: &[FieldSource] = &[FieldSource::Meta {
    attr: "property",
    key: "product:price:amount",
}];

pub const DESCRIPTION_SOURCES: &[FieldSource] = &[
    FieldSource::Meta {
        attr: "property",
        key: "og:description",
    },
    FieldSource::Meta {
        attr: "name",
        key: "description",
    },
];

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").expect("valid selector"));

/// Unauthenticated metadata scraping for any static HTML page.
#[derive(Debug, Clone)]
pub struct PageExtractor {
    http: Client,
}

impl PageExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
        }
    }

    pub async fn fetch(&self, url: &Url) -> Result<ProductRecord, PageError> {
        let response = self
            .http
            .get(url.clone())
            .header(header::USER_AGENT, CRAWLER_USER_AGENT)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|err| PageError::Fetch(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|err| PageError::Fetch(err.to_string()))?;
        debug!(
            target = "linkmeta.page",
            url = %url,
            bytes = html.len(),
            "page_fetched"
        );
        Ok(extract_metadata(&html))
    }
}

pub fn extract_metadata(html: &str) -> ProductRecord {
    let document = Html::parse_document(html);
    ProductRecord {
        image: first_match(&document, IMAGE_SOURCES),
        title: first_match(&document, TITLE_SOURCES),
        price: first_match(&document, PRICE_SOURCES),
        description: first_match(&document, DESCRIPTION_SOURCES),
    }
}

/// The HTML tokenizer has already decoded character references in attribute
/// values and text, so values are returned as parsed and never decoded again.
fn first_match(document: &Html, sources: &[FieldSource]) -> Option<String> {
    sources.iter().find_map(|source| lookup(document, *source))
}

fn lookup(document: &Html, source: FieldSource) -> Option<String> {
    match source {
        FieldSource::Meta { attr, key } => document
            .select(&META)
            .filter(|el| {
                el.value()
                    .attr(attr)
                    .is_some_and(|value| value.trim().eq_ignore_ascii_case(key))
            })
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string),
        FieldSource::Text(tag) => {
            let selector = Selector::parse(tag).ok()?;
            document
                .select(&selector)
                .map(|el| el.text().collect::<String>())
                .map(|text| text.trim().to_string())
                .find(|text| !text.is_empty())
        }
    }
}
