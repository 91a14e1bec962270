use crate::http::env_duration_secs;
use crate::marketplace::{ItemLookup, MarketplaceClient, MarketplaceRegistry};
use crate::models::{INVALID_URL, LookupResponse};
use crate::page::PageExtractor;
use crate::resolver::UrlResolver;
use reqwest::Url;
use std::{fmt, future::Future, sync::Arc, time::Duration, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-stage network bounds.
#[derive(Debug, Clone)]
pub struct LookupSettings {
    pub resolve_timeout: Duration,
    pub fetch_timeout: Duration,
    pub marketplace_timeout: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(8),
            marketplace_timeout: Duration::from_secs(8),
        }
    }
}

impl LookupSettings {
    pub fn from_env() -> Self {
        Self {
            resolve_timeout: env_duration_secs("RESOLVE_TIMEOUT_SECS", 5),
            fetch_timeout: env_duration_secs("FETCH_TIMEOUT_SECS", 8),
            marketplace_timeout: env_duration_secs("MARKETPLACE_TIMEOUT_SECS", 8),
        }
    }
}

/// Resolves a product URL to a normalized record.
///
/// Order per request: redirect resolution (best effort), marketplace
/// detection on both the submitted and resolved URL, the marketplace API when
/// one matches, and page scraping of the resolved URL whenever the
/// marketplace path produced nothing. Scrape failures come back as soft
/// errors, never as `Err`.
#[derive(Clone)]
pub struct Pipeline {
    resolver: UrlResolver,
    pages: PageExtractor,
    marketplaces: Arc<MarketplaceRegistry>,
    marketplace_client: MarketplaceClient,
}

impl Pipeline {
    pub fn new(settings: &LookupSettings, marketplaces: MarketplaceRegistry) -> Self {
        Self {
            resolver: UrlResolver::new(settings.resolve_timeout),
            pages: PageExtractor::new(settings.fetch_timeout),
            marketplaces: Arc::new(marketplaces),
            marketplace_client: MarketplaceClient::new(settings.marketplace_timeout),
        }
    }

    pub fn from_env() -> eyre::Result<Self> {
        let marketplaces = MarketplaceRegistry::from_env()?;
        Ok(Self::new(&LookupSettings::from_env(), marketplaces))
    }

    pub fn marketplaces(&self) -> &MarketplaceRegistry {
        &self.marketplaces
    }

    pub fn validate(raw: &str) -> Result<Url, PipelineError> {
        let url = Url::parse(raw.trim())
            .map_err(|_| PipelineError::invalid_input("validate", INVALID_URL))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(PipelineError::invalid_input("validate", INVALID_URL));
        }
        Ok(url)
    }

    pub async fn run(&self, raw_url: &str) -> Result<LookupResponse, PipelineError> {
        let original = Self::validate(raw_url)?;
        let resolved = timed("resolve", self.resolver.resolve(&original)).await;

        if let Some(marketplace) = self.marketplaces.detect(&original, &resolved) {
            let lookup = timed(
                "marketplace",
                self.marketplace_client.lookup(marketplace, &resolved),
            )
            .await;
            match lookup {
                Ok(ItemLookup::Found(record)) if !record.is_empty() => {
                    let source = LookupSource::Marketplace(marketplace.name().to_string());
                    info!(target = "linkmeta.pipeline", source = %source, "lookup_resolved");
                    crate::metrics::lookup_outcome(source.metric_label());
                    return Ok(LookupResponse::Record(record));
                }
                Ok(ItemLookup::Found(_)) => {
                    debug!(
                        target = "linkmeta.pipeline",
                        marketplace = %marketplace.name(),
                        "marketplace_item_empty"
                    );
                }
                Ok(ItemLookup::NotApplicable) => {
                    debug!(
                        target = "linkmeta.pipeline",
                        marketplace = %marketplace.name(),
                        "marketplace_not_applicable"
                    );
                }
                Ok(ItemLookup::Unavailable { status }) => {
                    info!(
                        target = "linkmeta.pipeline",
                        marketplace = %marketplace.name(),
                        status,
                        "marketplace_item_unavailable"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "linkmeta.pipeline",
                        marketplace = %marketplace.name(),
                        error = %err,
                        "marketplace_lookup_failed"
                    );
                }
            }
        }

        match timed("page", self.pages.fetch(&resolved)).await {
            Ok(record) => {
                let source = LookupSource::Page;
                info!(
                    target = "linkmeta.pipeline",
                    source = %source,
                    url = %resolved,
                    "lookup_resolved"
                );
                crate::metrics::lookup_outcome(source.metric_label());
                Ok(LookupResponse::Record(record))
            }
            Err(err) => {
                info!(
                    target = "linkmeta.pipeline",
                    source = %LookupSource::Page,
                    url = %resolved,
                    error = %err,
                    "page_lookup_failed"
                );
                crate::metrics::lookup_outcome("soft_error");
                Ok(LookupResponse::soft_error(err.to_string()))
            }
        }
    }
}

/// Which path produced the record returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupSource {
    Marketplace(String),
    Page,
}

impl LookupSource {
    pub fn metric_label(&self) -> &'static str {
        match self {
            LookupSource::Marketplace(_) => "marketplace",
            LookupSource::Page => "page",
        }
    }
}

impl fmt::Display for LookupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupSource::Marketplace(name) => write!(f, "marketplace:{name}"),
            LookupSource::Page => f.write_str("page"),
        }
    }
}

async fn timed<T, Fut>(stage: &'static str, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let started = Instant::now();
    let out = fut.await;
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(stage, elapsed_ms);
    debug!(
        target = "linkmeta.pipeline",
        stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_complete"
    );
    out
}

/// A request the pipeline refuses to run. Carries the caller-facing message.
#[derive(Debug, Error)]
#[error("stage `{stage}` rejected input: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}
