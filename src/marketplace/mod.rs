pub mod auth;
pub mod config;
pub mod item;

pub use auth::TokenCache;
pub use config::MarketplaceDefinition;
pub use item::ItemLookup;

use crate::http::build_client;
use regex::Regex;
use reqwest::{Client, Url};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("missing client credentials for marketplace `{0}`")]
    MissingCredentials(String),
    #[error("token exchange failed: {0}")]
    Auth(String),
    #[error("item request failed: {0}")]
    Item(String),
}

#[derive(Debug, Error)]
pub enum MarketplaceConfigError {
    #[error("marketplace `{name}` has an invalid item id pattern `{pattern}`: {source}")]
    Pattern {
        name: String,
        pattern: String,
        source: regex::Error,
    },
    #[error("marketplace `{name}` item id pattern `{pattern}` has no capture group for the id")]
    MissingCaptureGroup { name: String, pattern: String },
    #[error("marketplace `{0}` item_path must contain `{{id}}`")]
    ItemPath(String),
}

/// Client id/secret pair. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn from_env(id_key: &str, secret_key: &str) -> Option<Self> {
        let id = std::env::var(id_key).ok().filter(|v| !v.trim().is_empty())?;
        let secret = std::env::var(secret_key)
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self::new(id, secret))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A marketplace definition with its patterns compiled and credentials
/// resolved.
#[derive(Debug, Clone)]
pub struct Marketplace {
    definition: MarketplaceDefinition,
    patterns: Vec<Regex>,
    credentials: Option<Credentials>,
}

impl Marketplace {
    pub fn new(
        definition: MarketplaceDefinition,
        credentials: Option<Credentials>,
    ) -> Result<Self, MarketplaceConfigError> {
        if !definition.item_path.contains("{id}") {
            return Err(MarketplaceConfigError::ItemPath(definition.name.clone()));
        }
        let patterns = definition
            .item_id_patterns
            .iter()
            .map(|pattern| {
                let re = Regex::new(pattern).map_err(|source| MarketplaceConfigError::Pattern {
                    name: definition.name.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
                // group 1 carries the id
                if re.captures_len() < 2 {
                    return Err(MarketplaceConfigError::MissingCaptureGroup {
                        name: definition.name.clone(),
                        pattern: pattern.clone(),
                    });
                }
                Ok(re)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            definition,
            patterns,
            credentials,
        })
    }

    /// Credentials are read from the env vars the definition names.
    pub fn from_definition(
        definition: MarketplaceDefinition,
    ) -> Result<Self, MarketplaceConfigError> {
        let credentials =
            Credentials::from_env(&definition.client_id_env, &definition.client_secret_env);
        Self::new(definition, credentials)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &MarketplaceDefinition {
        &self.definition
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}{}",
            self.definition.api_root.trim_end_matches('/'),
            self.definition.token_path
        )
    }

    pub fn owns_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.definition.domains.iter().any(|domain| {
            let domain = domain.trim().to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        })
    }

    /// First pattern to match wins.
    pub fn item_id(&self, url: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(url)?.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Known marketplaces, in lookup precedence order.
#[derive(Debug, Clone, Default)]
pub struct MarketplaceRegistry {
    marketplaces: Vec<Marketplace>,
}

impl MarketplaceRegistry {
    pub fn new(marketplaces: Vec<Marketplace>) -> Self {
        Self { marketplaces }
    }

    /// Built-in definitions, replaced wholesale by `MARKETPLACES_FILE` when set.
    pub fn from_env() -> eyre::Result<Self> {
        use eyre::WrapErr;

        let definitions = match std::env::var("MARKETPLACES_FILE") {
            Ok(path) if !path.trim().is_empty() => {
                let raw = std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("reading marketplaces file {path}"))?;
                config::parse_definitions(&raw)
                    .wrap_err_with(|| format!("parsing marketplaces file {path}"))?
            }
            _ => vec![config::ebay_definition()],
        };
        let marketplaces = definitions
            .into_iter()
            .map(Marketplace::from_definition)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(marketplaces))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marketplace> {
        self.marketplaces.iter()
    }

    /// Both the submitted and the resolved URL are checked, so a marketplace
    /// link is still recognised when redirect resolution failed.
    pub fn detect(&self, original: &Url, resolved: &Url) -> Option<&Marketplace> {
        self.marketplaces
            .iter()
            .find(|m| m.owns_host(resolved) || m.owns_host(original))
    }
}

/// Authenticated item lookups against marketplace catalog APIs.
#[derive(Clone)]
pub struct MarketplaceClient {
    http: Client,
    tokens: TokenCache,
}

impl MarketplaceClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            tokens: TokenCache::default(),
        }
    }

    pub async fn lookup(
        &self,
        marketplace: &Marketplace,
        url: &Url,
    ) -> Result<ItemLookup, MarketplaceError> {
        let Some(item_id) = marketplace.item_id(url.as_str()) else {
            debug!(
                target = "linkmeta.marketplace",
                marketplace = %marketplace.name(),
                url = %url,
                "no_item_id_in_url"
            );
            return Ok(ItemLookup::NotApplicable);
        };
        let credentials = marketplace
            .credentials
            .as_ref()
            .ok_or_else(|| MarketplaceError::MissingCredentials(marketplace.name().to_string()))?;

        let token = self.tokens.token(&self.http, marketplace, credentials).await?;
        debug!(
            target = "linkmeta.marketplace",
            marketplace = %marketplace.name(),
            item_id = %item_id,
            "fetching_item"
        );
        item::fetch_item(&self.http, marketplace, &item_id, &token).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// eBay-shaped marketplace pointed at a test server.
    pub(crate) fn definition_for(api_root: &str, domain: &str) -> MarketplaceDefinition {
        MarketplaceDefinition {
            name: "ebay".to_string(),
            domains: vec![domain.to_string()],
            api_root: api_root.to_string(),
            ..config::ebay_definition()
        }
    }

    pub(crate) fn marketplace_for(api_root: &str, domain: &str) -> Marketplace {
        Marketplace::new(
            definition_for(api_root, domain),
            Some(Credentials::new("client-id", "client-secret")),
        )
        .expect("valid test marketplace")
    }
}
