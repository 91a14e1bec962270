use serde::Deserialize;
use std::env;

/// Declarative description of a marketplace whose catalog API can resolve
/// item pages. Adding a marketplace means adding one of these, either to the
/// built-in list or to the YAML file named by `MARKETPLACES_FILE`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceDefinition {
    pub name: String,
    /// Hosts owned by the marketplace; subdomains match too.
    pub domains: Vec<String>,
    pub api_root: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    pub scope: String,
    /// Sent as `X-EBAY-C-MARKETPLACE-ID` on item requests.
    pub region: String,
    /// Item resource path; `{id}` is replaced by the percent-encoded
    /// item reference.
    pub item_path: String,
    /// Composite identifier the API expects; `{id}` is the id from the URL.
    #[serde(default = "default_item_reference")]
    pub item_reference: String,
    /// Regexes tried in order against the full URL; capture group 1 is the id.
    pub item_id_patterns: Vec<String>,
    pub client_id_env: String,
    pub client_secret_env: String,
}

#[derive(Debug, Deserialize)]
struct MarketplaceFile {
    marketplaces: Vec<MarketplaceDefinition>,
}

fn default_item_reference() -> String {
    "{id}".to_string()
}

fn default_token_path() -> String {
    "/identity/v1/oauth2/token".to_string()
}

pub fn ebay_api_root() -> String {
    let ebay_env = env::var("EBAY_ENV").unwrap_or_else(|_| "PROD".to_string());
    if ebay_env.eq_ignore_ascii_case("SANDBOX") {
        "https://api.sandbox.ebay.com".to_string()
    } else {
        "https://api.ebay.com".to_string()
    }
}

pub fn ebay_definition() -> MarketplaceDefinition {
    MarketplaceDefinition {
        name: "ebay".to_string(),
        domains: vec!["ebay.com".to_string(), "ebay.us".to_string()],
        api_root: ebay_api_root(),
        token_path: default_token_path(),
        scope: "https://api.ebay.com/oauth/api_scope".to_string(),
        region: "EBAY_US".to_string(),
        item_path: "/buy/browse/v1/item/{id}".to_string(),
        item_reference: "v1|{id}|0".to_string(),
        item_id_patterns: vec![
            r"/itm/(?:[^/]+/)?(\d+)".to_string(),
            r"item=(\d+)".to_string(),
            r"/(\d{10,13})(?:\?|$)".to_string(),
        ],
        client_id_env: "EBAY_CLIENT_ID".to_string(),
        client_secret_env: "EBAY_CLIENT_SECRET".to_string(),
    }
}

pub fn parse_definitions(raw: &str) -> Result<Vec<MarketplaceDefinition>, serde_yaml::Error> {
    let file: MarketplaceFile = serde_yaml::from_str(raw)?;
    Ok(file.marketplaces)
}
