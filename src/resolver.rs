use crate::http::{RESOLVER_USER_AGENT, build_client};
use reqwest::{Client, Url, header};
use std::time::Duration;
use tracing::debug;

/// Follows redirects (short links, tracking hops) to the canonical product
/// URL. Best effort: any failure hands back the input URL.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    http: Client,
}

impl UrlResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
        }
    }

    pub async fn resolve(&self, url: &Url) -> Url {
        let result = self
            .http
            .head(url.clone())
            .header(header::USER_AGENT, RESOLVER_USER_AGENT)
            .send()
            .await;

        match result {
            Ok(response) => {
                let resolved = response.url().clone();
                if resolved != *url {
                    debug!(
                        target = "linkmeta.resolver",
                        from = %url,
                        to = %resolved,
                        status = response.status().as_u16(),
                        "redirect_resolved"
                    );
                }
                resolved
            }
            Err(err) => {
                debug!(
                    target = "linkmeta.resolver",
                    url = %url,
                    error = %err,
                    "resolve_failed_using_original"
                );
                url.clone()
            }
        }
    }
}
