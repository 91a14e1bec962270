use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::warn;

/// Many marketplaces refuse the default client identifiers, so every outbound
/// request to a product page presents itself as a search-engine crawler.
pub const RESOLVER_USER_AGENT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1)";
pub const CRAWLER_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

const MAX_REDIRECTS: usize = 10;

pub fn build_client(timeout: Duration) -> Client {
    let connect = env_duration_secs("HTTP_CONNECT_TIMEOUT_SECS", 5).min(timeout);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .unwrap_or_else(|err| {
            warn!(
                target = "linkmeta.http",
                error = %err,
                timeout_secs = timeout.as_secs(),
                "http client build failed; retrying with request timeout only"
            );
            Client::builder().timeout(timeout).build().unwrap_or_default()
        })
}

pub fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn client_enforces_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = build_client(Duration::from_millis(300))
            .get(server.uri())
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn client_stops_after_redirect_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/loop"),
            )
            .mount(&server)
            .await;

        let err = build_client(Duration::from_secs(2))
            .get(format!("{}/loop", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_redirect());
    }

    #[test]
    fn env_duration_defaults_when_unset() {
        assert_eq!(
            env_duration_secs("LINKMETA_TEST_UNSET_TIMEOUT", 7),
            Duration::from_secs(7)
        );
    }
}
