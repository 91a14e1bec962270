use super::{Credentials, Marketplace, MarketplaceError};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, header};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are treated as expired this long before the server says they are.
const EXPIRY_SKEW_SECS: i64 = 60;
const MAX_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TokenKey {
    token_url: String,
    client_id: String,
    scope: String,
}

type Slot = Arc<Mutex<Option<AccessToken>>>;

/// Single-flight cache of client-credentials tokens.
///
/// Each credential set owns a slot whose lock is held across the token
/// exchange, so concurrent lookups for the same marketplace wait on the one
/// in-flight exchange and then reuse its token.
#[derive(Clone, Default)]
pub struct TokenCache {
    slots: Arc<Mutex<HashMap<TokenKey, Slot>>>,
}

impl TokenCache {
    pub async fn token(
        &self,
        http: &Client,
        marketplace: &Marketplace,
        credentials: &Credentials,
    ) -> Result<String, MarketplaceError> {
        let key = TokenKey {
            token_url: marketplace.token_url(),
            client_id: credentials.client_id.clone(),
            scope: marketplace.definition().scope.clone(),
        };
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(key.clone()).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(token) = guard.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.value.clone());
        }

        let fresh = request_token(http, &key, credentials).await?;
        debug!(
            target = "linkmeta.marketplace",
            marketplace = %marketplace.name(),
            expires_at = %fresh.expires_at,
            "access_token_acquired"
        );
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }
}

fn basic_auth_header(credentials: &Credentials) -> String {
    let raw = format!("{}:{}", credentials.client_id, credentials.client_secret);
    format!("Basic {}", BASE64.encode(raw))
}

async fn request_token(
    http: &Client,
    key: &TokenKey,
    credentials: &Credentials,
) -> Result<AccessToken, MarketplaceError> {
    let params = [
        ("grant_type", "client_credentials"),
        ("scope", key.scope.as_str()),
    ];
    let requested_at = Utc::now();
    let response = http
        .post(key.token_url.as_str())
        .header(header::AUTHORIZATION, basic_auth_header(credentials))
        .form(&params)
        .send()
        .await
        .map_err(|err| MarketplaceError::Auth(err.to_string()))?;

    if !response.status().is_success() {
        return Err(MarketplaceError::Auth(format!(
            "HTTP {}",
            response.status()
        )));
    }

    let payload: TokenResponse = response
        .json()
        .await
        .map_err(|err| MarketplaceError::Auth(err.to_string()))?;
    if payload.access_token.trim().is_empty() {
        return Err(MarketplaceError::Auth("empty access_token".into()));
    }

    let lifetime =
        (payload.expires_in.unwrap_or(0) - EXPIRY_SKEW_SECS).clamp(0, MAX_LIFETIME_SECS);
    Ok(AccessToken {
        value: payload.access_token,
        expires_at: requested_at + Duration::seconds(lifetime),
    })
}
