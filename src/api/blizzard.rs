//! Blizzard Game Data API client.
//!
//! OAuth2 client-credentials flow with a cached token, per-realm auction
//! snapshots, item metadata and item media (icons), and connected-realm
//! lookup. All requests retry with exponential backoff on 429/5xx and
//! transport errors; a 401 discards the cached token and retries.
//!
//! Auctions: GET /data/wow/connected-realm/{id}/auctions (dynamic ns)
//! Items:    GET /data/wow/item/{id} (static ns)
//! Media:    GET /data/wow/media/item/{id} (static ns)
//! Token:    POST https://{region}.battle.net/oauth/token

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::AuctionSource;
use crate::types::{AuctionListing, Item, ItemId, ItemQuality, Realm, RealmId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SOURCE_NAME: &str = "blizzard";

/// Maximum retries per request.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

/// Refresh the token this long before its actual expiry.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// API response types (Blizzard JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct AuctionsResponse {
    #[serde(default)]
    auctions: Vec<RawAuction>,
}

/// One auction row. Non-commodity listings carry `buyout`; commodity
/// listings carry a per-unit `unit_price` instead.
#[derive(Debug, Deserialize)]
struct RawAuction {
    id: u64,
    item: RawAuctionItem,
    #[serde(default)]
    buyout: u64,
    #[serde(default)]
    unit_price: u64,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawAuctionItem {
    id: ItemId,
}

impl RawAuction {
    /// Total buyout in copper; zero means bid-only.
    fn effective_buyout(&self) -> u64 {
        if self.buyout > 0 {
            self.buyout
        } else {
            self.unit_price * self.quantity as u64
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: ItemId,
    name: String,
    quality: RawTyped,
    item_class: RawNamed,
    item_subclass: RawNamed,
    #[serde(default)]
    expansion_id: u32,
}

#[derive(Debug, Deserialize)]
struct RawTyped {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawConnectedRealm {
    id: RealmId,
    #[serde(default)]
    realms: Vec<RawRealmEntry>,
}

#[derive(Debug, Deserialize)]
struct RawRealmEntry {
    name: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Blizzard Game Data API client for one region.
pub struct BlizzardClient {
    http: Client,
    region: String,
    locale: String,
    client_id: String,
    client_secret: SecretString,
    token: Mutex<Option<CachedToken>>,
}

impl BlizzardClient {
    /// Create a new client. Credentials come from the env vars named in
    /// the config; the secret never appears in logs.
    pub fn new(
        region: &str,
        locale: &str,
        client_id: String,
        client_secret: SecretString,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent("SNIPEWATCH/0.1.0 (auction-snipe-agent)")
            .build()
            .context("Failed to build HTTP client for Blizzard API")?;

        Ok(Self {
            http,
            region: region.to_string(),
            locale: locale.to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    // -- URL helpers -----------------------------------------------------

    fn token_url(&self) -> String {
        format!("https://{}.battle.net/oauth/token", self.region)
    }

    fn api_base(&self) -> String {
        format!("https://{}.api.blizzard.com", self.region)
    }

    fn auctions_url(&self, realm: RealmId) -> String {
        format!(
            "{}/data/wow/connected-realm/{realm}/auctions?namespace=dynamic-{}&locale={}",
            self.api_base(),
            self.region,
            self.locale,
        )
    }

    fn item_url(&self, item: ItemId) -> String {
        format!(
            "{}/data/wow/item/{item}?namespace=static-{}&locale={}",
            self.api_base(),
            self.region,
            self.locale,
        )
    }

    fn item_media_url(&self, item: ItemId) -> String {
        format!(
            "{}/data/wow/media/item/{item}?namespace=static-{}&locale={}",
            self.api_base(),
            self.region,
            self.locale,
        )
    }

    fn connected_realm_url(&self, realm: RealmId) -> String {
        format!(
            "{}/data/wow/connected-realm/{realm}?namespace=dynamic-{}&locale={}",
            self.api_base(),
            self.region,
            self.locale,
        )
    }

    // -- Token handling --------------------------------------------------

    /// Return a valid access token, requesting a new one if the cached
    /// token is absent or close to expiry.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("Requesting new Blizzard OAuth token");
        let resp = self
            .http
            .post(self.token_url())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Blizzard token request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Blizzard token endpoint error {status}: {body}");
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse Blizzard token response")?;

        let expires_at = Utc::now()
            + ChronoDuration::seconds((token.expires_in - TOKEN_EXPIRY_SLACK_SECS).max(0));
        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        Ok(access)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    // -- Request plumbing ------------------------------------------------

    /// Authenticated GET with retry + exponential backoff.
    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, what, "Retrying Blizzard API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let token = self.access_token().await?;
            let resp = self.http.get(url).bearer_auth(&token).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("Failed to parse {what} response"));
                    }

                    // Token rejected server-side — discard and retry.
                    if status.as_u16() == 401 {
                        self.invalidate_token().await;
                        last_error = Some("HTTP 401: token rejected".to_string());
                        continue;
                    }

                    // Retryable: 429 (rate limit) and 5xx.
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let body = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, what, "Retryable Blizzard API error");
                        last_error = Some(format!("HTTP {status}: {body}"));
                        continue;
                    }

                    // Non-retryable error.
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Blizzard API error for {what}: {status}: {body}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, what, "Blizzard request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        anyhow::bail!(
            "Blizzard API {what} failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl AuctionSource for BlizzardClient {
    async fn fetch_auctions(&self, realm: RealmId) -> Result<Vec<AuctionListing>> {
        let url = self.auctions_url(realm);
        debug!(realm, "Fetching auction snapshot");
        let resp: AuctionsResponse = self
            .get_with_retry(&url, &format!("auctions realm {realm}"))
            .await?;

        let seen_at = Utc::now();
        let listings = resp
            .auctions
            .into_iter()
            .map(|raw| AuctionListing {
                auction_id: raw.id,
                item_id: raw.item.id,
                realm_id: realm,
                buyout: raw.effective_buyout(),
                quantity: raw.quantity,
                seen_at,
            })
            .collect();
        Ok(listings)
    }

    async fn fetch_item(&self, item: ItemId) -> Result<Item> {
        let raw: RawItem = self
            .get_with_retry(&self.item_url(item), &format!("item {item}"))
            .await?;

        let quality = ItemQuality::from_str(&raw.quality.kind)
            .with_context(|| format!("Item {item} has unknown quality"))?;

        // Icon lookup failure is not worth losing the item over.
        let icon_url = match self
            .get_with_retry::<RawMedia>(&self.item_media_url(item), &format!("item media {item}"))
            .await
        {
            Ok(media) => media
                .assets
                .into_iter()
                .find(|a| a.key == "icon")
                .map(|a| a.value),
            Err(e) => {
                warn!(item_id = item, error = %e, "Item media fetch failed");
                None
            }
        };

        Ok(Item {
            id: raw.id,
            name: raw.name,
            item_class: raw.item_class.name,
            item_subclass: raw.item_subclass.name,
            quality,
            expansion_id: raw.expansion_id,
            icon_url,
        })
    }

    async fn fetch_realm(&self, realm: RealmId) -> Result<Realm> {
        let raw: RawConnectedRealm = self
            .get_with_retry(&self.connected_realm_url(realm), &format!("realm {realm}"))
            .await?;

        // A connected realm groups several game realms; join their names.
        let name = if raw.realms.is_empty() {
            format!("Realm {}", raw.id)
        } else {
            raw.realms
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(" / ")
        };

        Ok(Realm {
            id: raw.id,
            name,
            region: self.region.clone(),
        })
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
