//! Workshop name lookups.
//!
//! [`WorkshopLookup`] is the seam between the mod list and whatever can turn a
//! workshop id into a human readable title. [`SteamWorkshopClient`] implements
//! it against the Steam Web API `IPublishedFileService/GetDetails` endpoint.
//!
//! Lookups are best effort: callers treat any [`LookupError`] as "no names"
//! and leave display names unset.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Steam Web API endpoint for published file details.
pub const STEAM_DETAILS_URL: &str =
    "https://api.steampowered.com/IPublishedFileService/GetDetails/v1/";

/// Request timeout for a single details call.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of ids sent in one request.
const MAX_IDS_PER_REQUEST: usize = 100;

/// Errors that can occur during a workshop lookup
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Steam API key not configured")]
    MissingApiKey,

    #[error("Rate limited by the Steam API")]
    RateLimited,

    #[error("Steam API returned HTTP {0}")]
    Status(u16),

    #[error("Steam API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected Steam API response: {0}")]
    InvalidResponse(String),
}

/// Display names keyed by workshop id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResult {
    names: IndexMap<String, String>,
}

impl LookupResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, workshop_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(workshop_id.into(), name.into());
    }

    pub fn get(&self, workshop_id: &str) -> Option<&str> {
        self.names.get(workshop_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LookupResult {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (k, v) in iter {
            result.insert(k, v);
        }
        result
    }
}

/// Resolves workshop ids to display names.
#[async_trait]
pub trait WorkshopLookup: Send + Sync {
    /// Fetch names for `workshop_ids`. Ids without a result are simply absent.
    async fn fetch_names(&self, workshop_ids: &[String]) -> Result<LookupResult, LookupError>;
}

/// Details of one published file as returned by the Steam API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkshopDetails {
    #[serde(default)]
    pub publishedfileid: String,
    #[serde(default)]
    pub result: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file_description: String,
    #[serde(default)]
    pub preview_url: String,
}

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    #[serde(default)]
    response: DetailsResponse,
}

#[derive(Debug, Default, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    publishedfiledetails: Vec<WorkshopDetails>,
}

/// Parse a GetDetails response body, keeping only found items (`result == 1`).
pub fn parse_details_response(body: &str) -> Result<Vec<WorkshopDetails>, LookupError> {
    let envelope: DetailsEnvelope =
        serde_json::from_str(body).map_err(|e| LookupError::InvalidResponse(e.to_string()))?;

    Ok(envelope
        .response
        .publishedfiledetails
        .into_iter()
        .filter(|item| item.result == 1)
        .collect())
}

/// Steam Web API implementation of [`WorkshopLookup`].
pub struct SteamWorkshopClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SteamWorkshopClient {
    /// Create a client for the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LookupError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LookupError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: STEAM_DETAILS_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Query parameters for one request: `key` and `publishedfileids[i]`.
    pub fn build_query(&self, workshop_ids: &[String]) -> Vec<(String, String)> {
        let mut params = vec![("key".to_string(), self.api_key.clone())];
        params.extend(
            workshop_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (format!("publishedfileids[{}]", i), id.clone())),
        );
        params
    }

    /// Fetch details for a batch of workshop ids.
    pub async fn fetch_details(
        &self,
        workshop_ids: &[String],
    ) -> Result<Vec<WorkshopDetails>, LookupError> {
        let mut details = Vec::new();

        for chunk in workshop_ids.chunks(MAX_IDS_PER_REQUEST) {
            tracing::debug!("Requesting details for {} workshop items", chunk.len());

            let response = self
                .client
                .get(&self.endpoint)
                .query(&self.build_query(chunk))
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LookupError::RateLimited);
            }
            if !status.is_success() {
                return Err(LookupError::Status(status.as_u16()));
            }

            let body = response.text().await?;
            details.extend(parse_details_response(&body)?);
        }

        Ok(details)
    }
}

#[async_trait]
impl WorkshopLookup for SteamWorkshopClient {
    async fn fetch_names(&self, workshop_ids: &[String]) -> Result<LookupResult, LookupError> {
        if workshop_ids.is_empty() {
            return Ok(LookupResult::new());
        }

        let details = self.fetch_details(workshop_ids).await?;
        let names: LookupResult = details
            .into_iter()
            .filter(|d| !d.publishedfileid.is_empty() && !d.title.is_empty())
            .map(|d| (d.publishedfileid, d.title))
            .collect();

        tracing::info!(
            "Resolved {} of {} workshop names",
            names.len(),
            workshop_ids.len()
        );
        Ok(names)
    }
}
