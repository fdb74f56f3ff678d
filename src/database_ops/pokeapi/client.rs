use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Anything that can hand back the raw payload for a numeric id.
///
/// `None` covers every miss (404, other statuses, transport errors); the
/// caller skips the id either way.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn fetch(&self, id: u32) -> Option<Value>;
}

/// Client for one PokeAPI resource (`pokemon`, `move`).
#[derive(Debug, Clone)]
pub struct PokeApiClient {
    base_url: String,
    resource: String,
    http: Client,
}

impl PokeApiClient {
    pub fn new(base_url: Option<&str>, resource: &str, timeout_secs: Option<u64>) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let http = Client::builder()
            .user_agent(concat!("pokeseed/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            resource: resource.trim_matches('/').to_string(),
            http,
        })
    }

    pub fn url_for(&self, id: u32) -> String {
        format!("{}/{}/{}", self.base_url, self.resource, id)
    }
}

#[async_trait]
impl EntitySource for PokeApiClient {
    async fn fetch(&self, id: u32) -> Option<Value> {
        let url = self.url_for(id);
        debug!(%url, "GET");
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(resource = %self.resource, id, error = %e, "network error fetching entity");
                return None;
            }
        };

        match resp.status() {
            StatusCode::OK => match resp.json::<Value>().await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(resource = %self.resource, id, error = %e, "response body is not valid JSON");
                    None
                }
            },
            StatusCode::NOT_FOUND => {
                info!(resource = %self.resource, id, "entity not found (404)");
                None
            }
            status => {
                warn!(resource = %self.resource, id, %status, "unexpected HTTP status");
                None
            }
        }
    }
}
