use std::time::Duration;

use dualmode_common::{EntityId, EntityState, ServiceCall};
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("home assistant rejected the access token")]
    Unauthorized,
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// Thin client for the Home Assistant REST API.
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HomeAssistantClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Self::DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// `Ok(None)` when the entity does not exist (yet).
    pub async fn fetch_state(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<EntityState>, ClientError> {
        let url = format!("{}/api/states/{entity_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<EntityState>().await?)),
            status => Err(status_error(status, url)),
        }
    }

    pub async fn call_service(&self, call: &ServiceCall) -> Result<(), ClientError> {
        let url = format!(
            "{}/api/services/{}/{}",
            self.base_url, call.domain, call.service
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&call.data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }
        Ok(())
    }
}

fn status_error(status: StatusCode, url: String) -> ClientError {
    if status == StatusCode::UNAUTHORIZED {
        return ClientError::Unauthorized;
    }
    ClientError::Status {
        status: status.as_u16(),
        url,
    }
}
