use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::models::RawCompany;
use crate::cnpj::Cnpj;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry did not answer within {0:?}")]
    Timeout(Duration),
    #[error("registry returned HTTP {status}")]
    Upstream { status: u16 },
    #[error("registry request failed: {0}")]
    Transport(String),
    #[error("registry payload could not be decoded: {0}")]
    Decode(String),
}

impl RegistryError {
    /// Whether a fresh attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Timeout(_) | RegistryError::Transport(_))
    }
}

/// Outbound lookup against the company registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch(&self, cnpj: &Cnpj) -> Result<RawCompany, RegistryError>;
}

/// `GET {base_url}/cnpj/{id}` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::constants::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url_for(&self, cnpj: &Cnpj) -> String {
        format!("{}/cnpj/{}", self.base_url, cnpj)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch(&self, cnpj: &Cnpj) -> Result<RawCompany, RegistryError> {
        let url = self.url_for(cnpj);
        tracing::debug!("GET {}", url);

        let request = async {
            let response = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| RegistryError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RegistryError::Upstream {
                    status: status.as_u16(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| RegistryError::Transport(e.to_string()))?;

            serde_json::from_slice::<RawCompany>(&body)
                .map_err(|e| RegistryError::Decode(e.to_string()))
        };

        // Dropping the request future on expiry aborts the in-flight call.
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Registry lookup for {} timed out after {:?}", cnpj, self.timeout);
                Err(RegistryError::Timeout(self.timeout))
            }
        }
    }
}
