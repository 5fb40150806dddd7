//! reqwest-backed HTTP transport

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::TransportConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::payments::traits::{HttpResponse, HttpTransport, OutboundRequest};

/// Sends each request once over a shared [`Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing client, keeping its settings.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: OutboundRequest) -> GatewayResult<HttpResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await.map_err(|e| {
            error!("POST {} failed: {}", request.url, e);
            GatewayError::from(e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!("POST {} answered {} ({} bytes)", request.url, status, body.len());

        Ok(HttpResponse { status, body })
    }
}
