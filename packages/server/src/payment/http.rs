use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    PaymentError, PaymentFacilitator, PaymentPayload, PaymentRequirements, SettleResponse,
    VerifyResponse, X402_VERSION,
};
use crate::config::PaymentConfig;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequest<'a> {
    x402_version: u8,
    payment_payload: &'a PaymentPayload,
    payment_requirements: &'a PaymentRequirements,
}

/// Facilitator reached over its REST interface (`POST /verify`, `POST /settle`).
#[derive(Debug, Clone)]
pub struct HttpFacilitator {
    client: Client,
    base_url: String,
}

impl HttpFacilitator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PaymentConfig) -> Result<Self, PaymentError> {
        Self::new(
            config.facilitator_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn call<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        payment: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<R, PaymentError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, network = %requirements.network, "Calling facilitator");

        let response = self
            .client
            .post(&url)
            .json(&FacilitatorRequest {
                x402_version: X402_VERSION,
                payment_payload: payment,
                payment_requirements: requirements,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentFacilitator for HttpFacilitator {
    async fn verify(
        &self,
        payment: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError> {
        self.call("verify", payment, requirements).await
    }

    async fn settle(
        &self,
        payment: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError> {
        self.call("settle", payment, requirements).await
    }
}
