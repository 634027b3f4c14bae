use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use super::events::ChargeData;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Paystack secret key not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Paystack API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Paystack rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units.
    pub amount: i64,
    pub reference: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProviderBalance {
    pub currency: String,
    /// Minor units.
    pub balance: i64,
}

/// Provider operations the service depends on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> Result<InitializedTransaction, GatewayError>;

    async fn verify_transaction(&self, reference: &str) -> Result<ChargeData, GatewayError>;

    async fn fetch_balance(&self) -> Result<Vec<ProviderBalance>, GatewayError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

impl PaystackClient {
    pub fn new(base_url: impl Into<String>, secret_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, GatewayError> {
        let key = self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)?;
        Ok(builder.bearer_auth(key))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.authorized(builder)?.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Rejected(format!("missing data: {}", envelope.message)))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> Result<InitializedTransaction, GatewayError> {
        tracing::debug!(reference = %request.reference, amount = request.amount, "Initializing Paystack transaction");
        let url = format!("{}/transaction/initialize", self.base_url);
        self.send(self.http.post(url).json(request)).await
    }

    async fn verify_transaction(&self, reference: &str) -> Result<ChargeData, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        self.send(self.http.get(url)).await
    }

    async fn fetch_balance(&self) -> Result<Vec<ProviderBalance>, GatewayError> {
        let url = format!("{}/balance", self.base_url);
        self.send(self.http.get(url)).await
    }
}
