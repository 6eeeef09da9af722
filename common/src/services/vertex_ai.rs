use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{configuration::VertexAiSettings, helper::error_chain_fmt};

/// Status carried by Google APIs when a quota is exceeded, in the body of a 429 response
/// and sometimes of other error responses
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// HTTP client for the publisher models hosted on Vertex AI
///
/// Cheap to clone: `reqwest::Client` shares its connection pool between clones.
#[derive(Clone)]
pub struct VertexAiClient {
    http_client: Client,
    settings: VertexAiSettings,
}

impl VertexAiClient {
    pub fn try_new(settings: &VertexAiSettings) -> Result<Self, RemoteCallError> {
        let http_client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &VertexAiSettings {
        &self.settings
    }

    fn access_token(&self) -> &Secret<String> {
        &self.settings.access_token
    }

    /// Calls a method of a publisher model, ex: `generateContent` or `predict`
    ///
    /// Quota errors are returned as `RemoteCallError::RateLimited` so callers can retry them.
    #[tracing::instrument(name = "Calling Vertex AI model", skip(self, body))]
    pub async fn call_model<Req, Res>(
        &self,
        model: &str,
        method: &str,
        body: &Req,
    ) -> Result<Res, RemoteCallError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(self.settings.model_endpoint(model, method))
            .bearer_auth(self.access_token().expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).to_string();
            return Err(RemoteCallError::from_status(status, message));
        }

        debug!(status = status.as_u16(), "Vertex AI model answered");

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(thiserror::Error)]
pub enum RemoteCallError {
    #[error("Remote service is rate limited ({status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Remote service answered with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to reach remote service")]
    Transport(#[from] reqwest::Error),

    #[error("Remote service answered with an unexpected body")]
    InvalidResponse(#[from] serde_json::Error),
}

impl RemoteCallError {
    pub fn from_status(status: StatusCode, message: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || message.contains(RESOURCE_EXHAUSTED) {
            Self::RateLimited {
                status: status.as_u16(),
                message,
            }
        } else {
            Self::Status {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Whether the call is worth retrying after a backoff
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl std::fmt::Debug for RemoteCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
