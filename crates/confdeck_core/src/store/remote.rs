//! Blocking HTTP client for the gateway config API.

use super::wire::{
    ApplyRequest, ApplyResponse, ConfigResponse, ErrorBody, HashResponse, SetAllRequest,
};
use super::{ApplyOutcome, DocumentStore, StoreSnapshot};
use crate::error::{FieldError, StoreError};
use crate::version::VersionToken;
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// [`DocumentStore`] backed by a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base: Url,
    http: Client,
}

impl GatewayClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    /// Returns [`StoreError::Unknown`] when the URL cannot be used as an API
    /// base or the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(&normalize_base_url(base_url)).map_err(|err| {
            StoreError::Unknown(format!("Invalid gateway URL '{}': {}", base_url, err))
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Unknown(format!(
                "Gateway URL '{}' cannot be used as an API base",
                base_url
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Unknown(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Probe `GET /health`.
    pub fn health(&self) -> Result<(), StoreError> {
        let response = self.http.get(self.endpoint(&["health"])?).send()?;
        check_status(response).map(|_| ())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StoreError::Unknown("Gateway URL cannot be used as an API base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let response = check_status(response)?;
        response
            .json::<T>()
            .map_err(|err| StoreError::Malformed(format!("Unexpected gateway response: {}", err)))
    }
}

fn normalize_base_url(raw: &str) -> String {
    let mut normalized = raw.trim().to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|err| format!("failed to read error response body: {}", err));
    Err(error_for_response(status, &body))
}

/// Map a non-success gateway response to a [`StoreError`].
pub(crate) fn error_for_response(status: StatusCode, body: &str) -> StoreError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let message = match &parsed {
        Some(parsed) => parsed.error.clone(),
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
        None => body.trim().to_string(),
    };
    debug!("gateway responded {}: {}", status, message);

    match status {
        StatusCode::CONFLICT => StoreError::Conflict,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation {
            message,
            issues: parsed
                .map(|body| body.issues.into_iter().map(FieldError::from).collect())
                .unwrap_or_default(),
        },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            StoreError::Transport(message)
        }
        _ => StoreError::Unknown(format!("{} ({})", message, status)),
    }
}

impl DocumentStore for GatewayClient {
    fn get(&self) -> Result<StoreSnapshot, StoreError> {
        let response = self.http.get(self.endpoint(&["api", "config"])?).send()?;
        let body: ConfigResponse = Self::read_json(response)?;
        Ok(StoreSnapshot {
            document: body.config,
            version: body.hash.map(VersionToken::new),
            path: body.path,
        })
    }

    fn schema(&self) -> Result<Value, StoreError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "config", "schema"])?)
            .send()?;
        Self::read_json(response)
    }

    fn apply(&self, raw: &str, base: &VersionToken) -> Result<ApplyOutcome, StoreError> {
        let request = ApplyRequest {
            raw: raw.to_string(),
            base_hash: base.as_str().to_string(),
        };
        let response = self
            .http
            .post(self.endpoint(&["api", "config", "apply"])?)
            .json(&request)
            .send()?;
        let body: ApplyResponse = Self::read_json(response)?;
        Ok(ApplyOutcome {
            document: body.config,
            version: body.hash.map(VersionToken::new),
        })
    }

    fn set_all(&self, document: &Value) -> Result<(), StoreError> {
        let request = SetAllRequest {
            config: document.clone(),
        };
        let response = self
            .http
            .put(self.endpoint(&["api", "config"])?)
            .json(&request)
            .send()?;
        Self::read_json::<HashResponse>(response).map(|_| ())
    }

    fn reload(&self) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.endpoint(&["api", "config", "reload"])?)
            .send()?;
        Self::read_json::<HashResponse>(response).map(|_| ())
    }
}
