//! # minhchung HTTP Client
//!
//! Typed wrapper around the evidence-code endpoints of a running server.

use crate::api::{
    ApiResponse, EvidenceCodeDto, GenerateRequest, HealthResponse, ListData, ListQuery,
    UpdateRequest,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from the HTTP client layer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cannot connect to minhchung at {0}")]
    ConnectionFailed(String),

    #[error("Unauthorized: invalid or missing token")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited: too many requests")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    /// 4xx other than the above, with the server's message.
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// HTTP client for the evidence-code API.
#[derive(Clone)]
pub struct MinhChungClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for MinhChungClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinhChungClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MinhChungClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
        req.send()
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    /// Map failure statuses to errors, then unwrap the envelope's `data`.
    async fn envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
                StatusCode::FORBIDDEN => ClientError::Forbidden(message),
                StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
                StatusCode::NOT_FOUND => ClientError::NotFound(message),
                s if s.is_server_error() => ClientError::ServerError(s.as_u16(), message),
                s => ClientError::Rejected {
                    status: s.as_u16(),
                    message,
                },
            });
        }

        let body: ApiResponse<T> =
            serde_json::from_str(&text).map_err(|e| ClientError::ParseError(e.to_string()))?;
        match (body.success, body.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(ClientError::ParseError(
                body.message
                    .unwrap_or_else(|| "response carried no data".to_string()),
            )),
        }
    }

    /// GET /health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.send(self.request(Method::GET, "/health")).await?;
        if !resp.status().is_success() {
            return Err(ClientError::ServerError(
                resp.status().as_u16(),
                "health check failed".to_string(),
            ));
        }
        resp.json()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))
    }

    /// POST /evidence-codes/generate
    pub async fn generate(&self, request: &GenerateRequest) -> Result<EvidenceCodeDto, ClientError> {
        let req = self
            .request(Method::POST, "/evidence-codes/generate")
            .json(request);
        Self::envelope(self.send(req).await?).await
    }

    /// GET /evidence-codes
    pub async fn list(&self, query: &ListQuery) -> Result<ListData<EvidenceCodeDto>, ClientError> {
        let req = self.request(Method::GET, "/evidence-codes").query(query);
        Self::envelope(self.send(req).await?).await
    }

    /// GET /evidence-codes/{id}
    pub async fn get(&self, id: u64) -> Result<EvidenceCodeDto, ClientError> {
        let req = self.request(Method::GET, &format!("/evidence-codes/{id}"));
        Self::envelope(self.send(req).await?).await
    }

    /// GET /evidence-codes/by-code/{code}
    pub async fn get_by_code(&self, code: &str) -> Result<EvidenceCodeDto, ClientError> {
        let req = self.request(Method::GET, &format!("/evidence-codes/by-code/{}", code.trim()));
        Self::envelope(self.send(req).await?).await
    }

    /// PUT /evidence-codes/{id}
    pub async fn update(
        &self,
        id: u64,
        request: &UpdateRequest,
    ) -> Result<EvidenceCodeDto, ClientError> {
        let req = self
            .request(Method::PUT, &format!("/evidence-codes/{id}"))
            .json(request);
        Self::envelope(self.send(req).await?).await
    }

    /// DELETE /evidence-codes/{id}
    pub async fn delete(&self, id: u64) -> Result<EvidenceCodeDto, ClientError> {
        let req = self.request(Method::DELETE, &format!("/evidence-codes/{id}"));
        Self::envelope(self.send(req).await?).await
    }
}
