// src/client.rs

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    models::test_instance::{SubmitTestRequest, SubmitTestResponse, TestView},
    session::{BackendError, TestBackend},
};

/// Error body produced by the API (`{"error": ..., "code": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// `TestBackend` over the HTTP API, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTestBackend {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpTestBackend {
    /// `base_url` may carry a path prefix (`https://host/quiz`); endpoints
    /// resolve below it.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Transport(format!("invalid base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    /// Signs in and keeps the issued token.
    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<Self, BackendError> {
        let mut backend = Self::new(base_url, String::new())?;
        let response = backend
            .http
            .post(backend.endpoint("api/auth/login")?)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(transport)?;

        let login: LoginResponse = read_json(response).await?;
        backend.token = login.token;
        Ok(backend)
    }

    /// `path` is relative (no leading `/`) so the base prefix is kept.
    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Transport(format!("invalid path {}: {}", path, e)))
    }
}

#[async_trait]
impl TestBackend for HttpTestBackend {
    async fn fetch_test(&self, instance_id: i64) -> Result<TestView, BackendError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/tests/{}", instance_id))?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn submit_test(
        &self,
        instance_id: i64,
        request: &SubmitTestRequest,
    ) -> Result<SubmitTestResponse, BackendError> {
        let response = self
            .http
            .post(self.endpoint(&format!("api/tests/{}/submit", instance_id))?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport);
    }

    let body = response.json::<ErrorBody>().await.ok();
    Err(classify(status, body))
}

fn classify(status: StatusCode, body: Option<ErrorBody>) -> BackendError {
    let code = body.as_ref().and_then(|b| b.code.as_deref());
    match (status, code) {
        (StatusCode::NOT_FOUND, _) => BackendError::NotFound,
        (StatusCode::UNAUTHORIZED, _) => BackendError::Unauthorized,
        (StatusCode::CONFLICT, Some("already_completed")) => BackendError::AlreadyCompleted,
        _ => BackendError::Rejected {
            status: status.as_u16(),
            message: body
                .map(|b| b.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
        },
    }
}
