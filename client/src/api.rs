//! REST session client.
//!
//! DESIGN
//! ======
//! Each function maps one resource action to one HTTP call and returns the
//! decoded body. No retries, no caching — callers decide what to do with
//! failures. The store depends on the [`SessionApi`] / [`HistoryApi`] traits
//! rather than on [`HttpApi`] directly so tests can supply doubles.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::types::{
    AuthResponse, CoupleHistoryResponse, FinishSessionRequest, HistoryListResponse, InviteResponse,
    LoginRequest, PhotoUpload, Session, SessionPoint, SessionStatusResponse, SignupRequest, User,
};

/// The session resource collection, as the store consumes it.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self) -> Result<Session, ClientError>;
    async fn accept_session(&self, session_id: i64) -> Result<Session, ClientError>;
    async fn session_status(&self, session_id: i64) -> Result<SessionStatusResponse, ClientError>;
    async fn session_history(&self, session_id: i64) -> Result<Vec<SessionPoint>, ClientError>;
    async fn finish_session(
        &self,
        session_id: i64,
        request: FinishSessionRequest,
    ) -> Result<(), ClientError>;
    async fn upload_photo(
        &self,
        session_id: i64,
        upload: PhotoUpload,
    ) -> Result<SessionPoint, ClientError>;
}

/// The couple-wide story/history surface.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn couple_history(&self) -> Result<CoupleHistoryResponse, ClientError>;
    async fn session_couple_history(
        &self,
        session_id: i64,
    ) -> Result<CoupleHistoryResponse, ClientError>;
    async fn history_list(&self) -> Result<HistoryListResponse, ClientError>;
}

/// `reqwest`-backed implementation of the REST surface.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Build an API client. The configured bearer token, if any, is attached
    /// to every request.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            } else {
                tracing::warn!("auth token is not a valid header value; sending unauthenticated");
            }
        }
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_owned() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status: status.as_u16(), body })
    }

    // -- auth / users / couples ----------------------------------------------

    /// `POST /auth/signup`.
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse, ClientError> {
        let response = self.client.post(self.url("/auth/signup")).json(request).send().await?;
        Self::decode(response).await
    }

    /// `POST /auth/login`.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ClientError> {
        let response = self.client.post(self.url("/auth/login")).json(request).send().await?;
        Self::decode(response).await
    }

    /// `GET /users/me`.
    pub async fn me(&self) -> Result<User, ClientError> {
        let response = self.client.get(self.url("/users/me")).send().await?;
        Self::decode(response).await
    }

    /// `POST /couples/invite-code`.
    pub async fn create_invite_code(&self) -> Result<InviteResponse, ClientError> {
        let response = self.client.post(self.url("/couples/invite-code")).send().await?;
        Self::decode(response).await
    }

    /// `POST /couples/join`.
    pub async fn join_invite_code(&self, code: &str) -> Result<InviteResponse, ClientError> {
        let response = self
            .client
            .post(self.url("/couples/join"))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `GET /sessions`.
    pub async fn sessions(&self) -> Result<Vec<Session>, ClientError> {
        let response = self.client.get(self.url("/sessions")).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl SessionApi for HttpApi {
    async fn create_session(&self) -> Result<Session, ClientError> {
        let response = self.client.post(self.url("/sessions")).send().await?;
        Self::decode(response).await
    }

    async fn accept_session(&self, session_id: i64) -> Result<Session, ClientError> {
        let response =
            self.client.post(self.url(&format!("/sessions/{session_id}/accept"))).send().await?;
        Self::decode(response).await
    }

    async fn session_status(&self, session_id: i64) -> Result<SessionStatusResponse, ClientError> {
        let response =
            self.client.get(self.url(&format!("/sessions/{session_id}/status"))).send().await?;
        Self::decode(response).await
    }

    async fn session_history(&self, session_id: i64) -> Result<Vec<SessionPoint>, ClientError> {
        let response =
            self.client.get(self.url(&format!("/sessions/{session_id}/history"))).send().await?;
        let body: crate::types::SessionHistoryResponse = Self::decode(response).await?;
        Ok(body.points)
    }

    async fn finish_session(
        &self,
        session_id: i64,
        request: FinishSessionRequest,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/sessions/{session_id}/finish")))
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_photo(
        &self,
        session_id: i64,
        upload: PhotoUpload,
    ) -> Result<SessionPoint, ClientError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        let mut form = reqwest::multipart::Form::new().part("photo", part);
        if let Some(text) = upload.text {
            form = form.text("text", text);
        }
        let response = self
            .client
            .post(self.url(&format!("/sessions/{session_id}/photos")))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl HistoryApi for HttpApi {
    async fn couple_history(&self) -> Result<CoupleHistoryResponse, ClientError> {
        let response = self.client.get(self.url("/history")).send().await?;
        Self::decode(response).await
    }

    async fn session_couple_history(
        &self,
        session_id: i64,
    ) -> Result<CoupleHistoryResponse, ClientError> {
        let response = self.client.get(self.url(&format!("/history/{session_id}"))).send().await?;
        Self::decode(response).await
    }

    async fn history_list(&self) -> Result<HistoryListResponse, ClientError> {
        let response = self.client.get(self.url("/history/list")).send().await?;
        Self::decode(response).await
    }
}
