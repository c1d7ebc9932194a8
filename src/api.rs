use crate::error::HttpError;
use crate::model::{UpdatedFields, UserPage, UserPatch};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Trait for the users API to allow mocking and abstraction.
///
/// Every call is one round trip: no retries, no caching. All calls except
/// `login` send `Authorization: Bearer {token}` when a token is given.
pub trait UsersApi {
    fn login(&self, email: &str, password: &str) -> Result<LoginResponse, HttpError>;
    fn list_users(&self, token: Option<&str>, page: u32) -> Result<UserPage, HttpError>;
    fn update_user(
        &self,
        token: Option<&str>,
        id: u64,
        patch: &UserPatch,
    ) -> Result<UpdatedFields, HttpError>;
    fn delete_user(&self, token: Option<&str>, id: u64) -> Result<(), HttpError>;
}

pub struct Client {
    base_url: String,
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new(),
            timeout: None,
        }
    }

    /// Per-request timeout. Without one the transport default applies.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str, token: Option<&str>) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        debug!(method, url = %url, authorized = token.is_some(), "sending request");

        let mut request = self.agent.request(method, &url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(token) = token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request
    }
}

/// Map a ureq outcome onto the API error taxonomy.
fn check(resp: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, HttpError> {
    match resp {
        Ok(r) => Ok(r),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            let message = error_message(&body);
            warn!(code, %message, "API returned an error status");
            Err(HttpError::Status { code, message })
        }
        Err(e) => {
            warn!(error = %e, "request failed");
            Err(HttpError::Network(e.to_string()))
        }
    }
}

/// Error bodies look like `{"error": "Missing password"}`; fall back to raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(resp: ureq::Response) -> Result<T, HttpError> {
    resp.into_json::<T>()
        .map_err(|e| HttpError::Decode(e.to_string()))
}

impl UsersApi for Client {
    fn login(&self, email: &str, password: &str) -> Result<LoginResponse, HttpError> {
        let resp = self
            .request("POST", "/login", None)
            .send_json(LoginRequest { email, password });
        decode(check(resp)?)
    }

    fn list_users(&self, token: Option<&str>, page: u32) -> Result<UserPage, HttpError> {
        let resp = self
            .request("GET", &format!("/users?page={}", page), token)
            .call();
        decode(check(resp)?)
    }

    fn update_user(
        &self,
        token: Option<&str>,
        id: u64,
        patch: &UserPatch,
    ) -> Result<UpdatedFields, HttpError> {
        let resp = self
            .request("PUT", &format!("/users/{}", id), token)
            .send_json(patch);
        decode(check(resp)?)
    }

    fn delete_user(&self, token: Option<&str>, id: u64) -> Result<(), HttpError> {
        let resp = self
            .request("DELETE", &format!("/users/{}", id), token)
            .call();
        check(resp)?;
        Ok(())
    }
}
