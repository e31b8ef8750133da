//! Client for the public Misskey/Sharkey JSON API.
//!
//! Every operation checks the shared [`ResponseCache`] first and performs a
//! single POST on a miss. There are no retries: a failed fetch is reported
//! to the caller, who may simply ask again.

pub mod types;

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::cache::{CacheKey, ResponseCache};
pub use types::{Attachment, InstanceMeta, Note, User, UserSummary};

const USER_AGENT: &str = concat!("vxsharkey/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    fn from_response(status: StatusCode, body: &[u8]) -> Self {
        if status == StatusCode::NOT_FOUND {
            return FetchError::NotFound;
        }

        match serde_json::from_slice::<types::ApiErrorBody>(body) {
            Ok(err) if err.error.code.starts_with("NO_SUCH_") => FetchError::NotFound,
            Ok(err) => {
                log::debug!("api error {}: {}", err.error.code, err.error.message);
                FetchError::Status(status)
            }
            Err(_) => FetchError::Status(status),
        }
    }
}

#[derive(Clone)]
pub struct MisskeyClient {
    http: reqwest::Client,
    cache: ResponseCache,
    scheme: &'static str,
}

impl MisskeyClient {
    pub fn new(cache: ResponseCache, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::with_http(http, cache, "https"))
    }

    /// Builds a client around an existing transport, `scheme` is used for
    /// every api url.
    pub fn with_http(http: reqwest::Client, cache: ResponseCache, scheme: &'static str) -> Self {
        Self {
            http,
            cache,
            scheme,
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        domain: &str,
        endpoint: &str,
        body: &B,
    ) -> Result<Bytes, FetchError> {
        let url = format!("{}://{domain}/api/{endpoint}", self.scheme);
        log::debug!("{domain}: POST {endpoint}");

        let resp = self.http.post(&url).json(body).send().await.map_err(|err| {
            log::warn!("{domain}: {endpoint}: {err}");
            err
        })?;

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status != StatusCode::OK {
            log::warn!("{domain}: {endpoint}: {status}");
            return Err(FetchError::from_response(status, &bytes));
        }

        Ok(bytes)
    }

    async fn cached_post<B, T>(
        &self,
        key: CacheKey,
        domain: &str,
        endpoint: &str,
        body: &B,
    ) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_slice(&raw) {
                Ok(value) => return Ok(value),
                Err(err) => log::warn!("{key}: cached entry no longer decodes: {err}"),
            }
        }

        let raw = self.post(domain, endpoint, body).await?;
        let value: T = serde_json::from_slice(&raw).map_err(|err| {
            log::warn!("{domain}: {endpoint}: {err}");
            err
        })?;

        self.cache.insert(key, raw).await;
        Ok(value)
    }

    pub async fn fetch_note(&self, domain: &str, note_id: &str) -> Result<Note, FetchError> {
        let key = CacheKey::Note {
            domain: domain.to_string(),
            id: note_id.to_string(),
        };
        let note: Option<Note> = self
            .cached_post(key, domain, "notes/show", &json!({ "noteId": note_id }))
            .await?;
        note.ok_or(FetchError::NotFound)
    }

    pub async fn fetch_user(&self, domain: &str, username: &str) -> Result<User, FetchError> {
        let key = CacheKey::User {
            domain: domain.to_string(),
            username: username.to_string(),
        };
        let user: Option<User> = self
            .cached_post(
                key,
                domain,
                "users/show",
                &json!({ "username": username, "host": null }),
            )
            .await?;
        user.ok_or(FetchError::NotFound)
    }

    pub async fn fetch_user_by_id(&self, domain: &str, user_id: &str) -> Result<User, FetchError> {
        let key = CacheKey::UserById {
            domain: domain.to_string(),
            id: user_id.to_string(),
        };
        let user: Option<User> = self
            .cached_post(key, domain, "users/show", &json!({ "userId": user_id }))
            .await?;
        user.ok_or(FetchError::NotFound)
    }

    pub async fn fetch_instance_meta(&self, domain: &str) -> Result<InstanceMeta, FetchError> {
        let key = CacheKey::Instance {
            domain: domain.to_string(),
        };
        self.cached_post(key, domain, "meta", &json!({ "detail": true }))
            .await
    }

    pub async fn fetch_timeline(&self, domain: &str, limit: u32) -> Result<Vec<Note>, FetchError> {
        let key = CacheKey::InstanceNotes {
            domain: domain.to_string(),
            limit,
        };
        let notes: Option<Vec<Note>> = self
            .cached_post(key, domain, "notes/local-timeline", &json!({ "limit": limit }))
            .await?;
        Ok(notes.unwrap_or_default())
    }

    pub async fn fetch_user_notes(
        &self,
        domain: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Note>, FetchError> {
        let key = CacheKey::UserNotes {
            domain: domain.to_string(),
            user_id: user_id.to_string(),
            limit,
        };
        let notes: Option<Vec<Note>> = self
            .cached_post(
                key,
                domain,
                "users/notes",
                &json!({ "userId": user_id, "limit": limit }),
            )
            .await?;
        Ok(notes.unwrap_or_default())
    }
}
