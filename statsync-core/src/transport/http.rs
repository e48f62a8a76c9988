//! HTTP implementation of [`StatsApi`] over the stats REST endpoints.
//!
//! - `GET /stats/{userId}` returns the server snapshot
//! - `POST /stats` stores the posted snapshot
//!
//! Both require `Authorization: Bearer <token>`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use super::url::http_url;
use super::{StatsApi, TokenProvider};
use crate::error::TransportError;
use crate::models::UserStatsSnapshot;

/// Timeout for the health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Body of `POST /stats`: the full snapshot plus the owning user.
#[derive(Serialize)]
struct PushBody<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(flatten)]
    snapshot: &'a UserStatsSnapshot,
}

/// [`StatsApi`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpStatsApi {
    client: reqwest::Client,
    server_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpStatsApi {
    pub fn new(server_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
            tokens,
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn bearer(&self) -> Result<String, TransportError> {
        self.tokens
            .token()
            .map(|token| format!("Bearer {}", token))
            .ok_or(TransportError::Unauthenticated)
    }

    async fn fetch(&self, user_id: &str) -> Result<UserStatsSnapshot, TransportError> {
        let url = http_url(
            &self.server_url,
            &format!("/stats/{}", urlencoding::encode(user_id)),
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .json::<UserStatsSnapshot>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn store(
        &self,
        user_id: &str,
        snapshot: &UserStatsSnapshot,
    ) -> Result<(), TransportError> {
        let url = http_url(&self.server_url, "/stats");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .json(&PushBody { user_id, snapshot })
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }
}

impl StatsApi for HttpStatsApi {
    fn pull<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<UserStatsSnapshot, TransportError>> {
        self.fetch(user_id).boxed()
    }

    fn push<'a>(
        &'a self,
        user_id: &'a str,
        snapshot: &'a UserStatsSnapshot,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        self.store(user_id, snapshot).boxed()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Returns true if `GET /health` on `server_url` answers with a success
/// status within a few seconds.
pub async fn check_server(server_url: &str) -> bool {
    let client = reqwest::Client::new();
    match client
        .get(http_url(server_url, "/health"))
        .timeout(HEALTH_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StaticToken;

    struct NoToken;

    impl TokenProvider for NoToken {
        fn token(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_bearer_header() {
        let api = HttpStatsApi::new(
            "http://localhost:8080",
            Arc::new(StaticToken("secret".to_string())),
        );
        assert_eq!(api.bearer().unwrap(), "Bearer secret");
        assert_eq!(api.server_url(), "http://localhost:8080");
    }

    #[test]
    fn test_missing_token_is_unauthenticated() {
        let api = HttpStatsApi::new("http://localhost:8080", Arc::new(NoToken));
        assert!(matches!(
            api.bearer(),
            Err(TransportError::Unauthenticated)
        ));
    }

    #[test]
    fn test_push_body_flattens_snapshot() {
        let snapshot = UserStatsSnapshot {
            xp: 10,
            ..Default::default()
        };
        let body = serde_json::to_value(PushBody {
            user_id: "u1",
            snapshot: &snapshot,
        })
        .unwrap();

        assert_eq!(body["userId"], "u1");
        assert_eq!(body["xp"], 10);
        assert_eq!(body["maxHearts"], 5);
    }

    #[tokio::test]
    async fn test_check_server_unreachable() {
        assert!(!check_server("http://127.0.0.1:1").await);
    }
}
