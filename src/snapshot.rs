//! Snapshot loading.
//!
//! A match view fetches its match exactly once on mount. The
//! [`SnapshotSource`] trait abstracts where that snapshot comes from so the
//! live match flow can be driven from a fixture in tests and from the REST API
//! in production ([`HttpSnapshotSource`], behind the `snapshot-http` feature).
//! The same feature provides [`HttpProfileSource`] for the caller's profile.

use async_trait::async_trait;

use crate::board::Symbol;
use crate::error::CaroError;
use crate::protocol::{MatchId, MatchSnapshot, UserId};

/// Anything that can produce the current snapshot of a match.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the snapshot for `match_id`.
    ///
    /// # Errors
    ///
    /// [`CaroError::MatchNotFound`], [`CaroError::Unauthorized`] or
    /// [`CaroError::Http`] depending on what went wrong. Callers do not retry.
    async fn fetch(&self, match_id: MatchId) -> Result<MatchSnapshot, CaroError>;
}

/// Decide which symbol `caller` controls in `snapshot`.
///
/// Returns `None` when there is no caller or the caller holds neither seat.
pub fn resolve_seat(snapshot: &MatchSnapshot, caller: Option<&UserId>) -> Option<Symbol> {
    let caller = caller?;
    if snapshot.black_player.as_ref() == Some(caller) {
        Some(Symbol::Black)
    } else if snapshot.white_player.as_ref() == Some(caller) {
        Some(Symbol::White)
    } else {
        None
    }
}

/// Human-readable status for a failed snapshot fetch.
pub fn failure_message(err: &CaroError) -> String {
    match err {
        CaroError::MatchNotFound(_) | CaroError::Unauthorized => {
            "Failed to load game. You may not have access to this match.".to_string()
        }
        other => format!("Failed to load game: {other}"),
    }
}

// ── HTTP ────────────────────────────────────────────────────────────

#[cfg(feature = "snapshot-http")]
pub use http::{HttpProfileSource, HttpSnapshotSource};

#[cfg(feature = "snapshot-http")]
mod http {
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde::de::DeserializeOwned;

    use super::SnapshotSource;
    use crate::auth::{AuthIdentity, ProfileSource, UserProfile};
    use crate::error::CaroError;
    use crate::protocol::{MatchId, MatchSnapshot};

    /// `GET url` and decode the JSON body. `not_found` maps a 404.
    async fn get_json<T: DeserializeOwned>(
        client: &reqwest::Client,
        url: &str,
        authorization: Option<&str>,
        not_found: CaroError,
    ) -> Result<T, CaroError> {
        let mut request = client.get(url);
        if let Some(auth) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CaroError::Http(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(not_found),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(CaroError::Unauthorized)
            }
            status if !status.is_success() => {
                return Err(CaroError::Http(format!("unexpected status {status}")))
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| CaroError::Http(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetches snapshots from `GET {api_base}/games/{id}/`.
    #[derive(Debug, Clone)]
    pub struct HttpSnapshotSource {
        client: reqwest::Client,
        api_base: String,
        authorization: Option<String>,
    }

    impl HttpSnapshotSource {
        /// `api_base` is the API root, e.g. `http://localhost:8000/api`.
        /// `authorization` is the full `Authorization` header value.
        pub fn new(api_base: impl Into<String>, authorization: Option<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_base: api_base.into(),
                authorization,
            }
        }

        /// Reuse an existing `reqwest` client (connection pool, proxies, TLS).
        #[must_use]
        pub fn with_client(mut self, client: reqwest::Client) -> Self {
            self.client = client;
            self
        }

        fn url(&self, match_id: MatchId) -> String {
            format!("{}/games/{match_id}/", self.api_base.trim_end_matches('/'))
        }
    }

    #[async_trait]
    impl SnapshotSource for HttpSnapshotSource {
        async fn fetch(&self, match_id: MatchId) -> Result<MatchSnapshot, CaroError> {
            let url = self.url(match_id);
            tracing::debug!(%url, "fetching match snapshot");
            get_json(
                &self.client,
                &url,
                self.authorization.as_deref(),
                CaroError::MatchNotFound(match_id),
            )
            .await
        }
    }

    /// Fetches the caller's account from `GET {api_base}/users/profile/`.
    ///
    /// This is how a federated session learns the game API user id that the
    /// snapshot's seats refer to.
    #[derive(Debug, Clone)]
    pub struct HttpProfileSource {
        client: reqwest::Client,
        api_base: String,
    }

    impl HttpProfileSource {
        pub fn new(api_base: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_base: api_base.into(),
            }
        }

        #[must_use]
        pub fn with_client(mut self, client: reqwest::Client) -> Self {
            self.client = client;
            self
        }

        fn url(&self) -> String {
            format!("{}/users/profile/", self.api_base.trim_end_matches('/'))
        }
    }

    #[async_trait]
    impl ProfileSource for HttpProfileSource {
        async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<UserProfile, CaroError> {
            let authorization = identity
                .authorization_header()
                .ok_or(CaroError::Unauthorized)?;
            let url = self.url();
            tracing::debug!(%url, "fetching caller profile");
            get_json(
                &self.client,
                &url,
                Some(&authorization),
                CaroError::Http("profile endpoint not found".into()),
            )
            .await
        }
    }

}
