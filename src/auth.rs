//! Caller identity.
//!
//! An identity is resolved once from a [`SessionStore`] and then published
//! through an [`AuthContext`]. Two sign-in paths exist: a local account token
//! issued by the game API, and a federated (OIDC) session whose id token is
//! presented as a bearer JWT. Local tokens take priority when both are stored.
//!
//! A federated session only knows the provider's subject. The game API maps
//! that subject to one of its own users, so the numeric user id needed for
//! seat resolution is loaded afterwards from a [`ProfileSource`]
//! ([`AuthContext::load_profile`]).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CaroError;
use crate::protocol::UserId;

/// Store key holding the local account token.
pub const TOKEN_KEY: &str = "token";
/// Store key holding the JSON profile of the local account.
pub const USER_KEY: &str = "user";

/// Public profile of a signed-in player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elo_rating: Option<i32>,
}

/// Who is making requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthIdentity {
    /// A local account token (`Authorization: Token …`).
    Token { token: String, user: UserProfile },
    /// A federated OIDC session (`Authorization: Bearer <id_token>`).
    Federated {
        id_token: String,
        subject: String,
        issuer: String,
        /// The game API account behind `subject`, once loaded.
        user: Option<UserProfile>,
    },
    #[default]
    Anonymous,
}

impl AuthIdentity {
    /// The game API user id, when known. A federated identity has one only
    /// after its profile was loaded.
    pub fn user_id(&self) -> Option<&UserId> {
        self.profile().map(|user| &user.id)
    }

    /// The game API profile, when known.
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Self::Token { user, .. } => Some(user),
            Self::Federated { user, .. } => user.as_ref(),
            Self::Anonymous => None,
        }
    }

    /// Attach the game API profile. Anonymous identities are returned as is.
    #[must_use]
    pub fn with_profile(self, profile: UserProfile) -> Self {
        match self {
            Self::Token { token, .. } => Self::Token {
                token,
                user: profile,
            },
            Self::Federated {
                id_token,
                subject,
                issuer,
                ..
            } => Self::Federated {
                id_token,
                subject,
                issuer,
                user: Some(profile),
            },
            Self::Anonymous => Self::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    /// Value for the HTTP `Authorization` header.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Self::Token { token, .. } => Some(format!("Token {token}")),
            Self::Federated { id_token, .. } => Some(format!("Bearer {id_token}")),
            Self::Anonymous => None,
        }
    }

    /// Credential passed in the game stream query string.
    pub fn stream_token(&self) -> Option<&str> {
        match self {
            Self::Token { token, .. } => Some(token),
            Self::Federated { id_token, .. } => Some(id_token),
            Self::Anonymous => None,
        }
    }
}

// ── Profile lookup ──────────────────────────────────────────────────

/// Anything that can return the game API profile of an authenticated caller.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the profile of the caller presenting `identity`'s credentials.
    ///
    /// # Errors
    ///
    /// [`CaroError::Unauthorized`] when the credentials are refused,
    /// [`CaroError::Http`] for any other failure.
    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<UserProfile, CaroError>;
}

// ── Storage ─────────────────────────────────────────────────────────

/// String key-value persistence for credentials.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

// ── Resolution ──────────────────────────────────────────────────────

/// Identity provider parameters that locate a stored federated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcSettings {
    pub issuer: String,
    pub client_id: String,
}

impl OidcSettings {
    /// Key under which the OIDC library persists its user.
    pub fn storage_key(&self) -> String {
        format!("oidc.user:{}:{}", self.issuer, self.client_id)
    }
}

#[derive(Debug, Deserialize)]
struct StoredOidcUser {
    id_token: Option<String>,
    #[serde(default)]
    expires_at: Option<u64>,
    profile: StoredOidcProfile,
}

#[derive(Debug, Deserialize)]
struct StoredOidcProfile {
    sub: String,
}

/// Resolve the caller identity from `store`.
///
/// Order: local token (with its stored profile), then the federated session
/// for `oidc`, else [`AuthIdentity::Anonymous`]. Unparseable or expired
/// entries are skipped.
pub fn resolve_identity(store: &dyn SessionStore, oidc: Option<&OidcSettings>) -> AuthIdentity {
    if let Some(identity) = local_identity(store) {
        debug!("resolved local token identity");
        return identity;
    }
    if let Some(identity) = oidc.and_then(|settings| federated_identity(store, settings)) {
        debug!("resolved federated identity");
        return identity;
    }
    AuthIdentity::Anonymous
}

fn local_identity(store: &dyn SessionStore) -> Option<AuthIdentity> {
    let token = store.get(TOKEN_KEY).filter(|t| !t.is_empty())?;
    let raw = store.get(USER_KEY)?;
    match serde_json::from_str::<UserProfile>(&raw) {
        Ok(user) => Some(AuthIdentity::Token { token, user }),
        Err(e) => {
            warn!("stored user profile is unreadable: {e}");
            None
        }
    }
}

fn federated_identity(store: &dyn SessionStore, settings: &OidcSettings) -> Option<AuthIdentity> {
    let raw = store.get(&settings.storage_key())?;
    let stored: StoredOidcUser = match serde_json::from_str(&raw) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("stored federated session is unreadable: {e}");
            return None;
        }
    };
    if let Some(expires_at) = stored.expires_at {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        if expires_at <= now {
            debug!("stored federated session expired");
            return None;
        }
    }
    Some(AuthIdentity::Federated {
        id_token: stored.id_token.filter(|t| !t.is_empty())?,
        subject: stored.profile.sub,
        issuer: settings.issuer.clone(),
        user: None,
    })
}

// ── Context ─────────────────────────────────────────────────────────

/// Shared, observable current identity.
///
/// Cloning is cheap; every clone observes the same identity.
#[derive(Debug, Clone)]
pub struct AuthContext {
    tx: std::sync::Arc<watch::Sender<AuthIdentity>>,
}

impl AuthContext {
    pub fn new(identity: AuthIdentity) -> Self {
        let (tx, _rx) = watch::channel(identity);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Resolve from `store` once and wrap the result.
    pub fn resolve(store: &dyn SessionStore, oidc: Option<&OidcSettings>) -> Self {
        Self::new(resolve_identity(store, oidc))
    }

    /// Snapshot of the current identity.
    pub fn current(&self) -> AuthIdentity {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<AuthIdentity> {
        self.tx.subscribe()
    }

    /// Replace the current identity.
    pub fn sign_in(&self, identity: AuthIdentity) {
        debug!(authenticated = identity.is_authenticated(), "identity changed");
        self.tx.send_replace(identity);
    }

    /// Load the game API profile of a federated identity that lacks one.
    ///
    /// Other identities are left untouched and nothing is fetched. If the
    /// identity changes while the fetch is in flight, the result is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Propagates the [`ProfileSource`] error; the identity keeps no user id
    /// and the caller can only observe matches.
    pub async fn load_profile(&self, source: &dyn ProfileSource) -> Result<(), CaroError> {
        let identity = self.current();
        if !matches!(identity, AuthIdentity::Federated { user: None, .. }) {
            return Ok(());
        }
        let profile = source.fetch_profile(&identity).await?;
        debug!(user_id = %profile.id, "federated profile loaded");
        self.tx.send_if_modified(|current| {
            if *current != identity {
                debug!("identity changed during profile load, discarding");
                return false;
            }
            *current = identity.clone().with_profile(profile);
            true
        });
        Ok(())
    }

    /// Drop back to [`AuthIdentity::Anonymous`].
    pub fn sign_out(&self) {
        debug!("signed out");
        self.tx.send_replace(AuthIdentity::Anonymous);
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new(AuthIdentity::Anonymous)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn oidc() -> OidcSettings {
        OidcSettings {
            issuer: "https://cognito-idp.us-east-1.amazonaws.com/pool".into(),
            client_id: "client".into(),
        }
    }

    fn store_local(store: &MemoryStore) {
        store.set(TOKEN_KEY, "abc123".into());
        store.set(USER_KEY, r#"{"id":7,"username":"alice","elo_rating":1200}"#.into());
    }

    fn store_federated(store: &MemoryStore, expires_at: u64) {
        store.set(
            &oidc().storage_key(),
            format!(
                r#"{{"id_token":"jwt.body.sig","access_token":"at","expires_at":{expires_at},"profile":{{"sub":"uuid-1","email":"a@b.c"}}}}"#
            ),
        );
    }

    #[test]
    fn empty_store_is_anonymous() {
        let store = MemoryStore::new();
        assert_eq!(resolve_identity(&store, Some(&oidc())), AuthIdentity::Anonymous);
    }

    #[test]
    fn local_token_wins_over_federated() {
        let store = MemoryStore::new();
        store_local(&store);
        store_federated(&store, u64::MAX);
        let identity = resolve_identity(&store, Some(&oidc()));
        assert_eq!(identity.user_id(), Some(&UserId::from(7)));
        assert_eq!(identity.authorization_header().unwrap(), "Token abc123");
        assert_eq!(identity.stream_token(), Some("abc123"));
    }

    #[test]
    fn federated_session_resolves_to_bearer() {
        let store = MemoryStore::new();
        store_federated(&store, u64::MAX);
        let identity = resolve_identity(&store, Some(&oidc()));
        let AuthIdentity::Federated { subject, issuer, .. } = &identity else {
            panic!("expected federated identity, got {identity:?}");
        };
        assert_eq!(subject, "uuid-1");
        assert_eq!(issuer, &oidc().issuer);
        assert_eq!(identity.authorization_header().unwrap(), "Bearer jwt.body.sig");
        assert_eq!(identity.user_id(), None);
    }

    struct FixedProfile(Result<UserProfile, fn() -> CaroError>);

    #[async_trait]
    impl ProfileSource for FixedProfile {
        async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<UserProfile, CaroError> {
            assert!(identity.authorization_header().unwrap().starts_with("Bearer "));
            self.0.clone().map_err(|make| make())
        }
    }

    fn bob() -> UserProfile {
        UserProfile {
            id: UserId::from(20),
            username: "bob".into(),
            elo_rating: Some(1184),
        }
    }

    #[tokio::test]
    async fn federated_identity_gains_user_id_from_profile() {
        let store = MemoryStore::new();
        store_federated(&store, u64::MAX);
        let context = AuthContext::resolve(&store, Some(&oidc()));
        let mut rx = context.subscribe();

        context.load_profile(&FixedProfile(Ok(bob()))).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let identity = rx.borrow_and_update().clone();
        assert_eq!(identity.user_id(), Some(&UserId::from(20)));
        assert_eq!(identity.authorization_header().unwrap(), "Bearer jwt.body.sig");
        assert!(matches!(identity, AuthIdentity::Federated { .. }));
    }

    #[tokio::test]
    async fn profile_load_failure_keeps_identity() {
        let store = MemoryStore::new();
        store_federated(&store, u64::MAX);
        let context = AuthContext::resolve(&store, Some(&oidc()));
        let before = context.current();

        let err = context
            .load_profile(&FixedProfile(Err(|| CaroError::Unauthorized)))
            .await
            .unwrap_err();
        assert!(matches!(err, CaroError::Unauthorized));
        assert_eq!(context.current(), before);
    }

    #[tokio::test]
    async fn profile_load_skips_local_and_anonymous_identities() {
        // A failing source proves nothing is fetched.
        let failing = FixedProfile(Err(|| CaroError::Http("unreachable".into())));

        let anonymous = AuthContext::default();
        anonymous.load_profile(&failing).await.unwrap();
        assert_eq!(anonymous.current(), AuthIdentity::Anonymous);

        let store = MemoryStore::new();
        store_local(&store);
        let local = AuthContext::resolve(&store, None);
        local.load_profile(&failing).await.unwrap();
        assert_eq!(local.current().user_id(), Some(&UserId::from(7)));
    }

    #[test]
    fn federated_session_ignored_without_oidc_settings_or_when_expired() {
        let store = MemoryStore::new();
        store_federated(&store, u64::MAX);
        assert_eq!(resolve_identity(&store, None), AuthIdentity::Anonymous);

        let store = MemoryStore::new();
        store_federated(&store, 1);
        assert_eq!(resolve_identity(&store, Some(&oidc())), AuthIdentity::Anonymous);
    }

    #[test]
    fn token_without_readable_profile_falls_through() {
        let store = MemoryStore::new();
        store.set(TOKEN_KEY, "abc".into());
        store.set(USER_KEY, "not json".into());
        assert_eq!(resolve_identity(&store, None), AuthIdentity::Anonymous);
    }

    #[test]
    fn storage_key_format() {
        assert_eq!(
            oidc().storage_key(),
            "oidc.user:https://cognito-idp.us-east-1.amazonaws.com/pool:client"
        );
    }

    #[tokio::test]
    async fn context_publishes_sign_in_and_out() {
        let context = AuthContext::default();
        let mut rx = context.subscribe();
        assert!(!context.current().is_authenticated());

        let store = MemoryStore::new();
        store_local(&store);
        context.sign_in(resolve_identity(&store, None));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());

        let clone = context.clone();
        clone.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthIdentity::Anonymous);
        assert_eq!(context.current(), AuthIdentity::Anonymous);
    }

    #[test]
    fn memory_store_remove() {
        let store = MemoryStore::new();
        store.set("k", "v".into());
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }
}
