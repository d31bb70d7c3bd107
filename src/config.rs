//! Environment-driven endpoint configuration.
//!
//! Every option resolves as: explicit environment variable, else the default
//! for the selected [`Environment`] (`CARO_ENV`, development when unset).
//!
//! | Variable                    | Development default            |
//! |-----------------------------|--------------------------------|
//! | `CARO_API_URL`              | `http://localhost:8000/api`    |
//! | `CARO_WS_URL`               | derived from the API URL       |
//! | `CARO_COGNITO_REGION`       | `us-east-1`                    |
//! | `CARO_COGNITO_USER_POOL_ID` | empty                          |
//! | `CARO_COGNITO_CLIENT_ID`    | empty                          |
//! | `CARO_COGNITO_DOMAIN`       | empty                          |
//! | `CARO_REDIRECT_SIGN_IN`     | `http://localhost:3000/callback` |
//! | `CARO_REDIRECT_SIGN_OUT`    | `http://localhost:3000/`       |

use crate::auth::OidcSettings;
use crate::protocol::MatchId;

/// Deployment environment selecting the fallback values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Cognito user pool parameters used for federated sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoConfig {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    pub domain: String,
}

impl CognitoConfig {
    /// The OIDC issuer (authority) for this pool.
    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// Whether enough is configured to attempt federated sign-in.
    pub fn is_configured(&self) -> bool {
        !self.user_pool_id.is_empty() && !self.client_id.is_empty()
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaroConfig {
    pub environment: Environment,
    /// REST API root, without a trailing slash.
    pub api_base_url: String,
    /// WebSocket origin, without a trailing slash.
    pub ws_base_url: String,
    pub cognito: CognitoConfig,
    pub redirect_sign_in: String,
    pub redirect_sign_out: String,
}

impl Default for CaroConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CaroConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("CARO_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or_default();
        let (api_default, sign_in_default, sign_out_default) = match environment {
            Environment::Development => (
                "http://localhost:8000/api",
                "http://localhost:3000/callback",
                "http://localhost:3000/",
            ),
            Environment::Production => (
                "https://localhost/api",
                "https://localhost/callback",
                "https://localhost/",
            ),
        };

        let api_base_url = get("CARO_API_URL")
            .unwrap_or_else(|| api_default.to_string())
            .trim_end_matches('/')
            .to_string();
        let ws_base_url = get("CARO_WS_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| ws_origin_for(&api_base_url));

        let cognito = CognitoConfig {
            region: get("CARO_COGNITO_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            user_pool_id: get("CARO_COGNITO_USER_POOL_ID").unwrap_or_default(),
            client_id: get("CARO_COGNITO_CLIENT_ID").unwrap_or_default(),
            domain: get("CARO_COGNITO_DOMAIN").unwrap_or_default(),
        };

        let config = Self {
            environment,
            api_base_url,
            ws_base_url,
            cognito,
            redirect_sign_in: get("CARO_REDIRECT_SIGN_IN")
                .unwrap_or_else(|| sign_in_default.to_string()),
            redirect_sign_out: get("CARO_REDIRECT_SIGN_OUT")
                .unwrap_or_else(|| sign_out_default.to_string()),
        };
        tracing::debug!(
            environment = ?config.environment,
            api = %config.api_base_url,
            ws = %config.ws_base_url,
            "configuration resolved"
        );
        config
    }

    /// `GET` endpoint for a match snapshot.
    pub fn snapshot_url(&self, match_id: MatchId) -> String {
        format!("{}/games/{match_id}/", self.api_base_url)
    }

    /// Game stream endpoint for a match, authenticated by `token`.
    pub fn stream_url(&self, match_id: MatchId, token: &str) -> String {
        format!("{}/ws/game/{match_id}/?token={token}", self.ws_base_url)
    }

    /// OIDC authority of the configured user pool.
    pub fn oidc_issuer(&self) -> String {
        self.cognito.issuer()
    }

    /// OIDC parameters when Cognito is configured.
    pub fn oidc_settings(&self) -> Option<OidcSettings> {
        self.cognito.is_configured().then(|| OidcSettings {
            issuer: self.oidc_issuer(),
            client_id: self.cognito.client_id.clone(),
        })
    }
}

/// `http://host:port/api` becomes `ws://host:port`; `https` becomes `wss`.
fn ws_origin_for(api_base_url: &str) -> String {
    let (scheme, rest) = match api_base_url.split_once("://") {
        Some(("https", rest)) => ("wss", rest),
        Some((_, rest)) => ("ws", rest),
        None => ("ws", api_base_url),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{host}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> CaroConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CaroConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn development_fallbacks() {
        let config = CaroConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.ws_base_url, "ws://localhost:8000");
        assert_eq!(config.cognito.region, "us-east-1");
        assert!(config.oidc_settings().is_none());
    }

    #[test]
    fn explicit_variables_win_over_defaults() {
        let config = config_from(&[
            ("CARO_ENV", "production"),
            ("CARO_API_URL", "https://caro.test/api/"),
            ("CARO_WS_URL", "wss://stream.caro.test/"),
        ]);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.api_base_url, "https://caro.test/api");
        assert_eq!(config.ws_base_url, "wss://stream.caro.test");
        assert_eq!(config.redirect_sign_in, "https://localhost/callback");
    }

    #[test]
    fn ws_origin_is_derived_from_api_url() {
        let config = config_from(&[("CARO_API_URL", "https://caro.test/api")]);
        assert_eq!(config.ws_base_url, "wss://caro.test");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("CARO_API_URL", "  ")]);
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
    }

    #[test]
    fn endpoint_builders() {
        let config = CaroConfig::default();
        assert_eq!(
            config.snapshot_url(12),
            "http://localhost:8000/api/games/12/"
        );
        assert_eq!(
            config.stream_url(12, "tok"),
            "ws://localhost:8000/ws/game/12/?token=tok"
        );
    }

    #[test]
    fn oidc_settings_when_cognito_configured() {
        let config = config_from(&[
            ("CARO_COGNITO_REGION", "eu-west-1"),
            ("CARO_COGNITO_USER_POOL_ID", "eu-west-1_abc"),
            ("CARO_COGNITO_CLIENT_ID", "client123"),
        ]);
        let oidc = config.oidc_settings().unwrap();
        assert_eq!(
            oidc.issuer,
            "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc"
        );
        assert_eq!(oidc.client_id, "client123");
    }
}
