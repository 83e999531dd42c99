//! Caller authentication, delegated to an external identity provider

use crate::config::AuthConfig;
use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque user identifier resolved from a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves bearer credentials to identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Unauthorized` when the credential is rejected; `Internal` when the
    /// provider itself cannot be reached.
    async fn authenticate(&self, token: &str) -> FaucetResult<Identity>;
}

/// Supabase GoTrue user lookup (`GET /auth/v1/user`)
pub struct SupabaseIdentityProvider {
    user_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
}

impl SupabaseIdentityProvider {
    pub fn new(base_url: &str, anon_key: impl Into<String>, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::Internal(format!("Failed to build identity client: {}", e)))?;

        Ok(Self {
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
            client,
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn authenticate(&self, token: &str) -> FaucetResult<Identity> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FaucetError::Internal(format!("Identity provider request failed: {}", e)))?;

        let status = response.status();
        let body: Option<Value> = response.json().await.ok();

        if status.is_success() {
            let user: SupabaseUser = body
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| FaucetError::Internal(format!("Invalid identity response: {}", e)))?
                .ok_or_else(|| FaucetError::Internal("Empty identity response".to_string()))?;
            debug!(user_id = %user.id, "Authenticated caller");
            return Ok(Identity::new(user.id));
        }

        if status.is_client_error() {
            let message = body
                .as_ref()
                .and_then(provider_message)
                .unwrap_or_else(|| "Invalid token".to_string());
            debug!(status = status.as_u16(), "Identity provider rejected credential");
            return Err(FaucetError::Unauthorized {
                message,
                details: body,
            });
        }

        warn!(status = status.as_u16(), "Identity provider returned an error");
        Err(FaucetError::Internal(format!(
            "Identity provider returned HTTP {}",
            status.as_u16()
        )))
    }
}

/// GoTrue error bodies use several field names depending on version.
fn provider_message(body: &Value) -> Option<String> {
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Fixed token table, for local development and tests
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Identity::new(identity));
        self
    }
}

impl From<&HashMap<String, String>> for StaticIdentityProvider {
    fn from(tokens: &HashMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, id)| (token.clone(), Identity::new(id.clone())))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> FaucetResult<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| FaucetError::unauthorized("Invalid token"))
    }
}

/// Build the provider selected in configuration
pub fn provider_from_config(config: &AuthConfig) -> FaucetResult<Arc<dyn IdentityProvider>> {
    use crate::config::AuthProviderKind;

    match config.provider {
        AuthProviderKind::Supabase => {
            let url = config.supabase_url.as_deref().ok_or_else(|| {
                FaucetError::ServiceMisconfigured("SUPABASE_URL not configured".to_string())
            })?;
            let anon_key = config.supabase_anon_key.clone().ok_or_else(|| {
                FaucetError::ServiceMisconfigured("SUPABASE_ANON_KEY not configured".to_string())
            })?;
            Ok(Arc::new(SupabaseIdentityProvider::new(
                url,
                anon_key,
                config.timeout(),
            )?))
        }
        AuthProviderKind::Static => {
            if config.static_tokens.is_empty() {
                warn!("Static identity provider configured without any tokens");
            }
            Ok(Arc::new(StaticIdentityProvider::from(&config.static_tokens)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn user_endpoint(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let api_key_ok = headers.get("apikey").map(|v| v == "anon").unwrap_or(false);
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        match (api_key_ok, auth) {
            (true, "Bearer good-token") => (
                StatusCode::OK,
                Json(json!({ "id": "user-123", "email": "a@example.com" })),
            ),
            (true, "Bearer broken") => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "db down" })),
            ),
            _ => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": 401, "msg": "invalid JWT" })),
            ),
        }
    }

    async fn spawn_provider() -> String {
        let app = Router::new().route("/auth/v1/user", get(user_endpoint));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_supabase_resolves_user_id() {
        let url = spawn_provider().await;
        let provider = SupabaseIdentityProvider::new(&url, "anon", Duration::from_secs(5)).unwrap();

        let identity = provider.authenticate("good-token").await.unwrap();
        assert_eq!(identity, Identity::new("user-123"));
    }

    #[tokio::test]
    async fn test_supabase_rejection_is_unauthorized_with_provider_body() {
        let url = spawn_provider().await;
        let provider = SupabaseIdentityProvider::new(&url, "anon", Duration::from_secs(5)).unwrap();

        match provider.authenticate("expired").await {
            Err(FaucetError::Unauthorized { message, details }) => {
                assert_eq!(message, "invalid JWT");
                assert_eq!(details, Some(json!({ "code": 401, "msg": "invalid JWT" })));
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_supabase_outage_is_internal() {
        let url = spawn_provider().await;
        let provider = SupabaseIdentityProvider::new(&url, "anon", Duration::from_secs(5)).unwrap();

        let err = provider.authenticate("broken").await.unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticIdentityProvider::new().with_token("t1", "alice");
        assert_eq!(provider.authenticate("t1").await.unwrap(), Identity::new("alice"));
        assert!(matches!(
            provider.authenticate("nope").await,
            Err(FaucetError::Unauthorized { .. })
        ));
    }
}
