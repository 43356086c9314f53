use super::{Credential, TokenProvider};
use crate::error::{Result, SyncError};
use crate::model::AccountSnapshot;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Tokens are refreshed this long before the provider says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Longest a token is served from cache, whatever `expires_in` claims
const MAX_CACHE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// A fresh access token and its lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Performs the refresh-token exchange and returns the raw response body
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, account: &AccountSnapshot) -> Result<String>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Classify a token endpoint response
///
/// `invalid_grant` and `deleted_client` mean the grant is gone for good.
/// Any other error payload, or a body that is not JSON, is a transient
/// provider failure.
pub fn parse_token_response(body: &str) -> Result<AccessToken> {
    let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
        error!(error = %e, "Invalid JSON renewing access token");
        SyncError::Provider("invalid JSON response on renewing token".to_string())
    })?;

    if let Some(error) = response.error {
        return match error.as_str() {
            "invalid_grant" | "deleted_client" => Err(SyncError::GrantRevoked(error)),
            _ => {
                error!(error = %error, "Error renewing access token");
                Err(SyncError::Provider(format!("server error renewing access token: {}", error)))
            }
        };
    }

    match (response.access_token, response.expires_in) {
        (Some(token), Some(expires_in)) => Ok(AccessToken {
            token,
            expires_in: Duration::from_secs(expires_in),
        }),
        _ => Err(SyncError::Provider("token response without access_token".to_string())),
    }
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Caching OAuth token provider
pub struct OAuthTokenManager {
    refresher: Arc<dyn TokenRefresher>,
    cache: RwLock<HashMap<i64, CachedToken>>,
}

impl OAuthTokenManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn cached(&self, account_id: i64) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(&account_id)
            .filter(|cached| Instant::now() < cached.refresh_at)
            .map(|cached| cached.token.clone())
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenManager {
    async fn get_token(&self, account: &AccountSnapshot) -> Result<Credential> {
        if account.credential_ref.is_none() {
            return Err(SyncError::GrantRevoked("refresh_token required".to_string()));
        }

        let token = match self.cached(account.id).await {
            Some(token) => token,
            None => {
                debug!(account_id = account.id, "Refreshing access token");
                let body = self.refresher.refresh(account).await?;

                let access = match parse_token_response(&body) {
                    Ok(access) => access,
                    Err(e) => {
                        if matches!(e, SyncError::GrantRevoked(_)) {
                            warn!(account_id = account.id, error = %e, "OAuth grant revoked");
                            self.invalidate(account.id).await;
                        }
                        return Err(e);
                    }
                };

                if access.expires_in > MAX_CACHE_LIFETIME {
                    warn!(
                        account_id = account.id,
                        expires_in = access.expires_in.as_secs(),
                        "Token lifetime capped"
                    );
                }
                let lifetime = access
                    .expires_in
                    .min(MAX_CACHE_LIFETIME)
                    .saturating_sub(EXPIRY_MARGIN);

                if let Some(refresh_at) = Instant::now().checked_add(lifetime) {
                    let mut cache = self.cache.write().await;
                    cache.insert(
                        account.id,
                        CachedToken {
                            token: access.token.clone(),
                            refresh_at,
                        },
                    );
                }
                access.token
            }
        };

        Ok(Credential::Bearer {
            username: account.email_address.clone(),
            token,
        })
    }

    async fn invalidate(&self, account_id: i64) {
        self.cache.write().await.remove(&account_id);
    }
}
