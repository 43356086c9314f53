//! Credentials for remote mailbox logins
//!
//! Workers ask a [`TokenProvider`] for a credential before each session. A
//! revoked grant surfaces as [`SyncError::GrantRevoked`](crate::error::SyncError::GrantRevoked),
//! which the monitors treat as permanent.

pub mod oauth;

pub use oauth::{parse_token_response, AccessToken, OAuthTokenManager, TokenRefresher};

use crate::error::{Result, SyncError};
use crate::model::AccountSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// What a mailbox session logs in with
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { username: String, password: String },
    Bearer { username: String, token: String },
}

impl Credential {
    pub fn username(&self) -> &str {
        match self {
            Credential::Password { username, .. } => username,
            Credential::Bearer { username, .. } => username,
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { username, .. } => {
                f.debug_struct("Password").field("username", username).finish_non_exhaustive()
            }
            Credential::Bearer { username, .. } => {
                f.debug_struct("Bearer").field("username", username).finish_non_exhaustive()
            }
        }
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A credential valid for a new login right now
    async fn get_token(&self, account: &AccountSnapshot) -> Result<Credential>;

    /// Forget any cached credential after the remote rejected it
    async fn invalidate(&self, _account_id: i64) {}
}

/// Password credentials keyed by the account's credential reference
#[derive(Default)]
pub struct StaticTokenProvider {
    passwords: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, credential_ref: impl Into<String>, password: impl Into<String>) -> Self {
        self.passwords.insert(credential_ref.into(), password.into());
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, account: &AccountSnapshot) -> Result<Credential> {
        let credential_ref = account
            .credential_ref
            .as_deref()
            .ok_or_else(|| SyncError::InvalidCredentials(format!("account {} has no credential", account.id)))?;

        let password = self
            .passwords
            .get(credential_ref)
            .ok_or_else(|| SyncError::InvalidCredentials(format!("unknown credential {}", credential_ref)))?;

        Ok(Credential::Password {
            username: account.email_address.clone(),
            password: password.clone(),
        })
    }
}
