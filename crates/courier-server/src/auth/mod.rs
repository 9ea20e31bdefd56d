//! Upstream authentication: resolves a bearer credential to a user before
//! a connection is admitted.

pub mod cache;
pub mod remote;

pub use cache::CredentialCache;
pub use remote::RemoteAuthenticator;

use async_trait::async_trait;
use courier_core::{CourierError, CourierResult, UserId};
use serde::Deserialize;
use std::collections::HashMap;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Resolve `credential`.
    ///
    /// Fails with [`CourierError::AuthFailed`] for a rejected credential and
    /// [`CourierError::AuthUnavailable`] when no decision could be made.
    async fn authenticate(&self, credential: &str) -> CourierResult<Identity>;

    /// Drop expired cached state. Called by the maintenance task.
    async fn purge_expired(&self) {}
}

/// Fixed token table, for development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticAuthenticator {
    pub fn new(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: &str, user_id: UserId, display_name: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            Identity {
                user_id,
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, credential: &str) -> CourierResult<Identity> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| CourierError::AuthFailed("unknown token".into()))
    }
}
