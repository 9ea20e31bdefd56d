//! Token verification against a remote auth service.

use super::{Authenticator, CredentialCache, Identity};
use async_trait::async_trait;
use courier_core::{CourierError, CourierResult, UserId};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    user: Option<VerifiedUser>,
}

#[derive(Debug, Deserialize)]
struct VerifiedUser {
    id: UserId,
    username: String,
}

/// Verifies tokens with `GET <url>/internal/verify-token`.
///
/// Service errors (5xx, unreachable, undecodable reply) fall back to a
/// recently verified identity for the same token; explicit rejections never do.
pub struct RemoteAuthenticator {
    client: reqwest::Client,
    verify_url: String,
    cache: Mutex<CredentialCache>,
}

impl RemoteAuthenticator {
    pub fn new(base_url: &str, timeout: Duration, cache_ttl: Duration) -> CourierResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Config(format!("auth client: {e}")))?;
        Ok(Self {
            client,
            verify_url: format!("{}/internal/verify-token", base_url.trim_end_matches('/')),
            cache: Mutex::new(CredentialCache::new(cache_ttl)),
        })
    }

    /// Forget a cached verification (e.g. on logout).
    pub async fn invalidate(&self, credential: &str) {
        self.cache.lock().await.invalidate(credential);
    }

    async fn verify(&self, credential: &str) -> CourierResult<Identity> {
        let resp = self
            .client
            .get(&self.verify_url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| CourierError::AuthUnavailable(format!("unreachable: {e}")))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(CourierError::AuthUnavailable(format!("status {status}")));
        }
        if status != reqwest::StatusCode::OK {
            return Err(CourierError::AuthFailed(format!("status {status}")));
        }

        let body: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| CourierError::AuthUnavailable(format!("bad response: {e}")))?;
        match body {
            VerifyResponse {
                valid: true,
                user: Some(user),
            } => Ok(Identity {
                user_id: user.id,
                display_name: user.username,
            }),
            _ => Err(CourierError::AuthFailed("token rejected".into())),
        }
    }
}

#[async_trait]
impl Authenticator for RemoteAuthenticator {
    async fn authenticate(&self, credential: &str) -> CourierResult<Identity> {
        match self.verify(credential).await {
            Ok(identity) => {
                debug!(user_id = %identity.user_id, "token verified");
                self.cache.lock().await.insert(credential, identity.clone());
                Ok(identity)
            }
            Err(CourierError::AuthUnavailable(reason)) => {
                if let Some(identity) = self.cache.lock().await.get(credential) {
                    warn!(user_id = %identity.user_id, reason = %reason, "auth service unavailable, using cached verification");
                    return Ok(identity);
                }
                Err(CourierError::AuthUnavailable(reason))
            }
            Err(e) => {
                self.cache.lock().await.invalidate(credential);
                Err(e)
            }
        }
    }

    async fn purge_expired(&self) {
        let removed = self.cache.lock().await.gc();
        if removed > 0 {
            debug!(removed, "purged expired auth cache entries");
        }
    }
}
