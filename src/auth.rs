#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Principal verification.
//!
//! Credential verification itself is an external collaborator; the
//! engine consumes it through the `PrincipalVerifier` capability and
//! trusts the result only when the verified email belongs to the
//! configured organizational domain allow-list.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{NeighborlyError, Result};
use crate::types::UserId;

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait PrincipalVerifier: Send + Sync {
    /// Resolve an opaque bearer credential to a verified principal.
    ///
    /// # Errors
    /// Returns `Unauthorized` when the credential cannot be resolved.
    async fn verify(&self, credential: &str) -> Result<Principal>;
}

/// Check an email against the organizational domain allow-list.
/// An empty allow-list admits nobody; the server refuses to start
/// without at least one configured domain.
#[must_use]
pub fn email_in_allowed_domain(email: &str, allowed_domains: &[String]) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    allowed_domains
        .iter()
        .any(|allowed| domain.eq_ignore_ascii_case(allowed))
}

/// Production verifier: resolves the bearer token against a remote
/// identity endpoint (OIDC userinfo shape).
pub struct RemoteVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteVerifier {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(alias = "id")]
    sub: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl PrincipalVerifier for RemoteVerifier {
    async fn verify(&self, credential: &str) -> Result<Principal> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| NeighborlyError::Unauthorized(format!("verifier unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(NeighborlyError::Unauthorized(format!(
                "credential rejected (HTTP {})",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| NeighborlyError::Unauthorized(format!("malformed identity: {e}")))?;

        Ok(Principal {
            user_id: UserId::new(info.sub),
            display_name: info.name.unwrap_or_else(|| info.email.clone()),
            email: info.email,
        })
    }
}

/// Deterministic verifier for tests: a fixed token-to-principal map.
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    known: HashMap<String, Principal>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.known.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl PrincipalVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<Principal> {
        self.known.get(credential).cloned().ok_or_else(|| {
            NeighborlyError::Unauthorized("unknown credential".to_string())
        })
    }
}
