//! Static credential verifier.

use async_trait::async_trait;
use session_controller::errors::ScError;
use session_controller::upstream::{AuthIssuer, Identity};
use std::collections::HashMap;
use std::sync::Mutex;

/// [`AuthIssuer`] backed by a static token-to-identity table. Any token
/// not registered fails verification.
#[derive(Default)]
pub struct StaticAuth {
    identities: Mutex<HashMap<String, Identity>>,
}

impl StaticAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token resolving to a minimal identity.
    pub fn register(&self, token: &str, user_id: &str, display_name: &str) {
        self.register_identity(
            token,
            Identity {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                avatar_url: None,
            },
        );
    }

    /// Register a token resolving to a full identity.
    pub fn register_identity(&self, token: &str, identity: Identity) {
        let mut identities = match self.identities.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        identities.insert(token.to_string(), identity);
    }
}

#[async_trait]
impl AuthIssuer for StaticAuth {
    async fn verify(&self, token: &str) -> Result<Identity, ScError> {
        let identities = match self.identities.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        identities
            .get(token)
            .cloned()
            .ok_or_else(|| ScError::Unauthorized("Invalid credential".to_string()))
    }
}
