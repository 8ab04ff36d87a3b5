use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Login for one school-system tenant at the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantCredential {
    pub tenant_id: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for TenantCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredential")
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token accepted by our own gRPC services, obtained by exchanging an identity token.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceToken(String);

impl ServiceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceToken(<{} bytes>)", self.0.len())
    }
}

struct Published {
    token: ServiceToken,
    at: Instant,
}

/// Holds the one live service token. Clones share the same slot: the broker's caller
/// publishes into it and every interceptor clone reads the current value per call.
#[derive(Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Option<Published>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live token.
    pub fn publish(&self, token: ServiceToken) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Published {
            token,
            at: Instant::now(),
        });
    }

    pub fn current(&self) -> Option<ServiceToken> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|p| p.token.clone())
    }

    pub fn has_token(&self) -> bool {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.is_some()
    }

    /// True when there is no token, or when `max_age` is set and the token is older.
    pub fn needs_exchange(&self, max_age: Option<Duration>) -> bool {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match (slot.as_ref(), max_age) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(published), Some(max_age)) => published.at.elapsed() >= max_age,
        }
    }
}
