//! OAuth `state` values and their single-use store.
//!
//! Each authorization URL embeds a fresh [`AuthorizationState`]. The caller
//! records it in a [`StateStore`] and, on callback, consumes it exactly once;
//! anything unknown, expired, replayed or issued for the other provider is
//! rejected with [`ProviderError::StateMismatch`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::RwLock;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::ProviderId;

/// Number of random bytes in a state value (128 bits).
const STATE_BYTES: usize = 16;

/// Default lifetime of an issued state.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// An anti-forgery nonce carried through the authorization redirect.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthorizationState(String);

impl AuthorizationState {
    /// Generates a new state from the operating system's CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the operating system cannot supply random bytes. A
    /// predictable state would defeat its purpose, so there is no fallback.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wraps a state value received on a callback.
    #[must_use]
    pub fn from_callback(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hex-encoded value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthorizationState").field(&self.0).finish()
    }
}

/// Storage for issued authorization states.
///
/// `consume` must be atomic: two callbacks racing on the same state can
/// never both succeed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Records a state issued for `provider`.
    async fn issue(&self, state: &AuthorizationState, provider: ProviderId);

    /// Removes and returns the provider a state was issued for.
    ///
    /// Returns `None` if the state is unknown, expired or already consumed.
    async fn consume(&self, state: &str) -> Option<ProviderId>;

    /// Drops expired states and returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

struct IssuedState {
    provider: ProviderId,
    issued_at: Instant,
}

/// In-memory [`StateStore`] with a fixed time-to-live.
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, IssuedState>>>,
    ttl: Duration,
}

impl InMemoryStateStore {
    /// Creates a store whose states expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the number of states currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Returns `true` if no state is held.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn issue(&self, state: &AuthorizationState, provider: ProviderId) {
        let mut states = self.states.write().await;
        states.insert(
            state.as_str().to_string(),
            IssuedState {
                provider,
                issued_at: Instant::now(),
            },
        );
        tracing::trace!(provider = %provider, "Issued authorization state");
    }

    async fn consume(&self, state: &str) -> Option<ProviderId> {
        let issued = self.states.write().await.remove(state)?;
        if issued.issued_at.elapsed() > self.ttl {
            tracing::debug!(provider = %issued.provider, "Authorization state expired");
            return None;
        }
        Some(issued.provider)
    }

    async fn purge_expired(&self) -> usize {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, issued| issued.issued_at.elapsed() <= self.ttl);
        before - states.len()
    }
}

/// Consumes the callback `state` and checks it was issued for `provider`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the state is missing or empty, and
/// `StateMismatch` if it is unknown, expired, replayed, or belongs to the
/// other provider.
pub async fn verify_callback_state(
    store: &dyn StateStore,
    provider: ProviderId,
    state: Option<&str>,
) -> ProviderResult<AuthorizationState> {
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::invalid_argument("callback is missing the state parameter"))?;

    match store.consume(state).await {
        Some(issued_for) if issued_for == provider => Ok(AuthorizationState::from_callback(state)),
        Some(issued_for) => {
            tracing::warn!(
                expected = %provider,
                actual = %issued_for,
                "Authorization state issued for another provider"
            );
            Err(ProviderError::StateMismatch)
        }
        None => {
            tracing::warn!(provider = %provider, "Unknown or expired authorization state");
            Err(ProviderError::StateMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_128_bit_hex() {
        let state = AuthorizationState::generate();
        assert_eq!(state.as_str().len(), 32);
        assert!(state.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(state.as_str().chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_is_fresh() {
        let a = AuthorizationState::generate();
        let b = AuthorizationState::generate();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = InMemoryStateStore::default();
        let state = AuthorizationState::generate();
        store.issue(&state, ProviderId::BlueButton).await;

        assert_eq!(
            store.consume(state.as_str()).await,
            Some(ProviderId::BlueButton)
        );
        assert_eq!(store.consume(state.as_str()).await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_state_is_rejected() {
        let store = InMemoryStateStore::new(Duration::ZERO);
        let state = AuthorizationState::generate();
        store.issue(&state, ProviderId::Lighthouse).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.consume(state.as_str()).await, None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStateStore::new(Duration::ZERO);
        store
            .issue(&AuthorizationState::generate(), ProviderId::Lighthouse)
            .await;
        store
            .issue(&AuthorizationState::generate(), ProviderId::BlueButton)
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_verify_callback_state() {
        let store = InMemoryStateStore::default();
        let state = AuthorizationState::generate();
        store.issue(&state, ProviderId::Lighthouse).await;

        let verified = verify_callback_state(&store, ProviderId::Lighthouse, Some(state.as_str()))
            .await
            .unwrap();
        assert_eq!(verified, state);

        let replay =
            verify_callback_state(&store, ProviderId::Lighthouse, Some(state.as_str())).await;
        assert!(matches!(replay, Err(ProviderError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_verify_callback_state_wrong_provider() {
        let store = InMemoryStateStore::default();
        let state = AuthorizationState::generate();
        store.issue(&state, ProviderId::BlueButton).await;

        let result =
            verify_callback_state(&store, ProviderId::Lighthouse, Some(state.as_str())).await;
        assert!(matches!(result, Err(ProviderError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_verify_callback_state_missing() {
        let store = InMemoryStateStore::default();
        let result = verify_callback_state(&store, ProviderId::BlueButton, None).await;
        assert!(result.unwrap_err().is_invalid_argument());

        let result = verify_callback_state(&store, ProviderId::BlueButton, Some("")).await;
        assert!(result.unwrap_err().is_invalid_argument());
    }
}
