//! Access gate for deploy triggers
//!
//! Every identity (usually a client address) accumulates strikes for bad
//! credentials. Enough strikes earn a temporary ban; more earn a permanent
//! one. A correct credential clears the record.

use crate::config::schema::AuthConfig;
use crate::error::{QuillError, QuillResult};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Failure count and ban deadline for one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BanState {
    pub failures: u32,
    pub banned_until: Option<DateTime<Utc>>,
}

/// Storage for per-identity strikes
pub trait FailedAttemptStore: Send + Sync {
    fn get(&self, identity: &str) -> BanState;

    /// Apply `f` to the stored state atomically and return the result
    fn modify(&self, identity: &str, f: &mut dyn FnMut(&mut BanState)) -> BanState;

    fn clear(&self, identity: &str);
}

/// Process-local strike storage
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    states: Mutex<HashMap<String, BanState>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FailedAttemptStore for MemoryAttemptStore {
    fn get(&self, identity: &str) -> BanState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .copied()
            .unwrap_or_default()
    }

    fn modify(&self, identity: &str, f: &mut dyn FnMut(&mut BanState)) -> BanState {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(identity.to_string()).or_default();
        f(state);
        *state
    }

    fn clear(&self, identity: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
    }
}

/// Strike thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanPolicy {
    pub temp_threshold: u32,
    pub perm_threshold: u32,
    pub temp_duration: Duration,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for BanPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            temp_threshold: config.temp_ban_threshold,
            perm_threshold: config.perm_ban_threshold,
            temp_duration: Duration::seconds(config.temp_ban_secs.min(i32::MAX as u64) as i64),
        }
    }
}

/// Checks bans and verifies credentials against a shared secret
pub struct AuthGate {
    store: Box<dyn FailedAttemptStore>,
    secret: Option<[u8; 32]>,
    policy: BanPolicy,
}

impl AuthGate {
    pub fn new(
        secret: Option<&str>,
        policy: BanPolicy,
        store: Box<dyn FailedAttemptStore>,
    ) -> Self {
        Self {
            store,
            secret: secret.filter(|s| !s.is_empty()).map(digest),
            policy,
        }
    }

    /// Gate with in-memory strikes, configured from `[auth]`
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.token.as_deref(),
            BanPolicy::from(config),
            Box::new(MemoryAttemptStore::new()),
        )
    }

    /// Short hex prefix of the configured secret's digest
    pub fn fingerprint(&self) -> Option<String> {
        self.secret.map(|d| hex::encode(&d[..4]))
    }

    /// Deny identities that are banned
    pub fn check(&self, identity: &str) -> QuillResult<()> {
        let state = self.store.get(identity);

        if let Some(until) = state.banned_until {
            let now = Utc::now();
            if now < until {
                let remaining = (until - now).num_seconds();
                return Err(QuillError::Forbidden {
                    identity: identity.to_string(),
                    reason: format!("temporarily banned, retry in {}s", remaining),
                });
            }
        }

        if state.failures >= self.policy.perm_threshold {
            return Err(QuillError::Forbidden {
                identity: identity.to_string(),
                reason: "permanently banned".to_string(),
            });
        }

        Ok(())
    }

    /// Compare a credential with the secret, recording a strike on mismatch
    pub fn verify(&self, identity: &str, credential: &str) -> QuillResult<()> {
        let secret = self.secret.ok_or(QuillError::TokenNotConfigured)?;

        if digest(credential) == secret {
            self.store.clear(identity);
            return Ok(());
        }

        let state = self.record_failure(identity);
        warn!(
            "Invalid credential from {} ({} failures)",
            identity, state.failures
        );
        Err(QuillError::Unauthorized)
    }

    /// `check` then `verify`
    pub fn authorize(&self, identity: &str, credential: &str) -> QuillResult<()> {
        self.check(identity)?;
        self.verify(identity, credential)
    }

    fn record_failure(&self, identity: &str) -> BanState {
        let policy = self.policy;
        let now = Utc::now();

        self.store.modify(identity, &mut |state| {
            // An expired temporary ban starts the count over
            if state.banned_until.is_some_and(|until| now >= until) {
                state.failures = 0;
                state.banned_until = None;
            }

            state.failures = state.failures.saturating_add(1);
            if state.failures >= policy.temp_threshold && state.failures < policy.perm_threshold {
                state.banned_until = Some(now + policy.temp_duration);
                debug!("Temporary ban for {}", identity);
            }
        })
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Random alphanumeric access token of `len` characters
pub fn generate_token(len: usize) -> String {
    let mut token = String::with_capacity(len);
    while token.len() < len {
        for byte in Uuid::new_v4().as_bytes() {
            // 248 is the largest multiple of 62 that fits in a byte
            if *byte < 248 && token.len() < len {
                token.push(TOKEN_ALPHABET[(*byte % 62) as usize] as char);
            }
        }
    }
    token
}
