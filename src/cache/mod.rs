//! In-memory content cache with per-entry background refresh
//!
//! Each (source, ref) pair owns one [`CacheEntry`]. Entries are created on
//! first access and refreshed by a [`Producer`], either on demand or by the
//! entry's own background loop.
//!
//! # Locking
//!
//! | Lock | Guards | Held across I/O |
//! |------|--------|-----------------|
//! | manager registry | key → entry map | never |
//! | entry slot | payload + timestamp | never |
//! | entry loop control | loop handle, token, state | only during a bounded stop |

pub mod entry;
pub mod manager;
pub mod producer;

pub use entry::{CacheEntry, CacheStatus, LoopSettings, LoopState};
pub use manager::CacheManager;
pub use producer::{Producer, RepoProducer};

use serde::Serialize;
use std::fmt;

/// Identifies one cache slot: a content source and a ref within it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    /// Source identifier, usually a repository URL
    pub source: String,
    /// Branch or other ref
    pub reference: String,
}

impl CacheKey {
    pub fn new(source: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            reference: reference.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let key = CacheKey::new("git@example.com:me/blog.git", "main");
        assert_eq!(key.to_string(), "git@example.com:me/blog.git@main");
    }
}
