//! Shared in-memory cache for instance API responses and rendered cards.
//!
//! Values are opaque byte buffers (raw JSON bodies or PNG data). Keys are
//! namespaced by resource kind so identifiers never collide across kinds:
//!
//! | Key | Value |
//! |-----|-------|
//! | `note:{domain}:{id}` | `notes/show` body |
//! | `user:{domain}:{username}` | `users/show` body |
//! | `user-id:{domain}:{id}` | `users/show` body |
//! | `instance:{domain}` | `meta` body |
//! | `instance-notes:{domain}:{limit}` | `notes/local-timeline` body |
//! | `user-notes:{domain}:{user_id}:{limit}` | `users/notes` body |
//! | `og-image:{domain}:{note_id}` | card PNG |

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

pub const DEFAULT_CACHE_CAPACITY: u64 = 500;

pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Note { domain: String, id: String },
    User { domain: String, username: String },
    UserById { domain: String, id: String },
    Instance { domain: String },
    InstanceNotes { domain: String, limit: u32 },
    UserNotes { domain: String, user_id: String, limit: u32 },
    CardImage { domain: String, note_id: String },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Note { domain, id } => write!(f, "note:{domain}:{id}"),
            CacheKey::User { domain, username } => write!(f, "user:{domain}:{username}"),
            CacheKey::UserById { domain, id } => write!(f, "user-id:{domain}:{id}"),
            CacheKey::Instance { domain } => write!(f, "instance:{domain}"),
            CacheKey::InstanceNotes { domain, limit } => {
                write!(f, "instance-notes:{domain}:{limit}")
            }
            CacheKey::UserNotes {
                domain,
                user_id,
                limit,
            } => write!(f, "user-notes:{domain}:{user_id}:{limit}"),
            CacheKey::CardImage { domain, note_id } => write!(f, "og-image:{domain}:{note_id}"),
        }
    }
}

/// Bounded LRU cache with a fixed time-to-live from insertion.
///
/// Cloning is cheap and every clone shares the same store.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, Bytes>,
}

impl ResponseCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        log::info!(
            "response cache initialized: capacity={capacity} ttl_secs={}",
            ttl.as_secs()
        );

        Self { inner }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let value = self.inner.get(&key.to_string()).await;
        if value.is_some() {
            log::debug!("cache hit: {key}");
        }
        value
    }

    pub async fn insert(&self, key: CacheKey, value: Bytes) {
        self.inner.insert(key.to_string(), value).await;
    }

    /// Applies pending evictions now instead of on the next maintenance cycle.
    #[cfg(test)]
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_TTL)
    }
}
