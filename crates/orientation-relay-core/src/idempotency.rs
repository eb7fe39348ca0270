//! Process-local idempotency cache.
//!
//! Storefront webhooks are retried by the sender, so the same order can
//! arrive several times. Each (order, customer, product) triple is
//! fingerprinted into an [`IdempotencyKey`]; once a notification has been sent
//! for a key, later deliveries carrying the same key are skipped.
//!
//! The in-memory implementation is bounded and evicts the oldest inserted
//! entry first (FIFO, not LRU). It lives for the lifetime of the process and is
//! not shared between instances. `has` and `record` are separate operations,
//! so two concurrent requests for the same key can both pass `has` before
//! either records; duplicate suppression is best effort.

use crate::fanout::ProcessingResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Maximum number of entries held by the default cache
pub const MAX_CACHE_SIZE: usize = 1000;

/// Deterministic fingerprint of an (order, customer, product) triple.
///
/// SHA-256 of `"{order_id}-{customer_email}-{product_id}"`, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for one line item of an order
    ///
    /// # Examples
    ///
    /// ```rust
    /// use orientation_relay_core::IdempotencyKey;
    ///
    /// let a = IdempotencyKey::derive("o1", "a@b.com", "p1");
    /// let b = IdempotencyKey::derive("o1", "a@b.com", "p1");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str().len(), 64);
    /// ```
    pub fn derive(order_id: &str, customer_email: &str, product_id: &str) -> Self {
        let material = format!("{}-{}-{}", order_id, customer_email, product_id);
        Self(hex::encode(Sha256::digest(material.as_bytes())))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What was recorded for a processed key
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub processed_at: DateTime<Utc>,
    pub result: ProcessingResult,
}

/// Interface for duplicate suppression storage.
///
/// The in-memory cache is the only implementation today; an external
/// key-value store can implement the same contract.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Check whether the key has already been processed
    async fn has(&self, key: &IdempotencyKey) -> bool;

    /// Record a processed key with its result
    async fn record(&self, key: IdempotencyKey, result: ProcessingResult);
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<IdempotencyKey, IdempotencyRecord>,
    insertion_order: VecDeque<IdempotencyKey>,
}

/// Bounded, FIFO-evicting in-memory [`IdempotencyStore`].
#[derive(Debug)]
pub struct MemoryIdempotencyCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl Default for MemoryIdempotencyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdempotencyCache {
    /// Create a cache bounded at [`MAX_CACHE_SIZE`] entries
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_SIZE)
    }

    /// Create a cache with a custom bound (at least one entry)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the record for a key
    pub fn get(&self, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.lock().entries.get(key).cloned()
    }

    fn contains(&self, key: &IdempotencyKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    fn insert(&self, key: IdempotencyKey, result: ProcessingResult) {
        let record = IdempotencyRecord {
            processed_at: Utc::now(),
            result,
        };

        let mut state = self.lock();

        // Re-recording keeps the original FIFO position
        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = record;
            return;
        }

        // Evict first, then insert
        if state.entries.len() >= self.capacity {
            if let Some(oldest) = state.insertion_order.pop_front() {
                state.entries.remove(&oldest);
            }
        }

        state.insertion_order.push_back(key.clone());
        state.entries.insert(key, record);
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyCache {
    async fn has(&self, key: &IdempotencyKey) -> bool {
        self.contains(key)
    }

    async fn record(&self, key: IdempotencyKey, result: ProcessingResult) {
        self.insert(key, result);
    }
}

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;
