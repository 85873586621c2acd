//! Secondary product cache and HTTP validators.
//!
//! The cache is read-through for single product lookups and is invalidated by
//! every product mutation. Its failures are never fatal: callers log and fall
//! back to the store.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::products::repo_types::Product;

#[derive(Debug, Error)]
pub enum CacheError {
    // only raised by test doubles until a remote cache backend exists
    #[cfg_attr(not(test), allow(dead_code))]
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a cache read. A miss carries the lease to present when filling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Product),
    Miss(u64),
}

#[async_trait]
pub trait ProductCache: Send + Sync {
    async fn get(&self, id: i64) -> Result<Lookup, CacheError>;
    /// Stores `product` unless `id` was invalidated after `lease` was issued.
    async fn fill(&self, id: i64, lease: u64, product: &Product) -> Result<(), CacheError>;
    async fn invalidate(&self, id: i64) -> Result<(), CacheError>;
}

struct Slot {
    epoch: u64,
    product: Option<Product>,
}

/// Epoch-only slots kept before they are swept.
const PRUNE_AFTER: usize = 4096;

#[derive(Default)]
struct Slots {
    map: HashMap<i64, Slot>,
    /// Last epoch handed out by an invalidation.
    clock: u64,
    /// Epoch of every id without a slot. Raised to `clock` on each sweep, so a
    /// lease issued before a swept invalidation can never fill.
    floor: u64,
    /// Slots that hold an epoch but no product.
    empty: usize,
}

impl Slots {
    fn epoch_of(&self, id: i64) -> u64 {
        self.map.get(&id).map_or(self.floor, |s| s.epoch)
    }

    fn sweep(&mut self) {
        self.map.retain(|_, s| s.product.is_some());
        self.floor = self.clock;
        self.empty = 0;
    }
}

pub struct MemoryCache {
    slots: RwLock<Slots>,
    prune_after: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_prune_after(PRUNE_AFTER)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_after(prune_after: usize) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            prune_after: prune_after.max(1),
        }
    }

    #[cfg(test)]
    pub async fn contains(&self, id: i64) -> bool {
        let guard = self.slots.read().await;
        guard.map.get(&id).is_some_and(|s| s.product.is_some())
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.read().await.map.len()
    }
}

#[async_trait]
impl ProductCache for MemoryCache {
    async fn get(&self, id: i64) -> Result<Lookup, CacheError> {
        let guard = self.slots.read().await;
        Ok(match guard.map.get(&id) {
            Some(Slot { product: Some(p), .. }) => Lookup::Hit(p.clone()),
            _ => Lookup::Miss(guard.epoch_of(id)),
        })
    }

    async fn fill(&self, id: i64, lease: u64, product: &Product) -> Result<(), CacheError> {
        let mut guard = self.slots.write().await;
        if guard.epoch_of(id) != lease {
            return Ok(());
        }
        let g = &mut *guard;
        match g.map.get_mut(&id) {
            Some(slot) => {
                if slot.product.is_none() {
                    g.empty -= 1;
                }
                slot.product = Some(product.clone());
            }
            None => {
                g.map.insert(id, Slot { epoch: lease, product: Some(product.clone()) });
            }
        }
        Ok(())
    }

    async fn invalidate(&self, id: i64) -> Result<(), CacheError> {
        let mut guard = self.slots.write().await;
        let g = &mut *guard;
        g.clock += 1;
        let epoch = g.clock;
        match g.map.get_mut(&id) {
            Some(slot) => {
                if slot.product.is_some() {
                    g.empty += 1;
                }
                slot.epoch = epoch;
                slot.product = None;
            }
            None => {
                g.map.insert(id, Slot { epoch, product: None });
                g.empty += 1;
            }
        }
        if g.empty >= self.prune_after {
            g.sweep();
        }
        Ok(())
    }
}

/// Used when `CACHE_ENABLED=false`: every read misses.
pub struct NoopCache;

#[async_trait]
impl ProductCache for NoopCache {
    async fn get(&self, _id: i64) -> Result<Lookup, CacheError> {
        Ok(Lookup::Miss(0))
    }

    async fn fill(&self, _id: i64, _lease: u64, _product: &Product) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _id: i64) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Builds a weak entity tag from the given field values.
pub fn etag<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("W/\"{}\"", hex::encode(hasher.finalize()))
}

fn opaque(tag: &str) -> &str {
    tag.trim().trim_start_matches("W/")
}

/// Weak comparison of `etag` against the request's If-None-Match header.
pub fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let ours = opaque(etag);
    value
        .split(',')
        .any(|candidate| candidate.trim() == "*" || opaque(candidate) == ours)
}
