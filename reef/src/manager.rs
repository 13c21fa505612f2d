// Copyright 2026 reef Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::HashMap, future::Future, time::Duration};

use crate::{
    code::{CacheValue, EntryCodec},
    error::{Error, Result},
    nullable::Nullable,
    service::{CacheService, LockToken},
};

/// Default prefix deriving a lock key from a cache key.
pub const DEFAULT_LOCK_PREFIX: &str = "lock.";
/// Default bound on waiting for a read-path lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(3);
/// Default bound on holding a lock before the service force-releases it.
pub const DEFAULT_LOCK_HOLD: Duration = Duration::from_secs(3);
/// Default TTL for entries written by the manager.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Builder for [`CacheAside`].
#[derive(Debug)]
pub struct CacheAsideBuilder<S> {
    service: S,
    lock_prefix: String,
    lock_wait: Duration,
    lock_hold: Duration,
    ttl: Duration,
}

impl<S> CacheAsideBuilder<S>
where
    S: CacheService,
{
    /// Create a builder over the given cache service with default timeouts.
    pub fn new(service: S) -> Self {
        Self {
            service,
            lock_prefix: DEFAULT_LOCK_PREFIX.to_string(),
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_hold: DEFAULT_LOCK_HOLD,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the prefix deriving lock keys from cache keys.
    pub fn with_lock_prefix(mut self, lock_prefix: impl Into<String>) -> Self {
        self.lock_prefix = lock_prefix.into();
        self
    }

    /// Set the bound on waiting for a read-path lock.
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Set the bound on holding a lock.
    pub fn with_lock_hold(mut self, lock_hold: Duration) -> Self {
        self.lock_hold = lock_hold;
        self
    }

    /// Set the TTL for entries written by the manager.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build the manager.
    pub fn build(self) -> CacheAside<S> {
        CacheAside {
            service: self.service,
            lock_prefix: self.lock_prefix,
            lock_wait: self.lock_wait,
            lock_hold: self.lock_hold,
            ttl: self.ttl,
        }
    }
}

/// Read-through/write-through cache-aside manager over a shared cache service.
///
/// Reads are served from the cache and repopulated on miss under a per-key distributed lock, so
/// at most one caller per miss episode runs the store loader (no breakdown of a hot key into a
/// stampede of store loads). A confirmed "absent in store" answer is cached as a [`Nullable`]
/// sentinel with the same TTL as present values, so repeated lookups for a non-existent key do
/// not repeatedly hit the store either.
///
/// Writes run the caller's store mutation first and invalidate the cache entry afterwards,
/// fire-and-forget. A concurrent reader can at worst see a brief stale value, never an
/// invalidation for a write that has not landed.
///
/// The manager holds no state beyond its configuration; it is a cheap clone.
#[derive(Debug, Clone)]
pub struct CacheAside<S> {
    service: S,
    lock_prefix: String,
    lock_wait: Duration,
    lock_hold: Duration,
    ttl: Duration,
}

impl<S> CacheAside<S>
where
    S: CacheService,
{
    /// Create a builder over the given cache service.
    pub fn builder(service: S) -> CacheAsideBuilder<S> {
        CacheAsideBuilder::new(service)
    }

    /// The underlying cache service.
    pub fn service(&self) -> &S {
        &self.service
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.lock_prefix, key)
    }

    /// Release the acquisition `token` at `lock_key`, keeping `res` as the operation outcome.
    ///
    /// A release failure must not mask a loader/writer error, so it is only logged.
    async fn unlock<T>(&self, lock_key: &str, token: LockToken, res: Result<T>) -> Result<T> {
        if let Err(e) = self.service.unlock(lock_key, token).await {
            tracing::warn!("failed to release lock: {lock_key}, error: {e}");
        }
        res
    }

    /// Read one value at `key`, loading it from the store on miss.
    ///
    /// The loader runs at most once per concurrent miss episode; callers that lose the per-key
    /// lock either observe the winner's freshly written entry (double-checked after the lock
    /// wait) or, if the lock wait times out, fall back to a best-effort read of whatever the
    /// bucket currently holds, possibly nothing.
    ///
    /// `Ok(None)` means the store confirmed the key absent, or a best-effort fallback found the
    /// bucket still unpopulated. Loader errors propagate unchanged as [`Error::Store`].
    pub async fn read<T, F, FU>(&self, key: &str, loader: F) -> Result<Option<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Option<T>>> + Send,
    {
        if let Some(buf) = self.service.get(key).await? {
            return Ok(EntryCodec::decode::<T>(&buf)?.into_inner());
        }

        tracing::warn!("miss in cache for key: {key}");
        let lock_key = self.lock_key(key);
        let token = match self.service.try_lock(&lock_key, self.lock_wait, self.lock_hold).await {
            Ok(token) => token,
            // Failing to become the loader is not fatal to the read. Degrade to a best-effort
            // answer and leave loading to a luckier caller.
            Err(e) => {
                tracing::error!("acquiring lock failed for key: {key}, error: {e}");
                return match self.service.get(key).await? {
                    Some(buf) => Ok(EntryCodec::decode::<T>(&buf)?.into_inner()),
                    None => Ok(None),
                };
            }
        };

        let res = self.read_locked(key, token.is_some(), loader).await;
        match token {
            Some(token) => self.unlock(&lock_key, token, res).await,
            None => res,
        }
    }

    async fn read_locked<T, F, FU>(&self, key: &str, locked: bool, loader: F) -> Result<Option<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Option<T>>> + Send,
    {
        // Double check: the lock wait may have overlapped another caller's load.
        if let Some(buf) = self.service.get(key).await? {
            return Ok(EntryCodec::decode::<T>(&buf)?.into_inner());
        }
        if !locked {
            return Ok(None);
        }

        let wrapped = Nullable::from(loader().await.map_err(Error::store)?);
        self.service
            .set(key, EntryCodec::encode(&wrapped)?, self.ttl)
            .await?;
        Ok(wrapped.into_inner())
    }

    /// Read one field of the collection at `key`, bulk-loading the whole collection on miss.
    ///
    /// One store round-trip repopulates every field of the collection, re-indexed by `field_of`,
    /// under the same per-key lock discipline as [`CacheAside::read`]. If the requested field is
    /// not among the loaded records an absent sentinel is still written for it, so later lookups
    /// of that field short-circuit in the cache.
    pub async fn read_field<T, F, FU, X>(&self, key: &str, field: &str, loader: F, field_of: X) -> Result<Option<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Vec<T>>> + Send,
        X: Fn(&T) -> String,
    {
        if let Some(buf) = self.service.field_get(key, field).await? {
            return Ok(EntryCodec::decode::<T>(&buf)?.into_inner());
        }

        tracing::warn!("miss in cache for key: {key}, field: {field}");
        let lock_key = self.lock_key(key);
        let token = match self.service.try_lock(&lock_key, self.lock_wait, self.lock_hold).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("acquiring lock failed for key: {key}, field: {field}, error: {e}");
                return match self.service.field_get(key, field).await? {
                    Some(buf) => Ok(EntryCodec::decode::<T>(&buf)?.into_inner()),
                    None => Ok(None),
                };
            }
        };

        let res = self.read_field_locked(key, field, token.is_some(), loader, field_of).await;
        match token {
            Some(token) => self.unlock(&lock_key, token, res).await,
            None => res,
        }
    }

    async fn read_field_locked<T, F, FU, X>(
        &self,
        key: &str,
        field: &str,
        locked: bool,
        loader: F,
        field_of: X,
    ) -> Result<Option<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Vec<T>>> + Send,
        X: Fn(&T) -> String,
    {
        if let Some(buf) = self.service.field_get(key, field).await? {
            return Ok(EntryCodec::decode::<T>(&buf)?.into_inner());
        }
        if !locked {
            return Ok(None);
        }

        let mut map: HashMap<String, Nullable<T>> = loader()
            .await
            .map_err(Error::store)?
            .into_iter()
            .map(|record| (field_of(&record), Nullable::some(record)))
            .collect();
        // The requested field may be absent from the store. Cache that verdict too.
        map.entry(field.to_string()).or_insert_with(Nullable::none);

        let mut entries = HashMap::with_capacity(map.len());
        for (f, wrapped) in &map {
            entries.insert(f.clone(), EntryCodec::encode(wrapped)?);
        }
        self.service.field_put_all(key, entries).await?;
        self.service.expire(key, self.ttl).await?;

        Ok(map.remove(field).and_then(Nullable::into_inner))
    }

    /// Read every known value of the collection at `key`.
    ///
    /// A non-empty cached field map is returned as-is (absent sentinels filtered out). On miss
    /// the collection is bulk-loaded and cached under the per-key lock; a caller that loses the
    /// lock wait returns whatever is currently cached rather than waiting. Enumeration is
    /// best-effort, not a point lookup.
    pub async fn read_all<T, F, FU, X>(&self, key: &str, loader: F, field_of: X) -> Result<Vec<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Vec<T>>> + Send,
        X: Fn(&T) -> String,
    {
        let entries = self.service.field_get_all(key).await?;
        if !entries.is_empty() {
            return decode_present(entries);
        }

        tracing::warn!("miss in cache for key: {key}");
        let lock_key = self.lock_key(key);
        let token = match self.service.try_lock(&lock_key, self.lock_wait, self.lock_hold).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("acquiring lock failed for key: {key}, error: {e}");
                return decode_present(self.service.field_get_all(key).await?);
            }
        };

        let res = self.read_all_locked(key, token.is_some(), loader, field_of).await;
        match token {
            Some(token) => self.unlock(&lock_key, token, res).await,
            None => res,
        }
    }

    async fn read_all_locked<T, F, FU, X>(&self, key: &str, locked: bool, loader: F, field_of: X) -> Result<Vec<T>>
    where
        T: CacheValue,
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Vec<T>>> + Send,
        X: Fn(&T) -> String,
    {
        let entries = self.service.field_get_all(key).await?;
        if !entries.is_empty() || !locked {
            return decode_present(entries);
        }

        let records = loader().await.map_err(Error::store)?;
        let mut entries = HashMap::with_capacity(records.len());
        for record in &records {
            entries.insert(field_of(record), EntryCodec::encode(&Nullable::some(record.clone()))?);
        }
        self.service.field_put_all(key, entries).await?;
        self.service.expire(key, self.ttl).await?;

        Ok(records)
    }

    /// Mutate the store under the per-key lock, then invalidate the cached bucket entry.
    ///
    /// Lock acquisition is blocking, not timeout-bounded: a write must eventually run or fail
    /// loudly, never be skipped because of contention. Invalidation happens after the store write
    /// commits and is fire-and-forget; a writer error propagates and leaves the cache entry
    /// untouched.
    pub async fn write_lock<R, F, FU>(&self, key: &str, writer: F) -> Result<R>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<R>> + Send,
    {
        let lock_key = self.lock_key(key);
        let token = self.service.lock(&lock_key, self.lock_hold).await?;
        let res = writer().await.map_err(Error::store);
        let value = self.unlock(&lock_key, token, res).await?;

        self.service.delete_background(key);
        Ok(value)
    }

    /// Mutate the store under the per-key lock, then invalidate one field of the collection at
    /// `key`.
    ///
    /// Same contract as [`CacheAside::write_lock`], invalidating a single field-map entry.
    pub async fn write_lock_field<R, F, FU>(&self, key: &str, field: &str, writer: F) -> Result<R>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<R>> + Send,
    {
        let lock_key = self.lock_key(key);
        let token = self.service.lock(&lock_key, self.lock_hold).await?;
        let res = writer().await.map_err(Error::store);
        let value = self.unlock(&lock_key, token, res).await?;

        self.service.field_remove_background(key, field);
        Ok(value)
    }

    /// Mutate the store, then invalidate the cached bucket entry, without taking the lock.
    ///
    /// For callers whose own transaction boundary already serializes writers, where the lock
    /// would be redundant.
    pub async fn write_cache_aside<R, F, FU>(&self, key: &str, writer: F) -> Result<R>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<R>> + Send,
    {
        let value = writer().await.map_err(Error::store)?;
        self.service.delete_background(key);
        Ok(value)
    }

    /// Mutate the store, then invalidate one field of the collection at `key`, without taking
    /// the lock.
    pub async fn write_cache_aside_field<R, F, FU>(&self, key: &str, field: &str, writer: F) -> Result<R>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<R>> + Send,
    {
        let value = writer().await.map_err(Error::store)?;
        self.service.field_remove_background(key, field);
        Ok(value)
    }
}

fn decode_present<T>(entries: HashMap<String, Vec<u8>>) -> Result<Vec<T>>
where
    T: CacheValue,
{
    let mut values = Vec::with_capacity(entries.len());
    for buf in entries.values() {
        if let Some(value) = EntryCodec::decode::<T>(buf)?.into_inner() {
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::future::join_all;
    use itertools::Itertools;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::memory::MemoryCacheService;

    const CONCURRENCY: usize = 8;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    fn user(id: u64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
        }
    }

    fn manager() -> CacheAside<MemoryCacheService> {
        CacheAside::builder(MemoryCacheService::new()).build()
    }

    #[test_log::test(tokio::test)]
    async fn test_read_loads_once_then_hits() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let loads = loads.clone();
            let res = manager
                .read("user:42", || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(user(42, "A")))
                })
                .await
                .unwrap();
            assert_eq!(res, Some(user(42, "A")));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_absent_key_is_cached_as_sentinel() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let loads = loads.clone();
            let res: Option<User> = manager
                .read("user:404", || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert_eq!(res, None);
        }
        // The confirmed-absent verdict is itself cached. One store round-trip, total.
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_misses_collapse_to_one_load() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        let handles = (0..CONCURRENCY)
            .map(|_| {
                let manager = manager.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    manager
                        .read("user:42", || async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(Some(user(42, "A")))
                        })
                        .await
                        .unwrap()
                })
            })
            .collect_vec();

        for res in join_all(handles).await {
            assert_eq!(res.unwrap(), Some(user(42, "A")));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_loader_error_propagates_and_releases_lock() {
        let manager = manager();

        let res: Result<Option<User>> = manager
            .read("user:42", || async { Err(anyhow::anyhow!("db down")) })
            .await;
        assert!(matches!(res, Err(Error::Store(_))));

        // Nothing was cached and the lock is free again for the next attempt.
        let res = manager
            .read("user:42", || async { Ok(Some(user(42, "A"))) })
            .await
            .unwrap();
        assert_eq!(res, Some(user(42, "A")));
    }

    #[test_log::test(tokio::test)]
    async fn test_lock_wait_timeout_falls_back_without_loading() {
        let service = MemoryCacheService::new();
        let manager = CacheAside::builder(service.clone())
            .with_lock_wait(Duration::from_millis(50))
            .build();
        let loads = Arc::new(AtomicUsize::new(0));

        // Another process holds the lock and never populates the bucket.
        service.lock("lock.user:42", Duration::from_secs(60)).await.unwrap();

        let res: Option<User> = {
            let loads = loads.clone();
            manager
                .read("user:42", || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(user(42, "A")))
                })
                .await
                .unwrap()
        };
        assert_eq!(res, None);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_read_field_bulk_loads_whole_collection() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        let bulk = |loads: Arc<AtomicUsize>| {
            move || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok((1..=5).map(|i| user(i, &format!("u{i}"))).collect_vec())
            }
        };

        let res = manager
            .read_field("users", "u3", bulk(loads.clone()), |u| u.name.clone())
            .await
            .unwrap();
        assert_eq!(res, Some(user(3, "u3")));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // Every sibling field was populated by that one round-trip.
        let res = manager
            .read_field("users", "u1", bulk(loads.clone()), |u| u.name.clone())
            .await
            .unwrap();
        assert_eq!(res, Some(user(1, "u1")));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_read_field_missing_field_gets_sentinel() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        let bulk = |loads: Arc<AtomicUsize>| {
            move || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![user(1, "u1")])
            }
        };

        let res = manager
            .read_field("users", "u9", bulk(loads.clone()), |u| u.name.clone())
            .await
            .unwrap();
        assert_eq!(res, None);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // The absent verdict for "u9" short-circuits the next lookup.
        let res = manager
            .read_field("users", "u9", bulk(loads.clone()), |u| u.name.clone())
            .await
            .unwrap();
        assert_eq!(res, None);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_read_all_returns_present_values_only() {
        let manager = manager();
        let loads = Arc::new(AtomicUsize::new(0));

        // Populate, including an absent sentinel for a field that is not in the store.
        let res: Option<User> = manager
            .read_field(
                "users",
                "u9",
                || async { Ok(vec![user(1, "u1"), user(2, "u2")]) },
                |u| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(res, None);

        let mut all = {
            let loads = loads.clone();
            manager
                .read_all(
                    "users",
                    || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![])
                    },
                    |u: &User| u.name.clone(),
                )
                .await
                .unwrap()
        };
        all.sort_by_key(|u| u.id);
        assert_eq!(all, vec![user(1, "u1"), user(2, "u2")]);
        // The populated field map is a hit. The sentinel is filtered, not returned.
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_read_all_loads_on_empty_map() {
        let manager = manager();

        let mut all = manager
            .read_all(
                "users",
                || async { Ok(vec![user(1, "u1"), user(2, "u2")]) },
                |u: &User| u.name.clone(),
            )
            .await
            .unwrap();
        all.sort_by_key(|u| u.id);
        assert_eq!(all, vec![user(1, "u1"), user(2, "u2")]);

        // And the loaded set is now served from the cache.
        let all = manager
            .read_all(
                "users",
                || async { Err::<Vec<User>, _>(anyhow::anyhow!("must not reload")) },
                |u: &User| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_write_lock_invalidates_bucket() {
        let manager = manager();
        let store = Arc::new(parking_lot::Mutex::new(user(42, "A")));

        let res = {
            let store = store.clone();
            manager
                .read("user:42", || async move { Ok(Some(store.lock().clone())) })
                .await
                .unwrap()
        };
        assert_eq!(res, Some(user(42, "A")));

        {
            let store = store.clone();
            manager
                .write_lock("user:42", || async move {
                    store.lock().name = "B".to_string();
                    Ok(())
                })
                .await
                .unwrap();
        }

        // Invalidation is fire-and-forget; give the background delete a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let res = {
            let store = store.clone();
            manager
                .read("user:42", || async move { Ok(Some(store.lock().clone())) })
                .await
                .unwrap()
        };
        assert_eq!(res, Some(user(42, "B")));
    }

    #[test_log::test(tokio::test)]
    async fn test_write_lock_error_skips_invalidation() {
        let manager = manager();

        let res = manager
            .read("user:42", || async { Ok(Some(user(42, "A"))) })
            .await
            .unwrap();
        assert_eq!(res, Some(user(42, "A")));

        let res: Result<()> = manager
            .write_lock("user:42", || async { Err(anyhow::anyhow!("db down")) })
            .await;
        assert!(matches!(res, Err(Error::Store(_))));

        tokio::time::sleep(Duration::from_millis(50)).await;

        // The failed write left the cached entry in place.
        let res = manager
            .read("user:42", || async { Err(anyhow::anyhow!("must not reload")) })
            .await
            .unwrap();
        assert_eq!(res, Some(user(42, "A")));
    }

    #[test_log::test(tokio::test)]
    async fn test_write_lock_field_invalidates_one_field() {
        let manager = manager();

        let res = manager
            .read_field(
                "users",
                "u1",
                || async { Ok(vec![user(1, "u1"), user(2, "u2")]) },
                |u| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(res, Some(user(1, "u1")));

        manager
            .write_lock_field("users", "u1", || async { Ok(()) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            manager.service().field_get("users", "u1").await.unwrap(),
            None
        );
        let res = manager
            .read_field(
                "users",
                "u2",
                || async { Err(anyhow::anyhow!("must not reload")) },
                |u: &User| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(res, Some(user(2, "u2")));
    }

    #[test_log::test(tokio::test)]
    async fn test_write_cache_aside_field_invalidates_one_field() {
        let manager = manager();

        let res = manager
            .read_field(
                "users",
                "u1",
                || async { Ok(vec![user(1, "u1"), user(2, "u2")]) },
                |u| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(res, Some(user(1, "u1")));

        manager
            .write_cache_aside_field("users", "u1", || async { Ok(()) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // "u1" was invalidated and reloads; "u2" is still a pure hit.
        let loads = Arc::new(AtomicUsize::new(0));
        let res = {
            let loads = loads.clone();
            manager
                .read_field(
                    "users",
                    "u1",
                    || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![user(1, "u1-v2"), user(2, "u2")])
                    },
                    |u| u.name.clone(),
                )
                .await
                .unwrap()
        };
        assert_eq!(res.map(|u| u.id), Some(1));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let res = manager
            .read_field(
                "users",
                "u2",
                || async { Err(anyhow::anyhow!("must not reload")) },
                |u: &User| u.name.clone(),
            )
            .await
            .unwrap();
        assert_eq!(res, Some(user(2, "u2")));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_entries_reload_after_ttl() {
        let service = MemoryCacheService::new();
        let manager = CacheAside::builder(service)
            .with_ttl(Duration::from_millis(100))
            .build();
        let loads = Arc::new(AtomicUsize::new(0));

        let read = |loads: Arc<AtomicUsize>| {
            let manager = manager.clone();
            async move {
                manager
                    .read("user:42", || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(Some(user(42, "A")))
                    })
                    .await
                    .unwrap()
            }
        };

        assert_eq!(read(loads.clone()).await, Some(user(42, "A")));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(read(loads.clone()).await, Some(user(42, "A")));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
