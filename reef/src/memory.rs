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

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    time::Instant,
};

use crate::{
    error::Result,
    service::{CacheService, LockToken},
};

#[derive(Debug)]
struct Slot {
    value: Vec<u8>,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct FieldMapSlot {
    fields: HashMap<String, Vec<u8>>,
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct LockHolder {
    token: LockToken,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Default)]
struct LockSlot {
    mutex: Arc<AsyncMutex<()>>,
    holder: Option<LockHolder>,
}

#[derive(Debug, Default)]
struct Shared {
    buckets: Mutex<HashMap<String, Slot>>,
    maps: Mutex<HashMap<String, FieldMapSlot>>,
    locks: Mutex<HashMap<String, LockSlot>>,
    lock_tokens: AtomicU64,
}

/// In-process [`CacheService`] over plain maps and tokio sync primitives.
///
/// Useful for local runs and tests, and as the reference semantics for remote implementations:
/// entries expire lazily on access, and a held lock is force-released once its hold timeout
/// elapses so a crashed holder cannot wedge a key forever.
///
/// The handle is a cheap clone over shared state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheService {
    shared: Arc<Shared>,
}

impl MemoryCacheService {
    /// Create an empty in-process cache service.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_mutex(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.shared
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .mutex
            .clone()
    }

    /// Register the freshly acquired guard as the current holder and arm the hold-timeout
    /// watchdog for it.
    fn install_holder(&self, key: &str, guard: OwnedMutexGuard<()>, hold: Duration) -> LockToken {
        let token = LockToken::new(self.shared.lock_tokens.fetch_add(1, Ordering::Relaxed));
        self.shared
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .holder = Some(LockHolder { token, _guard: guard });

        let shared = self.shared.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            if let Some(slot) = shared.locks.lock().get_mut(&key) {
                // Only the holder the watchdog was armed for is released. A later holder of the
                // same key carries a different token.
                if slot.holder.as_ref().is_some_and(|holder| holder.token == token) {
                    slot.holder = None;
                    tracing::warn!("lock hold timeout exceeded, force releasing: {key}");
                }
            }
        });

        token
    }
}

impl CacheService for MemoryCacheService {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut buckets = self.shared.buckets.lock();
        match buckets.get(key) {
            Some(slot) if slot.deadline > Instant::now() => Ok(Some(slot.value.clone())),
            Some(_) => {
                buckets.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let slot = Slot {
            value,
            deadline: Instant::now() + ttl,
        };
        self.shared.buckets.lock().insert(key.to_string(), slot);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.shared.buckets.lock().remove(key);
        Ok(())
    }

    fn delete_background(&self, key: &str) {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.delete(&key).await {
                tracing::warn!("background delete failed for key: {key}, error: {e}");
            }
        });
    }

    async fn field_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut maps = self.shared.maps.lock();
        Ok(live_map(&mut maps, key).and_then(|map| map.fields.get(field).cloned()))
    }

    async fn field_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        let mut maps = self.shared.maps.lock();
        Ok(live_map(&mut maps, key)
            .map(|map| map.fields.clone())
            .unwrap_or_default())
    }

    async fn field_put_all(&self, key: &str, entries: HashMap<String, Vec<u8>>) -> Result<()> {
        let mut maps = self.shared.maps.lock();
        if live_map(&mut maps, key).is_none() {
            maps.insert(key.to_string(), FieldMapSlot::default());
        }
        if let Some(map) = maps.get_mut(key) {
            map.fields.extend(entries);
        }
        Ok(())
    }

    async fn field_remove(&self, key: &str, field: &str) -> Result<()> {
        let mut maps = self.shared.maps.lock();
        if let Some(map) = live_map(&mut maps, key) {
            map.fields.remove(field);
        }
        Ok(())
    }

    fn field_remove_background(&self, key: &str, field: &str) {
        let this = self.clone();
        let key = key.to_string();
        let field = field.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.field_remove(&key, &field).await {
                tracing::warn!("background field remove failed for key: {key}, field: {field}, error: {e}");
            }
        });
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut maps = self.shared.maps.lock();
        if let Some(map) = live_map(&mut maps, key) {
            map.deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn try_lock(&self, key: &str, wait: Duration, hold: Duration) -> Result<Option<LockToken>> {
        let mutex = self.lock_mutex(key);
        match tokio::time::timeout(wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(Some(self.install_holder(key, guard, hold))),
            Err(_) => Ok(None),
        }
    }

    async fn lock(&self, key: &str, hold: Duration) -> Result<LockToken> {
        let mutex = self.lock_mutex(key);
        let guard = mutex.lock_owned().await;
        Ok(self.install_holder(key, guard, hold))
    }

    async fn unlock(&self, key: &str, token: LockToken) -> Result<()> {
        if let Some(slot) = self.shared.locks.lock().get_mut(key) {
            // A stale release must not eject a holder that acquired the lock after this token
            // was force-released.
            if slot.holder.as_ref().is_some_and(|holder| holder.token == token) {
                slot.holder = None;
            }
        }
        Ok(())
    }
}

/// Drop the field map at `key` if its TTL elapsed, then hand out whatever is left.
fn live_map<'a>(maps: &'a mut HashMap<String, FieldMapSlot>, key: &str) -> Option<&'a mut FieldMapSlot> {
    let expired = maps
        .get(key)
        .is_some_and(|map| map.deadline.is_some_and(|deadline| deadline <= Instant::now()));
    if expired {
        maps.remove(key);
    }
    maps.get_mut(key)
}
