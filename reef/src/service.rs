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

use crate::error::Result;

/// Identifies one successful lock acquisition.
///
/// A holder releases with the token it was handed, so a release arriving after the service
/// force-released an overheld lock cannot eject the holder that acquired it since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(u64);

impl LockToken {
    /// Mint a token for a fresh acquisition. Called by service implementations only.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// The shared cache service the manager runs against.
///
/// The surface splits in three, mirroring a Redis-shaped deployment: a value bucket per key, a
/// field map (hash) per key, and a mutual-exclusion lock namespace. Implementations are expected
/// to be cheaply cloneable handles to a shared client.
///
/// Lock keys are owned by the manager, derived 1:1 from cache keys with a fixed prefix, and never
/// shared across unrelated cache keys.
pub trait CacheService: Send + Sync + 'static + Clone {
    /// Get the value bucket content at `key`, if any.
    #[must_use]
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Set the value bucket at `key` with a bounded TTL.
    #[must_use]
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Delete the value bucket at `key`.
    #[must_use]
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Delete the value bucket at `key` in the background, without waiting for completion.
    fn delete_background(&self, key: &str);

    /// Get one field of the field map at `key`, if any.
    #[must_use]
    fn field_get(&self, key: &str, field: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Get all fields of the field map at `key`. An absent map reads as an empty map.
    #[must_use]
    fn field_get_all(&self, key: &str) -> impl Future<Output = Result<HashMap<String, Vec<u8>>>> + Send;

    /// Insert or replace all given fields of the field map at `key`.
    #[must_use]
    fn field_put_all(&self, key: &str, entries: HashMap<String, Vec<u8>>) -> impl Future<Output = Result<()>> + Send;

    /// Remove one field of the field map at `key`.
    #[must_use]
    fn field_remove(&self, key: &str, field: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove one field of the field map at `key` in the background, without waiting for
    /// completion.
    fn field_remove_background(&self, key: &str, field: &str);

    /// Set the TTL of the field map at `key`.
    #[must_use]
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Try to acquire the mutual-exclusion lock at `key`, waiting at most `wait`.
    ///
    /// On success the returned token identifies this acquisition, and the lock is held for at
    /// most `hold` before the service force-releases it. Returns `None` if the lock could not be
    /// acquired within `wait`.
    #[must_use]
    fn try_lock(&self, key: &str, wait: Duration, hold: Duration)
        -> impl Future<Output = Result<Option<LockToken>>> + Send;

    /// Acquire the mutual-exclusion lock at `key`, waiting as long as it takes.
    ///
    /// The returned token identifies this acquisition; the lock is held for at most `hold`
    /// before the service force-releases it.
    #[must_use]
    fn lock(&self, key: &str, hold: Duration) -> impl Future<Output = Result<LockToken>> + Send;

    /// Release the acquisition identified by `token` at `key`.
    ///
    /// Must be a no-op when `token` no longer identifies the current holder — after a
    /// hold-timeout force release the lock may already belong to someone else, and a stale
    /// release must not eject them.
    #[must_use]
    fn unlock(&self, key: &str, token: LockToken) -> impl Future<Output = Result<()>> + Send;
}
