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

//! reef - distributed lock-guarded cache-aside manager.
//!
//! reef sits between application code and a durable store, serving reads through a shared
//! (Redis-like) cache service. Cache misses repopulate the cache under a per-key distributed
//! lock so concurrent misses for a hot key collapse into a single store load, and confirmed
//! "absent in store" answers are cached as sentinels so repeated lookups for a non-existent key
//! stop hitting the store. Writes mutate the store first and invalidate the affected cache entry
//! afterwards.
//!
//! The cache service is consumed through the [`CacheService`] trait; [`MemoryCacheService`] is a
//! complete in-process implementation for local runs and tests.

mod code;
mod error;
mod manager;
mod memory;
mod nullable;
mod service;

pub mod prelude;

pub use code::{CacheValue, EntryCodec};
pub use error::{Error, Result};
pub use manager::{
    CacheAside, CacheAsideBuilder, DEFAULT_LOCK_HOLD, DEFAULT_LOCK_PREFIX, DEFAULT_LOCK_WAIT, DEFAULT_TTL,
};
pub use memory::MemoryCacheService;
pub use nullable::Nullable;
pub use service::{CacheService, LockToken};
