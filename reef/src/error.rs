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

/// Cache-aside manager error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Backing store loader/writer failure, propagated unchanged.
    #[error("store error: {0}")]
    Store(anyhow::Error),
    /// Shared cache service failure. The cache is a required collaborator, not an optional
    /// accelerator, so these surface to the caller.
    #[error("cache service error: {0}")]
    Cache(anyhow::Error),
    /// Wire codec failure while encoding or decoding a cached entry.
    #[error("codec error: {0}")]
    Code(#[from] bincode::Error),
}

impl Error {
    /// Wrap a backing store failure.
    pub fn store(e: impl Into<anyhow::Error>) -> Self {
        Self::Store(e.into())
    }

    /// Wrap a cache service failure. Constructed by [`CacheService`](crate::CacheService)
    /// implementations; the manager itself only propagates these.
    pub fn cache(e: impl Into<anyhow::Error>) -> Self {
        Self::Cache(e.into())
    }
}

/// Cache-aside manager result.
pub type Result<T> = core::result::Result<T, Error>;
