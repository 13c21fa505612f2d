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

use serde::{Deserialize, Serialize};

/// Sentinel wrapper around a cached value.
///
/// A cache entry holding `Nullable::none()` means the store was consulted and confirmed the key
/// absent, which is a valid, final answer within the entry's TTL. That is distinct from the entry
/// not existing at all ("never loaded"), and it is what keeps repeated lookups for a non-existent
/// key from hitting the store every time.
///
/// The wrapper is serialized explicitly rather than relying on a bare null on the wire, where the
/// distinction would be lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nullable<T> {
    value: Option<T>,
}

impl<T> Nullable<T> {
    /// Wrap a value loaded from the store.
    pub fn some(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// Wrap a confirmed "absent in store" result.
    pub fn none() -> Self {
        Self { value: None }
    }

    /// Whether the wrapper holds a present value.
    pub fn is_some(&self) -> bool {
        self.value.is_some()
    }

    /// Unwrap into the inner optional value.
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        Self { value }
    }
}
