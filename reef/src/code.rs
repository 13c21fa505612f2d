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

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::{error::Result, nullable::Nullable};

/// Bound for values that can travel through the shared cache.
pub trait CacheValue: Send + Sync + 'static + Debug + Clone + Serialize + DeserializeOwned {}
impl<T> CacheValue for T where T: Send + Sync + 'static + Debug + Clone + Serialize + DeserializeOwned {}

/// Wire codec for cached entries.
///
/// The cache service traffics in raw bytes; the manager owns the encoding of the sentinel wrapper
/// so the present/absent distinction survives the transport.
#[derive(Debug)]
pub struct EntryCodec;

impl EntryCodec {
    /// Encode a wrapped entry.
    pub fn encode<T>(entry: &Nullable<T>) -> Result<Vec<u8>>
    where
        T: CacheValue,
    {
        bincode::serialize(entry).map_err(Into::into)
    }

    /// Decode a wrapped entry.
    pub fn decode<T>(buf: &[u8]) -> Result<Nullable<T>>
    where
        T: CacheValue,
    {
        bincode::deserialize(buf).map_err(Into::into)
    }
}
