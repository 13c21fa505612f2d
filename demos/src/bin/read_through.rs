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

//! Read-through basics: one cold load, then cache hits, including for a key the store does not
//! have.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use reef::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

async fn select_user(id: u64) -> anyhow::Result<Option<User>> {
    println!("... store round-trip for user {id} ...");
    Ok((id == 42).then(|| User {
        id,
        name: "Ada".to_string(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let manager = CacheAside::builder(MemoryCacheService::new())
        .with_ttl(Duration::from_secs(60))
        .build();

    // Cold: goes to the store and populates the cache.
    let user = manager.read("user:42", || select_user(42)).await?;
    println!("first read: {user:?}");

    // Warm: pure cache hit.
    let user = manager.read("user:42", || select_user(42)).await?;
    println!("second read: {user:?}");

    // Absent keys are confirmed once and then served from the cached sentinel.
    for _ in 0..2 {
        let user = manager.read("user:7", || select_user(7)).await?;
        println!("missing user read: {user:?}");
    }

    Ok(())
}
