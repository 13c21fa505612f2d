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

//! Write path: mutate the store under the per-key lock, then let the invalidation catch the
//! cache up on the next read.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use reef::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let store: Arc<Mutex<HashMap<u64, User>>> = Arc::new(Mutex::new(HashMap::from([(
        42,
        User {
            id: 42,
            name: "Ada".to_string(),
        },
    )])));
    let manager = CacheAside::builder(MemoryCacheService::new()).build();

    let select = |store: Arc<Mutex<HashMap<u64, User>>>| async move {
        Ok(store.lock().unwrap().get(&42).cloned())
    };

    let user = manager.read("user:42", || select(store.clone())).await?;
    println!("before write: {user:?}");

    manager
        .write_lock("user:42", || {
            let store = store.clone();
            async move {
                if let Some(user) = store.lock().unwrap().get_mut(&42) {
                    user.name = "Grace".to_string();
                }
                Ok(())
            }
        })
        .await?;

    // Invalidation is fire-and-forget; give it a beat before reading back.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let user = manager.read("user:42", || select(store.clone())).await?;
    println!("after write: {user:?}");

    Ok(())
}
