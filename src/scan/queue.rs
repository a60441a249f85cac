//! Shared state of one classification pass.
//!
//! Both containers are guarded by `tokio::sync::Mutex`; the lock is never
//! held across a network call.

use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;

/// Pending keys of one pass. Each key is handed to exactly one worker.
#[derive(Debug, Default)]
pub struct WorkQueue {
    keys: Mutex<VecDeque<String>>,
}

impl WorkQueue {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter().collect()),
        }
    }

    /// Atomically take the next key.
    pub async fn pop(&self) -> Option<String> {
        self.keys.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }
}

/// Keys confirmed readable. Unordered.
#[derive(Debug, Default)]
pub struct ResultSet {
    keys: Mutex<HashSet<String>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: String) {
        self.keys.lock().await.insert(key);
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    /// Sorted copy of the confirmed keys, for stable reporting.
    pub async fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.lock().await.iter().cloned().collect();
        keys.sort();
        keys
    }
}
