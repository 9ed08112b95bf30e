//! Thread-safe append-only collection with snapshot reads.
//!
//! Shared by the result store and the telemetry store; both only ever grow
//! during a run and are read via a cloned snapshot so readers never observe
//! a collection mid-mutation.

use tokio::sync::RwLock;

pub struct ResultCollection<T: Clone> {
    items: RwLock<Vec<T>>,
}

impl<T: Clone> Default for ResultCollection<T> {
    fn default() -> Self {
        Self { items: RwLock::new(Vec::new()) }
    }
}

impl<T: Clone> ResultCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, item: T) {
        self.items.write().await.push(item);
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}
