//! In-memory platform for tests and embedding.
//!
//! [`InMemoryPlatform`] serves modules registered up front, counts every load
//! request per chunk, and can simulate latency and transient failures.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{QrlError, QrlResult};
use crate::platform::{Module, Platform};

/// An in-memory implementation of [`Platform`].
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    modules: RwLock<HashMap<String, Arc<Module>>>,
    loads: RwLock<HashMap<String, usize>>,
    pending_failures: RwLock<HashMap<String, usize>>,
    latency: Option<Duration>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load by `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Register (or replace) the module served for `chunk`.
    pub fn register(&self, chunk: impl Into<String>, module: Module) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk.into(), Arc::new(module));
    }

    /// Make the next `times` loads of `chunk` fail with `LoadFailed`.
    pub fn fail_next(&self, chunk: impl Into<String>, times: usize) {
        self.pending_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk.into(), times);
    }

    /// Number of load requests received for `chunk`, including failed ones.
    pub fn load_count(&self, chunk: &str) -> usize {
        self.loads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chunk)
            .copied()
            .unwrap_or(0)
    }

    /// Total load requests across all chunks.
    pub fn total_loads(&self) -> usize {
        self.loads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    fn take_failure(&self, chunk: &str) -> bool {
        let mut failures = self
            .pending_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(chunk) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn load(&self, chunk: &str) -> QrlResult<Arc<Module>> {
        *self
            .loads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(chunk.to_string())
            .or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_failure(chunk) {
            return Err(QrlError::LoadFailed {
                chunk: chunk.to_string(),
                reason: "injected failure".into(),
            });
        }

        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chunk)
            .cloned()
            .ok_or_else(|| QrlError::ChunkNotFound(chunk.to_string()))
    }
}
