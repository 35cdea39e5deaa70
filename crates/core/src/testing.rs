//! Shared test utilities for pipegen-core.
//!
//! Mock implementations of the cache boundary traits. Clones of a
//! [`MockCacheHandle`] share their counters and sequence-length gauge, so a
//! test can hand the handle to a ring and keep a mirror to steer the
//! recorded progress or observe releases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::{BatchContext, CacheError, CacheHandle};
use crate::slot::BatchInputs;

/// Externally steerable "recorded sequence length" of a mock cache.
#[derive(Debug, Default)]
pub struct SeqLenGauge(AtomicUsize);

impl SeqLenGauge {
    pub fn set(&self, len: usize) {
        self.0.store(len, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct MockCacheHandle {
    seq_len: Arc<SeqLenGauge>,
    contexts_created: Arc<AtomicUsize>,
    free_calls: Arc<AtomicUsize>,
    fail_release: bool,
}

impl MockCacheHandle {
    pub fn new() -> Self {
        Self {
            seq_len: Arc::new(SeqLenGauge::default()),
            contexts_created: Arc::new(AtomicUsize::new(0)),
            free_calls: Arc::new(AtomicUsize::new(0)),
            fail_release: false,
        }
    }

    /// A handle whose `free_all` always fails.
    pub fn failing_release() -> Self {
        Self {
            fail_release: true,
            ..Self::new()
        }
    }

    /// Gauge backing `max_seq_len` of every context this handle creates.
    pub fn seq_len_gauge(&self) -> Arc<SeqLenGauge> {
        Arc::clone(&self.seq_len)
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCacheHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheHandle for MockCacheHandle {
    type Context = MockBatchContext;

    fn init_from_batch(
        &mut self,
        _inputs: &BatchInputs,
        _max_input_len: usize,
        _max_output_len: usize,
    ) -> Result<Self::Context, CacheError> {
        self.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockBatchContext {
            seq_len: Arc::clone(&self.seq_len),
        })
    }

    fn free_all(&mut self) -> Result<(), CacheError> {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(CacheError::ReleaseFailed {
                reason: "mock release failure".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockBatchContext {
    seq_len: Arc<SeqLenGauge>,
}

impl BatchContext for MockBatchContext {
    fn max_seq_len(&self) -> usize {
        self.seq_len.get()
    }
}
