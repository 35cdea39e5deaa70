//! Boundary contracts to the external KV-cache allocator.
//!
//! The ring never inspects cache internals. It asks a per-position
//! [`CacheHandle`] to materialize a [`BatchContext`] when a slot is created
//! and to release everything it holds when a round is cleared. Body-stage
//! slots read their generation progress back through the context, which is
//! why `max_seq_len` is the one mandatory query.

use thiserror::Error;

use crate::slot::BatchInputs;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to initialize batch context: {reason}")]
    ContextInit { reason: String },

    #[error("failed to release cache resources: {reason}")]
    ReleaseFailed { reason: String },
}

/// Per-batch cache state materialized once at slot creation.
///
/// Opaque to the ring apart from the recorded sequence length. For body
/// stages the external cache advances this as tokens are appended, so the
/// value is expected to be monotonically non-decreasing.
pub trait BatchContext {
    /// Maximum recorded sequence length across the rows of the batch.
    fn max_seq_len(&self) -> usize;
}

/// One cache resource per ring position.
pub trait CacheHandle {
    type Context: BatchContext;

    /// Materialize the batch context for a newly created slot.
    fn init_from_batch(
        &mut self,
        inputs: &BatchInputs,
        max_input_len: usize,
        max_output_len: usize,
    ) -> std::result::Result<Self::Context, CacheError>;

    /// Release every resource held for the current round.
    ///
    /// Called exactly once per round from `SlotRing::reset_round`, finished
    /// or not. Failures propagate to the caller unmasked.
    fn free_all(&mut self) -> std::result::Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_context_init() {
        let e = CacheError::ContextInit {
            reason: "no free blocks".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "failed to initialize batch context: no free blocks"
        );
    }

    #[test]
    fn error_display_release_failed() {
        let e = CacheError::ReleaseFailed {
            reason: "device lost".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "failed to release cache resources: device lost"
        );
    }
}
