//! Microbatch ring coordination for pipeline-parallel generation.
//!
//! A pipeline-parallel deployment splits the model into stages and keeps
//! several microbatches in flight at once so every stage has work on every
//! micro-step. This crate owns the bookkeeping side of that schedule: how
//! far each in-flight microbatch has generated, what lifecycle phase it is
//! in, and when a full round of microbatches has drained. Model execution,
//! KV-cache internals and inter-stage transport stay behind the traits in
//! [`cache`].

pub mod cache;
pub mod config;
pub mod error;
pub mod ring;
pub mod slot;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{BatchContext, CacheError, CacheHandle};
pub use config::{RingConfig, StageConfig};
pub use error::{Result, RingError};
pub use ring::SlotRing;
pub use slot::{BatchInputs, BodySlot, HeadSlot, Slot, Status, TokenId};
