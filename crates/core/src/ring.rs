//! Ring-buffered slot manager for one pipeline stage.
//!
//! One `SlotRing` per stage, driven from a single sequential control flow:
//! the driver operates on the slot at the cursor, runs the pipeline step,
//! then rotates.
//!
//! ```text
//!            cursor
//!              v
//!   [ mb0 ] [ mb1 ] [ mb2 ] [ mb3 ]     buffer_capacity = pipeline depth
//!      ^_______________________/
//!            advance() rotates
//! ```
//!
//! Per-position lifecycle:
//!
//! ```text
//! (vacant) --add_slot--> Generate --step--> ... --step--> Cooldown
//!     ^                                                      |
//!     '---------------- reset_round <--- Done <----step------'
//! ```
//!
//! Positions are only ever vacated wholesale by [`SlotRing::reset_round`],
//! which also releases the cache resources of the round; individual slots
//! are never removed early.

use std::collections::HashMap;

use crate::cache::{BatchContext, CacheHandle};
use crate::config::{RingConfig, StageConfig};
use crate::error::{Result, RingError};
use crate::slot::{BatchInputs, BodySlot, HeadSlot, Slot, Status, TokenId};

enum SlotEntry<C> {
    Head(HeadSlot<C>),
    Body(BodySlot<C>),
}

impl<C: BatchContext> SlotEntry<C> {
    fn as_slot(&self) -> &dyn Slot {
        match self {
            Self::Head(slot) => slot,
            Self::Body(slot) => slot,
        }
    }

    fn as_slot_mut(&mut self) -> &mut dyn Slot {
        match self {
            Self::Head(slot) => slot,
            Self::Body(slot) => slot,
        }
    }

    fn context(&self) -> &C {
        match self {
            Self::Head(slot) => slot.context(),
            Self::Body(slot) => slot.context(),
        }
    }
}

/// Owns the slot at every ring position, the rotating cursor, and one cache
/// handle per position.
pub struct SlotRing<H: CacheHandle> {
    stage: StageConfig,
    config: RingConfig,
    cache_handles: Vec<H>,
    slots: HashMap<usize, SlotEntry<H::Context>>,
    cursor: usize,
}

impl<H: CacheHandle> SlotRing<H> {
    /// Create a ring for one stage. `cache_handles` must hold exactly one
    /// handle per ring position.
    pub fn new(stage: StageConfig, config: RingConfig, cache_handles: Vec<H>) -> Self {
        assert!(config.buffer_capacity > 0, "buffer_capacity must be > 0");
        assert_eq!(
            cache_handles.len(),
            config.buffer_capacity,
            "one cache handle per ring position"
        );

        Self {
            stage,
            config,
            cache_handles,
            slots: HashMap::with_capacity(config.buffer_capacity),
            cursor: 0,
        }
    }

    /// Create a slot for a new microbatch at the cursor position: a head
    /// slot on stage 0, a body slot elsewhere.
    ///
    /// Fails with [`RingError::SlotOccupied`] if the position still holds a
    /// slot from a round that was not cleared; silently replacing it would
    /// orphan that slot's cache resources.
    pub fn add_slot(&mut self, inputs: &BatchInputs) -> Result<()> {
        let position = self.cursor;
        if self.slots.contains_key(&position) {
            return Err(RingError::SlotOccupied { position });
        }

        let handle = &mut self.cache_handles[position];
        let entry = if self.stage.is_first {
            SlotEntry::Head(HeadSlot::create(
                inputs,
                self.config.max_input_len,
                self.config.max_output_len,
                handle,
            )?)
        } else {
            SlotEntry::Body(BodySlot::create(
                inputs,
                self.config.max_input_len,
                self.config.max_output_len,
                handle,
            )?)
        };

        tracing::debug!(
            stage_id = self.stage.stage_id,
            position,
            target_length = entry.as_slot().target_length(),
            "slot created"
        );
        self.slots.insert(position, entry);
        Ok(())
    }

    /// Feed one pipeline step's token column to the slot at the cursor and
    /// report its resulting state.
    ///
    /// `new_token` is `None` on the first call of a round for the head
    /// stage and on every call for body stages.
    pub fn step(&mut self, new_token: Option<&[TokenId]>) -> Result<Status> {
        let position = self.cursor;
        let entry = self
            .slots
            .get_mut(&position)
            .ok_or(RingError::NoActiveSlot { position })?;
        let slot = entry.as_slot_mut();
        slot.update(new_token);
        Ok(slot.state())
    }

    /// Rotate the cursor to the next position.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.config.buffer_capacity;
    }

    /// Whether every slot of the round has reached `Done`.
    ///
    /// An empty ring is "not started", not "done".
    pub fn is_round_complete(&self) -> bool {
        if self.slots.is_empty() {
            return false;
        }
        self.slots.values().all(|s| s.as_slot().state().is_done())
    }

    /// Collect the generated tokens of the round, rows in position order.
    ///
    /// Only the head stage owns tokens; a body-stage ring fails with
    /// [`RingError::NotApplicable`] rather than masking the caller bug with
    /// an empty result.
    pub fn collect_outputs(&self) -> Result<Vec<Vec<TokenId>>> {
        if !self.stage.is_first {
            return Err(RingError::NotApplicable {
                stage_id: self.stage.stage_id,
            });
        }

        let mut outputs = Vec::new();
        for position in 0..self.config.buffer_capacity {
            let Some(SlotEntry::Head(slot)) = self.slots.get(&position) else {
                continue;
            };
            match slot.generated_tokens() {
                Some(rows) => outputs.extend(rows.iter().cloned()),
                // Nothing produced yet: one closed empty row per batch row.
                None => outputs.extend(slot.input_ids().iter().map(|_| Vec::new())),
            }
        }
        Ok(outputs)
    }

    /// Clear every position and release the cache resources of the round.
    ///
    /// Safe on an unfinished round: this is also the abort path, so the
    /// handles are released regardless of slot state. Must be called before
    /// a position can be reused.
    pub fn reset_round(&mut self) -> Result<()> {
        self.slots.clear();
        for handle in &mut self.cache_handles {
            handle.free_all()?;
        }
        tracing::debug!(stage_id = self.stage.stage_id, "round cleared");
        Ok(())
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Slot at the cursor, if one was created.
    pub fn current_slot(&self) -> Option<&dyn Slot> {
        self.slots.get(&self.cursor).map(SlotEntry::as_slot)
    }

    /// Batch context of the slot at the cursor; the driver runs the model
    /// step against this.
    pub fn current_context(&self) -> Option<&H::Context> {
        self.slots.get(&self.cursor).map(SlotEntry::context)
    }

    /// State of the cursor position, `Prefill` while it is vacant.
    pub fn current_state(&self) -> Status {
        self.current_slot()
            .map_or(Status::Prefill, |slot| slot.state())
    }

    /// Number of positions holding a live slot.
    pub fn occupied(&self) -> usize {
        self.slots.len()
    }

    pub fn stage(&self) -> &StageConfig {
        &self.stage
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }
}
