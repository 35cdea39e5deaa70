//! Per-microbatch generation progress.
//!
//! A slot tracks one in-flight microbatch from creation to its target
//! length. Progress is never stored as a phase flag: [`Slot::state`] is
//! recomputed from `(current_length, target_length)` on every query, so the
//! lifecycle enum can never drift out of sync with the lengths that define
//! it.
//!
//! Two variants implement the capability:
//!
//! - [`HeadSlot`] (first stage) owns the prompt tokens, the growing
//!   attention mask and the generated tokens.
//! - [`BodySlot`] (every later stage) owns no generation-facing data and
//!   reads its progress from the batch context recorded by the cache.

use crate::cache::{BatchContext, CacheHandle};
use crate::error::{Result, RingError};

pub type TokenId = u32;

/// Lifecycle phase of a ring position.
///
/// `Prefill` is a ring-level label for "no slot created yet"; a slot's own
/// [`Slot::state`] never returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing occupies the position yet.
    Prefill,
    /// More than one step away from the target length.
    Generate,
    /// Exactly one step away: the next accepted token completes the slot.
    Cooldown,
    /// Current length reached the target length.
    Done,
}

impl Status {
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Inputs for one microbatch, row-major.
///
/// `input_ids` is required for every stage (it fixes the initial length);
/// `attention_mask` is required by the head stage only and must match
/// `input_ids` row for row.
#[derive(Debug, Clone, Default)]
pub struct BatchInputs {
    pub input_ids: Vec<Vec<TokenId>>,
    pub attention_mask: Option<Vec<Vec<u8>>>,
}

impl BatchInputs {
    pub fn new(input_ids: Vec<Vec<TokenId>>, attention_mask: Vec<Vec<u8>>) -> Self {
        Self {
            input_ids,
            attention_mask: Some(attention_mask),
        }
    }

    /// Token length of the starting sequence (columns of the grid).
    fn seq_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }
}

/// Progress record of one microbatch occupying one ring position.
pub trait Slot {
    /// Current sequence length, monotonically non-decreasing and never
    /// above [`Slot::target_length`].
    fn current_length(&self) -> usize;

    /// Initial length plus the configured output budget.
    fn target_length(&self) -> usize;

    /// Absorb the result of one pipeline step. Body stages ignore it: their
    /// progress is driven entirely by the external cache context.
    fn update(&mut self, new_token: Option<&[TokenId]>) {
        let _ = new_token;
    }

    /// Derived lifecycle phase; never `Prefill`.
    fn state(&self) -> Status {
        let current = self.current_length();
        let target = self.target_length();
        if current >= target {
            Status::Done
        } else if current + 1 == target {
            Status::Cooldown
        } else {
            Status::Generate
        }
    }
}

/// First-stage slot: owns tokens and the attention mask.
#[derive(Debug)]
pub struct HeadSlot<C> {
    initial_length: usize,
    target_length: usize,
    context: C,
    input_ids: Vec<Vec<TokenId>>,
    attention_mask: Vec<Vec<u8>>,
    /// Absent until the first token is produced, then one row per batch row.
    generated: Option<Vec<Vec<TokenId>>>,
}

impl<C> HeadSlot<C> {
    pub fn create<H>(
        inputs: &BatchInputs,
        max_input_len: usize,
        max_output_len: usize,
        handle: &mut H,
    ) -> Result<Self>
    where
        H: CacheHandle<Context = C>,
    {
        // Validate before touching the cache so a rejected slot allocates
        // nothing.
        let mask = validate_head_inputs(inputs)?;
        let initial_length = inputs.seq_len();
        let context = handle.init_from_batch(inputs, max_input_len, max_output_len)?;
        Ok(Self {
            initial_length,
            target_length: initial_length + max_output_len,
            context,
            input_ids: inputs.input_ids.clone(),
            attention_mask: mask.to_vec(),
            generated: None,
        })
    }

    pub fn input_ids(&self) -> &[Vec<TokenId>] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[Vec<u8>] {
        &self.attention_mask
    }

    pub fn generated_tokens(&self) -> Option<&[Vec<TokenId>]> {
        self.generated.as_deref()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    fn append_tokens(&mut self, new_token: &[TokenId]) {
        match &mut self.generated {
            None => {
                self.generated = Some(new_token.iter().map(|&t| vec![t]).collect());
            }
            Some(rows) => {
                for (row, &token) in rows.iter_mut().zip(new_token) {
                    row.push(token);
                }
            }
        }
    }

    fn extend_mask(&mut self) {
        for row in &mut self.attention_mask {
            row.push(1);
        }
    }
}

impl<C> Slot for HeadSlot<C> {
    fn current_length(&self) -> usize {
        match &self.generated {
            None => self.initial_length,
            Some(rows) => self.initial_length + rows.first().map_or(0, Vec::len),
        }
    }

    fn target_length(&self) -> usize {
        self.target_length
    }

    /// Appends the token column, then grows the mask by one attend element
    /// only if the slot still has another step to take. A slot whose last
    /// token just reached `Done` keeps its mask closed.
    fn update(&mut self, new_token: Option<&[TokenId]>) {
        let Some(new_token) = new_token else {
            return;
        };
        self.append_tokens(new_token);
        if self.state() != Status::Done {
            self.extend_mask();
        }
    }
}

/// Later-stage slot: progress is read back from the cache context.
pub struct BodySlot<C> {
    initial_length: usize,
    target_length: usize,
    context: C,
}

impl<C> BodySlot<C> {
    pub fn create<H>(
        inputs: &BatchInputs,
        max_input_len: usize,
        max_output_len: usize,
        handle: &mut H,
    ) -> Result<Self>
    where
        H: CacheHandle<Context = C>,
    {
        let initial_length = inputs.seq_len();
        let context = handle.init_from_batch(inputs, max_input_len, max_output_len)?;
        Ok(Self {
            initial_length,
            target_length: initial_length + max_output_len,
            context,
        })
    }

    pub fn initial_length(&self) -> usize {
        self.initial_length
    }

    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C: BatchContext> Slot for BodySlot<C> {
    fn current_length(&self) -> usize {
        self.context.max_seq_len()
    }

    fn target_length(&self) -> usize {
        self.target_length
    }
}

fn validate_head_inputs(inputs: &BatchInputs) -> Result<&[Vec<u8>]> {
    if inputs.input_ids.is_empty() || inputs.input_ids[0].is_empty() {
        return Err(RingError::InvalidInput {
            reason: "input_ids is missing or empty",
        });
    }
    let seq_len = inputs.input_ids[0].len();
    if inputs.input_ids.iter().any(|row| row.len() != seq_len) {
        return Err(RingError::InvalidInput {
            reason: "input_ids rows have unequal lengths",
        });
    }
    let Some(mask) = inputs.attention_mask.as_deref() else {
        return Err(RingError::InvalidInput {
            reason: "attention_mask is missing",
        });
    };
    if mask.len() != inputs.input_ids.len() || mask.iter().any(|row| row.len() != seq_len) {
        return Err(RingError::InvalidInput {
            reason: "attention_mask shape differs from input_ids",
        });
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCacheHandle;

    fn inputs(rows: usize, seq_len: usize) -> BatchInputs {
        BatchInputs::new(
            vec![vec![7; seq_len]; rows],
            vec![vec![1; seq_len]; rows],
        )
    }

    fn head(seq_len: usize, max_output_len: usize) -> HeadSlot<crate::testing::MockBatchContext> {
        let mut handle = MockCacheHandle::new();
        HeadSlot::create(&inputs(1, seq_len), 32, max_output_len, &mut handle).unwrap()
    }

    #[test]
    fn head_initial_state_is_generate() {
        let slot = head(3, 2);
        assert_eq!(slot.current_length(), 3);
        assert_eq!(slot.target_length(), 5);
        assert_eq!(slot.state(), Status::Generate);
    }

    #[test]
    fn head_reaches_done_after_exactly_k_updates() {
        for k in 1..=5 {
            let mut slot = head(4, k);
            let mut cooldowns = 0;
            for step in 0..k {
                assert_ne!(slot.state(), Status::Done, "done before step {step}");
                if slot.state() == Status::Cooldown {
                    cooldowns += 1;
                }
                slot.update(Some(&[11]));
            }
            assert_eq!(slot.state(), Status::Done);
            assert_eq!(cooldowns, 1, "exactly one cooldown observation for k={k}");
        }
    }

    #[test]
    fn head_cooldown_immediately_for_single_token_budget() {
        let slot = head(3, 1);
        assert_eq!(slot.state(), Status::Cooldown);
    }

    #[test]
    fn queries_are_idempotent() {
        let mut slot = head(3, 4);
        slot.update(Some(&[9]));
        let (len, state) = (slot.current_length(), slot.state());
        assert_eq!(slot.current_length(), len);
        assert_eq!(slot.state(), state);
        assert_eq!(slot.current_length(), len);
    }

    #[test]
    fn update_without_token_changes_nothing() {
        let mut slot = head(3, 2);
        slot.update(None);
        assert_eq!(slot.current_length(), 3);
        assert_eq!(slot.attention_mask()[0].len(), 3);
        assert!(slot.generated_tokens().is_none());
    }

    #[test]
    fn mask_grows_until_done_but_not_on_final_step() {
        let mut slot = head(3, 3);
        slot.update(Some(&[1]));
        assert_eq!(slot.attention_mask()[0].len(), 4);
        slot.update(Some(&[2]));
        assert_eq!(slot.attention_mask()[0].len(), 5);
        // Final token closes the sequence; the mask must not grow.
        slot.update(Some(&[3]));
        assert_eq!(slot.state(), Status::Done);
        assert_eq!(slot.attention_mask()[0].len(), 5);
    }

    #[test]
    fn generated_tokens_accumulate_per_row() {
        let mut handle = MockCacheHandle::new();
        let mut slot = HeadSlot::create(&inputs(2, 3), 32, 4, &mut handle).unwrap();
        slot.update(Some(&[10, 20]));
        slot.update(Some(&[11, 21]));
        let rows = slot.generated_tokens().unwrap();
        assert_eq!(rows, &[vec![10, 11], vec![20, 21]]);
        assert_eq!(slot.current_length(), 5);
    }

    #[test]
    fn head_rejects_missing_mask() {
        let mut handle = MockCacheHandle::new();
        let bad = BatchInputs {
            input_ids: vec![vec![1, 2, 3]],
            attention_mask: None,
        };
        let err = HeadSlot::create(&bad, 32, 2, &mut handle).unwrap_err();
        assert!(matches!(err, RingError::InvalidInput { .. }));
        assert_eq!(handle.contexts_created(), 0, "failed create must not touch the cache");
    }

    #[test]
    fn head_rejects_empty_input_ids() {
        let mut handle = MockCacheHandle::new();
        let bad = BatchInputs {
            input_ids: Vec::new(),
            attention_mask: Some(Vec::new()),
        };
        let err = HeadSlot::create(&bad, 32, 2, &mut handle).unwrap_err();
        assert!(matches!(err, RingError::InvalidInput { .. }));
    }

    #[test]
    fn head_rejects_mismatched_mask_shape() {
        let mut handle = MockCacheHandle::new();
        let bad = BatchInputs {
            input_ids: vec![vec![1, 2, 3]],
            attention_mask: Some(vec![vec![1, 1]]),
        };
        let err = HeadSlot::create(&bad, 32, 2, &mut handle).unwrap_err();
        assert!(matches!(err, RingError::InvalidInput { .. }));
    }

    #[test]
    fn body_reads_progress_from_context() {
        let mut handle = MockCacheHandle::new();
        let gauge = handle.seq_len_gauge();
        let slot = BodySlot::create(&inputs(1, 3), 32, 2, &mut handle).unwrap();
        gauge.set(3);
        assert_eq!(slot.state(), Status::Generate);
        gauge.set(4);
        assert_eq!(slot.state(), Status::Cooldown);
        gauge.set(5);
        assert_eq!(slot.state(), Status::Done);
    }

    #[test]
    fn body_update_is_a_no_op() {
        let mut handle = MockCacheHandle::new();
        let gauge = handle.seq_len_gauge();
        gauge.set(3);
        let mut slot = BodySlot::create(&inputs(1, 3), 32, 2, &mut handle).unwrap();
        slot.update(Some(&[42]));
        assert_eq!(slot.current_length(), 3);
        assert_eq!(slot.state(), Status::Generate);
    }

    #[test]
    fn body_accepts_inputs_without_mask() {
        let mut handle = MockCacheHandle::new();
        let no_mask = BatchInputs {
            input_ids: vec![vec![1, 2, 3]],
            attention_mask: None,
        };
        let slot = BodySlot::create(&no_mask, 32, 2, &mut handle).unwrap();
        assert_eq!(slot.initial_length(), 3);
        assert_eq!(slot.target_length(), 5);
    }
}
