use thiserror::Error;

use crate::cache::CacheError;

#[derive(Error, Debug)]
pub enum RingError {
    #[error("invalid batch inputs: {reason}")]
    InvalidInput { reason: &'static str },

    #[error("position {position} already holds a slot that was not cleared")]
    SlotOccupied { position: usize },

    #[error("no active slot at position {position}")]
    NoActiveSlot { position: usize },

    #[error("stage {stage_id} does not own generated tokens")]
    NotApplicable { stage_id: usize },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, RingError>;
