use serde::Deserialize;

/// Identity and role of one pipeline stage.
///
/// The first stage (stage 0) owns raw input and output tokens; every later
/// stage only sees hidden states and reads its progress back from the cache.
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    /// Index of this stage (0..num_stages)
    pub stage_id: usize,
    /// Total number of pipeline stages
    pub num_stages: usize,
    /// Whether this is the first stage (owns tokens)
    pub is_first: bool,
    /// Whether this is the last stage (samples next tokens)
    pub is_last: bool,
}

impl StageConfig {
    pub fn new(stage_id: usize, num_stages: usize) -> Self {
        assert!(num_stages > 0, "num_stages must be > 0");
        assert!(stage_id < num_stages, "stage_id must be < num_stages");

        Self {
            stage_id,
            num_stages,
            is_first: stage_id == 0,
            is_last: stage_id == num_stages - 1,
        }
    }
}

/// Sizing of the microbatch ring for one stage.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RingConfig {
    /// Rows per microbatch.
    pub micro_batch_size: usize,
    /// Concurrently in-flight microbatches, conventionally the pipeline depth.
    pub buffer_capacity: usize,
    /// Longest admissible prompt, in tokens.
    pub max_input_len: usize,
    /// Tokens generated per sequence before a slot is done.
    pub max_output_len: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            micro_batch_size: 1,
            buffer_capacity: 2,
            max_input_len: 1024,
            max_output_len: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_config_single_stage() {
        let cfg = StageConfig::new(0, 1);
        assert_eq!(cfg.stage_id, 0);
        assert!(cfg.is_first);
        assert!(cfg.is_last);
    }

    #[test]
    fn stage_config_roles() {
        let first = StageConfig::new(0, 4);
        let mid = StageConfig::new(2, 4);
        let last = StageConfig::new(3, 4);

        assert!(first.is_first && !first.is_last);
        assert!(!mid.is_first && !mid.is_last);
        assert!(!last.is_first && last.is_last);
    }

    #[test]
    #[should_panic(expected = "num_stages must be > 0")]
    fn stage_config_zero_stages() {
        let _ = StageConfig::new(0, 0);
    }

    #[test]
    #[should_panic(expected = "stage_id must be < num_stages")]
    fn stage_config_invalid_stage_id() {
        let _ = StageConfig::new(4, 4);
    }

    #[test]
    fn ring_config_from_json() {
        let json = r#"{
            "micro_batch_size": 4,
            "buffer_capacity": 8,
            "max_input_len": 2048,
            "max_output_len": 128
        }"#;
        let cfg: RingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.micro_batch_size, 4);
        assert_eq!(cfg.buffer_capacity, 8);
        assert_eq!(cfg.max_input_len, 2048);
        assert_eq!(cfg.max_output_len, 128);
    }

    #[test]
    fn ring_config_default() {
        let cfg = RingConfig::default();
        assert_eq!(cfg.buffer_capacity, 2);
        assert!(cfg.max_output_len > 0);
    }
}
