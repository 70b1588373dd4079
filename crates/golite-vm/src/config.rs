//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::heap::WORD;

/// Default heap size in words.
pub const DEFAULT_HEAP_WORDS: usize = 4096;

/// Smallest heap that still fits the canonical records.
pub const MIN_HEAP_WORDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Merge freed buddies back into larger blocks.
    pub coalesce: bool,
    /// Treat every stored frame as a root.
    pub conservative_frames: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { coalesce: true, conservative_frames: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub heap_words: usize,
    /// Inclusive bounds of the randomized time quantum, in ticks.
    pub min_quantum: u32,
    pub max_quantum: u32,
    /// Control-stack bound per goroutine.
    pub max_control_depth: usize,
    /// Seed for the scheduler's quantum RNG.
    pub seed: Option<u64>,
    pub gc: GcConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heap_words: DEFAULT_HEAP_WORDS,
            min_quantum: 5,
            max_quantum: 20,
            max_control_depth: 2048,
            seed: None,
            gc: GcConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_heap_words(heap_words: usize) -> Self {
        Self { heap_words, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        let max_words = u32::MAX as usize / WORD;
        if !(MIN_HEAP_WORDS..=max_words).contains(&self.heap_words) {
            return Err(RuntimeError::InvalidConfig(format!(
                "heap_words must be between {} and {}, got {}",
                MIN_HEAP_WORDS, max_words, self.heap_words
            )));
        }
        if self.min_quantum == 0 || self.min_quantum > self.max_quantum {
            return Err(RuntimeError::InvalidConfig(format!(
                "quantum range {}..={} is empty",
                self.min_quantum, self.max_quantum
            )));
        }
        if self.max_control_depth == 0 {
            return Err(RuntimeError::InvalidConfig("max_control_depth must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.heap_words, 4096);
        assert!(config.gc.coalesce);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = EngineConfig::with_heap_words(8);
        assert!(config.validate().is_err());
        config.heap_words = 1024;
        config.min_quantum = 30;
        assert!(config.validate().is_err());
    }
}
