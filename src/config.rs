//! Dataset configuration.

use crate::augment::Augmentation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("audio_window must be > 0")]
    ZeroWindow,
    #[error("max_augmentations {0} out of range [1, {1}]")]
    BadAugmentationCount(usize, usize),
    #[error("overlap_margin must be even, got {0}")]
    OddMargin(usize),
}

/// Shared configuration for all dataset adapters.
///
/// Defaults mirror the pretraining setup: 20480-sample windows at 16 kHz,
/// full six-entry catalogue, at most five augmentations per view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Samples per returned view.
    pub audio_window: usize,
    /// Required sampling rate; recordings at any other rate are rejected.
    pub sample_rate: u32,
    /// Augmentation catalogue. Empty disables augmentation entirely.
    pub augmentations: Vec<Augmentation>,
    /// Upper bound on augmentations composed per view.
    pub max_augmentations: usize,
    /// Leading characters stripped from every file list entry.
    pub path_trim: usize,
    /// Extra samples reserved around the shared pick point of the
    /// three-view adapter. Must be even; half of it pads each side of
    /// the anchor.
    pub overlap_margin: usize,
    /// Base seed for `Dataset::get_seeded`. `None` leaves `Dataset::get`
    /// on the thread-local RNG.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            audio_window: 20480,
            sample_rate: 16000,
            augmentations: Augmentation::ALL.to_vec(),
            max_augmentations: 5,
            path_trim: 4,
            overlap_margin: 8000,
            seed: None,
        }
    }
}

impl DatasetConfig {
    pub fn audio_window(mut self, n: usize) -> Self {
        self.audio_window = n;
        self
    }

    pub fn sample_rate(mut self, sr: u32) -> Self {
        self.sample_rate = sr;
        self
    }

    pub fn augmentations(mut self, ops: Vec<Augmentation>) -> Self {
        self.augmentations = ops;
        self
    }

    pub fn max_augmentations(mut self, n: usize) -> Self {
        self.max_augmentations = n;
        self
    }

    pub fn path_trim(mut self, n: usize) -> Self {
        self.path_trim = n;
        self
    }

    pub fn overlap_margin(mut self, n: usize) -> Self {
        self.overlap_margin = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    /// Check the invariants the adapters rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if !self.augmentations.is_empty()
            && !(1..=self.augmentations.len()).contains(&self.max_augmentations)
        {
            return Err(ConfigError::BadAugmentationCount(
                self.max_augmentations,
                self.augmentations.len(),
            ));
        }
        if self.overlap_margin % 2 != 0 {
            return Err(ConfigError::OddMargin(self.overlap_margin));
        }
        Ok(())
    }
}
