//! Waveform view datasets for BYOL-style audio pretraining.
//!
//! Single-process data loading with:
//! - Audio decoding (symphonia) and sinc resampling (rubato)
//! - Random windowing of variable-length recordings
//! - Per-view composition of a fixed augmentation catalogue
//! - Three dataset adapters: independent pairs, overlapping triples,
//!   labeled single views for benchmark corpora
//! - A pipelined, shuffled batch loader over any adapter

pub mod audio;
pub mod augment;
pub mod config;
pub mod dataset;
pub mod loader;
pub mod manifest;
pub mod shuffle;
pub mod window;

pub use audio::{load_audio, AudioError, Waveform};
pub use augment::{apply_pipeline, sample_pipeline, Augmentation};
pub use config::{ConfigError, DatasetConfig};
pub use dataset::{
    Dataset, DatasetError, LabeledDataset, LabeledSample, PairDataset, PairSample, TripleDataset,
    TripleSample,
};
pub use loader::{
    BatchLoader, Collate, LabeledBatch, LoaderConfig, PairBatch, TripleBatch,
};
pub use manifest::{class_code_from_path, read_file_list, ClassIndex, ManifestError};
pub use shuffle::ShufflePool;
pub use window::{random_start, OverlapWindows};
