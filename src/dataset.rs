//! Dataset adapters producing waveform views.
//!
//! Three adapters share one windowing + augmentation-selection policy:
//! - [`PairDataset`]: two views from independently drawn windows
//! - [`TripleDataset`]: an un-augmented anchor plus two augmented views
//!   carved around a shared pick point
//! - [`LabeledDataset`]: one view plus a dense class label for benchmark
//!   corpora
//!
//! Each access is a pure function of (file list, index, RNG draw). `get`
//! consumes the thread-local RNG; `get_seeded` derives a private RNG from
//! (seed, index) so pipelined loading and tests are reproducible.

use crate::audio::{load_audio, AudioError, Waveform};
use crate::augment::{apply_pipeline, sample_pipeline};
use crate::config::{ConfigError, DatasetConfig};
use crate::manifest::{class_code_from_path, read_file_list, ClassIndex, ManifestError};
use crate::window::{random_start, OverlapWindows};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sampling rate of {path} is {actual} Hz, dataset requires {required} Hz")]
    SampleRateMismatch {
        path: String,
        actual: u32,
        required: u32,
    },
    #[error("file list is empty: {0}")]
    EmptyFileList(String),
}

/// An indexed collection of training samples.
///
/// Implementations are `Send + Sync`: the batch loader hits one instance
/// from several worker threads at once.
pub trait Dataset: Send + Sync {
    type Sample;

    /// Number of file-list entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw the sample at `index` using the thread-local RNG.
    ///
    /// # Panics
    /// May panic if `index >= self.len()`.
    fn get(&self, index: usize) -> Result<Self::Sample, DatasetError>;

    /// Draw the sample at `index` with an RNG derived from `(seed, index)`.
    fn get_seeded(&self, index: usize, seed: u64) -> Result<Self::Sample, DatasetError>;
}

/// Two views from independently drawn windows of the same recording.
#[derive(Debug, Clone)]
pub struct PairSample {
    pub view_a: Array2<f32>,
    pub view_b: Array2<f32>,
}

/// An un-augmented anchor plus two augmented views that overlap it.
#[derive(Debug, Clone)]
pub struct TripleSample {
    pub anchor: Array2<f32>,
    pub view_a: Array2<f32>,
    pub view_b: Array2<f32>,
}

/// One view plus its dense class label.
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub view: Array2<f32>,
    pub label: usize,
}

/// Decode a recording and enforce the dataset-wide sampling rate. The rate
/// check is the only semantic check in the access path; every other failure
/// surfaces the underlying error unchanged.
fn load_checked(entry: &str, required: u32) -> Result<Waveform, DatasetError> {
    let wave = load_audio(entry)?;
    if wave.sample_rate() != required {
        return Err(DatasetError::SampleRateMismatch {
            path: entry.to_string(),
            actual: wave.sample_rate(),
            required,
        });
    }
    Ok(wave)
}

/// Mix (seed, index) through splitmix64 so nearby indices do not share
/// low-entropy RNG streams.
fn mix_seed(seed: u64, index: usize) -> u64 {
    let mut z = (seed ^ (index as u64).wrapping_mul(0xD6E8FEB86659FD93))
        .wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn open_file_list<P: AsRef<Path>>(
    path: P,
    cfg: &DatasetConfig,
) -> Result<Vec<String>, DatasetError> {
    cfg.validate()?;
    let files = read_file_list(&path, cfg.path_trim)?;
    if files.is_empty() {
        return Err(DatasetError::EmptyFileList(
            path.as_ref().display().to_string(),
        ));
    }
    Ok(files)
}

/// Independent-window two-view adapter.
pub struct PairDataset {
    files: Vec<String>,
    cfg: DatasetConfig,
}

impl PairDataset {
    pub fn new<P: AsRef<Path>>(file_list: P, cfg: DatasetConfig) -> Result<Self, DatasetError> {
        let files = open_file_list(file_list, &cfg)?;
        Ok(Self { files, cfg })
    }

    fn sample_with<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<PairSample, DatasetError> {
        let cfg = &self.cfg;
        let wave = load_checked(&self.files[index], cfg.sample_rate)?.pad_to(cfg.audio_window);
        let total = wave.num_samples();

        let start_a = random_start(rng, total, cfg.audio_window);
        let mut view_a = wave.window(start_a, cfg.audio_window);
        let start_b = random_start(rng, total, cfg.audio_window);
        let mut view_b = wave.window(start_b, cfg.audio_window);

        if !cfg.augmentations.is_empty() {
            let ops = sample_pipeline(&cfg.augmentations, cfg.max_augmentations, rng);
            view_a = apply_pipeline(view_a, cfg.sample_rate, cfg.audio_window, &ops, rng);
            let ops = sample_pipeline(&cfg.augmentations, cfg.max_augmentations, rng);
            view_b = apply_pipeline(view_b, cfg.sample_rate, cfg.audio_window, &ops, rng);
        }

        Ok(PairSample { view_a, view_b })
    }
}

impl Dataset for PairDataset {
    type Sample = PairSample;

    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<PairSample, DatasetError> {
        match self.cfg.seed {
            Some(seed) => self.get_seeded(index, seed),
            None => self.sample_with(index, &mut thread_rng()),
        }
    }

    fn get_seeded(&self, index: usize, seed: u64) -> Result<PairSample, DatasetError> {
        let mut rng = StdRng::seed_from_u64(mix_seed(seed, index));
        self.sample_with(index, &mut rng)
    }
}

/// Overlap three-view adapter.
///
/// One shared pick point: the anchor stays un-augmented, both side views
/// start oversized by `overlap_margin` samples so augmentation can re-crop
/// them anywhere and still overlap the anchor substantially.
pub struct TripleDataset {
    files: Vec<String>,
    cfg: DatasetConfig,
}

impl TripleDataset {
    pub fn new<P: AsRef<Path>>(file_list: P, cfg: DatasetConfig) -> Result<Self, DatasetError> {
        let files = open_file_list(file_list, &cfg)?;
        Ok(Self { files, cfg })
    }

    fn sample_with<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<TripleSample, DatasetError> {
        let cfg = &self.cfg;
        let wave = load_checked(&self.files[index], cfg.sample_rate)?
            .pad_to(cfg.audio_window + cfg.overlap_margin);
        let total = wave.num_samples();

        if cfg.augmentations.is_empty() {
            // No augmentation: three identical crops from one pick.
            let start = random_start(rng, total, cfg.audio_window);
            let anchor = wave.window(start, cfg.audio_window);
            return Ok(TripleSample {
                view_a: anchor.clone(),
                view_b: anchor.clone(),
                anchor,
            });
        }

        let windows = OverlapWindows::draw(rng, total, cfg.audio_window, cfg.overlap_margin);
        let anchor = wave.window(windows.anchor_start, cfg.audio_window);

        let raw_a = wave.window(windows.side_start, windows.side_len);
        let ops = sample_pipeline(&cfg.augmentations, cfg.max_augmentations, rng);
        let view_a = apply_pipeline(raw_a, cfg.sample_rate, cfg.audio_window, &ops, rng);

        let raw_b = wave.window(windows.side_start, windows.side_len);
        let ops = sample_pipeline(&cfg.augmentations, cfg.max_augmentations, rng);
        let view_b = apply_pipeline(raw_b, cfg.sample_rate, cfg.audio_window, &ops, rng);

        Ok(TripleSample {
            anchor,
            view_a,
            view_b,
        })
    }
}

impl Dataset for TripleDataset {
    type Sample = TripleSample;

    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<TripleSample, DatasetError> {
        match self.cfg.seed {
            Some(seed) => self.get_seeded(index, seed),
            None => self.sample_with(index, &mut thread_rng()),
        }
    }

    fn get_seeded(&self, index: usize, seed: u64) -> Result<TripleSample, DatasetError> {
        let mut rng = StdRng::seed_from_u64(mix_seed(seed, index));
        self.sample_with(index, &mut rng)
    }
}

/// Labeled single-view adapter for benchmark corpora.
///
/// Labels come from the filename-embedded class code, mapped through a
/// [`ClassIndex`] built once from the metadata table.
pub struct LabeledDataset {
    files: Vec<String>,
    cfg: DatasetConfig,
    class_index: ClassIndex,
}

impl LabeledDataset {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        file_list: P,
        metadata: Q,
        cfg: DatasetConfig,
    ) -> Result<Self, DatasetError> {
        let files = open_file_list(file_list, &cfg)?;
        let class_index = ClassIndex::from_csv(metadata)?;
        Ok(Self {
            files,
            cfg,
            class_index,
        })
    }

    pub fn class_index(&self) -> &ClassIndex {
        &self.class_index
    }

    fn sample_with<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<LabeledSample, DatasetError> {
        let cfg = &self.cfg;
        let entry = &self.files[index];
        let label = self.class_index.lookup(class_code_from_path(entry)?)?;

        let wave = load_checked(entry, cfg.sample_rate)?.pad_to(cfg.audio_window);
        let start = random_start(rng, wave.num_samples(), cfg.audio_window);
        let mut view = wave.window(start, cfg.audio_window);

        if !cfg.augmentations.is_empty() {
            let ops = sample_pipeline(&cfg.augmentations, cfg.max_augmentations, rng);
            view = apply_pipeline(view, cfg.sample_rate, cfg.audio_window, &ops, rng);
        }

        Ok(LabeledSample { view, label })
    }
}

impl Dataset for LabeledDataset {
    type Sample = LabeledSample;

    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<LabeledSample, DatasetError> {
        match self.cfg.seed {
            Some(seed) => self.get_seeded(index, seed),
            None => self.sample_with(index, &mut thread_rng()),
        }
    }

    fn get_seeded(&self, index: usize, seed: u64) -> Result<LabeledSample, DatasetError> {
        let mut rng = StdRng::seed_from_u64(mix_seed(seed, index));
        self.sample_with(index, &mut rng)
    }
}
