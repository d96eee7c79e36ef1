//! Waveform augmentation catalogue.
//!
//! Six perturbations, addressed by the integer codes 1-6 used in training
//! configs. A pipeline is a random subset of the catalogue, re-drawn per
//! view per call, applied in drawn order and then fixed back to the
//! requested window length.

use ndarray::{s, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Fraction of the window a time mask may cover at most.
const MAX_MASK_FRACTION: f64 = 0.1;

/// One entry of the augmentation catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Augmentation {
    /// Additive Gaussian noise with random standard deviation.
    Noise,
    /// Random gain in `[-12, +12]` dB.
    Gain,
    /// Sign flip of every sample.
    PolarityInversion,
    /// Linear-interpolation time stretch, rate in `[0.8, 1.25]`.
    TimeStretch,
    /// Zero a random contiguous span of up to 10% of the signal.
    TimeMask,
    /// One-pole low-pass filter with random cutoff.
    LowPass,
}

impl Augmentation {
    /// Full catalogue, in id order.
    pub const ALL: [Augmentation; 6] = [
        Augmentation::Noise,
        Augmentation::Gain,
        Augmentation::PolarityInversion,
        Augmentation::TimeStretch,
        Augmentation::TimeMask,
        Augmentation::LowPass,
    ];

    /// Integer code used in config files (1-6).
    pub fn id(self) -> u8 {
        match self {
            Augmentation::Noise => 1,
            Augmentation::Gain => 2,
            Augmentation::PolarityInversion => 3,
            Augmentation::TimeStretch => 4,
            Augmentation::TimeMask => 5,
            Augmentation::LowPass => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.id() == id)
    }
}

/// Draw a random pipeline: an unordered subset of `catalogue` whose size is
/// uniform in `[1, max_count]`.
///
/// # Panics
/// Panics if `catalogue` is empty or `max_count` exceeds its length; dataset
/// construction validates both (see `DatasetConfig::validate`).
pub fn sample_pipeline<R: Rng + ?Sized>(
    catalogue: &[Augmentation],
    max_count: usize,
    rng: &mut R,
) -> Vec<Augmentation> {
    assert!(!catalogue.is_empty(), "empty augmentation catalogue");
    assert!(
        (1..=catalogue.len()).contains(&max_count),
        "max_count {} out of range for catalogue of {}",
        max_count,
        catalogue.len()
    );
    let count = rng.gen_range(1..=max_count);
    catalogue.choose_multiple(rng, count).copied().collect()
}

/// Apply `ops` in order, then crop or pad the result to exactly
/// `window_len` samples per channel. Length-changing ops (time stretch)
/// are re-cropped at a random offset so the view position stays random.
pub fn apply_pipeline<R: Rng + ?Sized>(
    mut wave: Array2<f32>,
    sample_rate: u32,
    window_len: usize,
    ops: &[Augmentation],
    rng: &mut R,
) -> Array2<f32> {
    for op in ops {
        wave = match op {
            Augmentation::Noise => add_noise(wave, rng),
            Augmentation::Gain => random_gain(wave, rng),
            Augmentation::PolarityInversion => polarity_inversion(wave),
            Augmentation::TimeStretch => time_stretch(wave, rng),
            Augmentation::TimeMask => time_mask(wave, rng),
            Augmentation::LowPass => low_pass(wave, sample_rate, rng),
        };
    }
    fix_length(wave, window_len, rng)
}

/// Crop (random offset) or zero-pad to exactly `window_len` samples.
fn fix_length<R: Rng + ?Sized>(wave: Array2<f32>, window_len: usize, rng: &mut R) -> Array2<f32> {
    let len = wave.ncols();
    if len == window_len {
        return wave;
    }
    if len > window_len {
        let start = rng.gen_range(0..=len - window_len);
        return wave.slice(s![.., start..start + window_len]).to_owned();
    }
    let mut padded = Array2::zeros((wave.nrows(), window_len));
    padded.slice_mut(s![.., ..len]).assign(&wave);
    padded
}

fn add_noise<R: Rng + ?Sized>(mut wave: Array2<f32>, rng: &mut R) -> Array2<f32> {
    let std_dev = rng.gen_range(0.001..0.05);
    let normal = Normal::new(0.0f32, std_dev).expect("valid std");
    for v in wave.iter_mut() {
        *v += normal.sample(rng);
    }
    wave
}

fn random_gain<R: Rng + ?Sized>(mut wave: Array2<f32>, rng: &mut R) -> Array2<f32> {
    let db = rng.gen_range(-12.0f32..12.0);
    let factor = 10.0f32.powf(db / 20.0);
    wave.mapv_inplace(|v| v * factor);
    wave
}

fn polarity_inversion(mut wave: Array2<f32>) -> Array2<f32> {
    wave.mapv_inplace(|v| -v);
    wave
}

/// Resample along time by linear interpolation. rate > 1 speeds the signal
/// up (shorter output); the pipeline's fix-length step restores the window.
fn time_stretch<R: Rng + ?Sized>(wave: Array2<f32>, rng: &mut R) -> Array2<f32> {
    let rate = rng.gen_range(0.8f64..1.25);
    let n_in = wave.ncols();
    let n_out = ((n_in as f64 / rate).round() as usize).max(1);
    let mut out = Array2::zeros((wave.nrows(), n_out));
    for i in 0..n_out {
        let pos = i as f64 * rate;
        let left = (pos.floor() as usize).min(n_in - 1);
        let right = (left + 1).min(n_in - 1);
        let frac = (pos - left as f64) as f32;
        for ch in 0..wave.nrows() {
            out[[ch, i]] = wave[[ch, left]] * (1.0 - frac) + wave[[ch, right]] * frac;
        }
    }
    out
}

fn time_mask<R: Rng + ?Sized>(mut wave: Array2<f32>, rng: &mut R) -> Array2<f32> {
    let len = wave.ncols();
    let max_span = ((len as f64 * MAX_MASK_FRACTION) as usize).max(1);
    let span = rng.gen_range(1..=max_span);
    let start = rng.gen_range(0..=len - span);
    wave.slice_mut(s![.., start..start + span]).fill(0.0);
    wave
}

fn low_pass<R: Rng + ?Sized>(mut wave: Array2<f32>, sample_rate: u32, rng: &mut R) -> Array2<f32> {
    // One-pole IIR: y[n] = y[n-1] + a * (x[n] - y[n-1]).
    let nyquist = sample_rate as f32 / 2.0;
    let cutoff = rng.gen_range(nyquist * 0.125..nyquist * 0.875);
    let rc = 1.0 / (std::f32::consts::TAU * cutoff);
    let dt = 1.0 / sample_rate as f32;
    let a = dt / (rc + dt);
    for mut row in wave.rows_mut() {
        let mut prev = 0.0f32;
        for v in row.iter_mut() {
            prev += a * (*v - prev);
            *v = prev;
        }
    }
    wave
}
