//! Audio decoding and resampling using symphonia + rubato.
//!
//! Supports MP3, FLAC, OGG, WAV formats. Recordings are decoded into a
//! channel-major `(channels, samples)` buffer so windowing can slice time
//! without touching channel layout.

use ndarray::{s, Array2};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Unsupported codec")]
    UnsupportedCodec,
    #[error("Resampler error: {0}")]
    Resample(String),
}

/// A decoded recording: channel-major samples plus the source rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    data: Array2<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(data: Array2<f32>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples per channel.
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f32> {
        self.data
    }

    /// Convert to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        let ch = self.channels() as f32;
        self.data
            .columns()
            .into_iter()
            .map(|col| col.sum() / ch)
            .collect()
    }

    /// Copy the `[start, start + len)` sample span of every channel.
    ///
    /// # Panics
    /// Panics if `start + len > self.num_samples()`.
    pub fn window(&self, start: usize, len: usize) -> Array2<f32> {
        self.data.slice(s![.., start..start + len]).to_owned()
    }

    /// Zero-pad at the end so each channel holds at least `min_len` samples.
    /// Recordings already long enough are returned unchanged.
    pub fn pad_to(self, min_len: usize) -> Self {
        if self.num_samples() >= min_len {
            return self;
        }
        let mut padded = Array2::zeros((self.channels(), min_len));
        padded
            .slice_mut(s![.., ..self.num_samples()])
            .assign(&self.data);
        Self {
            data: padded,
            sample_rate: self.sample_rate,
        }
    }

    /// Crop or zero-pad to exactly `len` samples per channel.
    pub fn fit_to(self, len: usize) -> Self {
        if self.num_samples() > len {
            let data = self.data.slice(s![.., ..len]).to_owned();
            Self {
                data,
                sample_rate: self.sample_rate,
            }
        } else {
            self.pad_to(len)
        }
    }

    /// Resample to the target rate using sinc interpolation (rubato).
    /// Uses an anti-aliasing filter to prevent aliasing artifacts.
    pub fn resample(&self, target_rate: u32) -> Result<Waveform, AudioError> {
        if self.sample_rate == target_rate {
            return Ok(self.clone());
        }

        let channels = self.channels();
        let n_in = self.num_samples();
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let chunk_size = 1024;

        // max_resample_ratio_relative must cover the actual ratio (8kHz -> 32kHz = 4x)
        let max_ratio = ratio.max(1.0 / ratio) * 1.1;

        let mut resampler = SincFixedIn::<f32>::new(ratio, max_ratio, params, chunk_size, channels)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut pos = 0;

        // Process all channels chunk by chunk, padding the final chunk.
        while pos < n_in {
            let end = (pos + chunk_size).min(n_in);
            let input: Vec<Vec<f32>> = (0..channels)
                .map(|ch| {
                    let mut chunk = self.data.slice(s![ch, pos..end]).to_vec();
                    chunk.resize(chunk_size, 0.0);
                    chunk
                })
                .collect();

            let resampled = resampler
                .process(&input, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            for (ch, chunk) in resampled.into_iter().enumerate() {
                out[ch].extend_from_slice(&chunk);
            }
            pos += chunk_size;
        }

        // Trim to the expected output length.
        let expected_len = (n_in as f64 * ratio).round() as usize;
        let mut data = Array2::zeros((channels, expected_len));
        for (ch, samples) in out.iter().enumerate() {
            let n = samples.len().min(expected_len);
            for (i, &v) in samples[..n].iter().enumerate() {
                data[[ch, i]] = v;
            }
        }

        Ok(Waveform {
            data,
            sample_rate: target_rate,
        })
    }
}

/// Decode a recording from disk.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<Waveform, AudioError> {
    let path = path.as_ref();
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let probed =
        symphonia::default::get_probe().format(&hint, mss, &format_opts, &metadata_opts)?;
    let mut format = probed.format;

    // Find the first audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoAudioTrack)?;

    let decoder_opts = DecoderOptions::default();
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decoder_opts)?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::UnsupportedCodec)?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let track_id = track.id;
    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        append_samples(&decoded, &mut interleaved, channels)?;
    }

    if interleaved.is_empty() {
        return Err(AudioError::NoAudioTrack);
    }

    // De-interleave into channel-major layout.
    let n_frames = interleaved.len() / channels;
    let mut data = Array2::zeros((channels, n_frames));
    for frame in 0..n_frames {
        for ch in 0..channels {
            data[[ch, frame]] = interleaved[frame * channels + ch];
        }
    }

    Ok(Waveform { data, sample_rate })
}

fn append_samples(
    buffer: &AudioBufferRef,
    output: &mut Vec<f32>,
    channels: usize,
) -> Result<(), AudioError> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame]);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame] as f32 / 32768.0);
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame] as f32 / 2147483648.0);
                }
            }
        }
        AudioBufferRef::U8(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push((buf.chan(ch)[frame] as f32 - 128.0) / 128.0);
                }
            }
        }
        _ => {
            return Err(AudioError::UnsupportedCodec);
        }
    }
    Ok(())
}
