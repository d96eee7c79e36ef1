//! End-to-end checks over synthesized WAV corpora: every adapter, the
//! pipelined loader, and batch collation.

use ndarray::Array3;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use waveview::{
    BatchLoader, Collate, Dataset, DatasetConfig, DatasetError, LabeledDataset, LabeledSample,
    LoaderConfig, PairDataset, TripleDataset, TripleSample,
};

struct Corpus {
    dir: PathBuf,
}

impl Corpus {
    /// Synthesize `n_files` mono WAV recordings of varying length and write
    /// a file list pointing at them.
    fn new(tag: &str, n_files: usize, sample_rate: u32) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "waveview-pipeline-{}-{}",
            std::process::id(),
            tag
        ));
        fs::create_dir_all(&dir).unwrap();

        for i in 0..n_files {
            // Lengths straddle the window so padding paths get exercised.
            let n_samples = 1500 + i * 700;
            // Class codes cycle 0, 2, 5 through the filename convention.
            let code = [0, 2, 5][i % 3];
            let path = dir.join(format!("{}-{}-0-{}.wav", 100000 + i, code, i));
            write_wav(&path, sample_rate, n_samples, 220.0 + 20.0 * i as f32);
        }

        Corpus { dir }
    }

    fn file_list(&self) -> PathBuf {
        let list = self.dir.join("files.txt");
        let mut entries: Vec<String> = fs::read_dir(&self.dir)
            .unwrap()
            .filter_map(|e| {
                let p = e.unwrap().path();
                if p.extension().and_then(|x| x.to_str()) == Some("wav") {
                    Some(p.display().to_string())
                } else {
                    None
                }
            })
            .collect();
        entries.sort();
        let mut f = fs::File::create(&list).unwrap();
        for e in entries {
            writeln!(f, "{}", e).unwrap();
        }
        list
    }

    fn metadata(&self) -> PathBuf {
        let path = self.dir.join("metadata.csv");
        fs::write(
            &path,
            "slice_file_name,fold,classID\na.wav,1,0\nb.wav,1,2\nc.wav,2,5\n",
        )
        .unwrap();
        path
    }
}

impl Drop for Corpus {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

fn write_wav(path: &Path, sample_rate: u32, n: usize, freq: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..n {
        let v = (i as f32 / sample_rate as f32 * freq * std::f32::consts::TAU).sin();
        writer.write_sample((v * 12000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn config() -> DatasetConfig {
    DatasetConfig::default()
        .audio_window(2048)
        .sample_rate(16000)
        .overlap_margin(800)
        .path_trim(0)
}

#[test]
fn pair_dataset_through_loader() {
    let corpus = Corpus::new("pair", 9, 16000);
    let dataset = Arc::new(PairDataset::new(corpus.file_list(), config()).unwrap());
    assert_eq!(dataset.len(), 9);

    let loader = BatchLoader::new(
        Arc::clone(&dataset),
        LoaderConfig::default()
            .batch_size(4)
            .num_workers(2)
            .epochs(2)
            .seed(13),
    );

    let mut total = 0;
    for batch in loader {
        for sample in &batch {
            assert_eq!(sample.view_a.dim(), (1, 2048));
            assert_eq!(sample.view_b.dim(), (1, 2048));
        }
        total += batch.len();
    }
    assert_eq!(total, 18);
}

#[test]
fn triple_dataset_views_overlap_the_anchor() {
    let corpus = Corpus::new("triple", 4, 16000);
    // No augmentation: the three views must be byte-identical windows, which
    // is the strongest form of the shared-pick-point guarantee.
    let cfg = config().augmentations(Vec::new());
    let dataset = TripleDataset::new(corpus.file_list(), cfg).unwrap();

    for index in 0..dataset.len() {
        let TripleSample {
            anchor,
            view_a,
            view_b,
        } = dataset.get_seeded(index, 21).unwrap();
        assert_eq!(anchor, view_a);
        assert_eq!(anchor, view_b);
    }

    // With augmentation on, all three views still share the window length.
    let dataset = TripleDataset::new(corpus.file_list(), config()).unwrap();
    let sample = dataset.get_seeded(0, 4).unwrap();
    assert_eq!(sample.anchor.dim(), (1, 2048));
    assert_eq!(sample.view_a.dim(), (1, 2048));
    assert_eq!(sample.view_b.dim(), (1, 2048));
}

#[test]
fn labeled_dataset_maps_codes_to_dense_labels() {
    let corpus = Corpus::new("labeled", 6, 16000);
    let dataset =
        LabeledDataset::new(corpus.file_list(), corpus.metadata(), config()).unwrap();
    assert_eq!(dataset.class_index().classes(), &[0, 2, 5]);

    for index in 0..dataset.len() {
        let LabeledSample { view, label } = dataset.get_seeded(index, 8).unwrap();
        assert_eq!(view.dim(), (1, 2048));
        assert!(label < dataset.class_index().len());
    }
}

#[test]
fn labeled_batches_collate_views_and_labels() {
    let corpus = Corpus::new("collate", 6, 16000);
    let dataset = Arc::new(
        LabeledDataset::new(corpus.file_list(), corpus.metadata(), config()).unwrap(),
    );

    let loader = BatchLoader::new(
        dataset,
        LoaderConfig::default()
            .batch_size(3)
            .num_workers(2)
            .epochs(1)
            .drop_last(true),
    );

    for samples in loader {
        let batch = LabeledSample::collate(samples);
        let views: &Array3<f32> = &batch.views;
        assert_eq!(views.dim(), (3, 1, 2048));
        assert_eq!(batch.labels.len(), 3);
        assert!(batch.labels.iter().all(|&l| (0..3).contains(&l)));
    }
}

#[test]
fn wrong_rate_recording_fails_for_every_index() {
    let corpus = Corpus::new("wrong-rate", 3, 22050);
    let dataset = PairDataset::new(corpus.file_list(), config()).unwrap();

    for index in 0..dataset.len() {
        assert!(matches!(
            dataset.get_seeded(index, 0),
            Err(DatasetError::SampleRateMismatch { required: 16000, .. })
        ));
    }
}
