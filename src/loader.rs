//! Pipelined batch loader.
//!
//! Architecture:
//! Feeder Thread -> Index Channel -> Worker Threads -> Shuffle Pool -> Consumer
//!
//! - The feeder walks shuffled index permutations, one per epoch
//! - Workers draw samples from the dataset in parallel
//! - The shuffle pool decorrelates batch composition from worker timing
//! - The consumer collects batches with `next_batch` or by iterating

use crate::dataset::{Dataset, LabeledSample, PairSample, TripleSample};
use crate::shuffle::ShufflePool;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for [`BatchLoader`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Samples per batch.
    pub batch_size: usize,
    /// Parallel sample-drawing threads.
    pub num_workers: usize,
    /// Bound of the feeder -> worker index channel.
    pub queue_size: usize,
    /// Shuffle pool capacity.
    pub pool_capacity: usize,
    /// Minimum pool fill before batches are served (0 disables).
    pub pool_min_ready: usize,
    /// Base seed for epoch permutations and per-sample RNG derivation.
    pub seed: u64,
    /// Number of passes over the dataset; `None` runs forever.
    pub epochs: Option<usize>,
    /// Drop the final incomplete batch instead of returning it short.
    pub drop_last: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: 4,
            queue_size: 256,
            pool_capacity: 4096,
            pool_min_ready: 0,
            seed: 0,
            epochs: None,
            drop_last: false,
        }
    }
}

impl LoaderConfig {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn pool(mut self, capacity: usize, min_ready: usize) -> Self {
        self.pool_capacity = capacity;
        self.pool_min_ready = min_ready;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self
    }

    pub fn epochs(mut self, n: usize) -> Self {
        self.epochs = Some(n);
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }
}

/// One unit of work for a worker: which sample to draw and the epoch seed
/// its RNG derives from.
struct Job {
    index: usize,
    epoch_seed: u64,
}

/// Multi-threaded loader producing shuffled batches from any [`Dataset`].
///
/// A failed sample draw is logged and skipped; the pipeline keeps running.
/// Dropping the loader shuts the pipeline down and joins every thread.
pub struct BatchLoader<D: Dataset + 'static>
where
    D::Sample: Send + 'static,
{
    batch_size: usize,
    drop_last: bool,
    pool: Arc<ShufflePool<D::Sample>>,
    stop: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl<D: Dataset + 'static> BatchLoader<D>
where
    D::Sample: Send + 'static,
{
    pub fn new(dataset: Arc<D>, cfg: LoaderConfig) -> Self {
        assert!(cfg.batch_size > 0, "batch_size must be > 0");
        assert!(cfg.num_workers > 0, "num_workers must be > 0");
        assert!(cfg.queue_size > 0, "queue_size must be > 0");

        let pool = Arc::new(ShufflePool::new(
            cfg.pool_capacity,
            cfg.pool_min_ready,
            cfg.seed,
        ));
        let stop = Arc::new(AtomicBool::new(false));
        let (job_tx, job_rx) = bounded::<Job>(cfg.queue_size);
        let workers_alive = Arc::new(AtomicUsize::new(cfg.num_workers));

        let feeder = {
            let dataset = Arc::clone(&dataset);
            let stop = Arc::clone(&stop);
            let seed = cfg.seed;
            let epochs = cfg.epochs;
            thread::spawn(move || feeder_main(dataset.len(), seed, epochs, job_tx, stop))
        };

        let workers = (0..cfg.num_workers)
            .map(|_| {
                let dataset = Arc::clone(&dataset);
                let job_rx = job_rx.clone();
                let pool = Arc::clone(&pool);
                let stop = Arc::clone(&stop);
                let workers_alive = Arc::clone(&workers_alive);
                thread::spawn(move || worker_main(dataset, job_rx, pool, stop, workers_alive))
            })
            .collect();

        // Close the pool once every worker has finished so the consumer
        // sees the end of the final epoch.
        let monitor = {
            let pool = Arc::clone(&pool);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while workers_alive.load(Ordering::SeqCst) > 0 {
                    thread::sleep(Duration::from_millis(50));
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                }
                pool.close();
            })
        };

        Self {
            batch_size: cfg.batch_size,
            drop_last: cfg.drop_last,
            pool,
            stop,
            feeder: Some(feeder),
            workers,
            monitor: Some(monitor),
        }
    }

    /// Collect the next batch. Returns `None` once the pipeline has
    /// finished and the pool is drained.
    pub fn next_batch(&self) -> Option<Vec<D::Sample>> {
        let mut samples = Vec::with_capacity(self.batch_size);
        while samples.len() < self.batch_size {
            match self.pool.take(Duration::from_millis(100)) {
                Some(s) => samples.push(s),
                None => {
                    if self.pool.is_closed() && self.pool.is_empty() {
                        break;
                    }
                }
            }
        }
        if samples.is_empty() || (self.drop_last && samples.len() < self.batch_size) {
            return None;
        }
        Some(samples)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.pool.close();
        if let Some(h) = self.feeder.take() {
            let _ = h.join();
        }
        for h in self.workers.drain(..) {
            let _ = h.join();
        }
        if let Some(h) = self.monitor.take() {
            let _ = h.join();
        }
    }
}

impl<D: Dataset + 'static> Iterator for BatchLoader<D>
where
    D::Sample: Send + 'static,
{
    type Item = Vec<D::Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

impl<D: Dataset + 'static> Drop for BatchLoader<D>
where
    D::Sample: Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn feeder_main(
    n_samples: usize,
    base_seed: u64,
    epochs: Option<usize>,
    job_tx: Sender<Job>,
    stop: Arc<AtomicBool>,
) {
    if n_samples == 0 {
        return;
    }
    let mut epoch: u64 = 0;
    loop {
        if let Some(max) = epochs {
            if epoch >= max as u64 {
                return;
            }
        }

        let epoch_seed = base_seed.wrapping_add(epoch);
        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut StdRng::seed_from_u64(epoch_seed));

        for index in order {
            let mut job = Job { index, epoch_seed };
            loop {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                match job_tx.send_timeout(job, Duration::from_millis(100)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(returned)) => job = returned,
                    Err(SendTimeoutError::Disconnected(_)) => return,
                }
            }
        }

        epoch += 1;
    }
}

fn worker_main<D: Dataset>(
    dataset: Arc<D>,
    job_rx: Receiver<Job>,
    pool: Arc<ShufflePool<D::Sample>>,
    stop: Arc<AtomicBool>,
    workers_alive: Arc<AtomicUsize>,
) {
    // Decrement the live counter even if a draw panics.
    struct CounterGuard(Arc<AtomicUsize>);
    impl Drop for CounterGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }
    let _guard = CounterGuard(workers_alive);

    loop {
        let job = match job_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(j) => j,
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };

        match dataset.get_seeded(job.index, job.epoch_seed) {
            Ok(sample) => {
                if !pool.put(sample) {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(index = job.index, error = %e, "skipping sample");
            }
        }
    }
}

/// Stacking a batch of samples into dense tensors.
pub trait Collate: Sized {
    type Batch;

    /// # Panics
    /// Panics on an empty batch or on samples with mismatched view shapes.
    fn collate(samples: Vec<Self>) -> Self::Batch;
}

/// Stack `(channels, window)` views into `(batch, channels, window)`.
fn stack_views(views: Vec<Array2<f32>>) -> Array3<f32> {
    assert!(!views.is_empty(), "cannot collate an empty batch");
    let (channels, window) = views[0].dim();
    let mut out = Array3::zeros((views.len(), channels, window));
    for (i, view) in views.iter().enumerate() {
        out.slice_mut(s![i, .., ..]).assign(view);
    }
    out
}

pub struct PairBatch {
    pub views_a: Array3<f32>,
    pub views_b: Array3<f32>,
}

impl Collate for PairSample {
    type Batch = PairBatch;

    fn collate(samples: Vec<Self>) -> PairBatch {
        let (a, b): (Vec<_>, Vec<_>) = samples.into_iter().map(|s| (s.view_a, s.view_b)).unzip();
        PairBatch {
            views_a: stack_views(a),
            views_b: stack_views(b),
        }
    }
}

pub struct TripleBatch {
    pub anchors: Array3<f32>,
    pub views_a: Array3<f32>,
    pub views_b: Array3<f32>,
}

impl Collate for TripleSample {
    type Batch = TripleBatch;

    fn collate(samples: Vec<Self>) -> TripleBatch {
        let mut anchors = Vec::with_capacity(samples.len());
        let mut views_a = Vec::with_capacity(samples.len());
        let mut views_b = Vec::with_capacity(samples.len());
        for s in samples {
            anchors.push(s.anchor);
            views_a.push(s.view_a);
            views_b.push(s.view_b);
        }
        TripleBatch {
            anchors: stack_views(anchors),
            views_a: stack_views(views_a),
            views_b: stack_views(views_b),
        }
    }
}

pub struct LabeledBatch {
    pub views: Array3<f32>,
    pub labels: Vec<i64>,
}

impl Collate for LabeledSample {
    type Batch = LabeledBatch;

    fn collate(samples: Vec<Self>) -> LabeledBatch {
        let labels = samples.iter().map(|s| s.label as i64).collect();
        let views = stack_views(samples.into_iter().map(|s| s.view).collect());
        LabeledBatch { views, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetError;
    use ndarray::Array2;

    /// Synthetic dataset: sample i is a `(1, 4)` view filled with i.
    struct CountingDataset {
        n: usize,
        fail_index: Option<usize>,
    }

    impl Dataset for CountingDataset {
        type Sample = usize;

        fn len(&self) -> usize {
            self.n
        }

        fn get(&self, index: usize) -> Result<usize, DatasetError> {
            self.get_seeded(index, 0)
        }

        fn get_seeded(&self, index: usize, _seed: u64) -> Result<usize, DatasetError> {
            if Some(index) == self.fail_index {
                return Err(DatasetError::EmptyFileList("synthetic failure".into()));
            }
            Ok(index)
        }
    }

    fn drain<D: Dataset + 'static>(loader: BatchLoader<D>) -> Vec<D::Sample>
    where
        D::Sample: Send + 'static,
    {
        let mut all = Vec::new();
        for batch in loader {
            all.extend(batch);
        }
        all
    }

    #[test]
    fn one_epoch_delivers_every_index_once() {
        let dataset = Arc::new(CountingDataset {
            n: 37,
            fail_index: None,
        });
        let cfg = LoaderConfig::default().batch_size(8).num_workers(3).epochs(1);
        let mut all = drain(BatchLoader::new(dataset, cfg));
        all.sort();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn multiple_epochs_multiply_sample_count() {
        let dataset = Arc::new(CountingDataset {
            n: 10,
            fail_index: None,
        });
        let cfg = LoaderConfig::default().batch_size(4).num_workers(2).epochs(3);
        let all = drain(BatchLoader::new(dataset, cfg));
        assert_eq!(all.len(), 30);
    }

    #[test]
    fn failed_samples_are_skipped() {
        let dataset = Arc::new(CountingDataset {
            n: 12,
            fail_index: Some(5),
        });
        let cfg = LoaderConfig::default().batch_size(4).num_workers(2).epochs(1);
        let mut all = drain(BatchLoader::new(dataset, cfg));
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn drop_last_discards_short_batches() {
        let dataset = Arc::new(CountingDataset {
            n: 10,
            fail_index: None,
        });
        let cfg = LoaderConfig::default()
            .batch_size(4)
            .num_workers(2)
            .epochs(1)
            .drop_last(true);
        let all = drain(BatchLoader::new(dataset, cfg));
        // 10 samples -> two full batches, remainder dropped.
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn collate_stacks_views() {
        let samples: Vec<PairSample> = (0..3)
            .map(|i| PairSample {
                view_a: Array2::from_elem((2, 5), i as f32),
                view_b: Array2::from_elem((2, 5), -(i as f32)),
            })
            .collect();
        let batch = PairSample::collate(samples);
        assert_eq!(batch.views_a.dim(), (3, 2, 5));
        assert_eq!(batch.views_b.dim(), (3, 2, 5));
        assert_eq!(batch.views_a[[2, 1, 4]], 2.0);
        assert_eq!(batch.views_b[[2, 1, 4]], -2.0);
    }

    #[test]
    fn collate_labeled_batch() {
        let samples: Vec<LabeledSample> = (0..4)
            .map(|i| LabeledSample {
                view: Array2::zeros((1, 3)),
                label: i,
            })
            .collect();
        let batch = LabeledSample::collate(samples);
        assert_eq!(batch.views.dim(), (4, 1, 3));
        assert_eq!(batch.labels, vec![0, 1, 2, 3]);
    }
}
