/// Shuffling, batching loader over an indexed dataset
use std::sync::Arc;

use candle_core::Device;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use super::{BatchDataLoader, IndexedDataset, Sample};

/// Configuration for [`SampleLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Number of samples per batch
    pub batch_size: usize,
    /// Reshuffle indices at the start of every pass
    pub shuffle: bool,
    /// Skip the last batch if it is short
    pub drop_last: bool,
    /// Worker threads for fetching samples (0 = sequential)
    pub num_workers: usize,
    /// Seed for reproducible shuffling; each pass advances the same RNG
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            drop_last: false,
            num_workers: 0,
            seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }
}

/// Data loader yielding collated [`Sample`] batches
pub struct SampleLoader<D: IndexedDataset> {
    dataset: Arc<D>,
    config: LoaderConfig,
    current_idx: usize,
    indices: Vec<usize>,
    rng: StdRng,
    pool: Option<rayon::ThreadPool>,
}

impl<D: IndexedDataset> SampleLoader<D> {
    /// Create new data loader
    pub fn new(dataset: Arc<D>, config: LoaderConfig) -> crate::Result<Self> {
        if config.batch_size == 0 {
            return Err(crate::MaestroError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        let pool = if config.num_workers > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.num_workers)
                    .thread_name(|i| format!("sample-loader-{}", i))
                    .build()?,
            )
        } else {
            None
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut loader = Self {
            indices: (0..dataset.len()).collect(),
            dataset,
            config,
            current_idx: 0,
            rng,
            pool,
        };
        loader.shuffle_indices();
        Ok(loader)
    }

    fn shuffle_indices(&mut self) {
        if self.config.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    fn fetch_samples(&self, indices: &[usize], device: &Device) -> crate::Result<Vec<Sample>> {
        let dataset = &self.dataset;
        match &self.pool {
            Some(pool) if indices.len() > 1 => pool.install(|| {
                indices
                    .par_iter()
                    .map(|&i| dataset.get(i, device))
                    .collect::<crate::Result<Vec<_>>>()
            }),
            _ => indices.iter().map(|&i| dataset.get(i, device)).collect(),
        }
    }

    /// Get next collated batch
    pub fn next_batch(&mut self, device: &Device) -> crate::Result<Option<Sample>> {
        let remaining = self.indices.len().saturating_sub(self.current_idx);
        if remaining == 0 || (self.config.drop_last && remaining < self.config.batch_size) {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.config.batch_size).min(self.indices.len());
        let samples = self.fetch_samples(&self.indices[self.current_idx..end_idx], device)?;
        self.current_idx = end_idx;

        log::debug!(
            "Loaded batch of {} samples ({}/{})",
            samples.len(),
            end_idx,
            self.indices.len()
        );

        Ok(Some(Sample::collate(samples)?))
    }

    /// Reset loader for new pass
    pub fn reset(&mut self) {
        self.current_idx = 0;
        self.shuffle_indices();
    }

    /// Get number of batches per pass
    pub fn num_batches(&self) -> usize {
        if self.config.drop_last {
            self.dataset.len() / self.config.batch_size
        } else {
            self.dataset.len().div_ceil(self.config.batch_size)
        }
    }

    /// Total number of samples
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Get dataset reference
    pub fn dataset(&self) -> &D {
        &self.dataset
    }
}

impl<D: IndexedDataset> BatchDataLoader for SampleLoader<D> {
    fn next_batch(&mut self, device: &Device) -> crate::Result<Option<Sample>> {
        SampleLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        SampleLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        SampleLoader::num_batches(self)
    }
}
