/// Data loading modules for Maestro training
pub mod array_store;
pub mod loader;
mod npz;
pub mod sample;
pub mod sample_store;
pub mod sampler;

pub use array_store::StoreFormat;
pub use loader::{LoaderConfig, SampleLoader};
pub use sample::{Mode, Sample};
pub use sample_store::{SampleStore, SAMPLE_COLS, SAMPLE_ROWS};
pub use sampler::{random_batch_sampler, random_batch_sampler_with_rng};

use candle_core::Device;

/// An indexed collection of samples.
///
/// Implementations must be `Send + Sync` so loaders can fetch from several
/// worker threads at once.
pub trait IndexedDataset: Send + Sync {
    /// Total number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the sample at `index`, for `index` in `[0, len())`
    fn get(&self, index: usize, device: &Device) -> crate::Result<Sample>;

    /// Shape of one emitted tensor, without a batch axis
    fn sample_shape(&self) -> &[usize];
}

/// Generic batch loader trait
pub trait BatchDataLoader {
    /// Get next collated batch, `None` once the pass is exhausted
    fn next_batch(&mut self, device: &Device) -> crate::Result<Option<Sample>>;

    /// Reset loader for new pass
    fn reset(&mut self);

    /// Get total number of batches per pass
    fn num_batches(&self) -> usize;
}
