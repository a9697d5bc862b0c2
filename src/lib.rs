//! Maestro data loading
//!
//! Reads fixed-shape numeric samples from an on-disk array store and hands
//! them to a candle training loop, either one index at a time or as randomly
//! drawn batches.
//!
//! # Layout
//!
//! - **SampleStore**: random access over the `x` field of a `.npz` (or, with
//!   the `hdf5` feature, HDF5) file, in `single` or `pair` mode
//! - **random_batch_sampler**: draws `n` pairs with replacement and stacks
//!   them into a `[2, n, 1, 128, 16]` tensor
//! - **MaestroDataModule**: `setup` / `train_dataloader` lifecycle over a
//!   shuffling, multi-worker [`data::SampleLoader`]
//!
//! # Example
//!
//! ```ignore
//! use candle_core::Device;
//! use maestro_data::{random_batch_sampler, Mode, SampleStore};
//!
//! let store = SampleStore::open("maestro_v3.npz", Mode::Pair)?;
//! let batch = random_batch_sampler(&store, 4, &Device::Cpu)?; // [2, 4, 1, 128, 16]
//! ```

pub mod config;
pub mod data;
pub mod data_module;

// Re-export commonly used items
pub use config::{DataModuleConfig, NUM_WORKERS};
pub use data::{
    random_batch_sampler, random_batch_sampler_with_rng, IndexedDataset, Mode, Sample,
    SampleLoader, SampleStore,
};
pub use data_module::{DataModule, MaestroDataModule, Stage};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NPY error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HDF5 error: {0}")]
    Hdf5(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid mode: {0:?}. Must be 'single' or 'pair'")]
    InvalidMode(String),

    #[error("Unsupported store format: {0}")]
    UnsupportedFormat(String),

    #[error("Field '{field}' not found in {path}")]
    MissingField { field: String, path: String },

    #[error("Index {index} out of range for store of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Record does not unpack into (prev, curr): {0}")]
    NotAPair(String),

    #[error("Expected a {expected} sample, found a {found} sample")]
    ModeMismatch {
        expected: data::Mode,
        found: data::Mode,
    },

    #[error("Cannot draw from an empty dataset")]
    EmptyDataset,

    #[error("Data module used before setup()")]
    NotSetUp,
}

pub type Result<T> = std::result::Result<T, MaestroError>;
