/// Random-access sample store over the `x` field of an on-disk array store
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use ndarray::{ArrayViewD, Axis};

use super::array_store::{StoreFormat, FIELD};
use super::{IndexedDataset, Mode, Sample};
use crate::MaestroError;

/// Rows of one stored array.
pub const SAMPLE_ROWS: usize = 128;
/// Columns of one stored array.
pub const SAMPLE_COLS: usize = 16;

/// Dataset handle over an array store file.
///
/// Only the path, record count and sample shape are kept; the file itself is
/// reopened for every [`SampleStore::get`].
#[derive(Debug, Clone)]
pub struct SampleStore {
    path: PathBuf,
    format: StoreFormat,
    mode: Mode,
    len: usize,
    sample_shape: Vec<usize>, // [1, ...record shape]
}

impl SampleStore {
    /// Open a store and cache its length.
    ///
    /// Fails if the file is missing, cannot be read, or has no `x` field.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = StoreFormat::from_path(&path)?;

        log::info!("Opening {:?} store at {:?} in {} mode", format, path, mode);

        let shape = format.field_shape(&path)?;
        let len = shape[0];

        // Pair records carry (prev, curr) on their leading axis
        let record_axes = match mode {
            Mode::Single => 1,
            Mode::Pair => 2,
        };
        let mut sample_shape = vec![1];
        sample_shape.extend(shape.iter().skip(record_axes));

        log::info!(
            "Store loaded: {} records, field '{}' shape {:?}, sample shape {:?}",
            len,
            FIELD,
            shape,
            sample_shape
        );

        Ok(Self {
            path,
            format,
            mode,
            len,
            sample_shape,
        })
    }

    /// Parse `mode` and open the store. An unknown mode fails before the
    /// file is touched.
    pub fn open_with_mode<P: AsRef<Path>>(path: P, mode: &str) -> crate::Result<Self> {
        let mode: Mode = mode.parse()?;
        Self::open(path, mode)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// Get number of records
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shape of one emitted tensor, channel axis included.
    pub fn sample_shape(&self) -> &[usize] {
        &self.sample_shape
    }

    /// Read the sample at `index`.
    pub fn get(&self, index: usize, device: &Device) -> crate::Result<Sample> {
        let record = self.format.read_record(&self.path, index)?;

        match self.mode {
            Mode::Single => Ok(Sample::Single(to_tensor(record.view(), device)?)),
            Mode::Pair => {
                if record.ndim() == 0 || record.len_of(Axis(0)) != 2 {
                    return Err(MaestroError::NotAPair(format!(
                        "record {} has shape {:?}",
                        index,
                        record.shape()
                    )));
                }
                let prev = to_tensor(record.index_axis(Axis(0), 0), device)?;
                let curr = to_tensor(record.index_axis(Axis(0), 1), device)?;
                Ok(Sample::Pair { prev, curr })
            }
        }
    }
}

/// Copy an array into an f32 tensor with a leading singleton axis.
fn to_tensor(array: ArrayViewD<'_, f32>, device: &Device) -> crate::Result<Tensor> {
    let shape = array.shape().to_vec();
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(data, shape, device)?.unsqueeze(0)?)
}

impl IndexedDataset for SampleStore {
    fn len(&self) -> usize {
        SampleStore::len(self)
    }

    fn get(&self, index: usize, device: &Device) -> crate::Result<Sample> {
        SampleStore::get(self, index, device)
    }

    fn sample_shape(&self) -> &[usize] {
        SampleStore::sample_shape(self)
    }
}
