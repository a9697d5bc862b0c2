/// Backends for the on-disk array store holding the `x` field
///
/// Every call opens the file, reads what it needs and drops the handle
/// before returning. Nothing is cached between calls.
use std::path::Path;

use ndarray::ArrayD;

use super::npz;
use crate::MaestroError;

/// Name of the field every store keeps its records under.
pub const FIELD: &str = "x";

/// File format of a store, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    /// NumPy `.npz` archive (`np.savez(path, x=...)`)
    Npz,
    /// HDF5 file with a dataset named `x` (needs the `hdf5` feature)
    Hdf5,
}

impl StoreFormat {
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("npz") => Ok(StoreFormat::Npz),
            Some("h5") | Some("hdf5") => Ok(StoreFormat::Hdf5),
            _ => Err(MaestroError::UnsupportedFormat(format!(
                "{} (expected .npz, .h5 or .hdf5)",
                path.display()
            ))),
        }
    }

    /// Shape of the whole `x` field, record axis first.
    pub fn field_shape(self, path: &Path) -> crate::Result<Vec<usize>> {
        let shape = match self {
            StoreFormat::Npz => npz::field_shape(path)?,
            StoreFormat::Hdf5 => h5::field_shape(path)?,
        };

        if shape.is_empty() {
            return Err(MaestroError::UnsupportedFormat(format!(
                "field '{}' in {} is a scalar",
                FIELD,
                path.display()
            )));
        }
        Ok(shape)
    }

    /// Read record `index` of the `x` field, converted to f32.
    pub fn read_record(self, path: &Path, index: usize) -> crate::Result<ArrayD<f32>> {
        match self {
            StoreFormat::Npz => npz::read_record(path, index),
            StoreFormat::Hdf5 => h5::read_record(path, index),
        }
    }
}

pub(super) fn check_index(shape: &[usize], index: usize) -> crate::Result<()> {
    let len = shape.first().copied().unwrap_or(0);
    if index >= len {
        return Err(MaestroError::IndexOutOfRange { index, len });
    }
    Ok(())
}

pub(super) fn missing_field(path: &Path) -> MaestroError {
    MaestroError::MissingField {
        field: FIELD.to_string(),
        path: path.display().to_string(),
    }
}

#[cfg(feature = "hdf5")]
mod h5 {
    use super::*;
    use ndarray::{s, Ix1, Ix2, Ix3};

    fn h5_err(e: hdf5::Error) -> MaestroError {
        MaestroError::Hdf5(e.to_string())
    }

    fn open_field(file: &hdf5::File, path: &Path) -> crate::Result<hdf5::Dataset> {
        if !file.link_exists(FIELD) {
            return Err(missing_field(path));
        }
        file.dataset(FIELD).map_err(h5_err)
    }

    pub(super) fn field_shape(path: &Path) -> crate::Result<Vec<usize>> {
        let file = hdf5::File::open(path).map_err(h5_err)?;
        let dataset = open_field(&file, path)?;
        Ok(dataset.shape())
    }

    pub(super) fn read_record(path: &Path, index: usize) -> crate::Result<ArrayD<f32>> {
        let file = hdf5::File::open(path).map_err(h5_err)?;
        let dataset = open_field(&file, path)?;
        let shape = dataset.shape();
        check_index(&shape, index)?;

        // HDF5 converts the stored numeric type to f32 on read
        let record = match shape.len() {
            2 => dataset.read_slice::<f32, _, Ix1>(s![index, ..]).map_err(h5_err)?.into_dyn(),
            3 => dataset.read_slice::<f32, _, Ix2>(s![index, .., ..]).map_err(h5_err)?.into_dyn(),
            4 => dataset
                .read_slice::<f32, _, Ix3>(s![index, .., .., ..])
                .map_err(h5_err)?
                .into_dyn(),
            rank => {
                return Err(MaestroError::UnsupportedFormat(format!(
                    "field '{}' in {} has rank {}",
                    FIELD,
                    path.display(),
                    rank
                )))
            }
        };
        Ok(record)
    }
}

#[cfg(not(feature = "hdf5"))]
mod h5 {
    use super::*;

    fn disabled(path: &Path) -> MaestroError {
        MaestroError::UnsupportedFormat(format!(
            "{}: HDF5 support requires the `hdf5` feature",
            path.display()
        ))
    }

    pub(super) fn field_shape(path: &Path) -> crate::Result<Vec<usize>> {
        Err(disabled(path))
    }

    pub(super) fn read_record(path: &Path, _index: usize) -> crate::Result<ArrayD<f32>> {
        Err(disabled(path))
    }
}
