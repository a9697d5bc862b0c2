/// Configuration for the Maestro data module
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::data::Mode;

/// Worker threads used by the training loader. Tune to the host CPU.
pub const NUM_WORKERS: usize = 9;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataModuleConfig {
    /// Path to the array store file (`.npz`, or `.h5`/`.hdf5` with the `hdf5` feature)
    pub data_path: PathBuf,

    /// Samples per training batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Read mode: "single" or "pair"
    #[serde(default)]
    pub mode: Mode,
}

fn default_batch_size() -> usize {
    32
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::new(),
            batch_size: default_batch_size(),
            mode: Mode::Single,
        }
    }
}

impl DataModuleConfig {
    pub fn new<P: Into<PathBuf>>(data_path: P, batch_size: usize, mode: Mode) -> Self {
        Self {
            data_path: data_path.into(),
            batch_size,
            mode,
        }
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::MaestroError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.data_path.as_os_str().is_empty() {
            return Err(crate::MaestroError::Config(
                "data_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
