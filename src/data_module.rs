/// Training-loop lifecycle adapter over the sample store
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DataModuleConfig, NUM_WORKERS};
use crate::data::{LoaderConfig, SampleLoader, SampleStore};
use crate::MaestroError;

/// Lifecycle stage passed to [`DataModule::setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fit,
    Validate,
    Test,
    Predict,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fit => "fit",
            Stage::Validate => "validate",
            Stage::Test => "test",
            Stage::Predict => "predict",
        };
        f.write_str(name)
    }
}

impl FromStr for Stage {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(Stage::Fit),
            "validate" => Ok(Stage::Validate),
            "test" => Ok(Stage::Test),
            "predict" => Ok(Stage::Predict),
            other => Err(MaestroError::Config(format!("Unknown stage: {}", other))),
        }
    }
}

/// Data side of a training run: build datasets on `setup`, hand out loaders.
pub trait DataModule {
    type Loader;

    /// Prepare datasets for `stage`
    fn setup(&mut self, stage: Stage) -> crate::Result<()>;

    /// Loader feeding the training loop
    fn train_dataloader(&self) -> crate::Result<Self::Loader>;
}

/// Data module over one Maestro sample store
pub struct MaestroDataModule {
    config: DataModuleConfig,
    dataset: Option<Arc<SampleStore>>,
}

impl MaestroDataModule {
    pub fn new(config: DataModuleConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dataset: None,
        })
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    /// Store built by the last `setup`, if any
    pub fn dataset(&self) -> Option<&SampleStore> {
        self.dataset.as_deref()
    }
}

impl DataModule for MaestroDataModule {
    type Loader = SampleLoader<SampleStore>;

    fn setup(&mut self, stage: Stage) -> crate::Result<()> {
        log::info!("Setting up data module for stage '{}'", stage);
        let store = SampleStore::open(&self.config.data_path, self.config.mode)?;
        self.dataset = Some(Arc::new(store));
        Ok(())
    }

    fn train_dataloader(&self) -> crate::Result<Self::Loader> {
        let dataset = self.dataset.clone().ok_or(MaestroError::NotSetUp)?;

        let config = LoaderConfig::default()
            .batch_size(self.config.batch_size)
            .shuffle(true)
            .num_workers(NUM_WORKERS);

        log::info!(
            "Training loader: {} samples, batch size {}, {} workers",
            dataset.len(),
            config.batch_size,
            config.num_workers
        );

        SampleLoader::new(dataset, config)
    }
}
