/// Open a Maestro store, draw a random pair batch and run one training-loader pass
///
/// Usage: cargo run --example sample_batches -- <store.npz> [single|pair] [batch_size]
use candle_core::Device;
use maestro_data::{
    random_batch_sampler, DataModule, DataModuleConfig, MaestroDataModule, Mode, Stage,
};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let data_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: sample_batches <store.npz> [single|pair] [batch_size]"))?;
    let mode: Mode = match args.next() {
        Some(m) => m.parse()?,
        None => Mode::Pair,
    };
    let batch_size: usize = match args.next() {
        Some(bs) => bs.parse()?,
        None => 32,
    };

    let device = if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)?
    } else {
        Device::Cpu
    };
    log::info!("Using device: {:?}", device);

    let config = DataModuleConfig::new(data_path, batch_size, mode);
    let mut module = MaestroDataModule::new(config)?;
    module.setup(Stage::Fit)?;

    if let Some(store) = module.dataset() {
        log::info!("Store:");
        log::info!("  - Records: {}", store.len());
        log::info!("  - Mode: {}", store.mode());
        log::info!("  - Sample shape: {:?}", store.sample_shape());

        if mode == Mode::Pair {
            let batch = random_batch_sampler(store, 4, &device)?;
            log::info!("Random pair batch shape: {:?}", batch.dims());
        }
    }

    let mut loader = module.train_dataloader()?;
    log::info!("Training loader: {} batches per pass", loader.num_batches());

    let mut batches = 0;
    while let Some(batch) = loader.next_batch(&device)? {
        batches += 1;
        if batches == 1 {
            log::info!("First batch: {:?}", batch);
        }
    }
    log::info!("Pass complete: {} batches", batches);

    Ok(())
}
