// Integration tests for maestro-data: store, sampler and data module together

use std::fs::File;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use maestro_data::{
    random_batch_sampler, DataModule, DataModuleConfig, IndexedDataset, MaestroDataModule,
    MaestroError, Mode, SampleStore, Stage,
};
use ndarray::{Array, Array3, Array4, Dimension};
use ndarray_npy::WriteNpyExt;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ROWS: usize = 128;
const COLS: usize = 16;

fn value(index: usize, part: usize, row: usize, col: usize) -> f32 {
    (index * 10_000 + part * 5_000 + row * COLS + col) as f32
}

/// Same layout as `np.savez` (stored) or `np.savez_compressed` (deflated)
fn savez<D: Dimension>(path: &Path, x: &Array<f32, D>, method: CompressionMethod) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    zip.start_file("x.npy", SimpleFileOptions::default().compression_method(method))
        .unwrap();
    x.write_npy(&mut zip).unwrap();
    zip.finish().unwrap();
}

fn pair_store(dir: &Path, len: usize) -> PathBuf {
    let path = dir.join("maestro_pair.npz");
    let x = Array4::<f32>::from_shape_fn((len, 2, ROWS, COLS), |(i, p, r, c)| value(i, p, r, c));
    savez(&path, &x, CompressionMethod::Stored);
    path
}

fn single_store(dir: &Path, len: usize) -> PathBuf {
    let path = dir.join("maestro_single.npz");
    let x = Array3::<f32>::from_shape_fn((len, ROWS, COLS), |(i, r, c)| value(i, 0, r, c));
    savez(&path, &x, CompressionMethod::Deflated);
    path
}

#[test]
fn pair_batch_of_four_from_ten_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::open(pair_store(dir.path(), 10), Mode::Pair).unwrap();
    let device = Device::Cpu;
    assert_eq!(store.len(), 10);

    let batch = random_batch_sampler(&store, 4, &device).unwrap();
    assert_eq!(batch.dims(), &[2, 4, 1, ROWS, COLS]);
    assert_eq!(batch.dtype(), DType::F32);

    // prev and curr of each draw come from the same record
    for j in 0..4 {
        let prev = batch.get(0).unwrap().get(j).unwrap().flatten_all().unwrap();
        let curr = batch.get(1).unwrap().get(j).unwrap().flatten_all().unwrap();
        let prev = prev.to_vec1::<f32>().unwrap();
        let curr = curr.to_vec1::<f32>().unwrap();

        let index = (prev[0] / 10_000.0) as usize;
        assert!(index < 10);
        assert_eq!(prev[0], value(index, 0, 0, 0));
        assert_eq!(curr[0], value(index, 1, 0, 0));
        assert_eq!(prev[ROWS * COLS - 1], value(index, 0, ROWS - 1, COLS - 1));
    }
}

#[test]
fn empty_batch_does_not_fail() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::open(pair_store(dir.path(), 2), Mode::Pair).unwrap();

    let batch = random_batch_sampler(&store, 0, &Device::Cpu).unwrap();
    assert_eq!(batch.dims(), &[2, 0, 1, ROWS, COLS]);
}

#[test]
fn single_mode_reads_through_trait_object() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::open(single_store(dir.path(), 3), Mode::Single).unwrap();
    let dataset: &dyn IndexedDataset = &store;

    assert_eq!(dataset.len(), 3);
    assert!(!dataset.is_empty());
    for i in 0..dataset.len() {
        let sample = dataset.get(i, &Device::Cpu).unwrap().into_single().unwrap();
        assert_eq!(sample.dims(), &[1, ROWS, COLS]);
    }

    // the sampler needs pairs
    assert!(matches!(
        random_batch_sampler(dataset, 1, &Device::Cpu),
        Err(MaestroError::NotAPair(_))
    ));
}

#[test]
fn invalid_mode_string() {
    let err = SampleStore::open_with_mode("never/opened.npz", "both").unwrap_err();
    assert!(matches!(err, MaestroError::InvalidMode(_)));
}

#[test]
fn unsupported_extension() {
    let err = SampleStore::open("store.zarr", Mode::Single).unwrap_err();
    assert!(matches!(err, MaestroError::UnsupportedFormat(_)));
}

#[test]
fn data_module_training_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = single_store(dir.path(), 9);
    let device = Device::Cpu;

    let config_path = dir.path().join("data.json");
    let json = serde_json::json!({ "data_path": path, "batch_size": 4, "mode": "single" });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let config = DataModuleConfig::from_json_file(&config_path).unwrap();
    let mut module = MaestroDataModule::new(config).unwrap();
    module.setup(Stage::Fit).unwrap();

    let mut loader = module.train_dataloader().unwrap();
    let mut total = 0;
    while let Some(batch) = loader.next_batch(&device).unwrap() {
        let batch = batch.into_single().unwrap();
        assert_eq!(&batch.dims()[1..], &[1, ROWS, COLS]);
        total += batch.dims()[0];
    }
    assert_eq!(total, 9);
}

#[test]
fn stored_and_compressed_archives_agree() {
    let dir = tempfile::tempdir().unwrap();
    let device = Device::Cpu;
    let x = Array4::<f32>::from_shape_fn((6, 2, ROWS, COLS), |(i, p, r, c)| value(i, p, r, c));

    let stored = dir.path().join("stored.npz");
    let deflated = dir.path().join("deflated.npz");
    savez(&stored, &x, CompressionMethod::Stored);
    savez(&deflated, &x, CompressionMethod::Deflated);

    let stored = SampleStore::open(stored, Mode::Pair).unwrap();
    let deflated = SampleStore::open(deflated, Mode::Pair).unwrap();
    assert_eq!(stored.len(), deflated.len());

    for index in [0, 3, 5] {
        let (a_prev, a_curr) = stored.get(index, &device).unwrap().into_pair().unwrap();
        let (b_prev, b_curr) = deflated.get(index, &device).unwrap().into_pair().unwrap();
        let a = a_prev.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = b_prev.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b);
        assert_eq!(a[ROWS * COLS - 1], value(index, 0, ROWS - 1, COLS - 1));

        let a = a_curr.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = b_curr.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], value(index, 1, 0, 0));
    }
}
