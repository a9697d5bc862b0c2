//! Random batch sampling with replacement.

use candle_core::{DType, Device, Tensor};
use rand::Rng;

use super::IndexedDataset;
use crate::MaestroError;

/// Draw `size` independent uniform indices and stack the `(prev, curr)`
/// pairs they point at.
///
/// The result has shape `[2, size, ...sample_shape]`: index 0 of the first
/// axis holds the prevs, index 1 the currs, both in draw order. Duplicate
/// draws are kept. `size == 0` yields a tensor with an empty second axis.
///
/// Every drawn sample must unpack into a pair; a single-mode dataset fails
/// with [`MaestroError::NotAPair`] at the first draw.
pub fn random_batch_sampler<D>(dataset: &D, size: usize, device: &Device) -> crate::Result<Tensor>
where
    D: IndexedDataset + ?Sized,
{
    let mut rng = rand::thread_rng();
    random_batch_sampler_with_rng(dataset, size, device, &mut rng)
}

/// [`random_batch_sampler`] driven by a caller-supplied RNG.
pub fn random_batch_sampler_with_rng<D, R>(
    dataset: &D,
    size: usize,
    device: &Device,
    rng: &mut R,
) -> crate::Result<Tensor>
where
    D: IndexedDataset + ?Sized,
    R: Rng,
{
    if size == 0 {
        let mut shape = vec![2, 0];
        shape.extend_from_slice(dataset.sample_shape());
        return Ok(Tensor::zeros(shape, DType::F32, device)?);
    }

    let len = dataset.len();
    if len == 0 {
        return Err(MaestroError::EmptyDataset);
    }

    let mut prevs = Vec::with_capacity(size);
    let mut currs = Vec::with_capacity(size);

    for _ in 0..size {
        let index = rng.gen_range(0..len);
        let (prev, curr) = dataset.get(index, device)?.into_pair()?;
        log::trace!("Drew index {}", index);
        prevs.push(prev);
        currs.push(curr);
    }

    let prevs = Tensor::stack(&prevs, 0)?;
    let currs = Tensor::stack(&currs, 0)?;
    Ok(Tensor::stack(&[prevs, currs], 0)?)
}
