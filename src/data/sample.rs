/// Read modes and the samples they emit
use std::fmt;
use std::str::FromStr;

use candle_core::Tensor;

use crate::MaestroError;

/// How a record of the `x` field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Each record is one `[128, 16]` array.
    #[default]
    Single,
    /// Each record is a `(prev, curr)` pair of temporally adjacent arrays.
    Pair,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::Pair => "pair",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Mode::Single),
            "pair" => Ok(Mode::Pair),
            other => Err(MaestroError::InvalidMode(other.to_string())),
        }
    }
}

/// A sample read from a store, or a batch of them once collated.
///
/// Store reads carry a leading channel axis (`[1, 128, 16]`); collated
/// batches add a batch axis in front of that (`[b, 1, 128, 16]`).
#[derive(Debug, Clone)]
pub enum Sample {
    Single(Tensor),
    Pair { prev: Tensor, curr: Tensor },
}

impl Sample {
    pub fn mode(&self) -> Mode {
        match self {
            Sample::Single(_) => Mode::Single,
            Sample::Pair { .. } => Mode::Pair,
        }
    }

    /// Unwrap a single-mode sample.
    pub fn into_single(self) -> crate::Result<Tensor> {
        match self {
            Sample::Single(t) => Ok(t),
            Sample::Pair { .. } => Err(MaestroError::ModeMismatch {
                expected: Mode::Single,
                found: Mode::Pair,
            }),
        }
    }

    /// Unpack into `(prev, curr)`.
    pub fn into_pair(self) -> crate::Result<(Tensor, Tensor)> {
        match self {
            Sample::Pair { prev, curr } => Ok((prev, curr)),
            Sample::Single(t) => Err(MaestroError::NotAPair(format!(
                "got a single sample of shape {:?}",
                t.dims()
            ))),
        }
    }

    /// Stack samples along a new leading batch axis.
    ///
    /// The variant of the first sample decides the variant of the batch;
    /// every other sample must match it.
    pub fn collate(samples: Vec<Sample>) -> crate::Result<Sample> {
        let mode = match samples.first() {
            Some(sample) => sample.mode(),
            None => return Err(MaestroError::EmptyDataset),
        };

        match mode {
            Mode::Single => {
                let tensors = samples
                    .into_iter()
                    .map(Sample::into_single)
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(Sample::Single(Tensor::stack(&tensors, 0)?))
            }
            Mode::Pair => {
                let (prevs, currs): (Vec<Tensor>, Vec<Tensor>) = samples
                    .into_iter()
                    .map(Sample::into_pair)
                    .collect::<crate::Result<Vec<_>>>()?
                    .into_iter()
                    .unzip();
                Ok(Sample::Pair {
                    prev: Tensor::stack(&prevs, 0)?,
                    curr: Tensor::stack(&currs, 0)?,
                })
            }
        }
    }
}
