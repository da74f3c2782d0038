use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    #[error("mask shape mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    ShapeMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },
}

/// Per-pixel integer mask on a provider's grid.
///
/// Threshold masks hold 0/1. A signed difference holds -1/0/+1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMask {
    values: Array2<i8>,
}

impl PixelMask {
    pub fn from_array(values: Array2<i8>) -> Self {
        Self { values }
    }

    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            values: Array2::zeros(shape),
        }
    }

    pub fn ones(shape: (usize, usize)) -> Self {
        Self {
            values: Array2::ones(shape),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> &Array2<i8> {
        &self.values
    }

    /// `last - first`, clamped to -1..=1.
    pub fn signed_difference(first: &PixelMask, last: &PixelMask) -> Result<PixelMask, MaskError> {
        let (er, ec) = first.shape();
        let (ar, ac) = last.shape();
        if (er, ec) != (ar, ac) {
            return Err(MaskError::ShapeMismatch { er, ec, ar, ac });
        }

        let values = Zip::from(&first.values)
            .and(&last.values)
            .map_collect(|&before, &after| (i16::from(after) - i16::from(before)).signum() as i8);
        Ok(PixelMask { values })
    }

    /// 1 where the mask equals `value`, 0 elsewhere.
    pub fn select(&self, value: i8) -> PixelMask {
        PixelMask {
            values: self.values.mapv(|v| i8::from(v == value)),
        }
    }

    pub fn count(&self, value: i8) -> usize {
        self.values.iter().filter(|&&v| v == value).count()
    }
}
