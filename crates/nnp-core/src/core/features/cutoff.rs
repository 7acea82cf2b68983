use super::BasisError;
use candle_core::Tensor;
use std::f64::consts::PI;

/// `f(d) = 0.5 (cos(π d / r_c) + 1)` for `d < r_c`, otherwise `0`.
///
/// The hard mask is applied as a constant, so at `d = r_c` both the value and the gradient of the
/// envelope are exactly zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineCutoff {
    cutoff: f64,
}

impl CosineCutoff {
    pub fn new(cutoff: f64) -> Result<Self, BasisError> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(BasisError::InvalidCutoff(cutoff));
        }
        Ok(Self { cutoff })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn value(&self, d: f64) -> f64 {
        if d < self.cutoff {
            0.5 * ((PI * d / self.cutoff).cos() + 1.0)
        } else {
            0.0
        }
    }

    /// `d_ij` of shape `[P]` to weights of shape `[P]`.
    pub fn forward(&self, d_ij: &Tensor) -> candle_core::Result<Tensor> {
        let mask: Vec<f64> = d_ij
            .to_vec1::<f64>()?
            .into_iter()
            .map(|d| if d < self.cutoff { 1.0 } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(mask, d_ij.dims1()?, d_ij.device())?;
        let envelope = d_ij
            .affine(PI / self.cutoff, 0.0)?
            .cos()?
            .affine(0.5, 0.5)?;
        envelope.mul(&mask)
    }
}
