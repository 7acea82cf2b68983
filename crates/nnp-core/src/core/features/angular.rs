use super::cutoff::CosineCutoff;
use super::{BasisError, linspace};
use crate::core::pairs::geometry::{directions, distances};
use candle_core::{CpuStorage, CustomOp1, D, Layout, Shape, Tensor};
use std::f64::consts::PI;

/// Cosines are clamped to `[-1 + δ, 1 - δ]` before `arccos`, keeping its gradient finite.
pub const ANGLE_CLAMP_DELTA: f64 = 1e-6;
/// 12.5 Å⁻² in nm⁻².
pub const ANGULAR_ETA: f64 = 1250.0;
pub const ANGULAR_ZETA: f64 = 14.1;

struct ArcCos;

impl CustomOp1 for ArcCos {
    fn name(&self) -> &'static str {
        "arccos"
    }

    fn cpu_fwd(
        &self,
        storage: &CpuStorage,
        layout: &Layout,
    ) -> candle_core::Result<(CpuStorage, Shape)> {
        let CpuStorage::F64(values) = storage else {
            candle_core::bail!("arccos is only implemented for f64 tensors")
        };
        let Some((start, end)) = layout.contiguous_offsets() else {
            candle_core::bail!("arccos requires a contiguous input")
        };
        let out = values[start..end].iter().map(|x| x.acos()).collect();
        Ok((CpuStorage::F64(out), layout.shape().clone()))
    }

    fn bwd(
        &self,
        arg: &Tensor,
        _res: &Tensor,
        grad_res: &Tensor,
    ) -> candle_core::Result<Option<Tensor>> {
        let slope = arg.sqr()?.affine(-1.0, 1.0)?.sqrt()?;
        Ok(Some(grad_res.div(&slope)?.neg()?))
    }
}

/// Elementwise `arccos` with the analytic derivative `-1 / sqrt(1 - x²)`.
pub fn arccos(x: &Tensor) -> candle_core::Result<Tensor> {
    x.contiguous()?.apply_op1(ArcCos)
}

/// Cosine of the angle between two bond vectors, clamped away from ±1.
pub fn clamped_cosine(r_12: &Tensor, r_13: &Tensor) -> candle_core::Result<Tensor> {
    let u_12 = directions(r_12, &distances(r_12)?)?;
    let u_13 = directions(r_13, &distances(r_13)?)?;
    u_12.mul(&u_13)?
        .sum(D::Minus1)?
        .clamp(-1.0 + ANGLE_CLAMP_DELTA, 1.0 - ANGLE_CLAMP_DELTA)
}

/// ANI angular symmetry functions for triples `(i; j, k)`:
///
/// `2 · ((1 + cos(θ - θ_s)) / 2)^ζ · exp(-η ((d_ij + d_ik) / 2 - r_s)²) · f_c(d_ij) · f_c(d_ik)`
///
/// evaluated on a grid of `S` angle sections `θ_s` and `G` radial shells `r_s`, flattened
/// section-major to width `S · G`. The expression is symmetric in the two bonds.
#[derive(Debug, Clone)]
pub struct AngularSymmetryFunction {
    cutoff: CosineCutoff,
    section_shifts: Vec<f64>,
    radial_shifts: Vec<f64>,
}

impl AngularSymmetryFunction {
    pub fn new(
        min_distance: f64,
        cutoff: f64,
        number_of_shells: usize,
        number_of_sections: usize,
    ) -> Result<Self, BasisError> {
        let cutoff_envelope = CosineCutoff::new(cutoff)?;
        if number_of_shells == 0 {
            return Err(BasisError::TooFewFunctions {
                family: "angular shell",
                minimum: 1,
                found: 0,
            });
        }
        if number_of_sections == 0 {
            return Err(BasisError::TooFewFunctions {
                family: "angular section",
                minimum: 1,
                found: 0,
            });
        }
        if !min_distance.is_finite() || min_distance < 0.0 || min_distance >= cutoff {
            return Err(BasisError::InvalidRange {
                min: min_distance,
                max: cutoff,
            });
        }

        let half_section = PI / (2.0 * number_of_sections as f64);
        let mut section_shifts = linspace(0.0, PI, number_of_sections + 1);
        section_shifts.truncate(number_of_sections);
        section_shifts.iter_mut().for_each(|s| *s += half_section);

        let mut radial_shifts = linspace(min_distance, cutoff, number_of_shells + 1);
        radial_shifts.truncate(number_of_shells);

        Ok(Self {
            cutoff: cutoff_envelope,
            section_shifts,
            radial_shifts,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff.cutoff()
    }

    pub fn feature_width(&self) -> usize {
        self.section_shifts.len() * self.radial_shifts.len()
    }

    pub fn section_shifts(&self) -> &[f64] {
        &self.section_shifts
    }

    /// Bond vectors `r_12`, `r_13` of shape `[T, 3]` leaving the central atom, to `[T, S·G]`.
    pub fn forward(&self, r_12: &Tensor, r_13: &Tensor) -> candle_core::Result<Tensor> {
        let device = r_12.device();
        let triples = r_12.dims2()?.0;
        let sections = self.section_shifts.len();
        let shells = self.radial_shifts.len();

        let d_12 = distances(r_12)?;
        let d_13 = distances(r_13)?;
        let theta = arccos(&clamped_cosine(r_12, r_13)?)?;

        let section_shifts = Tensor::from_vec(self.section_shifts.clone(), (1, sections), device)?;
        let angular = theta
            .unsqueeze(1)?
            .broadcast_sub(&section_shifts)?
            .cos()?
            .affine(0.5, 0.5)?
            .powf(ANGULAR_ZETA)?;

        let radial_shifts = Tensor::from_vec(self.radial_shifts.clone(), (1, shells), device)?;
        let radial = d_12
            .add(&d_13)?
            .affine(0.5, 0.0)?
            .unsqueeze(1)?
            .broadcast_sub(&radial_shifts)?
            .sqr()?
            .affine(-ANGULAR_ETA, 0.0)?
            .exp()?;

        let envelope = self
            .cutoff
            .forward(&d_12)?
            .mul(&self.cutoff.forward(&d_13)?)?
            .affine(2.0, 0.0)?;

        angular
            .unsqueeze(2)?
            .broadcast_mul(&radial.unsqueeze(1)?)?
            .reshape((triples, sections * shells))?
            .broadcast_mul(&envelope.unsqueeze(1)?)
    }
}
