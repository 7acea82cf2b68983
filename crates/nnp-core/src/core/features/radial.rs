use super::{BasisError, linspace};
use candle_core::{D, Device, Tensor, Var};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Width parameter of ANI radial functions: 19.7 Å⁻² expressed in nm⁻².
pub const ANI_RADIAL_ETA: f64 = 1970.0;
const ANI_RADIAL_PREFACTOR: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RadialBasisFamily {
    /// `exp(-γ (d - μ)²)`, centers spaced linearly over `[min, max]`, `γ = 0.5 / Δμ²`.
    #[default]
    Gaussian,
    /// `0.25 exp(-η (d - μ)²)`, `K` shells over `[min, max)` with fixed `η`.
    AniGaussian,
    /// `exp(-β (exp(α (min - d)) - μ)²)`, centers spaced linearly in `exp(-d)`-space.
    ExpNormal,
}

impl RadialBasisFamily {
    pub fn name(self) -> &'static str {
        match self {
            RadialBasisFamily::Gaussian => "gaussian",
            RadialBasisFamily::AniGaussian => "ani-gaussian",
            RadialBasisFamily::ExpNormal => "exp-normal",
        }
    }

    fn minimum_functions(self) -> usize {
        match self {
            RadialBasisFamily::Gaussian => 2,
            RadialBasisFamily::AniGaussian | RadialBasisFamily::ExpNormal => 1,
        }
    }
}

impl fmt::Display for RadialBasisFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RadialBasisFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gaussian" | "schnet" => Ok(RadialBasisFamily::Gaussian),
            "ani-gaussian" | "ani" => Ok(RadialBasisFamily::AniGaussian),
            "exp-normal" | "physnet" | "sake" => Ok(RadialBasisFamily::ExpNormal),
            other => Err(format!("unknown radial basis family '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BasisParameter {
    Fixed(Tensor),
    Trainable(Var),
}

impl BasisParameter {
    fn new(values: Vec<f64>, trainable: bool, device: &Device) -> candle_core::Result<Self> {
        let n = values.len();
        let tensor = Tensor::from_vec(values, n, device)?;
        Ok(if trainable {
            Self::Trainable(Var::from_tensor(&tensor)?)
        } else {
            Self::Fixed(tensor)
        })
    }

    pub fn tensor(&self) -> &Tensor {
        match self {
            BasisParameter::Fixed(tensor) => tensor,
            BasisParameter::Trainable(var) => var.as_tensor(),
        }
    }

    pub fn var(&self) -> Option<&Var> {
        match self {
            BasisParameter::Fixed(_) => None,
            BasisParameter::Trainable(var) => Some(var),
        }
    }
}

/// A bank of `K` radial functions mapping distances `[P]` to features `[P, K]`.
#[derive(Debug, Clone)]
pub struct RadialBasis {
    family: RadialBasisFamily,
    min_distance: f64,
    max_distance: f64,
    centers: BasisParameter,
    scales: BasisParameter,
    alpha: f64,
    prefactor: f64,
}

impl RadialBasis {
    pub fn new(
        family: RadialBasisFamily,
        number_of_functions: usize,
        min_distance: f64,
        max_distance: f64,
        trainable: bool,
        device: &Device,
    ) -> Result<Self, BasisError> {
        if number_of_functions < family.minimum_functions() {
            return Err(BasisError::TooFewFunctions {
                family: family.name(),
                minimum: family.minimum_functions(),
                found: number_of_functions,
            });
        }
        if !min_distance.is_finite()
            || !max_distance.is_finite()
            || min_distance < 0.0
            || max_distance <= min_distance
        {
            return Err(BasisError::InvalidRange {
                min: min_distance,
                max: max_distance,
            });
        }

        let k = number_of_functions;
        let span = max_distance - min_distance;
        let (centers, scales, alpha, prefactor) = match family {
            RadialBasisFamily::Gaussian => {
                let centers = linspace(min_distance, max_distance, k);
                let width = span / (k - 1) as f64;
                (centers, vec![0.5 / (width * width); k], 0.0, 1.0)
            }
            RadialBasisFamily::AniGaussian => {
                let mut centers = linspace(min_distance, max_distance, k + 1);
                centers.truncate(k);
                (
                    centers,
                    vec![ANI_RADIAL_ETA; k],
                    0.0,
                    ANI_RADIAL_PREFACTOR,
                )
            }
            RadialBasisFamily::ExpNormal => {
                let start = (-span).exp();
                let beta = (2.0 / k as f64 * (1.0 - start)).powi(-2);
                (linspace(start, 1.0, k), vec![beta; k], 5.0 / span, 1.0)
            }
        };

        debug!(
            family = %family,
            functions = k,
            min_distance,
            max_distance,
            trainable,
            "Initialized radial basis."
        );

        Ok(Self {
            family,
            min_distance,
            max_distance,
            centers: BasisParameter::new(centers, trainable, device)?,
            scales: BasisParameter::new(scales, trainable, device)?,
            alpha,
            prefactor,
        })
    }

    pub fn family(&self) -> RadialBasisFamily {
        self.family
    }

    pub fn number_of_functions(&self) -> usize {
        self.centers.tensor().elem_count()
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn centers(&self) -> &Tensor {
        self.centers.tensor()
    }

    pub fn scales(&self) -> &Tensor {
        self.scales.tensor()
    }

    pub fn trainable_variables(&self) -> Vec<Var> {
        [&self.centers, &self.scales]
            .into_iter()
            .filter_map(|p| p.var().cloned())
            .collect()
    }

    pub fn forward(&self, d_ij: &Tensor) -> candle_core::Result<Tensor> {
        let argument = match self.family {
            RadialBasisFamily::Gaussian | RadialBasisFamily::AniGaussian => d_ij.clone(),
            RadialBasisFamily::ExpNormal => d_ij
                .affine(-self.alpha, self.alpha * self.min_distance)?
                .exp()?,
        };
        argument
            .unsqueeze(D::Minus1)?
            .broadcast_sub(&self.centers.tensor().unsqueeze(0)?)?
            .sqr()?
            .broadcast_mul(&self.scales.tensor().unsqueeze(0)?)?
            .neg()?
            .exp()?
            .affine(self.prefactor, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn distances(values: &[f64]) -> Tensor {
        Tensor::from_vec(values.to_vec(), values.len(), &Device::Cpu).unwrap()
    }

    #[test]
    fn gaussian_centers_span_the_range_with_matching_width() {
        let basis = RadialBasis::new(
            RadialBasisFamily::Gaussian,
            5,
            0.0,
            0.4,
            false,
            &Device::Cpu,
        )
        .unwrap();
        let centers = basis.centers().to_vec1::<f64>().unwrap();
        assert_eq!(centers.first(), Some(&0.0));
        assert_eq!(centers.last(), Some(&0.4));

        let f = basis.forward(&distances(&[0.1])).unwrap();
        assert_eq!(f.dims(), &[1, 5]);
        let row = &f.to_vec2::<f64>().unwrap()[0];
        assert!((row[1] - 1.0).abs() < TOLERANCE);
        assert!((row[0] - (-0.5f64).exp()).abs() < 1e-9);
        assert!((row[2] - (-0.5f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn ani_shells_exclude_the_upper_bound() {
        let basis = RadialBasis::new(
            RadialBasisFamily::AniGaussian,
            16,
            0.08,
            0.53,
            false,
            &Device::Cpu,
        )
        .unwrap();
        let centers = basis.centers().to_vec1::<f64>().unwrap();
        assert_eq!(centers.len(), 16);
        assert!((centers[1] - centers[0] - 0.45 / 16.0).abs() < TOLERANCE);
        assert!(centers[15] < 0.53);

        let f = basis.forward(&distances(&[0.08])).unwrap().to_vec2::<f64>().unwrap();
        assert!((f[0][0] - 0.25).abs() < TOLERANCE);
    }

    #[test]
    fn exp_normal_peaks_at_the_last_center_for_the_minimum_distance() {
        let basis = RadialBasis::new(
            RadialBasisFamily::ExpNormal,
            8,
            0.0,
            0.5,
            false,
            &Device::Cpu,
        )
        .unwrap();
        let f = basis.forward(&distances(&[0.0, 0.3])).unwrap().to_vec2::<f64>().unwrap();
        assert!((f[0][7] - 1.0).abs() < TOLERANCE);
        assert!(f[1].iter().all(|v| v.is_finite() && *v > 0.0 && *v <= 1.0));
    }

    #[test]
    fn degenerate_configurations_are_rejected() {
        let device = Device::Cpu;
        assert!(matches!(
            RadialBasis::new(RadialBasisFamily::Gaussian, 1, 0.0, 0.5, false, &device),
            Err(BasisError::TooFewFunctions { minimum: 2, .. })
        ));
        assert!(matches!(
            RadialBasis::new(RadialBasisFamily::ExpNormal, 0, 0.0, 0.5, false, &device),
            Err(BasisError::TooFewFunctions { .. })
        ));
        assert!(matches!(
            RadialBasis::new(RadialBasisFamily::AniGaussian, 4, 0.5, 0.5, false, &device),
            Err(BasisError::InvalidRange { .. })
        ));
        assert!(matches!(
            RadialBasis::new(RadialBasisFamily::Gaussian, 4, 0.0, f64::NAN, false, &device),
            Err(BasisError::InvalidRange { .. })
        ));
    }

    #[test]
    fn trainable_basis_exposes_centers_and_scales() {
        let device = Device::Cpu;
        let fixed =
            RadialBasis::new(RadialBasisFamily::Gaussian, 4, 0.0, 0.5, false, &device).unwrap();
        let trainable =
            RadialBasis::new(RadialBasisFamily::Gaussian, 4, 0.0, 0.5, true, &device).unwrap();

        assert!(fixed.trainable_variables().is_empty());
        assert_eq!(trainable.trainable_variables().len(), 2);

        let d = distances(&[0.1, 0.2]);
        let grads = trainable
            .forward(&d)
            .unwrap()
            .sum_all()
            .unwrap()
            .backward()
            .unwrap();
        for var in trainable.trainable_variables() {
            assert!(grads.get(var.as_tensor()).is_some());
        }
    }

    #[test]
    fn family_names_parse_back() {
        for family in [
            RadialBasisFamily::Gaussian,
            RadialBasisFamily::AniGaussian,
            RadialBasisFamily::ExpNormal,
        ] {
            assert_eq!(family.name().parse::<RadialBasisFamily>(), Ok(family));
        }
        assert!("bessel".parse::<RadialBasisFamily>().is_err());
    }
}
