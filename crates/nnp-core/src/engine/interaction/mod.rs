//! # Interaction Blocks
//!
//! One layer of message passing: compute a message per pair from the sender's representation and
//! the pair features, aggregate messages at the receiver, and return an update that the driver adds
//! to the old representation.
//!
//! ## Contract
//!
//! - Blocks never overwrite a representation. They return a [`RepresentationUpdate`] and
//!   [`AtomRepresentation::apply`] adds it, so every layer is a residual layer.
//! - Aggregation happens at `idx_i` only. Every shipped block therefore expects an
//!   [`PairMode::All`] pair list, which carries both directions of each pair.
//! - An atom without incoming pairs receives a zero message-passing update.
//! - The vector channel (`[N, 3, F]`) is only ever updated by directions or existing vectors
//!   weighted by invariant scalars.

use crate::core::pairs::enumerate::PairMode;
use candle_core::{DType, Device, Tensor};
use std::fmt;

pub mod attention;
pub mod painn;
pub mod schnet;

pub use attention::AttentionInteraction;
pub use painn::PaiNNInteraction;
pub use schnet::SchNetInteraction;

/// Per-atom state threaded through the interaction stack.
#[derive(Debug, Clone)]
pub struct AtomRepresentation {
    /// Invariant features, `[N, F]`.
    pub scalar: Tensor,
    /// Equivariant features, `[N, 3, F]`, present only for architectures that carry them.
    pub vector: Option<Tensor>,
}

impl AtomRepresentation {
    pub fn scalar_only(scalar: Tensor) -> Self {
        Self {
            scalar,
            vector: None,
        }
    }

    pub fn number_of_atoms(&self) -> candle_core::Result<usize> {
        Ok(self.scalar.dims2()?.0)
    }

    pub fn feature_width(&self) -> candle_core::Result<usize> {
        Ok(self.scalar.dims2()?.1)
    }

    /// `new = old + update`, channel by channel.
    pub fn apply(&self, update: RepresentationUpdate) -> candle_core::Result<Self> {
        let scalar = match update.scalar {
            Some(delta) => self.scalar.add(&delta)?,
            None => self.scalar.clone(),
        };
        let vector = match (&self.vector, update.vector) {
            (Some(old), Some(delta)) => Some(old.add(&delta)?),
            (None, Some(delta)) => Some(delta),
            (old, None) => old.clone(),
        };
        Ok(Self { scalar, vector })
    }
}

/// The additive change a block proposes; `None` means no change to that channel.
#[derive(Debug, Clone, Default)]
pub struct RepresentationUpdate {
    pub scalar: Option<Tensor>,
    pub vector: Option<Tensor>,
}

impl RepresentationUpdate {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Pair-level inputs shared by every block of one forward pass.
#[derive(Debug, Clone)]
pub struct PairFeatures {
    /// Receivers, `[P]` (`u32`).
    pub idx_i: Tensor,
    /// Senders, `[P]` (`u32`).
    pub idx_j: Tensor,
    pub number_of_atoms: usize,
    /// `[P]`
    pub d_ij: Tensor,
    /// `[P, 3]`
    pub direction: Tensor,
    /// Radial basis expansion, `[P, K]`.
    pub radial: Tensor,
    /// Cutoff envelope, `[P]`.
    pub cutoff_weight: Tensor,
}

impl PairFeatures {
    /// Features for a batch without any pair.
    pub fn empty(
        number_of_atoms: usize,
        radial_width: usize,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let index = Tensor::zeros(0, DType::U32, device)?;
        Ok(Self {
            idx_i: index.clone(),
            idx_j: index,
            number_of_atoms,
            d_ij: Tensor::zeros(0, DType::F64, device)?,
            direction: Tensor::zeros((0, 3), DType::F64, device)?,
            radial: Tensor::zeros((0, radial_width), DType::F64, device)?,
            cutoff_weight: Tensor::zeros(0, DType::F64, device)?,
        })
    }

    pub fn number_of_pairs(&self) -> usize {
        self.idx_i.elem_count()
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_pairs() == 0
    }

    pub fn radial_width(&self) -> candle_core::Result<usize> {
        Ok(self.radial.dims2()?.1)
    }

    /// `radial · f_cut`, `[P, K]`.
    pub fn filtered_radial(&self) -> candle_core::Result<Tensor> {
        self.radial
            .broadcast_mul(&self.cutoff_weight.unsqueeze(1)?)
    }
}

pub trait InteractionBlock: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// The pair convention this block's aggregation assumes.
    fn expected_pair_mode(&self) -> PairMode {
        PairMode::All
    }

    /// Width `F` of the scalar channel the block reads and updates.
    fn feature_width(&self) -> usize;

    /// Width `K` of the radial features the block consumes.
    fn radial_width(&self) -> usize;

    fn carries_vector_channel(&self) -> bool {
        false
    }

    fn forward(
        &self,
        representation: &AtomRepresentation,
        pairs: &PairFeatures,
    ) -> candle_core::Result<RepresentationUpdate>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::features::cutoff::CosineCutoff;
    use crate::core::features::radial::{RadialBasis, RadialBasisFamily};
    use crate::core::models::batch::AtomSystemBatch;
    use crate::core::pairs::enumerate::pair_list;
    use crate::core::pairs::geometry::pair_geometry;
    use candle_core::Var;
    use candle_nn::{VarBuilder, VarMap};
    use nalgebra::{Point3, Rotation3, Vector3};

    pub const CUTOFF: f64 = 0.5;
    pub const RADIAL_WIDTH: usize = 6;
    pub const FEATURES: usize = 4;

    pub fn var_builder(varmap: &VarMap) -> VarBuilder<'_> {
        VarBuilder::from_varmap(varmap, DType::F64, &Device::Cpu)
    }

    /// Two molecules: a bent triatomic and a diatomic.
    pub fn batch() -> AtomSystemBatch {
        AtomSystemBatch::neutral(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.11, 0.02, 0.0),
                Point3::new(-0.03, 0.1, 0.04),
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(1.12, 1.01, 0.98),
            ],
            vec![8, 1, 1, 6, 8],
            vec![0, 0, 0, 1, 1],
        )
        .unwrap()
    }

    pub fn rotate(batch: &AtomSystemBatch, rotation: &Rotation3<f64>) -> AtomSystemBatch {
        let shift = Vector3::new(0.3, -0.7, 2.0);
        let positions = batch
            .positions()
            .iter()
            .map(|p| rotation * p + shift)
            .collect();
        batch.with_positions(positions).unwrap()
    }

    pub fn rotation() -> Rotation3<f64> {
        Rotation3::from_euler_angles(0.3, -1.1, 2.4)
    }

    pub fn features(batch: &AtomSystemBatch, positions: &Tensor) -> PairFeatures {
        let device = Device::Cpu;
        let pairs = pair_list(batch, PairMode::All);
        let (idx_i, idx_j) = pairs.index_tensors(&device).unwrap();
        let geometry = pair_geometry(positions, &idx_i, &idx_j).unwrap();
        let basis = RadialBasis::new(
            RadialBasisFamily::Gaussian,
            RADIAL_WIDTH,
            0.0,
            CUTOFF,
            false,
            &device,
        )
        .unwrap();
        let envelope = CosineCutoff::new(CUTOFF).unwrap();
        PairFeatures {
            idx_i,
            idx_j,
            number_of_atoms: batch.number_of_atoms(),
            radial: basis.forward(&geometry.d_ij).unwrap(),
            cutoff_weight: envelope.forward(&geometry.d_ij).unwrap(),
            d_ij: geometry.d_ij,
            direction: geometry.direction,
        }
    }

    pub fn positions(batch: &AtomSystemBatch) -> Var {
        Var::from_tensor(&batch.positions_tensor(&Device::Cpu).unwrap()).unwrap()
    }

    /// Deterministic non-trivial scalar features, `[N, F]`.
    pub fn scalar(number_of_atoms: usize) -> Tensor {
        let values = (0..number_of_atoms * FEATURES)
            .map(|k| ((k * 7 % 11) as f64 - 5.0) * 0.1)
            .collect();
        Tensor::from_vec(values, (number_of_atoms, FEATURES), &Device::Cpu).unwrap()
    }

    pub fn rows(tensor: &Tensor) -> Vec<Vec<f64>> {
        tensor.to_vec2::<f64>().unwrap()
    }

    pub fn assert_close(a: &[Vec<f64>], b: &[Vec<f64>], tolerance: f64) {
        assert_eq!(a.len(), b.len());
        for (row_a, row_b) in a.iter().zip(b) {
            for (x, y) in row_a.iter().zip(row_b) {
                assert!((x - y).abs() < tolerance, "{x} vs {y}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_adds_updates_and_keeps_untouched_channels() {
        let device = Device::Cpu;
        let scalar = Tensor::from_vec(vec![1.0, 2.0], (1, 2), &device).unwrap();
        let vector = Tensor::ones((1, 3, 2), DType::F64, &device).unwrap();
        let representation = AtomRepresentation {
            scalar,
            vector: Some(vector),
        };

        let update = RepresentationUpdate {
            scalar: Some(Tensor::from_vec(vec![0.5, -2.0], (1, 2), &device).unwrap()),
            vector: None,
        };
        let next = representation.apply(update).unwrap();
        assert_eq!(next.scalar.to_vec2::<f64>().unwrap(), vec![vec![1.5, 0.0]]);
        assert_eq!(
            next.vector.unwrap().sum_all().unwrap().to_scalar::<f64>().unwrap(),
            6.0
        );

        let unchanged = representation.apply(RepresentationUpdate::zero()).unwrap();
        assert_eq!(
            unchanged.scalar.to_vec2::<f64>().unwrap(),
            vec![vec![1.0, 2.0]]
        );
    }

    #[test]
    fn empty_pair_features_have_consistent_shapes() {
        let features = PairFeatures::empty(3, 5, &Device::Cpu).unwrap();
        assert!(features.is_empty());
        assert_eq!(features.number_of_atoms, 3);
        assert_eq!(features.radial.dims(), &[0, 5]);
        assert_eq!(features.direction.dims(), &[0, 3]);
        assert_eq!(features.radial_width().unwrap(), 5);
    }
}
