use super::{AtomRepresentation, InteractionBlock, PairFeatures, RepresentationUpdate};
use crate::core::ops::scatter::scatter_add;
use candle_core::{DType, Module, Tensor};
use candle_nn::{Linear, VarBuilder, linear, linear_no_bias};

/// Added under the square root of vector norms so their gradient stays finite at zero.
const VECTOR_NORM_EPSILON: f64 = 1e-8;

/// Polarizable atom interaction: a message step followed by a per-atom mixing step.
///
/// Message step, for each pair `(i, j)` with filter `W(d_ij) · f_cut(d_ij)`:
///
/// - `Δq_i += φ(q_j) ∘ W_q`
/// - `Δμ_i += (φ(q_j) ∘ W_r) r̂_ij + (φ(q_j) ∘ W_μ) μ_j`
///
/// Mixing step, per atom, with `V = U μ` and `W = U' μ`:
///
/// - `Δq += a_q + a_qμ ⟨V, W⟩`
/// - `Δμ += a_μ W`
///
/// where `a = ψ(q, ‖V‖)`, gated per atom by `min(1, Σ_j f_cut(d_ij))`. The gate vanishes for atoms
/// without incoming pairs and goes to zero continuously as the last pair reaches the cutoff. Vector
/// updates only scale directions or existing vectors by invariants.
#[derive(Debug, Clone)]
pub struct PaiNNInteraction {
    feature_width: usize,
    radial_width: usize,
    filter_net: Linear,
    interatomic_in: Linear,
    interatomic_out: Linear,
    channel_mix: Linear,
    intra_in: Linear,
    intra_out: Linear,
}

impl PaiNNInteraction {
    pub fn new(feature_width: usize, radial_width: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let f = feature_width;
        Ok(Self {
            feature_width,
            radial_width,
            filter_net: linear(radial_width, 3 * f, vb.pp("filter_net"))?,
            interatomic_in: linear(f, f, vb.pp("interatomic_in"))?,
            interatomic_out: linear(f, 3 * f, vb.pp("interatomic_out"))?,
            channel_mix: linear_no_bias(f, 2 * f, vb.pp("channel_mix"))?,
            intra_in: linear(2 * f, f, vb.pp("intra_in"))?,
            intra_out: linear(f, 3 * f, vb.pp("intra_out"))?,
        })
    }

    fn chunk(&self, x: &Tensor, dim: usize, k: usize) -> candle_core::Result<Tensor> {
        x.narrow(dim, k * self.feature_width, self.feature_width)?
            .contiguous()
    }

    /// `(Δq, Δμ)` aggregated at the receivers.
    fn messages(
        &self,
        q: &Tensor,
        mu: &Tensor,
        pairs: &PairFeatures,
    ) -> candle_core::Result<(Tensor, Tensor)> {
        let filter = self
            .filter_net
            .forward(&pairs.radial)?
            .broadcast_mul(&pairs.cutoff_weight.unsqueeze(1)?)?;
        let x = self
            .interatomic_out
            .forward(&self.interatomic_in.forward(q)?.silu()?)?
            .index_select(&pairs.idx_j, 0)?
            .mul(&filter)?;

        let dq = self.chunk(&x, 1, 0)?;
        let dmu_r = self.chunk(&x, 1, 1)?;
        let dmu_mu = self.chunk(&x, 1, 2)?;

        let along_bond = dmu_r
            .unsqueeze(1)?
            .broadcast_mul(&pairs.direction.unsqueeze(2)?)?;
        let along_sender = dmu_mu
            .unsqueeze(1)?
            .broadcast_mul(&mu.index_select(&pairs.idx_j, 0)?)?;
        let dmu = along_bond.add(&along_sender)?;

        Ok((
            scatter_add(&dq, &pairs.idx_i, pairs.number_of_atoms)?,
            scatter_add(&dmu, &pairs.idx_i, pairs.number_of_atoms)?,
        ))
    }

    /// `(Δq, Δμ)` of the per-atom mixing step.
    fn mixing(&self, q: &Tensor, mu: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let mixed = self.channel_mix.forward(mu)?;
        let v = self.chunk(&mixed, 2, 0)?;
        let w = self.chunk(&mixed, 2, 1)?;

        let v_norm = v.sqr()?.sum(1)?.affine(1.0, VECTOR_NORM_EPSILON)?.sqrt()?;
        let context = Tensor::cat(&[q, &v_norm], 1)?;
        let x = self
            .intra_out
            .forward(&self.intra_in.forward(&context)?.silu()?)?;

        let a_q = self.chunk(&x, 1, 0)?;
        let a_mu = self.chunk(&x, 1, 1)?;
        let a_qmu = self.chunk(&x, 1, 2)?;

        let dq = a_q.add(&a_qmu.mul(&v.mul(&w)?.sum(1)?)?)?;
        let dmu = a_mu.unsqueeze(1)?.broadcast_mul(&w)?;
        Ok((dq, dmu))
    }
}

impl InteractionBlock for PaiNNInteraction {
    fn name(&self) -> &'static str {
        "painn"
    }

    fn feature_width(&self) -> usize {
        self.feature_width
    }

    fn radial_width(&self) -> usize {
        self.radial_width
    }

    fn carries_vector_channel(&self) -> bool {
        true
    }

    fn forward(
        &self,
        representation: &AtomRepresentation,
        pairs: &PairFeatures,
    ) -> candle_core::Result<RepresentationUpdate> {
        let q = &representation.scalar;
        let (n, f) = q.dims2()?;
        let mu = match &representation.vector {
            Some(mu) => mu.clone(),
            None => Tensor::zeros((n, 3, f), DType::F64, q.device())?,
        };

        if pairs.is_empty() {
            return Ok(RepresentationUpdate {
                scalar: Some(q.zeros_like()?),
                vector: Some(mu.zeros_like()?),
            });
        }

        let (message_dq, message_dmu) = self.messages(q, &mu, pairs)?;
        let (mix_dq, mix_dmu) = self.mixing(&q.add(&message_dq)?, &mu.add(&message_dmu)?)?;

        let gate = scatter_add(&pairs.cutoff_weight, &pairs.idx_i, n)?.clamp(0.0, 1.0)?;
        let dq = message_dq.add(&mix_dq.broadcast_mul(&gate.unsqueeze(1)?)?)?;
        let dmu = message_dmu.add(&mix_dmu.broadcast_mul(&gate.reshape((n, 1, 1))?)?)?;
        Ok(RepresentationUpdate {
            scalar: Some(dq),
            vector: Some(dmu),
        })
    }
}
