use super::{AtomRepresentation, InteractionBlock, PairFeatures, RepresentationUpdate};
use crate::core::ops::scatter::{scatter_add, scatter_softmax, scatter_weighted_mean};
use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder, linear, linear_no_bias};

/// Damps receivers whose total cutoff weight vanishes.
const ATTENTION_EPSILON: f64 = 1e-5;

/// Invariant multi-head attention over cutoff-gated edges.
///
/// Each pair gets an edge feature from both endpoints, the filtered radial features and the
/// distance. Per-head logits are normalized with a softmax over the pairs sharing a receiver, each
/// exponential weighted by the pair's cutoff envelope, and damped by `W / (W + epsilon)` where `W`
/// is the receiver's total envelope. The receiver aggregates the head-weighted edges (the semantic
/// part) and the norm of the envelope-weighted mean direction (the spatial part); only norms of
/// directions reach the scalar channel. Every pair's contribution vanishes continuously as it
/// reaches the cutoff.
#[derive(Debug, Clone)]
pub struct AttentionInteraction {
    feature_width: usize,
    radial_width: usize,
    number_of_heads: usize,
    node_filter: Linear,
    radial_filter: Linear,
    edge_out: Linear,
    attention: Linear,
    spatial_coefficients: Linear,
    spatial_in: Linear,
    spatial_out: Linear,
    update_in: Linear,
    update_out: Linear,
}

impl AttentionInteraction {
    pub fn new(
        feature_width: usize,
        radial_width: usize,
        number_of_filters: usize,
        number_of_heads: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let f = feature_width;
        let e = number_of_filters;
        let semantic_width = e * number_of_heads;
        Ok(Self {
            feature_width,
            radial_width,
            number_of_heads,
            node_filter: linear(2 * f, e, vb.pp("node_filter"))?,
            radial_filter: linear(radial_width, e, vb.pp("radial_filter"))?,
            edge_out: linear(e + 1, e, vb.pp("edge_out"))?,
            attention: linear(e, number_of_heads, vb.pp("attention"))?,
            spatial_coefficients: linear_no_bias(semantic_width, f, vb.pp("spatial_coefficients"))?,
            spatial_in: linear_no_bias(f, f, vb.pp("spatial_in"))?,
            spatial_out: linear_no_bias(f, f, vb.pp("spatial_out"))?,
            update_in: linear_no_bias(semantic_width + f, f, vb.pp("update_in"))?,
            update_out: linear_no_bias(f, f, vb.pp("update_out"))?,
        })
    }

    /// Edge features `[P, E]`.
    fn edges(&self, h: &Tensor, pairs: &PairFeatures) -> candle_core::Result<Tensor> {
        let endpoints = Tensor::cat(
            &[
                h.index_select(&pairs.idx_j, 0)?,
                h.index_select(&pairs.idx_i, 0)?,
            ],
            1,
        )?;
        let filtered = self
            .radial_filter
            .forward(&pairs.filtered_radial()?)?
            .mul(&self.node_filter.forward(&endpoints)?)?;
        let with_distance = Tensor::cat(&[filtered, pairs.d_ij.unsqueeze(1)?], 1)?;
        self.edge_out.forward(&with_distance)?.silu()
    }

    /// Cutoff-gated attention weights `[P, H]`, summing to at most one per receiver.
    fn weights(&self, edges: &Tensor, pairs: &PairFeatures) -> candle_core::Result<Tensor> {
        let n = pairs.number_of_atoms;
        let normalized = scatter_softmax(
            &self.attention.forward(edges)?,
            &pairs.cutoff_weight,
            &pairs.idx_i,
            n,
        )?;
        let total = scatter_add(&pairs.cutoff_weight, &pairs.idx_i, n)?;
        let damping = total
            .div(&total.affine(1.0, ATTENTION_EPSILON)?)?
            .index_select(&pairs.idx_i, 0)?;
        normalized.broadcast_mul(&damping.unsqueeze(1)?)
    }
}

impl InteractionBlock for AttentionInteraction {
    fn name(&self) -> &'static str {
        "attention"
    }

    fn feature_width(&self) -> usize {
        self.feature_width
    }

    fn radial_width(&self) -> usize {
        self.radial_width
    }

    fn forward(
        &self,
        representation: &AtomRepresentation,
        pairs: &PairFeatures,
    ) -> candle_core::Result<RepresentationUpdate> {
        if pairs.is_empty() {
            return Ok(RepresentationUpdate::zero());
        }
        let n = pairs.number_of_atoms;
        let p = pairs.number_of_pairs();
        let h = &representation.scalar;

        let edges = self.edges(h, pairs)?;
        let weights = self.weights(&edges, pairs)?;
        let semantic = edges
            .unsqueeze(2)?
            .broadcast_mul(&weights.unsqueeze(1)?)?
            .reshape((p, edges.dims2()?.1 * self.number_of_heads))?;
        let h_semantic = scatter_add(&semantic, &pairs.idx_i, n)?;

        let coefficients = self.spatial_coefficients.forward(&semantic)?.tanh()?;
        let spatial = pairs
            .direction
            .unsqueeze(2)?
            .broadcast_mul(&coefficients.unsqueeze(1)?)?;
        let combined = scatter_weighted_mean(
            &spatial,
            &pairs.cutoff_weight,
            &pairs.idx_i,
            n,
            ATTENTION_EPSILON,
        )?
        .sqr()?
        .sum(1)?;
        let h_spatial = self
            .spatial_out
            .forward(&self.spatial_in.forward(&combined)?.silu()?)?;

        let update = self.update_out.forward(
            &self
                .update_in
                .forward(&Tensor::cat(&[h_semantic, h_spatial], 1)?)?
                .silu()?,
        )?;
        Ok(RepresentationUpdate {
            scalar: Some(update),
            vector: None,
        })
    }
}
