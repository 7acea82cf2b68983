use super::{AtomRepresentation, InteractionBlock, PairFeatures, RepresentationUpdate};
use crate::core::ops::activation::shifted_softplus;
use crate::core::ops::scatter::scatter_add;
use candle_core::Module;
use candle_nn::{Linear, VarBuilder, linear, linear_no_bias};

/// Continuous-filter convolution.
///
/// The filter is a two-layer network of the radial features, gated by the cutoff envelope. The
/// message from `j` to `i` is the sender's projected features times the filter; the update network
/// is bias-free, so a zero aggregate yields a zero update.
#[derive(Debug, Clone)]
pub struct SchNetInteraction {
    feature_width: usize,
    radial_width: usize,
    filter_in: Linear,
    filter_out: Linear,
    in2f: Linear,
    f2out: Linear,
    update: Linear,
}

impl SchNetInteraction {
    pub fn new(
        feature_width: usize,
        radial_width: usize,
        number_of_filters: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        Ok(Self {
            feature_width,
            radial_width,
            filter_in: linear(radial_width, number_of_filters, vb.pp("filter_in"))?,
            filter_out: linear(number_of_filters, number_of_filters, vb.pp("filter_out"))?,
            in2f: linear_no_bias(feature_width, number_of_filters, vb.pp("in2f"))?,
            f2out: linear_no_bias(number_of_filters, feature_width, vb.pp("f2out"))?,
            update: linear_no_bias(feature_width, feature_width, vb.pp("update"))?,
        })
    }
}

impl InteractionBlock for SchNetInteraction {
    fn name(&self) -> &'static str {
        "schnet"
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

        let filter = self
            .filter_out
            .forward(&shifted_softplus(&self.filter_in.forward(&pairs.radial)?)?)?
            .broadcast_mul(&pairs.cutoff_weight.unsqueeze(1)?)?;

        let messages = self
            .in2f
            .forward(&representation.scalar)?
            .index_select(&pairs.idx_j, 0)?
            .mul(&filter)?;
        let aggregated = scatter_add(&messages, &pairs.idx_i, pairs.number_of_atoms)?;

        let update = self
            .update
            .forward(&shifted_softplus(&self.f2out.forward(&aggregated)?)?)?;
        Ok(RepresentationUpdate {
            scalar: Some(update),
            vector: None,
        })
    }
}
