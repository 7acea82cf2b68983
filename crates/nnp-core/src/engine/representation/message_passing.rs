use super::Representation;
use crate::core::features::cutoff::CosineCutoff;
use crate::core::features::radial::RadialBasis;
use crate::core::models::batch::AtomSystemBatch;
use crate::core::pairs::enumerate::{PairList, PairMode};
use crate::core::pairs::geometry::pair_geometry;
use crate::engine::config::{Architecture, ConfigError, PotentialConfig};
use crate::engine::context::ForwardContext;
use crate::engine::error::PotentialError;
use crate::engine::interaction::{
    AtomRepresentation, AttentionInteraction, InteractionBlock, PaiNNInteraction, PairFeatures,
    SchNetInteraction,
};
use candle_core::{DType, Device, Module, Tensor, Var};
use candle_nn::{Embedding, VarBuilder, embedding};
use tracing::{debug, trace};

/// Embedding, radial featurization and a stack of interaction blocks sharing one pair list.
#[derive(Debug)]
pub struct MessagePassingRepresentation {
    embedding: Embedding,
    max_atomic_number: u8,
    feature_width: usize,
    basis: RadialBasis,
    envelope: CosineCutoff,
    blocks: Vec<Box<dyn InteractionBlock>>,
    pair_mode: PairMode,
    carries_vector_channel: bool,
}

impl MessagePassingRepresentation {
    /// Assembles the stack after checking every block against the embedding width, the basis
    /// width and the configured pair mode.
    pub fn new(
        embedding: Embedding,
        max_atomic_number: u8,
        basis: RadialBasis,
        envelope: CosineCutoff,
        blocks: Vec<Box<dyn InteractionBlock>>,
        pair_mode: PairMode,
    ) -> Result<Self, PotentialError> {
        let (rows, feature_width) = embedding.embeddings().dims2()?;
        if rows != usize::from(max_atomic_number) + 1 {
            return Err(PotentialError::ShapeMismatch {
                context: "embedding table rows".to_string(),
                expected: usize::from(max_atomic_number) + 1,
                found: rows,
            });
        }

        let radial_width = basis.number_of_functions();
        for (k, block) in blocks.iter().enumerate() {
            if block.feature_width() != feature_width {
                return Err(PotentialError::ShapeMismatch {
                    context: format!("feature width of interaction block {k} ({})", block.name()),
                    expected: feature_width,
                    found: block.feature_width(),
                });
            }
            if block.radial_width() != radial_width {
                return Err(PotentialError::ShapeMismatch {
                    context: format!("radial width of interaction block {k} ({})", block.name()),
                    expected: radial_width,
                    found: block.radial_width(),
                });
            }
            if block.expected_pair_mode() != pair_mode {
                return Err(PotentialError::PairModeMismatch {
                    component: block.name(),
                    expected: block.expected_pair_mode(),
                    configured: pair_mode,
                });
            }
        }

        let carries_vector_channel = blocks.iter().any(|b| b.carries_vector_channel());
        Ok(Self {
            embedding,
            max_atomic_number,
            feature_width,
            basis,
            envelope,
            blocks,
            pair_mode,
            carries_vector_channel,
        })
    }

    /// Builds the embedding, basis and blocks of a message-passing architecture.
    pub fn from_config(
        config: &PotentialConfig,
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self, PotentialError> {
        let cutoff = config.cutoff_radius.require_nanometer("cutoff_radius")?;
        let min_distance = config.min_distance.require_nanometer("min_distance")?;
        let f = config.number_of_atom_features;
        let k = config.number_of_radial_basis_functions;

        let embedding = embedding(
            usize::from(config.max_atomic_number) + 1,
            f,
            vb.pp("embedding"),
        )?;
        let basis = RadialBasis::new(
            config.radial_basis_family,
            k,
            min_distance,
            cutoff,
            config.trainable_basis,
            device,
        )?;
        let envelope = CosineCutoff::new(cutoff)?;

        let mut blocks: Vec<Box<dyn InteractionBlock>> =
            Vec::with_capacity(config.number_of_interaction_blocks);
        for layer in 0..config.number_of_interaction_blocks {
            let vb = vb.pp(format!("interaction{layer}"));
            let block: Box<dyn InteractionBlock> = match config.architecture {
                Architecture::SchNet => {
                    Box::new(SchNetInteraction::new(f, k, config.number_of_filters, vb)?)
                }
                Architecture::PaiNN => Box::new(PaiNNInteraction::new(f, k, vb)?),
                Architecture::Attention => Box::new(AttentionInteraction::new(
                    f,
                    k,
                    config.number_of_filters,
                    config.number_of_attention_heads,
                    vb,
                )?),
                Architecture::Ani => {
                    return Err(ConfigError::InvalidValue {
                        parameter: "architecture",
                        reason: "ani is not a message-passing architecture".to_string(),
                    }
                    .into());
                }
            };
            blocks.push(block);
        }

        debug!(
            architecture = %config.architecture,
            blocks = blocks.len(),
            features = f,
            radial = k,
            "Built message-passing representation."
        );
        Self::new(
            embedding,
            config.max_atomic_number,
            basis,
            envelope,
            blocks,
            config.pair_mode,
        )
    }

    pub fn number_of_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn pair_features(
        &self,
        positions: &Tensor,
        pairs: &PairList,
        number_of_atoms: usize,
        device: &Device,
    ) -> candle_core::Result<PairFeatures> {
        if pairs.is_empty() {
            return PairFeatures::empty(number_of_atoms, self.basis.number_of_functions(), device);
        }
        let (idx_i, idx_j) = pairs.index_tensors(device)?;
        let geometry = pair_geometry(positions, &idx_i, &idx_j)?;
        Ok(PairFeatures {
            radial: self.basis.forward(&geometry.d_ij)?,
            cutoff_weight: self.envelope.forward(&geometry.d_ij)?,
            idx_i,
            idx_j,
            number_of_atoms,
            d_ij: geometry.d_ij,
            direction: geometry.direction,
        })
    }
}

impl Representation for MessagePassingRepresentation {
    fn name(&self) -> &'static str {
        "message-passing"
    }

    fn expected_pair_mode(&self) -> PairMode {
        self.pair_mode
    }

    fn output_width(&self) -> usize {
        self.feature_width
    }

    fn cutoff(&self) -> f64 {
        self.envelope.cutoff()
    }

    fn forward(
        &self,
        batch: &AtomSystemBatch,
        positions: &Tensor,
        pairs: &PairList,
        ctx: &ForwardContext,
    ) -> Result<AtomRepresentation, PotentialError> {
        pairs.require_mode(self.pair_mode)?;
        if let Some(&atomic_number) = batch
            .atomic_numbers()
            .iter()
            .find(|&&z| z > self.max_atomic_number)
        {
            return Err(PotentialError::UnsupportedElement { atomic_number });
        }

        let device = ctx.device();
        let n = batch.number_of_atoms();
        let scalar = self
            .embedding
            .forward(&batch.atomic_numbers_tensor(device)?)?;
        let vector = if self.carries_vector_channel {
            Some(Tensor::zeros((n, 3, self.feature_width), DType::F64, device)?)
        } else {
            None
        };
        let features = self.pair_features(positions, pairs, n, device)?;

        let mut representation = AtomRepresentation { scalar, vector };
        for (layer, block) in self.blocks.iter().enumerate() {
            let update = block.forward(&representation, &features)?;
            representation = representation.apply(update)?;
            trace!(layer, block = block.name(), "Applied interaction block.");
        }
        Ok(representation)
    }

    fn trainable_variables(&self) -> Vec<Var> {
        self.basis.trainable_variables()
    }
}
