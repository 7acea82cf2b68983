//! # Representations
//!
//! A representation turns a batch, its (possibly differentiable) positions and a pair list into
//! per-atom features. The potential treats every architecture through the [`Representation`]
//! trait and only ever sees the resulting [`AtomRepresentation`].
//!
//! - [`MessagePassingRepresentation`] embeds atomic numbers and drives a stack of
//!   [`InteractionBlock`](crate::engine::interaction::InteractionBlock)s.
//! - [`AniRepresentation`] builds species-resolved radial and angular environment vectors.

use super::context::ForwardContext;
use super::error::PotentialError;
use super::interaction::AtomRepresentation;
use crate::core::models::batch::AtomSystemBatch;
use crate::core::pairs::enumerate::{PairList, PairMode};
use candle_core::{Tensor, Var};
use std::fmt;

pub mod ani;
pub mod message_passing;

pub use ani::AniRepresentation;
pub use message_passing::MessagePassingRepresentation;

pub trait Representation: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn expected_pair_mode(&self) -> PairMode;

    /// Width of the scalar representation handed to the readout.
    fn output_width(&self) -> usize;

    /// Largest distance, in nanometers, at which a pair still contributes.
    fn cutoff(&self) -> f64;

    fn forward(
        &self,
        batch: &AtomSystemBatch,
        positions: &Tensor,
        pairs: &PairList,
        ctx: &ForwardContext,
    ) -> Result<AtomRepresentation, PotentialError>;

    /// Parameters created outside the potential's variable map, such as a trainable radial basis.
    fn trainable_variables(&self) -> Vec<Var> {
        Vec::new()
    }
}
