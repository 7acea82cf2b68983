use super::config::{Architecture, PotentialConfig};
use super::context::ForwardContext;
use super::error::PotentialError;
use super::postprocessing::EnergyScaling;
use super::readout::EnergyReadout;
use super::representation::{AniRepresentation, MessagePassingRepresentation, Representation};
use crate::core::models::batch::AtomSystemBatch;
use crate::core::models::statistics::DatasetStatistics;
use crate::core::ops::scatter::reduce_to_molecules;
use crate::core::pairs::enumerate::{PairList, neighbor_list_with_cutoff};
use candle_core::{DType, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use nalgebra::Vector3;
use std::fmt;
use tracing::{debug, info, instrument};

/// Everything a forward pass produces, from representations to the final per-molecule energies.
#[derive(Debug, Clone)]
pub struct PotentialOutput {
    /// Readout energy of every atom before scaling, `[N]`.
    pub per_atom_scalar: Tensor,
    /// `[N, F]`
    pub scalar_representation: Tensor,
    /// `[N, 3, F]` for architectures with a vector channel.
    pub vector_representation: Option<Tensor>,
    /// `Σ per_atom_scalar` per molecule, `[M]`.
    pub raw_energy: Tensor,
    /// `raw_energy · stddev + mean`, `[M]`.
    pub rescaled_energy: Tensor,
    /// `[M]`
    pub molecular_self_energy: Tensor,
    /// `rescaled_energy + molecular_self_energy`, `[M]`.
    pub per_molecule_energy: Tensor,
    pub pair_list: PairList,
}

#[derive(Debug, Clone)]
pub struct EnergyAndForces {
    /// `[M]`
    pub energies: Tensor,
    /// `-∂(Σ E)/∂positions`, `[N, 3]`.
    pub forces: Tensor,
    pub pair_list: PairList,
}

impl EnergyAndForces {
    pub fn energy_values(&self) -> Result<Vec<f64>, PotentialError> {
        Ok(self.energies.to_vec1::<f64>()?)
    }

    pub fn force_vectors(&self) -> Result<Vec<Vector3<f64>>, PotentialError> {
        Ok(self
            .forces
            .to_vec2::<f64>()?
            .into_iter()
            .map(|row| Vector3::new(row[0], row[1], row[2]))
            .collect())
    }
}

/// A configured neural network potential: representation, readout and energy scaling.
///
/// Trainable weights live in a private [`VarMap`]; every call receives its execution context
/// explicitly and allocates fresh accumulators, so calls never influence one another.
pub struct Potential {
    config: PotentialConfig,
    varmap: VarMap,
    representation: Box<dyn Representation>,
    readout: EnergyReadout,
    scaling: EnergyScaling,
}

impl fmt::Debug for Potential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Potential")
            .field("config", &self.config)
            .field("representation", &self.representation)
            .field("readout", &self.readout)
            .field("scaling", &self.scaling)
            .finish_non_exhaustive()
    }
}

impl Potential {
    pub fn from_config(
        config: PotentialConfig,
        statistics: &DatasetStatistics,
        ctx: &ForwardContext,
    ) -> Result<Self, PotentialError> {
        statistics.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, ctx.dtype(), ctx.device());

        let representation: Box<dyn Representation> = match config.architecture {
            Architecture::Ani => Box::new(AniRepresentation::from_config(&config, ctx.device())?),
            _ => Box::new(MessagePassingRepresentation::from_config(
                &config,
                vb.pp("representation"),
                ctx.device(),
            )?),
        };
        if representation.expected_pair_mode() != config.pair_mode {
            return Err(PotentialError::PairModeMismatch {
                component: representation.name(),
                expected: representation.expected_pair_mode(),
                configured: config.pair_mode,
            });
        }

        let readout = EnergyReadout::new(
            representation.output_width(),
            config.number_of_atom_features,
            vb.pp("readout"),
        )?;

        info!(
            architecture = %config.architecture,
            pair_mode = %config.pair_mode,
            cutoff = %config.cutoff_radius,
            representation_width = representation.output_width(),
            "Initialized potential."
        );
        Ok(Self {
            scaling: EnergyScaling::new(statistics),
            config,
            varmap,
            representation,
            readout,
        })
    }

    pub fn config(&self) -> &PotentialConfig {
        &self.config
    }

    pub fn architecture(&self) -> Architecture {
        self.config.architecture
    }

    /// All trainable parameters: network weights plus any trainable basis parameters.
    pub fn trainable_variables(&self) -> Vec<Var> {
        let mut variables = self.varmap.all_vars();
        variables.extend(self.representation.trainable_variables());
        variables
    }

    pub fn number_of_parameters(&self) -> usize {
        self.trainable_variables()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    #[instrument(skip_all, name = "potential_forward", fields(atoms = batch.number_of_atoms()))]
    pub fn forward(
        &self,
        batch: &AtomSystemBatch,
        ctx: &ForwardContext,
    ) -> Result<PotentialOutput, PotentialError> {
        let positions = batch.positions_tensor(ctx.device())?;
        self.forward_with_positions(batch, &positions, ctx)
    }

    /// Energies and forces, the latter as the negative gradient of the summed energy.
    #[instrument(skip_all, name = "potential_forces", fields(atoms = batch.number_of_atoms()))]
    pub fn energy_and_forces(
        &self,
        batch: &AtomSystemBatch,
        ctx: &ForwardContext,
    ) -> Result<EnergyAndForces, PotentialError> {
        let positions = Var::from_tensor(&batch.positions_tensor(ctx.device())?)?;
        let output = self.forward_with_positions(batch, positions.as_tensor(), ctx)?;

        let gradients = output.per_molecule_energy.sum_all()?.backward()?;
        let forces = match gradients.get(positions.as_tensor()) {
            Some(gradient) => gradient.neg()?,
            // no pair: the energy does not depend on positions
            None => Tensor::zeros((batch.number_of_atoms(), 3), DType::F64, ctx.device())?,
        };
        Ok(EnergyAndForces {
            energies: output.per_molecule_energy,
            forces,
            pair_list: output.pair_list,
        })
    }

    fn forward_with_positions(
        &self,
        batch: &AtomSystemBatch,
        positions: &Tensor,
        ctx: &ForwardContext,
    ) -> Result<PotentialOutput, PotentialError> {
        let device = ctx.device();
        let pair_list =
            neighbor_list_with_cutoff(batch, self.config.pair_mode, self.config.cutoff_radius)?;

        let representation = self
            .representation
            .forward(batch, positions, &pair_list, ctx)?;
        let per_atom_scalar = self.readout.forward(&representation.scalar)?;

        let raw_energy = reduce_to_molecules(
            &per_atom_scalar,
            &batch.subsystem_indices_tensor(device)?,
            batch.number_of_molecules(),
        )?;
        let rescaled_energy = self.scaling.rescale(&raw_energy)?;
        let molecular_self_energy = self.scaling.molecular_self_energies(batch, device)?;
        let per_molecule_energy = rescaled_energy.add(&molecular_self_energy)?;
        debug!(
            molecules = batch.number_of_molecules(),
            pairs = pair_list.len(),
            "Completed forward pass."
        );

        Ok(PotentialOutput {
            per_atom_scalar,
            scalar_representation: representation.scalar,
            vector_representation: representation.vector,
            raw_energy,
            rescaled_energy,
            molecular_self_energy,
            per_molecule_energy,
            pair_list,
        })
    }
}
