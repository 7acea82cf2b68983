use super::Representation;
use crate::core::features::angular::AngularSymmetryFunction;
use crate::core::features::cutoff::CosineCutoff;
use crate::core::features::radial::RadialBasis;
use crate::core::models::batch::AtomSystemBatch;
use crate::core::ops::scatter::scatter_add;
use crate::core::pairs::enumerate::{PairList, PairMode};
use crate::core::pairs::geometry::{PairGeometry, pair_geometry};
use crate::core::pairs::triples::{Triples, triples_by_center};
use crate::engine::config::PotentialConfig;
use crate::engine::context::ForwardContext;
use crate::engine::error::PotentialError;
use crate::engine::interaction::AtomRepresentation;
use candle_core::{DType, Device, Tensor, Var};
use tracing::{debug, trace};

/// Atomic environment vectors resolved by neighbor species.
///
/// The radial part has one block of `K` shells per species: every unique pair adds its radial
/// features to atom `i` in the block of `j`'s species, and to atom `j` in the block of `i`'s
/// species. The angular part has one block per unordered species pair and sums, for every triple
/// around a center, the angular symmetry functions into the block of the two neighbors' species.
/// Only pairs within the (shorter) angular cutoff form triples.
#[derive(Debug)]
pub struct AniRepresentation {
    species: Vec<u8>,
    species_index: Vec<Option<usize>>,
    radial: RadialBasis,
    radial_cutoff: CosineCutoff,
    angular: AngularSymmetryFunction,
}

impl AniRepresentation {
    pub fn new(
        species: &[u8],
        radial: RadialBasis,
        radial_cutoff: CosineCutoff,
        angular: AngularSymmetryFunction,
    ) -> Self {
        let mut species_index = vec![None; usize::from(u8::MAX) + 1];
        for (slot, &z) in species.iter().enumerate() {
            species_index[usize::from(z)] = Some(slot);
        }
        Self {
            species: species.to_vec(),
            species_index,
            radial,
            radial_cutoff,
            angular,
        }
    }

    pub fn from_config(config: &PotentialConfig, device: &Device) -> Result<Self, PotentialError> {
        if config.pair_mode != PairMode::Unique {
            return Err(PotentialError::PairModeMismatch {
                component: "ani",
                expected: PairMode::Unique,
                configured: config.pair_mode,
            });
        }
        let cutoff = config.cutoff_radius.require_nanometer("cutoff_radius")?;
        let min_distance = config.min_distance.require_nanometer("min_distance")?;
        let angular_cutoff = config
            .angular
            .cutoff_radius
            .require_nanometer("angular.cutoff_radius")?;

        let radial = RadialBasis::new(
            config.radial_basis_family,
            config.number_of_radial_basis_functions,
            min_distance,
            cutoff,
            config.trainable_basis,
            device,
        )?;
        let angular = AngularSymmetryFunction::new(
            min_distance,
            angular_cutoff,
            config.angular.number_of_shells,
            config.angular.number_of_sections,
        )?;
        let representation = Self::new(
            &config.species,
            radial,
            CosineCutoff::new(cutoff)?,
            angular,
        );
        debug!(
            species = representation.species.len(),
            radial_width = representation.radial_width(),
            angular_width = representation.angular_width(),
            "Built ANI representation."
        );
        Ok(representation)
    }

    pub fn species(&self) -> &[u8] {
        &self.species
    }

    pub fn radial_width(&self) -> usize {
        self.species.len() * self.radial.number_of_functions()
    }

    pub fn angular_width(&self) -> usize {
        self.number_of_species_pairs() * self.angular.feature_width()
    }

    fn number_of_species_pairs(&self) -> usize {
        let s = self.species.len();
        s * (s + 1) / 2
    }

    /// Position of the unordered species pair `{a, b}` in row-major upper-triangular order.
    fn species_pair_slot(&self, a: usize, b: usize) -> usize {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        a * (2 * self.species.len() + 1 - a) / 2 + (b - a)
    }

    fn species_of(&self, batch: &AtomSystemBatch) -> Result<Vec<usize>, PotentialError> {
        batch
            .atomic_numbers()
            .iter()
            .map(|&z| {
                self.species_index[usize::from(z)]
                    .ok_or(PotentialError::UnsupportedElement { atomic_number: z })
            })
            .collect()
    }

    fn radial_aev(
        &self,
        geometry: &PairGeometry,
        pairs: &PairList,
        species: &[usize],
        device: &Device,
    ) -> candle_core::Result<Tensor> {
        let n = species.len();
        let s = self.species.len();
        let features = self.radial.forward(&geometry.d_ij)?.broadcast_mul(
            &self
                .radial_cutoff
                .forward(&geometry.d_ij)?
                .unsqueeze(1)?,
        )?;

        let targets: Vec<u32> = pairs
            .iter()
            .map(|(i, j)| (i * s + species[j]) as u32)
            .chain(pairs.iter().map(|(i, j)| (j * s + species[i]) as u32))
            .collect();
        let targets = Tensor::from_vec(targets, 2 * pairs.len(), device)?;
        scatter_add(&Tensor::cat(&[&features, &features], 0)?, &targets, n * s)?
            .reshape((n, self.radial_width()))
    }

    fn angular_aev(
        &self,
        geometry: &PairGeometry,
        triples: &Triples,
        species: &[usize],
        device: &Device,
    ) -> candle_core::Result<Tensor> {
        let n = species.len();
        let slots = self.number_of_species_pairs();
        if triples.is_empty() {
            return Tensor::zeros((n, self.angular_width()), DType::F64, device);
        }

        let t = triples.len();
        let bond = |b: usize| -> candle_core::Result<Tensor> {
            let index = Tensor::from_vec(triples.pairs[b].clone(), t, device)?;
            let sign = Tensor::from_vec(triples.signs[b].clone(), (t, 1), device)?;
            geometry.r_ij.index_select(&index, 0)?.broadcast_mul(&sign)
        };
        let features = self.angular.forward(&bond(0)?, &bond(1)?)?;

        let targets: Vec<u32> = (0..t)
            .map(|k| {
                let first = species[triples.neighbors[0][k] as usize];
                let second = species[triples.neighbors[1][k] as usize];
                (triples.centers[k] as usize * slots + self.species_pair_slot(first, second)) as u32
            })
            .collect();
        let targets = Tensor::from_vec(targets, t, device)?;
        scatter_add(&features, &targets, n * slots)?.reshape((n, self.angular_width()))
    }
}

impl Representation for AniRepresentation {
    fn name(&self) -> &'static str {
        "ani"
    }

    fn expected_pair_mode(&self) -> PairMode {
        PairMode::Unique
    }

    fn output_width(&self) -> usize {
        self.radial_width() + self.angular_width()
    }

    fn cutoff(&self) -> f64 {
        self.radial_cutoff.cutoff()
    }

    fn forward(
        &self,
        batch: &AtomSystemBatch,
        positions: &Tensor,
        pairs: &PairList,
        ctx: &ForwardContext,
    ) -> Result<AtomRepresentation, PotentialError> {
        pairs.require_mode(PairMode::Unique)?;
        let species = self.species_of(batch)?;
        let device = ctx.device();
        let n = batch.number_of_atoms();

        if pairs.is_empty() {
            let zeros = Tensor::zeros((n, self.output_width()), DType::F64, device)?;
            return Ok(AtomRepresentation::scalar_only(zeros));
        }

        let (idx_i, idx_j) = pairs.index_tensors(device)?;
        let geometry = pair_geometry(positions, &idx_i, &idx_j)?;
        let radial = self.radial_aev(&geometry, pairs, &species, device)?;

        let distances = geometry.d_ij.to_vec1::<f64>()?;
        let angular_cutoff = self.angular.cutoff();
        let triples = triples_by_center(pairs, n, |p| distances[p] <= angular_cutoff)?;
        trace!(pairs = pairs.len(), triples = triples.len(), "Built ANI environment.");
        let angular = self.angular_aev(&geometry, &triples, &species, device)?;

        Ok(AtomRepresentation::scalar_only(Tensor::cat(
            &[radial, angular],
            1,
        )?))
    }

    fn trainable_variables(&self) -> Vec<Var> {
        self.radial.trainable_variables()
    }
}
