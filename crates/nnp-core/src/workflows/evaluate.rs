use crate::core::models::batch::AtomSystemBatch;
use crate::engine::context::ForwardContext;
use crate::engine::error::PotentialError;
use crate::engine::potential::Potential;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::Vector3;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateOptions {
    pub compute_forces: bool,
    /// Molecules per forward pass; `None` evaluates the whole batch at once.
    pub molecules_per_chunk: Option<usize>,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            compute_forces: true,
            molecules_per_chunk: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// One energy per molecule, in batch order.
    pub energies: Vec<f64>,
    /// One force per atom, in batch order, when requested.
    pub forces: Option<Vec<Vector3<f64>>>,
    /// Number of pairs enumerated for each molecule.
    pub pair_counts: Vec<usize>,
}

#[instrument(skip_all, name = "evaluate_workflow", fields(molecules = batch.number_of_molecules()))]
pub fn run(
    potential: &Potential,
    batch: &AtomSystemBatch,
    options: &EvaluateOptions,
    ctx: &ForwardContext,
    reporter: &ProgressReporter,
) -> Result<EvaluationResult, PotentialError> {
    let molecules = batch.number_of_molecules();
    let chunk_size = options.molecules_per_chunk.unwrap_or(molecules).clamp(1, molecules);
    let chunks: Vec<Vec<usize>> = (0..molecules)
        .collect::<Vec<_>>()
        .chunks(chunk_size)
        .map(<[usize]>::to_vec)
        .collect();

    let result = reporter.phase("Evaluation", || {
        reporter.report(Progress::EvaluationStart {
            molecules: molecules as u64,
            chunks: chunks.len() as u64,
        });
        let mut result = EvaluationResult {
            energies: Vec::with_capacity(molecules),
            forces: options
                .compute_forces
                .then(|| vec![Vector3::zeros(); batch.number_of_atoms()]),
            pair_counts: Vec::with_capacity(molecules),
        };
        for chunk in &chunks {
            let counted = result.pair_counts.len();
            evaluate_chunk(potential, batch, chunk, ctx, &mut result)?;
            reporter.report(Progress::ChunkEvaluated {
                molecules: chunk.len() as u64,
                pairs: result.pair_counts[counted..].iter().sum::<usize>() as u64,
            });
        }
        reporter.report(Progress::EvaluationFinish);
        Ok::<_, PotentialError>(result)
    })?;

    info!(
        molecules,
        chunks = chunks.len(),
        pairs = result.pair_counts.iter().sum::<usize>(),
        "Evaluation complete."
    );
    Ok(result)
}

fn evaluate_chunk(
    potential: &Potential,
    batch: &AtomSystemBatch,
    molecules: &[usize],
    ctx: &ForwardContext,
    result: &mut EvaluationResult,
) -> Result<(), PotentialError> {
    let whole_batch = molecules.len() == batch.number_of_molecules();
    let selected;
    let sub_batch = if whole_batch {
        batch
    } else {
        selected = batch.select_molecules(molecules)?;
        &selected
    };

    // chunks hold ascending molecule ids, so the sub-batch keeps the original atom order
    let atoms: Vec<usize> = batch
        .subsystem_indices()
        .iter()
        .enumerate()
        .filter(|&(_, m)| molecules.contains(m))
        .map(|(atom, _)| atom)
        .collect();

    if let Some(forces) = result.forces.as_mut() {
        let output = potential.energy_and_forces(sub_batch, ctx)?;
        result.energies.extend(output.energy_values()?);
        result
            .pair_counts
            .extend(output.pair_list.counts_per_molecule(sub_batch));
        for (atom, force) in atoms.into_iter().zip(output.force_vectors()?) {
            forces[atom] = force;
        }
    } else {
        let output = potential.forward(sub_batch, ctx)?;
        result
            .energies
            .extend(output.per_molecule_energy.to_vec1::<f64>()?);
        result
            .pair_counts
            .extend(output.pair_list.counts_per_molecule(sub_batch));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::statistics::DatasetStatistics;
    use crate::engine::config::{Architecture, PotentialConfigBuilder};
    use nalgebra::Point3;
    use std::sync::{Arc, Mutex};

    fn potential() -> Potential {
        let config = PotentialConfigBuilder::for_architecture(Architecture::SchNet)
            .number_of_atom_features(8)
            .number_of_radial_basis_functions(6)
            .number_of_interaction_blocks(2)
            .build()
            .unwrap();
        Potential::from_config(config, &DatasetStatistics::default(), &ForwardContext::cpu())
            .unwrap()
    }

    fn three_molecules() -> AtomSystemBatch {
        AtomSystemBatch::neutral(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.11, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.1, 0.05, 0.0),
                Point3::new(2.0, 0.1, 0.02),
                Point3::new(4.0, 0.0, 0.0),
            ],
            vec![6, 8, 8, 1, 1, 7],
            vec![0, 0, 1, 1, 1, 2],
        )
        .unwrap()
    }

    #[test]
    fn chunked_evaluation_matches_a_single_pass() {
        let potential = potential();
        let batch = three_molecules();
        let ctx = ForwardContext::cpu();
        let reporter = ProgressReporter::new();

        let whole = run(&potential, &batch, &EvaluateOptions::default(), &ctx, &reporter).unwrap();
        let chunked = run(
            &potential,
            &batch,
            &EvaluateOptions {
                compute_forces: true,
                molecules_per_chunk: Some(2),
            },
            &ctx,
            &reporter,
        )
        .unwrap();

        assert_eq!(whole.energies.len(), 3);
        assert_eq!(whole.pair_counts, vec![2, 6, 0]);
        assert_eq!(chunked.pair_counts, whole.pair_counts);
        for (a, b) in whole.energies.iter().zip(&chunked.energies) {
            assert!((a - b).abs() < 1e-10 * (1.0 + a.abs()));
        }
        let whole_forces = whole.forces.unwrap();
        let chunked_forces = chunked.forces.unwrap();
        assert_eq!(whole_forces.len(), 6);
        for (a, b) in whole_forces.iter().zip(&chunked_forces) {
            assert!((a - b).norm() < 1e-10 * (1.0 + a.norm()));
        }
        assert_eq!(whole_forces[5], Vector3::zeros());
    }

    #[test]
    fn forces_are_skipped_when_not_requested() {
        let potential = potential();
        let batch = three_molecules();
        let options = EvaluateOptions {
            compute_forces: false,
            molecules_per_chunk: None,
        };
        let result = run(
            &potential,
            &batch,
            &options,
            &ForwardContext::cpu(),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert!(result.forces.is_none());
        assert_eq!(result.energies.len(), 3);
    }

    #[test]
    fn progress_reports_every_chunk_with_its_pair_count() {
        let potential = potential();
        let batch = three_molecules();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter =
            ProgressReporter::with_callback(Box::new(move |e| sink.lock().unwrap().push(e)));
        let options = EvaluateOptions {
            compute_forces: false,
            molecules_per_chunk: Some(1),
        };
        let result =
            run(&potential, &batch, &options, &ForwardContext::cpu(), &reporter).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0], Progress::PhaseStart { name: "Evaluation" });
        assert_eq!(
            events[1],
            Progress::EvaluationStart {
                molecules: 3,
                chunks: 3
            }
        );
        let chunk_pairs: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Progress::ChunkEvaluated { molecules: 1, pairs } => Some(*pairs),
                _ => None,
            })
            .collect();
        let expected: Vec<u64> = result.pair_counts.iter().map(|&c| c as u64).collect();
        assert_eq!(chunk_pairs, expected);
        assert_eq!(events[events.len() - 2], Progress::EvaluationFinish);
        assert_eq!(events.last(), Some(&Progress::PhaseFinish));
    }
}
