use crate::core::models::batch::AtomSystemBatch;
use crate::core::models::statistics::DatasetStatistics;
use crate::core::regression::{MoleculeRecord, fit_self_energies};
use crate::engine::error::PotentialError;
use crate::engine::progress::ProgressReporter;
use tracing::{info, instrument};

/// Pairs every molecule of `batch` with its reference energy.
pub fn records_from_batch(
    batch: &AtomSystemBatch,
    energies: &[f64],
) -> Result<Vec<MoleculeRecord>, PotentialError> {
    let molecules = batch.number_of_molecules();
    if energies.len() != molecules {
        return Err(PotentialError::ShapeMismatch {
            context: "reference energies".to_string(),
            expected: molecules,
            found: energies.len(),
        });
    }

    let mut compositions: Vec<Vec<u8>> = vec![Vec::new(); molecules];
    for (&z, &m) in batch.atomic_numbers().iter().zip(batch.subsystem_indices()) {
        compositions[m].push(z);
    }
    Ok(compositions
        .iter()
        .zip(energies)
        .map(|(atomic_numbers, &energy)| MoleculeRecord::new(atomic_numbers, energy))
        .collect())
}

/// Fits per-element self energies and returns `base` with its self-energy table replaced.
#[instrument(skip_all, name = "self_energy_workflow", fields(molecules = records.len()))]
pub fn run(
    records: &[MoleculeRecord],
    base: &DatasetStatistics,
    reporter: &ProgressReporter,
) -> Result<DatasetStatistics, PotentialError> {
    let atomic_self_energies =
        reporter.phase("Self-energy regression", || fit_self_energies(records))?;
    reporter.message(format!(
        "Fitted self energies for {} elements from {} molecules.",
        atomic_self_energies.len(),
        records.len()
    ));
    info!(
        elements = atomic_self_energies.len(),
        "Self-energy regression complete."
    );

    let statistics = DatasetStatistics {
        atomic_self_energies,
        ..base.clone()
    };
    statistics.validate()?;
    Ok(statistics)
}
