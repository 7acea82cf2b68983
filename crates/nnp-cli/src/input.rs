use crate::error::{CliError, Result};
use nnpforge::core::models::batch::AtomSystemBatch;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AtomRow {
    molecule: usize,
    atomic_number: u8,
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Deserialize)]
struct EnergyRow {
    molecule: usize,
    energy: f64,
}

fn parsing_error(path: &Path, source: impl Into<anyhow::Error>) -> CliError {
    CliError::FileParsing {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

/// Reads a batch from CSV rows of `molecule,atomic_number,x,y,z` (positions in nanometers).
pub fn read_batch(path: &Path) -> Result<AtomSystemBatch> {
    let file = std::fs::File::open(path).map_err(|e| parsing_error(path, e))?;
    let batch = parse_batch(file).map_err(|e| parsing_error(path, e))?;
    debug!(
        atoms = batch.number_of_atoms(),
        molecules = batch.number_of_molecules(),
        "Read batch from '{}'.",
        path.display()
    );
    Ok(batch)
}

fn parse_batch<R: Read>(reader: R) -> anyhow::Result<AtomSystemBatch> {
    let mut positions = Vec::new();
    let mut atomic_numbers = Vec::new();
    let mut subsystem_indices = Vec::new();
    for row in csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
        .deserialize()
    {
        let row: AtomRow = row?;
        positions.push(Point3::new(row.x, row.y, row.z));
        atomic_numbers.push(row.atomic_number);
        subsystem_indices.push(row.molecule);
    }
    Ok(AtomSystemBatch::neutral(
        positions,
        atomic_numbers,
        subsystem_indices,
    )?)
}

/// Reads one reference energy per molecule from CSV rows of `molecule,energy`.
pub fn read_energies(path: &Path, number_of_molecules: usize) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path).map_err(|e| parsing_error(path, e))?;
    parse_energies(file, number_of_molecules).map_err(|e| parsing_error(path, e))
}

fn parse_energies<R: Read>(reader: R, number_of_molecules: usize) -> anyhow::Result<Vec<f64>> {
    let mut energies = BTreeMap::new();
    for row in csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
        .deserialize()
    {
        let row: EnergyRow = row?;
        anyhow::ensure!(
            row.molecule < number_of_molecules,
            "molecule {} is not in the batch of {} molecules",
            row.molecule,
            number_of_molecules
        );
        anyhow::ensure!(
            energies.insert(row.molecule, row.energy).is_none(),
            "molecule {} has more than one reference energy",
            row.molecule
        );
    }
    anyhow::ensure!(
        energies.len() == number_of_molecules,
        "found reference energies for {} of {} molecules",
        energies.len(),
        number_of_molecules
    );
    Ok(energies.into_values().collect())
}

/// Writes `molecule,energy,pairs` rows.
pub fn write_energies<W: Write>(writer: W, energies: &[f64], pair_counts: &[usize]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let csv_error = |e: csv::Error| CliError::Other(e.into());
    out.write_record(["molecule", "energy", "pairs"]).map_err(csv_error)?;
    for (molecule, (energy, pairs)) in energies.iter().zip(pair_counts).enumerate() {
        out.write_record([molecule.to_string(), energy.to_string(), pairs.to_string()])
            .map_err(csv_error)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `atom,molecule,atomic_number,fx,fy,fz` rows in batch order.
pub fn write_forces<W: Write>(
    writer: W,
    batch: &AtomSystemBatch,
    forces: &[Vector3<f64>],
) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let csv_error = |e: csv::Error| CliError::Other(e.into());
    out.write_record(["atom", "molecule", "atomic_number", "fx", "fy", "fz"])
        .map_err(csv_error)?;
    for (atom, force) in forces.iter().enumerate() {
        out.write_record([
            atom.to_string(),
            batch.subsystem_indices()[atom].to_string(),
            batch.atomic_numbers()[atom].to_string(),
            force.x.to_string(),
            force.y.to_string(),
            force.z.to_string(),
        ])
        .map_err(csv_error)?;
    }
    out.flush()?;
    Ok(())
}
