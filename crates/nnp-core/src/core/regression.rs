//! Least-squares fit of per-element reference energies.
//!
//! Each molecule contributes one row `counts · x = E`, where `counts[e]` is the number of atoms of
//! element `e`. Only elements that occur in at least one molecule become columns, so unobserved
//! elements can never make the system structurally singular. Rank deficiency among the observed
//! elements is reported as an error rather than resolved by regularization.

use crate::core::models::elements;
use crate::core::models::statistics::AtomicSelfEnergies;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegressionError {
    #[error("No molecules were supplied for self-energy regression")]
    NoRecords,

    #[error("{molecules} molecules cannot determine {elements} element energies")]
    Underdetermined { molecules: usize, elements: usize },

    #[error("Element-count matrix has rank {rank} but {elements} elements were observed")]
    Singular { rank: usize, elements: usize },

    #[error("Non-finite value in regression input or solution")]
    NonFinite,

    #[error("Invalid atomic number {0} in regression input")]
    InvalidAtomicNumber(u8),

    #[error("Least-squares solver failed: {0}")]
    Solver(String),
}

/// Composition and reference energy of one molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeRecord {
    element_counts: BTreeMap<u8, usize>,
    energy: f64,
}

impl MoleculeRecord {
    pub fn new(atomic_numbers: &[u8], energy: f64) -> Self {
        let mut element_counts = BTreeMap::new();
        for &z in atomic_numbers {
            *element_counts.entry(z).or_insert(0) += 1;
        }
        Self {
            element_counts,
            energy,
        }
    }

    pub fn element_counts(&self) -> &BTreeMap<u8, usize> {
        &self.element_counts
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }
}

#[instrument(skip_all, name = "self_energy_regression", fields(molecules = records.len()))]
pub fn fit_self_energies(records: &[MoleculeRecord]) -> Result<AtomicSelfEnergies, RegressionError> {
    if records.is_empty() {
        return Err(RegressionError::NoRecords);
    }
    if records.iter().any(|r| !r.energy.is_finite()) {
        return Err(RegressionError::NonFinite);
    }

    let observed: Vec<u8> = records
        .iter()
        .flat_map(|r| r.element_counts.keys().copied())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    if let Some(&z) = observed
        .iter()
        .find(|&&z| !elements::is_valid_atomic_number(z))
    {
        return Err(RegressionError::InvalidAtomicNumber(z));
    }

    let rows = records.len();
    let columns = observed.len();
    if rows < columns {
        return Err(RegressionError::Underdetermined {
            molecules: rows,
            elements: columns,
        });
    }

    let design = DMatrix::from_fn(rows, columns, |r, c| {
        records[r]
            .element_counts
            .get(&observed[c])
            .map_or(0.0, |&n| n as f64)
    });
    let targets = DVector::from_iterator(rows, records.iter().map(|r| r.energy));

    let svd = design.svd(true, true);
    let largest = svd.singular_values.max();
    let tolerance = rows.max(columns) as f64 * f64::EPSILON * largest;
    let rank = svd.rank(tolerance);
    debug!(rank, columns, tolerance, "Decomposed element-count matrix.");
    if rank < columns {
        return Err(RegressionError::Singular {
            rank,
            elements: columns,
        });
    }

    let solution = svd
        .solve(&targets, tolerance)
        .map_err(|e| RegressionError::Solver(e.to_string()))?;
    if solution.iter().any(|x| !x.is_finite()) {
        return Err(RegressionError::NonFinite);
    }

    info!(
        elements = columns,
        "Fitted self energies for {} observed elements.", columns
    );
    Ok(observed.into_iter().zip(solution.iter().copied()).collect())
}
