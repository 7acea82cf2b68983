use super::elements;
use crate::core::units::{LengthUnit, UnitError};
use candle_core::{Device, Tensor};
use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BatchError {
    #[error("Batch contains no atoms")]
    EmptyBatch,

    #[error("Length of '{field}' is {found}, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid subsystem indices: {reason}")]
    InvalidSubsystemIndex { reason: String },

    #[error("Atom {atom} has a non-finite position")]
    NonFinitePosition { atom: usize },

    #[error("Atom {atom} has invalid atomic number {atomic_number}")]
    InvalidAtomicNumber { atom: usize, atomic_number: u8 },

    #[error("Batch of {0} atoms exceeds the supported index range")]
    TooManyAtoms(usize),
}

/// A minibatch of independent molecules stored as flat per-atom arrays.
///
/// Atoms of one molecule need not be contiguous: `subsystem_indices[a]` names the molecule of atom
/// `a`, and the indices must form the dense range `0..M`. All invariants are checked in
/// [`AtomSystemBatch::new`], after which the batch is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSystemBatch {
    positions: Vec<Point3<f64>>,
    atomic_numbers: Vec<u8>,
    subsystem_indices: Vec<usize>,
    total_charge: Vec<f64>,
    length_unit: LengthUnit,
    number_of_molecules: usize,
}

impl AtomSystemBatch {
    pub fn new(
        positions: Vec<Point3<f64>>,
        atomic_numbers: Vec<u8>,
        subsystem_indices: Vec<usize>,
        total_charge: Vec<f64>,
        length_unit: LengthUnit,
    ) -> Result<Self, BatchError> {
        let n = positions.len();
        if n == 0 {
            return Err(BatchError::EmptyBatch);
        }
        if n > u32::MAX as usize {
            return Err(BatchError::TooManyAtoms(n));
        }
        if atomic_numbers.len() != n {
            return Err(BatchError::ShapeMismatch {
                field: "atomic_numbers",
                expected: n,
                found: atomic_numbers.len(),
            });
        }
        if subsystem_indices.len() != n {
            return Err(BatchError::ShapeMismatch {
                field: "subsystem_indices",
                expected: n,
                found: subsystem_indices.len(),
            });
        }

        let number_of_molecules = validate_dense_indices(&subsystem_indices)?;
        if total_charge.len() != number_of_molecules {
            return Err(BatchError::ShapeMismatch {
                field: "total_charge",
                expected: number_of_molecules,
                found: total_charge.len(),
            });
        }

        if let Some(atom) = positions
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(BatchError::NonFinitePosition { atom });
        }
        if let Some((atom, &atomic_number)) = atomic_numbers
            .iter()
            .enumerate()
            .find(|&(_, &z)| !elements::is_valid_atomic_number(z))
        {
            return Err(BatchError::InvalidAtomicNumber {
                atom,
                atomic_number,
            });
        }

        Ok(Self {
            positions,
            atomic_numbers,
            subsystem_indices,
            total_charge,
            length_unit,
            number_of_molecules,
        })
    }

    /// Builds a batch of charge-neutral molecules in nanometers.
    pub fn neutral(
        positions: Vec<Point3<f64>>,
        atomic_numbers: Vec<u8>,
        subsystem_indices: Vec<usize>,
    ) -> Result<Self, BatchError> {
        // an index past the atom count is reported by `new`
        let molecules = subsystem_indices
            .iter()
            .max()
            .map_or(0, |&m| m.saturating_add(1))
            .min(subsystem_indices.len());
        Self::new(
            positions,
            atomic_numbers,
            subsystem_indices,
            vec![0.0; molecules],
            LengthUnit::Nanometer,
        )
    }

    pub fn number_of_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn number_of_molecules(&self) -> usize {
        self.number_of_molecules
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn atomic_numbers(&self) -> &[u8] {
        &self.atomic_numbers
    }

    pub fn subsystem_indices(&self) -> &[usize] {
        &self.subsystem_indices
    }

    pub fn total_charge(&self) -> &[f64] {
        &self.total_charge
    }

    pub fn length_unit(&self) -> LengthUnit {
        self.length_unit
    }

    pub fn require_nanometer(&self) -> Result<(), UnitError> {
        if self.length_unit != LengthUnit::Nanometer {
            return Err(UnitError::Mismatch {
                quantity: "positions",
                expected: LengthUnit::Nanometer,
                found: self.length_unit,
            });
        }
        Ok(())
    }

    pub fn atoms_per_molecule(&self) -> Vec<usize> {
        let mut counts = vec![0; self.number_of_molecules];
        for &m in &self.subsystem_indices {
            counts[m] += 1;
        }
        counts
    }

    /// Returns a copy of the batch with new coordinates, keeping every other array.
    pub fn with_positions(&self, positions: Vec<Point3<f64>>) -> Result<Self, BatchError> {
        Self::new(
            positions,
            self.atomic_numbers.clone(),
            self.subsystem_indices.clone(),
            self.total_charge.clone(),
            self.length_unit,
        )
    }

    /// Extracts the given molecules into a new batch, renumbering them densely in the order given.
    pub fn select_molecules(&self, molecules: &[usize]) -> Result<Self, BatchError> {
        let mut remap = vec![None; self.number_of_molecules];
        for (new_index, &old_index) in molecules.iter().enumerate() {
            let slot = remap
                .get_mut(old_index)
                .ok_or_else(|| BatchError::InvalidSubsystemIndex {
                    reason: format!("molecule {old_index} does not exist in the batch"),
                })?;
            if slot.is_some() {
                return Err(BatchError::InvalidSubsystemIndex {
                    reason: format!("molecule {old_index} selected more than once"),
                });
            }
            *slot = Some(new_index);
        }

        let mut positions = Vec::new();
        let mut atomic_numbers = Vec::new();
        let mut subsystem_indices = Vec::new();
        for (atom, &m) in self.subsystem_indices.iter().enumerate() {
            if let Some(new_index) = remap[m] {
                positions.push(self.positions[atom]);
                atomic_numbers.push(self.atomic_numbers[atom]);
                subsystem_indices.push(new_index);
            }
        }
        let total_charge = molecules.iter().map(|&m| self.total_charge[m]).collect();

        Self::new(
            positions,
            atomic_numbers,
            subsystem_indices,
            total_charge,
            self.length_unit,
        )
    }

    /// Positions as an `[N, 3]` tensor.
    pub fn positions_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let flat: Vec<f64> = self
            .positions
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect();
        Tensor::from_vec(flat, (self.number_of_atoms(), 3), device)
    }

    pub fn atomic_numbers_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let ids: Vec<u32> = self.atomic_numbers.iter().map(|&z| u32::from(z)).collect();
        Tensor::from_vec(ids, self.number_of_atoms(), device)
    }

    pub fn subsystem_indices_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        let ids: Vec<u32> = self.subsystem_indices.iter().map(|&m| m as u32).collect();
        Tensor::from_vec(ids, self.number_of_atoms(), device)
    }
}

fn validate_dense_indices(indices: &[usize]) -> Result<usize, BatchError> {
    let Some(&max) = indices.iter().max() else {
        return Err(BatchError::EmptyBatch);
    };
    if max >= indices.len() {
        return Err(BatchError::InvalidSubsystemIndex {
            reason: format!(
                "{} atoms cannot cover molecule indices 0..={max}",
                indices.len()
            ),
        });
    }
    let number_of_molecules = max + 1;
    let mut seen = vec![false; number_of_molecules];
    for &m in indices {
        seen[m] = true;
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(BatchError::InvalidSubsystemIndex {
            reason: format!("molecule index {missing} is missing from the range 0..={max}"),
        });
    }
    Ok(number_of_molecules)
}
