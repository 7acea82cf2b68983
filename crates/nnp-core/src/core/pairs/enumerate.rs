use crate::core::models::batch::AtomSystemBatch;
use crate::core::units::{Length, UnitError};
use candle_core::{Device, Tensor};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PairMode {
    /// Both `(i, j)` and `(j, i)` for every same-molecule pair.
    #[default]
    All,
    /// Only `(i, j)` with `i < j`.
    Unique,
}

impl fmt::Display for PairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairMode::All => f.write_str("all"),
            PairMode::Unique => f.write_str("unique"),
        }
    }
}

impl FromStr for PairMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(PairMode::All),
            "unique" => Ok(PairMode::Unique),
            other => Err(format!(
                "unknown pair mode '{other}' (expected 'all' or 'unique')"
            )),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Expected a '{expected}' pair list, found '{found}'")]
pub struct PairModeMismatch {
    pub expected: PairMode,
    pub found: PairMode,
}

/// Ordered atom-index pairs stored column-wise as two flat index arrays.
///
/// Pairs are grouped by molecule (ascending), then sorted by `i`, then by `j`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairList {
    mode: PairMode,
    idx_i: Vec<u32>,
    idx_j: Vec<u32>,
}

impl PairList {
    pub fn mode(&self) -> PairMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.idx_i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_i.is_empty()
    }

    pub fn idx_i(&self) -> &[u32] {
        &self.idx_i
    }

    pub fn idx_j(&self) -> &[u32] {
        &self.idx_j
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.idx_i
            .iter()
            .zip(&self.idx_j)
            .map(|(&i, &j)| (i as usize, j as usize))
    }

    pub fn require_mode(&self, expected: PairMode) -> Result<(), PairModeMismatch> {
        if self.mode != expected {
            return Err(PairModeMismatch {
                expected,
                found: self.mode,
            });
        }
        Ok(())
    }

    /// Index arrays as `u32` tensors `(idx_i, idx_j)`, each of shape `[P]`.
    pub fn index_tensors(&self, device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let n = self.len();
        Ok((
            Tensor::from_vec(self.idx_i.clone(), n, device)?,
            Tensor::from_vec(self.idx_j.clone(), n, device)?,
        ))
    }

    pub fn counts_per_molecule(&self, batch: &AtomSystemBatch) -> Vec<usize> {
        let mut counts = vec![0; batch.number_of_molecules()];
        for &i in &self.idx_i {
            counts[batch.subsystem_indices()[i as usize]] += 1;
        }
        counts
    }

    fn from_pairs(mode: PairMode, pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let (idx_i, idx_j) = pairs.into_iter().unzip();
        Self { mode, idx_i, idx_j }
    }
}

/// Atoms of each molecule laid out contiguously: molecule `m` owns
/// `atoms[offsets[m]..offsets[m + 1]]`, in ascending atom order.
struct MoleculeArena {
    offsets: Vec<usize>,
    atoms: Vec<u32>,
}

impl MoleculeArena {
    fn from_batch(batch: &AtomSystemBatch) -> Self {
        let mut offsets = vec![0; batch.number_of_molecules() + 1];
        for &m in batch.subsystem_indices() {
            offsets[m + 1] += 1;
        }
        for m in 0..batch.number_of_molecules() {
            offsets[m + 1] += offsets[m];
        }

        let mut cursor = offsets.clone();
        let mut atoms = vec![0; batch.number_of_atoms()];
        for (atom, &m) in batch.subsystem_indices().iter().enumerate() {
            atoms[cursor[m]] = atom as u32;
            cursor[m] += 1;
        }
        Self { offsets, atoms }
    }

    fn number_of_molecules(&self) -> usize {
        self.offsets.len() - 1
    }

    fn molecule(&self, m: usize) -> &[u32] {
        &self.atoms[self.offsets[m]..self.offsets[m + 1]]
    }
}

fn molecule_pairs(atoms: &[u32], mode: PairMode) -> Vec<(u32, u32)> {
    let n = atoms.len();
    let mut pairs = Vec::with_capacity(match mode {
        PairMode::All => n * n.saturating_sub(1),
        PairMode::Unique => n * n.saturating_sub(1) / 2,
    });
    for (a, &i) in atoms.iter().enumerate() {
        let partners = match mode {
            PairMode::All => &atoms[..],
            PairMode::Unique => &atoms[a + 1..],
        };
        pairs.extend(partners.iter().filter(|&&j| j != i).map(|&j| (i, j)));
    }
    pairs
}

fn enumerate<F>(batch: &AtomSystemBatch, mode: PairMode, keep: F) -> PairList
where
    F: Fn(u32, u32) -> bool + Sync,
{
    let arena = MoleculeArena::from_batch(batch);

    #[cfg(not(feature = "parallel"))]
    let per_molecule: Vec<Vec<(u32, u32)>> = (0..arena.number_of_molecules())
        .map(|m| {
            let mut pairs = molecule_pairs(arena.molecule(m), mode);
            pairs.retain(|&(i, j)| keep(i, j));
            pairs
        })
        .collect();

    #[cfg(feature = "parallel")]
    let per_molecule: Vec<Vec<(u32, u32)>> = (0..arena.number_of_molecules())
        .into_par_iter()
        .map(|m| {
            let mut pairs = molecule_pairs(arena.molecule(m), mode);
            pairs.retain(|&(i, j)| keep(i, j));
            pairs
        })
        .collect();

    PairList::from_pairs(mode, per_molecule.into_iter().flatten())
}

/// Every same-molecule pair of the batch, without any distance filter.
#[instrument(skip_all, name = "pair_list", fields(mode = %mode))]
pub fn pair_list(batch: &AtomSystemBatch, mode: PairMode) -> PairList {
    let pairs = enumerate(batch, mode, |_, _| true);
    debug!(pairs = pairs.len(), "Enumerated same-molecule pairs.");
    pairs
}

/// Same-molecule pairs whose separation does not exceed `cutoff`.
#[instrument(skip_all, name = "neighbor_list", fields(mode = %mode))]
pub fn neighbor_list_with_cutoff(
    batch: &AtomSystemBatch,
    mode: PairMode,
    cutoff: Length,
) -> Result<PairList, UnitError> {
    batch.require_nanometer()?;
    let cutoff = cutoff.require_nanometer("cutoff_radius")?;
    let positions = batch.positions();
    let pairs = enumerate(batch, mode, |i, j| {
        (positions[j as usize] - positions[i as usize]).norm() <= cutoff
    });
    debug!(
        pairs = pairs.len(),
        cutoff, "Enumerated same-molecule pairs within cutoff."
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::LengthUnit;
    use nalgebra::Point3;

    fn methane_positions(offset: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(offset, 0.0, 0.0),
            Point3::new(offset + 0.063, 0.063, 0.063),
            Point3::new(offset - 0.063, -0.063, 0.063),
            Point3::new(offset - 0.063, 0.063, -0.063),
            Point3::new(offset + 0.063, -0.063, -0.063),
        ]
    }

    fn methane() -> AtomSystemBatch {
        AtomSystemBatch::neutral(methane_positions(0.0), vec![6, 1, 1, 1, 1], vec![0; 5]).unwrap()
    }

    fn methane_and_water() -> AtomSystemBatch {
        let mut positions = methane_positions(0.0);
        positions.extend([
            Point3::new(0.05, 0.0, 0.0),
            Point3::new(0.1457, 0.0, 0.0),
            Point3::new(0.026, 0.0927, 0.0),
            Point3::new(0.3, 0.3, 0.3),
        ]);
        AtomSystemBatch::neutral(
            positions,
            vec![6, 1, 1, 1, 1, 8, 1, 1, 10],
            vec![0, 0, 0, 0, 0, 1, 1, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn methane_pair_counts_match_combinatorics() {
        let batch = methane();
        let cutoff = Length::nanometers(10.0);

        let unique = neighbor_list_with_cutoff(&batch, PairMode::Unique, cutoff).unwrap();
        let all = neighbor_list_with_cutoff(&batch, PairMode::All, cutoff).unwrap();

        assert_eq!(unique.len(), 10);
        assert_eq!(all.len(), 20);
        assert!(unique.iter().all(|(i, j)| i < j));
    }

    #[test]
    fn all_mode_contains_both_orientations() {
        let all = pair_list(&methane(), PairMode::All);
        for (i, j) in all.iter() {
            assert_ne!(i, j);
            assert!(all.iter().any(|pair| pair == (j, i)));
        }
    }

    #[test]
    fn pairs_never_cross_molecules() {
        let batch = methane_and_water();
        for mode in [PairMode::All, PairMode::Unique] {
            let pairs = pair_list(&batch, mode);
            for (i, j) in pairs.iter() {
                assert_eq!(
                    batch.subsystem_indices()[i],
                    batch.subsystem_indices()[j],
                    "pair ({i}, {j}) crosses molecules"
                );
            }
        }
        assert_eq!(
            pair_list(&batch, PairMode::Unique).counts_per_molecule(&batch),
            vec![10, 6]
        );
    }

    #[test]
    fn interleaved_molecules_are_grouped_by_molecule() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.2, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
        ];
        let batch = AtomSystemBatch::neutral(positions, vec![1; 4], vec![1, 0, 1, 0]).unwrap();
        let pairs = pair_list(&batch, PairMode::Unique);
        assert_eq!(pairs.idx_i(), &[1, 0]);
        assert_eq!(pairs.idx_j(), &[3, 2]);
    }

    #[test]
    fn cutoff_filter_keeps_exactly_the_close_pairs() {
        let batch = methane_and_water();
        let cutoff = 0.12;
        let candidates = pair_list(&batch, PairMode::Unique);
        let kept =
            neighbor_list_with_cutoff(&batch, PairMode::Unique, Length::nanometers(cutoff))
                .unwrap();

        let distance = |i: usize, j: usize| (batch.positions()[j] - batch.positions()[i]).norm();
        for (i, j) in kept.iter() {
            assert!(distance(i, j) <= cutoff);
        }
        for (i, j) in candidates.iter() {
            if !kept.iter().any(|pair| pair == (i, j)) {
                assert!(distance(i, j) > cutoff);
            }
        }
        assert!(kept.len() < candidates.len());
        assert!(!kept.is_empty());
    }

    #[test]
    fn single_atom_molecules_yield_no_pairs() {
        let batch = AtomSystemBatch::neutral(
            vec![Point3::origin(), Point3::new(0.1, 0.0, 0.0)],
            vec![1, 1],
            vec![0, 1],
        )
        .unwrap();
        assert!(pair_list(&batch, PairMode::All).is_empty());
    }

    #[test]
    fn cutoff_in_angstrom_is_rejected() {
        let result = neighbor_list_with_cutoff(&methane(), PairMode::All, Length::angstroms(5.0));
        assert!(matches!(
            result,
            Err(UnitError::Mismatch {
                found: LengthUnit::Angstrom,
                ..
            })
        ));
    }

    #[test]
    fn require_mode_reports_mismatch() {
        let pairs = pair_list(&methane(), PairMode::All);
        assert!(pairs.require_mode(PairMode::All).is_ok());
        assert_eq!(
            pairs.require_mode(PairMode::Unique),
            Err(PairModeMismatch {
                expected: PairMode::Unique,
                found: PairMode::All
            })
        );
    }
}
