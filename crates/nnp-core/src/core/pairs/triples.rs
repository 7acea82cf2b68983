use super::enumerate::{PairList, PairMode, PairModeMismatch};
use itertools::Itertools;

/// Pairs of bonds sharing a central atom, built from a UNIQUE pair list.
///
/// For triple `t`, bond `b ∈ {0, 1}` is pair `pairs[b][t]` of the source list. Because each
/// unique pair is stored once as `(i, j)` with `i < j`, the bond vector leaving the center is
/// `sign[b][t] * r_ij`: `+1` when the center is the pair's `i`, `-1` when it is `j`. The
/// `neighbors` array holds the non-central atom of each bond.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triples {
    pub centers: Vec<u32>,
    pub pairs: [Vec<u32>; 2],
    pub signs: [Vec<f64>; 2],
    pub neighbors: [Vec<u32>; 2],
}

impl Triples {
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

struct Bond {
    pair: u32,
    sign: f64,
    neighbor: u32,
}

/// Enumerates every unordered bond pair around each atom, restricted to pairs for which
/// `include(pair_index)` holds. Triples are ordered by center, then by pair index.
pub fn triples_by_center<F>(
    pairs: &PairList,
    number_of_atoms: usize,
    include: F,
) -> Result<Triples, PairModeMismatch>
where
    F: Fn(usize) -> bool,
{
    pairs.require_mode(PairMode::Unique)?;

    let mut incident: Vec<Vec<Bond>> = (0..number_of_atoms).map(|_| Vec::new()).collect();
    for (p, (i, j)) in pairs.iter().enumerate().filter(|&(p, _)| include(p)) {
        incident[i].push(Bond {
            pair: p as u32,
            sign: 1.0,
            neighbor: j as u32,
        });
        incident[j].push(Bond {
            pair: p as u32,
            sign: -1.0,
            neighbor: i as u32,
        });
    }

    let mut triples = Triples::default();
    for (center, bonds) in incident.iter().enumerate() {
        for (first, second) in bonds.iter().tuple_combinations() {
            triples.centers.push(center as u32);
            for (b, bond) in [first, second].into_iter().enumerate() {
                triples.pairs[b].push(bond.pair);
                triples.signs[b].push(bond.sign);
                triples.neighbors[b].push(bond.neighbor);
            }
        }
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::batch::AtomSystemBatch;
    use crate::core::pairs::enumerate::pair_list;
    use nalgebra::Point3;

    fn chain(n: usize) -> AtomSystemBatch {
        let positions = (0..n).map(|k| Point3::new(0.1 * k as f64, 0.0, 0.0)).collect();
        AtomSystemBatch::neutral(positions, vec![6; n], vec![0; n]).unwrap()
    }

    #[test]
    fn each_atom_contributes_choose_two_of_its_bonds() {
        let batch = chain(4);
        let pairs = pair_list(&batch, PairMode::Unique);
        let triples = triples_by_center(&pairs, 4, |_| true).unwrap();

        // Fully connected 4-atom molecule: every atom has 3 bonds, C(3, 2) = 3 triples each.
        assert_eq!(triples.len(), 12);
        for center in 0..4u32 {
            assert_eq!(triples.centers.iter().filter(|&&c| c == center).count(), 3);
        }
    }

    #[test]
    fn signs_orient_bonds_away_from_the_center() {
        let batch = chain(3);
        let pairs = pair_list(&batch, PairMode::Unique);
        let triples = triples_by_center(&pairs, 3, |_| true).unwrap();

        for t in 0..triples.len() {
            let center = triples.centers[t] as usize;
            for b in 0..2 {
                let (i, j) = pairs.iter().nth(triples.pairs[b][t] as usize).unwrap();
                let expected = if center == i { 1.0 } else { -1.0 };
                assert_eq!(triples.signs[b][t], expected);
                let neighbor = triples.neighbors[b][t] as usize;
                assert_eq!(neighbor, if center == i { j } else { i });
            }
        }
    }

    #[test]
    fn excluded_pairs_do_not_form_triples() {
        let batch = chain(3);
        let pairs = pair_list(&batch, PairMode::Unique);
        // Pairs: (0,1), (0,2), (1,2). Dropping (0,2) leaves a single triple centered on atom 1.
        let triples = triples_by_center(&pairs, 3, |p| p != 1).unwrap();
        assert_eq!(triples.centers, vec![1]);
    }

    #[test]
    fn all_mode_pair_lists_are_rejected() {
        let batch = chain(3);
        let pairs = pair_list(&batch, PairMode::All);
        assert!(triples_by_center(&pairs, 3, |_| true).is_err());
    }
}
