use crate::cli::PairsArgs;
use crate::error::Result;
use crate::input;
use nnpforge::core::models::batch::AtomSystemBatch;
use nnpforge::core::pairs::enumerate::{PairList, neighbor_list_with_cutoff};
use nnpforge::engine::error::PotentialError;
use tracing::info;

/// One enumerated pair with its separation in nanometers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PairEntry {
    i: usize,
    j: usize,
    distance: f64,
}

fn pair_entries(batch: &AtomSystemBatch, pairs: &PairList) -> Vec<PairEntry> {
    let positions = batch.positions();
    pairs
        .iter()
        .map(|(i, j)| PairEntry {
            i,
            j,
            distance: (positions[j] - positions[i]).norm(),
        })
        .collect()
}

pub fn run(args: PairsArgs) -> Result<()> {
    info!("Loading batch from {:?}", &args.input);
    let batch = input::read_batch(&args.input)?;
    let pairs = neighbor_list_with_cutoff(&batch, args.mode, args.cutoff)
        .map_err(PotentialError::from)?;

    println!(
        "{} '{}' pair(s) within {} across {} molecule(s).",
        pairs.len(),
        pairs.mode(),
        args.cutoff,
        batch.number_of_molecules()
    );
    println!("{:>8}  {:>8}  {:>8}", "molecule", "atoms", "pairs");
    for (molecule, (atoms, count)) in batch
        .atoms_per_molecule()
        .into_iter()
        .zip(pairs.counts_per_molecule(&batch))
        .enumerate()
    {
        println!("{:>8}  {:>8}  {:>8}", molecule, atoms, count);
    }

    if args.list {
        println!();
        println!("{:>8}  {:>8}  {:>12}", "i", "j", "distance/nm");
        for entry in pair_entries(&batch, &pairs) {
            println!("{:>8}  {:>8}  {:>12.6}", entry.i, entry.j, entry.distance);
        }
    }
    Ok(())
}
