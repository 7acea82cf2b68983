use crate::cli::EvaluateArgs;
use crate::config::PartialPotentialConfig;
use crate::error::Result;
use crate::input;
use crate::utils::progress::CliProgressHandler;
use nnpforge::core::models::statistics::DatasetStatistics;
use nnpforge::engine::context::ForwardContext;
use nnpforge::engine::potential::Potential;
use nnpforge::workflows::evaluate::{self, EvaluateOptions};
use std::fs::File;
use std::io::BufWriter;
use tracing::info;

pub fn run(args: EvaluateArgs, progress: &CliProgressHandler) -> Result<()> {
    let partial_config = PartialPotentialConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let statistics = match &args.statistics {
        Some(path) => {
            info!("Loading dataset statistics from {:?}", path);
            DatasetStatistics::load(path)?
        }
        None => DatasetStatistics::default(),
    };

    info!("Loading batch from {:?}", &args.input);
    let batch = input::read_batch(&args.input)?;

    let ctx = ForwardContext::cpu();
    let potential = Potential::from_config(config, &statistics, &ctx)?;
    println!(
        "Evaluating {} molecule(s) ({} atoms) with a {} potential ({} parameters)...",
        batch.number_of_molecules(),
        batch.number_of_atoms(),
        potential.architecture(),
        potential.number_of_parameters()
    );

    let options = EvaluateOptions {
        compute_forces: !args.no_forces,
        molecules_per_chunk: args.chunk_size,
    };
    let result = evaluate::run(&potential, &batch, &options, &ctx, &progress.reporter())?;

    match &args.output {
        Some(path) => {
            input::write_energies(
                BufWriter::new(File::create(path)?),
                &result.energies,
                &result.pair_counts,
            )?;
            println!("✓ Energies written to: {}", path.display());
        }
        None => {
            println!("{:>8}  {:>20}  {:>8}", "molecule", "energy", "pairs");
            for (molecule, (energy, pairs)) in
                result.energies.iter().zip(&result.pair_counts).enumerate()
            {
                println!("{:>8}  {:>20.8}  {:>8}", molecule, energy, pairs);
            }
        }
    }

    if let (Some(path), Some(forces)) = (&args.forces, &result.forces) {
        input::write_forces(BufWriter::new(File::create(path)?), &batch, forces)?;
        println!("✓ Forces written to: {}", path.display());
    }

    Ok(())
}
