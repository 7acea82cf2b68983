use crate::cli::FitSelfEnergiesArgs;
use crate::error::Result;
use crate::input;
use crate::utils::progress::CliProgressHandler;
use nnpforge::core::models::elements;
use nnpforge::core::models::statistics::DatasetStatistics;
use nnpforge::workflows::self_energy;
use tracing::info;

pub fn run(args: FitSelfEnergiesArgs, progress: &CliProgressHandler) -> Result<()> {
    info!("Loading batch from {:?}", &args.input);
    let batch = input::read_batch(&args.input)?;
    let energies = input::read_energies(&args.energies, batch.number_of_molecules())?;

    let base = match &args.statistics {
        Some(path) => {
            info!("Carrying scaling constants over from {:?}", path);
            DatasetStatistics::load(path)?
        }
        None => DatasetStatistics::default(),
    };

    let records = self_energy::records_from_batch(&batch, &energies)?;
    println!(
        "Fitting self energies from {} molecule(s)...",
        records.len()
    );
    let statistics = self_energy::run(&records, &base, &progress.reporter())?;

    for (atomic_number, energy) in statistics.atomic_self_energies.iter() {
        let symbol = elements::symbol(atomic_number).unwrap_or("?");
        println!("  {:<3} {:>20.8}", symbol, energy);
    }
    statistics.save(&args.output)?;
    println!("✓ Statistics written to: {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::error::CliError;
    use clap::Parser;
    use std::fs;
    use std::path::Path;

    // H2, CH4, H2O, CO2
    const BATCH: &str = "\
molecule,atomic_number,x,y,z
0,1,0.0,0.0,0.0
0,1,0.074,0.0,0.0
1,6,0.0,0.0,0.0
1,1,0.063,0.063,0.063
1,1,-0.063,-0.063,0.063
1,1,-0.063,0.063,-0.063
1,1,0.063,-0.063,-0.063
2,8,0.0,0.0,0.0
2,1,0.0957,0.0,0.0
2,1,-0.024,0.0927,0.0
3,6,0.0,0.0,0.0
3,8,0.116,0.0,0.0
3,8,-0.116,0.0,0.0
";

    fn fit_args(dir: &Path, energies: &str, extra: &[&str]) -> FitSelfEnergiesArgs {
        fs::write(dir.join("batch.csv"), BATCH).unwrap();
        fs::write(dir.join("energies.csv"), energies).unwrap();
        let mut argv: Vec<String> = [
            "nnpforge",
            "fit-self-energies",
            "-i",
            dir.join("batch.csv").to_str().unwrap(),
            "-e",
            dir.join("energies.csv").to_str().unwrap(),
            "-o",
            dir.join("statistics.toml").to_str().unwrap(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::FitSelfEnergies(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn energies(h: f64, c: f64, o: f64) -> String {
        format!(
            "molecule,energy\n0,{}\n1,{}\n2,{}\n3,{}\n",
            2.0 * h,
            c + 4.0 * h,
            o + 2.0 * h,
            c + 2.0 * o
        )
    }

    #[test]
    fn fitted_statistics_recover_additive_self_energies() {
        let dir = tempfile::tempdir().unwrap();
        let args = fit_args(dir.path(), &energies(-0.5, -38.0, -75.0), &[]);
        run(args, &CliProgressHandler::hidden()).unwrap();

        let statistics = DatasetStatistics::load(&dir.path().join("statistics.toml")).unwrap();
        let table = &statistics.atomic_self_energies;
        assert!((table.get(1).unwrap() + 0.5).abs() < 1e-8);
        assert!((table.get(6).unwrap() + 38.0).abs() < 1e-8);
        assert!((table.get(8).unwrap() + 75.0).abs() < 1e-8);
        assert_eq!(statistics.scaling_stddev, 1.0);
    }

    #[test]
    fn scaling_constants_are_carried_over_from_base_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        fs::write(&base, "scaling-mean = 2.5\nscaling-stddev = 0.5\n").unwrap();
        let args = fit_args(
            dir.path(),
            &energies(-0.5, -38.0, -75.0),
            &["-s", base.to_str().unwrap()],
        );
        run(args, &CliProgressHandler::hidden()).unwrap();

        let statistics = DatasetStatistics::load(&dir.path().join("statistics.toml")).unwrap();
        assert_eq!(statistics.scaling_mean, 2.5);
        assert_eq!(statistics.scaling_stddev, 0.5);
        assert_eq!(statistics.atomic_self_energies.len(), 3);
    }

    #[test]
    fn missing_reference_energy_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = fit_args(dir.path(), "molecule,energy\n0,-1.0\n1,-40.0\n", &[]);
        let result = run(args, &CliProgressHandler::hidden());
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
        assert!(!dir.path().join("statistics.toml").exists());
    }
}
