use crate::utils::parser::{parse_architecture, parse_length, parse_pair_mode};
use clap::{Args, Parser, Subcommand};
use nnpforge::core::pairs::enumerate::PairMode;
use nnpforge::core::units::Length;
use nnpforge::engine::config::Architecture;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "nnpforge CLI - Evaluate neural network interatomic potentials on batches of molecules and fit their per-element self energies.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel pair enumeration.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate per-molecule energies and per-atom forces for a batch of molecules.
    Evaluate(EvaluateArgs),
    /// Enumerate same-molecule atom pairs and report how many fall within the cutoff.
    Pairs(PairsArgs),
    /// Fit per-element self energies from molecules with reference energies.
    FitSelfEnergies(FitSelfEnergiesArgs),
}

/// Arguments for the `evaluate` subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    // --- Core Arguments ---
    /// Path to the batch file (CSV with columns molecule,atomic_number,x,y,z in nanometers).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the potential configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path to the dataset statistics file (scaling and self energies) in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub statistics: Option<PathBuf>,

    /// Write per-molecule energies to a CSV file instead of the console.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write per-atom forces to a CSV file.
    #[arg(long, value_name = "PATH", conflicts_with = "no_forces")]
    pub forces: Option<PathBuf>,

    // --- Configuration Overrides ---
    /// Override the architecture from the config file (schnet, painn, attention, ani).
    #[arg(short, long, value_name = "NAME", value_parser = parse_architecture)]
    pub architecture: Option<Architecture>,

    /// Override the interaction cutoff radius (e.g., '0.5 nm').
    #[arg(long, value_name = "LENGTH", value_parser = parse_length)]
    pub cutoff: Option<Length>,

    /// Override the pair enumeration mode ('all' or 'unique').
    #[arg(long, value_name = "MODE", value_parser = parse_pair_mode)]
    pub pair_mode: Option<PairMode>,

    // --- Execution Control ---
    /// Skip the backward pass and report energies only.
    #[arg(long)]
    pub no_forces: bool,

    /// Evaluate the batch in chunks of this many molecules.
    #[arg(long, value_name = "NUM")]
    pub chunk_size: Option<usize>,

    /// Set a configuration value, overriding the config file. Can be used multiple times.
    /// Example: -S number-of-interaction-blocks=4 -S trainable-basis=true
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `pairs` subcommand.
#[derive(Args, Debug)]
pub struct PairsArgs {
    /// Path to the batch file (CSV with columns molecule,atomic_number,x,y,z in nanometers).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Cutoff radius; pairs farther apart are dropped.
    #[arg(long, value_name = "LENGTH", value_parser = parse_length, default_value = "0.5 nm")]
    pub cutoff: Length,

    /// Pair enumeration mode ('all' or 'unique').
    #[arg(long, value_name = "MODE", value_parser = parse_pair_mode, default_value = "all")]
    pub mode: PairMode,

    /// Print every pair as 'i j distance' in addition to the per-molecule counts.
    #[arg(long)]
    pub list: bool,
}

/// Arguments for the `fit-self-energies` subcommand.
#[derive(Args, Debug)]
pub struct FitSelfEnergiesArgs {
    /// Path to the batch file (CSV with columns molecule,atomic_number,x,y,z).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the reference energies (CSV with columns molecule,energy).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub energies: PathBuf,

    /// Path for the resulting dataset statistics file (TOML).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Existing statistics whose scaling constants are carried over.
    #[arg(short, long, value_name = "PATH")]
    pub statistics: Option<PathBuf>,
}
