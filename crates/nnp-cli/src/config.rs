use crate::cli::EvaluateArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use nnpforge::core::features::radial::RadialBasisFamily;
use nnpforge::core::models::elements;
use nnpforge::core::units::Length;
use nnpforge::engine::config::{
    AngularConfig, Architecture, PotentialConfig, PotentialConfigBuilder,
};
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialAngularConfig {
    #[serde(rename = "cutoff-radius")]
    cutoff_radius: Option<String>,
    #[serde(rename = "number-of-shells")]
    number_of_shells: Option<usize>,
    #[serde(rename = "number-of-sections")]
    number_of_sections: Option<usize>,
}

/// The potential settings as written in a TOML file; every field may be absent.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialPotentialConfig {
    architecture: Option<String>,
    #[serde(rename = "cutoff-radius")]
    cutoff_radius: Option<String>,
    #[serde(rename = "min-distance")]
    min_distance: Option<String>,
    #[serde(rename = "radial-basis-family")]
    radial_basis_family: Option<String>,
    #[serde(rename = "number-of-radial-basis-functions")]
    number_of_radial_basis_functions: Option<usize>,
    #[serde(rename = "number-of-interaction-blocks")]
    number_of_interaction_blocks: Option<usize>,
    #[serde(rename = "pair-mode")]
    pair_mode: Option<String>,
    #[serde(rename = "trainable-basis")]
    trainable_basis: Option<bool>,
    #[serde(rename = "number-of-atom-features")]
    number_of_atom_features: Option<usize>,
    #[serde(rename = "number-of-filters")]
    number_of_filters: Option<usize>,
    #[serde(rename = "number-of-attention-heads")]
    number_of_attention_heads: Option<usize>,
    #[serde(rename = "max-atomic-number")]
    max_atomic_number: Option<u8>,
    species: Option<Vec<String>>,
    angular: Option<PartialAngularConfig>,
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| CliError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}

fn parse_length(key: &str, value: &str) -> Result<Length> {
    parse_setting(key, value)
}

impl PartialPotentialConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolves the final configuration: command-line flags override `-S` values, which
    /// override the file, which overrides the architecture defaults.
    pub fn merge_with_cli(mut self, args: &EvaluateArgs) -> Result<PotentialConfig> {
        self.apply_set_values(&args.set_values)?;

        let architecture = match (args.architecture, self.architecture.as_deref()) {
            (Some(architecture), _) => architecture,
            (None, Some(name)) => parse_setting::<Architecture>("architecture", name)?,
            (None, None) => {
                return Err(CliError::Config(
                    "No architecture given in the config file or on the command line".to_string(),
                ));
            }
        };
        debug!(architecture = %architecture, "Resolving potential configuration.");

        let mut builder = PotentialConfigBuilder::for_architecture(architecture);

        if let Some(cutoff) = args.cutoff {
            builder = builder.cutoff_radius(cutoff);
        } else if let Some(cutoff) = &self.cutoff_radius {
            builder = builder.cutoff_radius(parse_length("cutoff-radius", cutoff)?);
        }
        if let Some(distance) = &self.min_distance {
            builder = builder.min_distance(parse_length("min-distance", distance)?);
        }
        if let Some(family) = &self.radial_basis_family {
            builder = builder
                .radial_basis_family(parse_setting::<RadialBasisFamily>("radial-basis-family", family)?);
        }
        if let Some(n) = self.number_of_radial_basis_functions {
            builder = builder.number_of_radial_basis_functions(n);
        }
        if let Some(n) = self.number_of_interaction_blocks {
            builder = builder.number_of_interaction_blocks(n);
        }
        if let Some(mode) = args.pair_mode {
            builder = builder.pair_mode(mode);
        } else if let Some(mode) = &self.pair_mode {
            builder = builder.pair_mode(parser::parse_pair_mode(mode).map_err(CliError::Config)?);
        }
        if let Some(trainable) = self.trainable_basis {
            builder = builder.trainable_basis(trainable);
        }
        if let Some(n) = self.number_of_atom_features {
            builder = builder.number_of_atom_features(n);
        }
        if let Some(n) = self.number_of_filters {
            builder = builder.number_of_filters(n);
        }
        if let Some(n) = self.number_of_attention_heads {
            builder = builder.number_of_attention_heads(n);
        }
        if let Some(z) = self.max_atomic_number {
            builder = builder.max_atomic_number(z);
        }
        if let Some(symbols) = &self.species {
            let species = symbols
                .iter()
                .map(|symbol| {
                    elements::atomic_number(symbol).ok_or_else(|| {
                        CliError::Config(format!("Unknown element symbol in species: '{}'", symbol))
                    })
                })
                .collect::<Result<Vec<u8>>>()?;
            builder = builder.species(species);
        }
        if let Some(angular) = &self.angular {
            let defaults = AngularConfig::default();
            builder = builder.angular(AngularConfig {
                cutoff_radius: match &angular.cutoff_radius {
                    Some(cutoff) => parse_length("angular.cutoff-radius", cutoff)?,
                    None => defaults.cutoff_radius,
                },
                number_of_shells: angular.number_of_shells.unwrap_or(defaults.number_of_shells),
                number_of_sections: angular
                    .number_of_sections
                    .unwrap_or(defaults.number_of_sections),
            });
        }

        builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = parser::parse_key_value(kv_pair).ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            match key {
                "architecture" => self.architecture = Some(value.to_string()),
                "cutoff-radius" => self.cutoff_radius = Some(value.to_string()),
                "min-distance" => self.min_distance = Some(value.to_string()),
                "radial-basis-family" => self.radial_basis_family = Some(value.to_string()),
                "pair-mode" => self.pair_mode = Some(value.to_string()),
                "number-of-radial-basis-functions" => {
                    self.number_of_radial_basis_functions = Some(parse_setting(key, value)?)
                }
                "number-of-interaction-blocks" => {
                    self.number_of_interaction_blocks = Some(parse_setting(key, value)?)
                }
                "trainable-basis" => self.trainable_basis = Some(parse_setting(key, value)?),
                "number-of-atom-features" => {
                    self.number_of_atom_features = Some(parse_setting(key, value)?)
                }
                "number-of-filters" => self.number_of_filters = Some(parse_setting(key, value)?),
                "number-of-attention-heads" => {
                    self.number_of_attention_heads = Some(parse_setting(key, value)?)
                }
                "max-atomic-number" => self.max_atomic_number = Some(parse_setting(key, value)?),
                "angular.cutoff-radius" => {
                    self.angular.get_or_insert_with(Default::default).cutoff_radius =
                        Some(value.to_string())
                }
                "angular.number-of-shells" => {
                    self.angular
                        .get_or_insert_with(Default::default)
                        .number_of_shells = Some(parse_setting(key, value)?)
                }
                "angular.number-of-sections" => {
                    self.angular
                        .get_or_insert_with(Default::default)
                        .number_of_sections = Some(parse_setting(key, value)?)
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unknown configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use nnpforge::core::pairs::enumerate::PairMode;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config_file(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("model.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn evaluate_args(config_path: &Path, extra: &[&str]) -> EvaluateArgs {
        let mut argv = vec![
            "nnpforge".to_string(),
            "evaluate".to_string(),
            "-i".to_string(),
            "batch.csv".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Evaluate(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn resolve(content: &str, extra: &[&str]) -> Result<PotentialConfig> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config_file(&dir, content);
        let args = evaluate_args(&path, extra);
        PartialPotentialConfig::from_file(&path)?.merge_with_cli(&args)
    }

    #[test]
    fn file_values_override_architecture_defaults() {
        let config = resolve(
            r#"
            architecture = "schnet"
            cutoff-radius = "0.6 nm"
            radial-basis-family = "exp-normal"
            number-of-radial-basis-functions = 8
            number-of-interaction-blocks = 2
            number-of-atom-features = 16
            trainable-basis = true
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(config.architecture, Architecture::SchNet);
        assert_eq!(config.cutoff_radius, Length::nanometers(0.6));
        assert_eq!(config.radial_basis_family, RadialBasisFamily::ExpNormal);
        assert_eq!(config.number_of_radial_basis_functions, 8);
        assert_eq!(config.number_of_interaction_blocks, 2);
        assert_eq!(config.number_of_atom_features, 16);
        assert!(config.trainable_basis);
        assert_eq!(config.pair_mode, PairMode::All);
    }

    #[test]
    fn command_line_overrides_file_and_set_values() {
        let config = resolve(
            r#"
            architecture = "schnet"
            cutoff-radius = "0.6 nm"
            "#,
            &[
                "--architecture",
                "painn",
                "--cutoff",
                "0.4 nm",
                "-S",
                "number-of-interaction-blocks=5",
                "cutoff-radius=0.3 nm",
            ],
        )
        .unwrap();

        assert_eq!(config.architecture, Architecture::PaiNN);
        assert_eq!(config.cutoff_radius, Length::nanometers(0.4));
        assert_eq!(config.number_of_interaction_blocks, 5);
    }

    #[test]
    fn ani_section_resolves_species_and_angular_settings() {
        let config = resolve(
            r#"
            architecture = "ani"
            species = ["H", "C", "O"]

            [angular]
            cutoff-radius = "0.3 nm"
            number-of-shells = 4
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(config.architecture, Architecture::Ani);
        assert_eq!(config.pair_mode, PairMode::Unique);
        assert_eq!(config.species, vec![1, 6, 8]);
        assert_eq!(config.angular.cutoff_radius, Length::nanometers(0.3));
        assert_eq!(config.angular.number_of_shells, 4);
        assert_eq!(
            config.angular.number_of_sections,
            AngularConfig::default().number_of_sections
        );
    }

    #[test]
    fn missing_architecture_is_a_config_error() {
        let result = resolve("cutoff-radius = \"0.5 nm\"", &[]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn unknown_key_in_file_is_a_parse_error() {
        let result = resolve("architecture = \"schnet\"\nlearning-rate = 0.1", &[]);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn invalid_set_values_are_rejected() {
        for set in [
            "number-of-interaction-blocks",
            "number-of-interaction-blocks=three",
            "optimizer=adam",
        ] {
            let result = resolve("architecture = \"schnet\"", &["-S", set]);
            assert!(matches!(result, Err(CliError::Config(_))), "{set}");
        }
    }

    #[test]
    fn validation_errors_surface_as_config_errors() {
        let result = resolve(
            "architecture = \"attention\"\ncutoff-radius = \"-0.5 nm\"",
            &[],
        );
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn unknown_species_symbol_is_rejected() {
        let result = resolve("architecture = \"ani\"\nspecies = [\"H\", \"Xx\"]", &[]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let result = PartialPotentialConfig::from_file(Path::new("/nonexistent/model.toml"));
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}
