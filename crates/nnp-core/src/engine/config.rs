use crate::core::features::radial::RadialBasisFamily;
use crate::core::models::elements::{self, MAX_ATOMIC_NUMBER};
use crate::core::pairs::enumerate::PairMode;
use crate::core::units::Length;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        parameter,
        reason: reason.into(),
    }
}

/// Elements of the ANI-2x model family, in its species order.
pub const ANI_SPECIES: [u8; 7] = [1, 6, 7, 8, 16, 9, 17];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Continuous-filter convolutions on the scalar channel.
    SchNet,
    /// Scalar and vector channels with equivariant message passing and mixing.
    PaiNN,
    /// Receiver-normalized multi-head attention over cutoff-gated edges.
    Attention,
    /// Species-resolved radial and angular environment vectors, no message passing.
    Ani,
}

impl Architecture {
    pub fn name(self) -> &'static str {
        match self {
            Architecture::SchNet => "schnet",
            Architecture::PaiNN => "painn",
            Architecture::Attention => "attention",
            Architecture::Ani => "ani",
        }
    }

    pub fn default_pair_mode(self) -> PairMode {
        match self {
            Architecture::Ani => PairMode::Unique,
            _ => PairMode::All,
        }
    }

    pub fn default_radial_basis(self) -> RadialBasisFamily {
        match self {
            Architecture::SchNet | Architecture::PaiNN => RadialBasisFamily::Gaussian,
            Architecture::Attention => RadialBasisFamily::ExpNormal,
            Architecture::Ani => RadialBasisFamily::AniGaussian,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "schnet" => Ok(Architecture::SchNet),
            "painn" => Ok(Architecture::PaiNN),
            "attention" | "sake" => Ok(Architecture::Attention),
            "ani" | "ani2x" => Ok(Architecture::Ani),
            other => Err(invalid(
                "architecture",
                format!("unknown architecture '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AngularConfig {
    pub cutoff_radius: Length,
    pub number_of_shells: usize,
    pub number_of_sections: usize,
}

impl Default for AngularConfig {
    fn default() -> Self {
        Self {
            cutoff_radius: Length::nanometers(0.35),
            number_of_shells: 8,
            number_of_sections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PotentialConfig {
    pub architecture: Architecture,
    pub cutoff_radius: Length,
    pub min_distance: Length,
    pub radial_basis_family: RadialBasisFamily,
    pub number_of_radial_basis_functions: usize,
    pub number_of_interaction_blocks: usize,
    pub pair_mode: PairMode,
    pub trainable_basis: bool,
    pub number_of_atom_features: usize,
    pub number_of_filters: usize,
    pub number_of_attention_heads: usize,
    pub max_atomic_number: u8,
    pub angular: AngularConfig,
    pub species: Vec<u8>,
}

#[derive(Default, Debug, Clone)]
pub struct PotentialConfigBuilder {
    architecture: Option<Architecture>,
    cutoff_radius: Option<Length>,
    min_distance: Option<Length>,
    radial_basis_family: Option<RadialBasisFamily>,
    number_of_radial_basis_functions: Option<usize>,
    number_of_interaction_blocks: Option<usize>,
    pair_mode: Option<PairMode>,
    trainable_basis: Option<bool>,
    number_of_atom_features: Option<usize>,
    number_of_filters: Option<usize>,
    number_of_attention_heads: Option<usize>,
    max_atomic_number: Option<u8>,
    angular: Option<AngularConfig>,
    species: Option<Vec<u8>>,
}

impl PotentialConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-filled with the published defaults of an architecture.
    pub fn for_architecture(architecture: Architecture) -> Self {
        let builder = Self::new().architecture(architecture);
        match architecture {
            Architecture::SchNet | Architecture::PaiNN => builder
                .cutoff_radius(Length::nanometers(0.5))
                .number_of_radial_basis_functions(16)
                .number_of_interaction_blocks(3)
                .number_of_atom_features(32),
            Architecture::Attention => builder
                .cutoff_radius(Length::nanometers(0.5))
                .number_of_radial_basis_functions(16)
                .number_of_interaction_blocks(3)
                .number_of_atom_features(32)
                .number_of_attention_heads(4),
            Architecture::Ani => builder
                .cutoff_radius(Length::nanometers(0.53))
                .min_distance(Length::nanometers(0.08))
                .number_of_radial_basis_functions(16)
                .number_of_interaction_blocks(0)
                .number_of_atom_features(64)
                .angular(AngularConfig::default())
                .species(ANI_SPECIES.to_vec()),
        }
    }

    pub fn architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = Some(architecture);
        self
    }
    pub fn cutoff_radius(mut self, cutoff: Length) -> Self {
        self.cutoff_radius = Some(cutoff);
        self
    }
    pub fn min_distance(mut self, distance: Length) -> Self {
        self.min_distance = Some(distance);
        self
    }
    pub fn radial_basis_family(mut self, family: RadialBasisFamily) -> Self {
        self.radial_basis_family = Some(family);
        self
    }
    pub fn number_of_radial_basis_functions(mut self, n: usize) -> Self {
        self.number_of_radial_basis_functions = Some(n);
        self
    }
    pub fn number_of_interaction_blocks(mut self, n: usize) -> Self {
        self.number_of_interaction_blocks = Some(n);
        self
    }
    pub fn pair_mode(mut self, mode: PairMode) -> Self {
        self.pair_mode = Some(mode);
        self
    }
    pub fn trainable_basis(mut self, trainable: bool) -> Self {
        self.trainable_basis = Some(trainable);
        self
    }
    pub fn number_of_atom_features(mut self, n: usize) -> Self {
        self.number_of_atom_features = Some(n);
        self
    }
    pub fn number_of_filters(mut self, n: usize) -> Self {
        self.number_of_filters = Some(n);
        self
    }
    pub fn number_of_attention_heads(mut self, n: usize) -> Self {
        self.number_of_attention_heads = Some(n);
        self
    }
    pub fn max_atomic_number(mut self, z: u8) -> Self {
        self.max_atomic_number = Some(z);
        self
    }
    pub fn angular(mut self, angular: AngularConfig) -> Self {
        self.angular = Some(angular);
        self
    }
    pub fn species(mut self, species: Vec<u8>) -> Self {
        self.species = Some(species);
        self
    }

    pub fn build(self) -> Result<PotentialConfig, ConfigError> {
        let architecture = self
            .architecture
            .ok_or(ConfigError::MissingParameter("architecture"))?;
        let number_of_atom_features = self
            .number_of_atom_features
            .ok_or(ConfigError::MissingParameter("number_of_atom_features"))?;

        let config = PotentialConfig {
            architecture,
            cutoff_radius: self
                .cutoff_radius
                .ok_or(ConfigError::MissingParameter("cutoff_radius"))?,
            min_distance: self.min_distance.unwrap_or(Length::nanometers(0.0)),
            radial_basis_family: self
                .radial_basis_family
                .unwrap_or(architecture.default_radial_basis()),
            number_of_radial_basis_functions: self
                .number_of_radial_basis_functions
                .ok_or(ConfigError::MissingParameter(
                    "number_of_radial_basis_functions",
                ))?,
            number_of_interaction_blocks: self
                .number_of_interaction_blocks
                .ok_or(ConfigError::MissingParameter("number_of_interaction_blocks"))?,
            pair_mode: self.pair_mode.unwrap_or(architecture.default_pair_mode()),
            trainable_basis: self.trainable_basis.unwrap_or(false),
            number_of_atom_features,
            number_of_filters: self.number_of_filters.unwrap_or(number_of_atom_features),
            number_of_attention_heads: self.number_of_attention_heads.unwrap_or(1),
            max_atomic_number: self.max_atomic_number.unwrap_or(MAX_ATOMIC_NUMBER),
            angular: self.angular.unwrap_or_default(),
            species: self.species.unwrap_or_else(|| ANI_SPECIES.to_vec()),
        };
        config.validate()?;
        Ok(config)
    }
}

impl PotentialConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let cutoff = self.cutoff_radius.to_nanometer().value;
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(invalid("cutoff_radius", "must be positive and finite"));
        }
        let min_distance = self.min_distance.to_nanometer().value;
        if !min_distance.is_finite() || min_distance < 0.0 || min_distance >= cutoff {
            return Err(invalid(
                "min_distance",
                "must be non-negative and below the cutoff radius",
            ));
        }
        for (parameter, value) in [
            (
                "number_of_radial_basis_functions",
                self.number_of_radial_basis_functions,
            ),
            ("number_of_atom_features", self.number_of_atom_features),
            ("number_of_filters", self.number_of_filters),
            ("number_of_attention_heads", self.number_of_attention_heads),
        ] {
            if value == 0 {
                return Err(invalid(parameter, "must be at least 1"));
            }
        }
        if !elements::is_valid_atomic_number(self.max_atomic_number) {
            return Err(invalid(
                "max_atomic_number",
                format!("must lie in 1..={MAX_ATOMIC_NUMBER}"),
            ));
        }

        match self.architecture {
            Architecture::Ani => self.validate_ani(cutoff),
            _ if self.number_of_interaction_blocks == 0 => Err(invalid(
                "number_of_interaction_blocks",
                "message-passing architectures need at least one block",
            )),
            _ => Ok(()),
        }
    }

    fn validate_ani(&self, cutoff: f64) -> Result<(), ConfigError> {
        if self.number_of_interaction_blocks != 0 {
            return Err(invalid(
                "number_of_interaction_blocks",
                "the ANI representation has no interaction blocks",
            ));
        }
        let angular_cutoff = self.angular.cutoff_radius.to_nanometer().value;
        if !angular_cutoff.is_finite() || angular_cutoff <= 0.0 || angular_cutoff > cutoff {
            return Err(invalid(
                "angular.cutoff_radius",
                "must be positive and not exceed the radial cutoff",
            ));
        }
        if self.species.is_empty() {
            return Err(invalid("species", "at least one element is required"));
        }
        for (k, &z) in self.species.iter().enumerate() {
            if !elements::is_valid_atomic_number(z) {
                return Err(invalid("species", format!("invalid atomic number {z}")));
            }
            if self.species[..k].contains(&z) {
                return Err(invalid("species", format!("element {z} listed twice")));
            }
        }
        Ok(())
    }
}
