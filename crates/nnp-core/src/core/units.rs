use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LengthUnit {
    #[default]
    Nanometer,
    Angstrom,
}

impl LengthUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Nanometer => "nm",
            LengthUnit::Angstrom => "Å",
        }
    }

    fn nanometers_per_unit(self) -> f64 {
        match self {
            LengthUnit::Nanometer => 1.0,
            LengthUnit::Angstrom => 0.1,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for LengthUnit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nm" | "nanometer" | "nanometers" => Ok(LengthUnit::Nanometer),
            "a" | "å" | "ang" | "angstrom" | "angstroms" => Ok(LengthUnit::Angstrom),
            other => Err(UnitError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown length unit '{0}' (expected 'nm' or 'angstrom')")]
    UnknownUnit(String),

    #[error("Length '{0}' carries no unit")]
    MissingUnit(String),

    #[error("Invalid length value '{0}'")]
    InvalidValue(String),

    #[error("{quantity} must be given in {expected}, found {found}")]
    Mismatch {
        quantity: &'static str,
        expected: LengthUnit,
        found: LengthUnit,
    },
}

/// A length tagged with its unit.
///
/// The numeric core works in nanometers only and never rescales on its own: a length in any other
/// unit is rejected by [`Length::require_nanometer`] until the caller converts it explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub fn new(value: f64, unit: LengthUnit) -> Self {
        Self { value, unit }
    }

    pub fn nanometers(value: f64) -> Self {
        Self::new(value, LengthUnit::Nanometer)
    }

    pub fn angstroms(value: f64) -> Self {
        Self::new(value, LengthUnit::Angstrom)
    }

    pub fn to_nanometer(self) -> Self {
        Self::nanometers(self.value * self.unit.nanometers_per_unit())
    }

    pub fn require_nanometer(self, quantity: &'static str) -> Result<f64, UnitError> {
        if self.unit != LengthUnit::Nanometer {
            return Err(UnitError::Mismatch {
                quantity,
                expected: LengthUnit::Nanometer,
                found: self.unit,
            });
        }
        Ok(self.value)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

impl FromStr for Length {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = unit_start(trimmed)
            .ok_or_else(|| UnitError::MissingUnit(trimmed.to_string()))?;
        let (number, unit) = trimmed.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| UnitError::InvalidValue(trimmed.to_string()))?;
        Ok(Self::new(value, unit.parse()?))
    }
}

// An exponent marker ('e' followed by a digit or sign) belongs to the number, not the unit.
fn unit_start(s: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    chars.iter().enumerate().find_map(|(k, &(offset, c))| {
        if !c.is_alphabetic() {
            return None;
        }
        let is_exponent = matches!(c, 'e' | 'E')
            && chars
                .get(k + 1)
                .is_some_and(|&(_, next)| next.is_ascii_digit() || next == '-' || next == '+');
        (!is_exponent).then_some(offset)
    })
}
