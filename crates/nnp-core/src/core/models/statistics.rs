use super::elements;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to serialize dataset statistics: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unknown element symbol '{0}' in self-energy table")]
    UnknownElement(String),
    #[error("Invalid atomic number {0} in self-energy table")]
    InvalidAtomicNumber(u8),
    #[error("Invalid value {value} for '{field}'")]
    InvalidScaling { field: &'static str, value: f64 },
}

/// Reference energy per element, keyed by atomic number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicSelfEnergies {
    energies: BTreeMap<u8, f64>,
}

impl AtomicSelfEnergies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, atomic_number: u8, energy: f64) -> Result<(), StatisticsError> {
        if !elements::is_valid_atomic_number(atomic_number) {
            return Err(StatisticsError::InvalidAtomicNumber(atomic_number));
        }
        self.energies.insert(atomic_number, energy);
        Ok(())
    }

    pub fn get(&self, atomic_number: u8) -> Option<f64> {
        self.energies.get(&atomic_number).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        self.energies.iter().map(|(&z, &e)| (z, e))
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    /// Dense table indexed directly by atomic number; elements without an entry map to zero.
    pub fn lookup_table(&self) -> Vec<f64> {
        let mut table = vec![0.0; usize::from(elements::MAX_ATOMIC_NUMBER) + 1];
        for (z, e) in self.iter() {
            table[usize::from(z)] = e;
        }
        table
    }

    pub fn from_symbols<'a>(
        entries: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, StatisticsError> {
        let mut table = Self::new();
        for (symbol, energy) in entries {
            let z = elements::atomic_number(symbol)
                .ok_or_else(|| StatisticsError::UnknownElement(symbol.to_string()))?;
            table.insert(z, energy)?;
        }
        Ok(table)
    }

    fn to_symbols(&self) -> BTreeMap<String, f64> {
        self.iter()
            .filter_map(|(z, e)| elements::symbol(z).map(|s| (s.to_string(), e)))
            .collect()
    }
}

impl FromIterator<(u8, f64)> for AtomicSelfEnergies {
    fn from_iter<I: IntoIterator<Item = (u8, f64)>>(iter: I) -> Self {
        Self {
            energies: iter
                .into_iter()
                .filter(|&(z, _)| elements::is_valid_atomic_number(z))
                .collect(),
        }
    }
}

/// Dataset-level constants injected into a potential: `E = raw * stddev + mean + Σ self energies`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatistics {
    pub scaling_mean: f64,
    pub scaling_stddev: f64,
    pub atomic_self_energies: AtomicSelfEnergies,
}

impl Default for DatasetStatistics {
    fn default() -> Self {
        Self {
            scaling_mean: 0.0,
            scaling_stddev: 1.0,
            atomic_self_energies: AtomicSelfEnergies::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct StatisticsFile {
    #[serde(default)]
    scaling_mean: f64,
    #[serde(default = "unit_stddev")]
    scaling_stddev: f64,
    #[serde(default)]
    self_energies: BTreeMap<String, f64>,
}

fn unit_stddev() -> f64 {
    1.0
}

impl DatasetStatistics {
    pub fn validate(&self) -> Result<(), StatisticsError> {
        if !self.scaling_mean.is_finite() {
            return Err(StatisticsError::InvalidScaling {
                field: "scaling-mean",
                value: self.scaling_mean,
            });
        }
        if !self.scaling_stddev.is_finite() || self.scaling_stddev == 0.0 {
            return Err(StatisticsError::InvalidScaling {
                field: "scaling-stddev",
                value: self.scaling_stddev,
            });
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StatisticsError> {
        let content = std::fs::read_to_string(path).map_err(|e| StatisticsError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: StatisticsFile = toml::from_str(&content).map_err(|e| StatisticsError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let statistics = Self {
            scaling_mean: file.scaling_mean,
            scaling_stddev: file.scaling_stddev,
            atomic_self_energies: AtomicSelfEnergies::from_symbols(
                file.self_energies.iter().map(|(s, &e)| (s.as_str(), e)),
            )?,
        };
        statistics.validate()?;
        Ok(statistics)
    }

    pub fn to_toml_string(&self) -> Result<String, StatisticsError> {
        let file = StatisticsFile {
            scaling_mean: self.scaling_mean,
            scaling_stddev: self.scaling_stddev,
            self_energies: self.atomic_self_energies.to_symbols(),
        };
        Ok(toml::to_string(&file)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StatisticsError> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| StatisticsError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn load_reads_scaling_and_self_energies_by_symbol() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.toml");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            scaling-mean = -0.5
            scaling-stddev = 2.0

            [self-energies]
            H = -1313.4
            C = -99366.7
            "#
        )
        .unwrap();

        let stats = DatasetStatistics::load(&path).unwrap();
        assert_eq!(stats.scaling_mean, -0.5);
        assert_eq!(stats.scaling_stddev, 2.0);
        assert_eq!(stats.atomic_self_energies.get(1), Some(-1313.4));
        assert_eq!(stats.atomic_self_energies.get(6), Some(-99366.7));
        assert_eq!(stats.atomic_self_energies.len(), 2);
    }

    #[test]
    fn missing_scaling_keys_fall_back_to_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.toml");
        std::fs::write(&path, "[self-energies]\nO = -4.0\n").unwrap();

        let stats = DatasetStatistics::load(&path).unwrap();
        assert_eq!(stats.scaling_mean, 0.0);
        assert_eq!(stats.scaling_stddev, 1.0);
    }

    #[test]
    fn load_rejects_unknown_elements_and_zero_stddev() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.toml");

        std::fs::write(&path, "[self-energies]\nQq = 1.0\n").unwrap();
        assert!(matches!(
            DatasetStatistics::load(&path),
            Err(StatisticsError::UnknownElement(s)) if s == "Qq"
        ));

        std::fs::write(&path, "scaling-stddev = 0.0\n").unwrap();
        assert!(matches!(
            DatasetStatistics::load(&path),
            Err(StatisticsError::InvalidScaling {
                field: "scaling-stddev",
                ..
            })
        ));
    }

    #[test]
    fn load_reports_io_and_toml_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            DatasetStatistics::load(&missing),
            Err(StatisticsError::Io { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "scaling-mean = \"not a number\"\n").unwrap();
        assert!(matches!(
            DatasetStatistics::load(&bad),
            Err(StatisticsError::Toml { .. })
        ));
    }

    #[test]
    fn saved_statistics_load_back_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.toml");
        let stats = DatasetStatistics {
            scaling_mean: 1.25,
            scaling_stddev: 0.5,
            atomic_self_energies: [(1, -0.5), (8, -75.0)].into_iter().collect(),
        };

        stats.save(&path).unwrap();
        let loaded = DatasetStatistics::load(&path).unwrap();
        assert_eq!(loaded, stats);
    }

    #[test]
    fn lookup_table_is_indexed_by_atomic_number() {
        let table: AtomicSelfEnergies = [(1, -0.5), (6, -38.0)].into_iter().collect();
        let lookup = table.lookup_table();
        assert_eq!(lookup.len(), 101);
        assert_eq!(lookup[1], -0.5);
        assert_eq!(lookup[6], -38.0);
        assert_eq!(lookup[7], 0.0);
    }
}
