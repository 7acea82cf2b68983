use super::config::ConfigError;
use crate::core::features::BasisError;
use crate::core::models::batch::BatchError;
use crate::core::models::statistics::StatisticsError;
use crate::core::pairs::enumerate::{PairMode, PairModeMismatch};
use crate::core::regression::RegressionError;
use crate::core::units::UnitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PotentialError {
    #[error("Invalid batch: {0}")]
    Batch(#[from] BatchError),

    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Featurizer setup failed: {0}")]
    Basis(#[from] BasisError),

    #[error("Invalid dataset statistics: {0}")]
    Statistics(#[from] StatisticsError),

    #[error("Self-energy regression failed: {0}")]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    PairList(#[from] PairModeMismatch),

    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("'{component}' expects '{expected}' pairs but the potential is configured for '{configured}'")]
    PairModeMismatch {
        component: &'static str,
        expected: PairMode,
        configured: PairMode,
    },

    #[error("Element with atomic number {atomic_number} is not supported by this potential")]
    UnsupportedElement { atomic_number: u8 },

    #[error("Tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),
}
