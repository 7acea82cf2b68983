//! # Features Module
//!
//! Maps pair distances (and, for triples, angles) to fixed-width feature vectors.
//!
//! ## Overview
//!
//! Every featurizer here depends on distances and angles only, which makes the resulting
//! features invariant under rotation, translation and reflection by construction. All outputs
//! are meant to be gated by the [`cutoff::CosineCutoff`] envelope before use.
//!
//! - [`cutoff`] - Smooth cosine envelope, zero at and beyond the cutoff radius
//! - [`radial`] - Interchangeable radial basis families with optional trainable parameters
//! - [`angular`] - ANI-style sectioned angular symmetry functions

pub mod angular;
pub mod cutoff;
pub mod radial;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BasisError {
    #[error("Cutoff radius must be positive and finite, got {0}")]
    InvalidCutoff(f64),

    #[error("{family} basis needs at least {minimum} functions, got {found}")]
    TooFewFunctions {
        family: &'static str,
        minimum: usize,
        found: usize,
    },

    #[error("Invalid basis range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("Failed to allocate basis parameters: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub(crate) fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|k| if k == n - 1 { end } else { start + step * k as f64 })
                .collect()
        }
    }
}
