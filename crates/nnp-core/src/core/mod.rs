//! # Core Module
//!
//! Stateless building blocks shared by every potential architecture.
//!
//! ## Overview
//!
//! Everything in this module is a pure function of its inputs: batches are validated once at
//! construction and never mutated, pair lists are recomputed for every forward pass, and every
//! scatter-reduction allocates a fresh accumulator.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Batches of molecules, the element table, dataset statistics
//! - **Units** ([`units`]) - Explicit length units; the numerics only accept nanometers
//! - **Pairs** ([`pairs`]) - Same-molecule pair enumeration, displacement geometry, triples
//! - **Features** ([`features`]) - Cutoff envelope, radial and angular featurizers
//! - **Operations** ([`ops`]) - Scatter-reductions and activations missing from the tensor backend
//! - **Regression** ([`regression`]) - Least-squares fit of per-element self energies

pub mod features;
pub mod models;
pub mod ops;
pub mod pairs;
pub mod regression;
pub mod units;
