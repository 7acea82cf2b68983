//! # Workflows Module
//!
//! High-level entry points that combine the engine's building blocks into complete procedures.
//!
//! ## Overview
//!
//! Workflows validate their inputs, report progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) and return plain Rust values
//! (energies, force vectors, statistics) instead of tensors.
//!
//! ## Architecture
//!
//! - **Evaluation** ([`evaluate`]) - Energies, optional forces and pair counts for a batch,
//!   processed in independent chunks of molecules
//! - **Self-Energy Fitting** ([`self_energy`]) - Least-squares per-element reference energies from
//!   labelled molecules, packaged as dataset statistics

pub mod evaluate;
pub mod self_energy;
