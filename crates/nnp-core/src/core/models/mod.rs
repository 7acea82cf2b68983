//! # Data Models
//!
//! Plain data carried into and out of a forward pass.
//!
//! - [`batch`] - `AtomSystemBatch`, the flat arena of atoms grouped into molecules
//! - [`elements`] - Compile-time element symbol table
//! - [`statistics`] - Energy scaling and per-element self energies for a dataset

pub mod batch;
pub mod elements;
pub mod statistics;
