//! # Pairs Module
//!
//! Pair enumeration and the geometry derived from it.
//!
//! ## Overview
//!
//! Pairs are only ever generated inside one molecule: the enumerator walks each molecule's own
//! atoms, so a cross-molecule pair cannot be produced. Distances used for cutoff filtering are
//! plain `f64` values; the differentiable geometry fed to the network is rebuilt from the
//! position tensor in [`geometry`].
//!
//! - [`enumerate`] - `PairList`, ALL/UNIQUE modes, cutoff filtering
//! - [`geometry`] - Displacements, distances and unit directions with ε-guards
//! - [`triples`] - Bond pairs sharing a central atom, for angular features

pub mod enumerate;
pub mod geometry;
pub mod triples;
