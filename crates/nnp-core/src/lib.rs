//! # nnpforge Core Library
//!
//! Batched message-passing neural network interatomic potentials: functions mapping atomic
//! positions and element types to per-molecule energies, and by reverse-mode differentiation
//! to per-atom forces.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the numerics stay testable
//! in isolation from the model that composes them.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`AtomSystemBatch`, `DatasetStatistics`),
//!   length units, pair enumeration, cutoff envelopes, radial and angular featurizers,
//!   scatter-reductions and the self-energy regression.
//!
//! - **[`engine`]: The Logic Core.** The stateful potential. It owns the trainable parameters,
//!   validates configuration, and drives the shared pipeline: embedding, interaction blocks,
//!   readout, reduction and rescaling. Interaction variants (SchNet, PaiNN, attention) plug into
//!   one block interface.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures such as evaluating energies and
//!   forces for a batch, or fitting per-element self energies from labelled molecules.

pub mod core;
pub mod engine;
pub mod workflows;
