//! # Engine Module
//!
//! The stateful half of the library: a configured potential with its trainable parameters and
//! the shared pipeline that turns a batch of molecules into energies and forces.
//!
//! ## Overview
//!
//! Every architecture runs the same skeleton: enumerate pairs, featurize them, apply a stack of
//! interaction blocks to an atomic-number embedding, read out per-atom energies, reduce them per
//! molecule and rescale. Architectures differ only in the [`interaction::InteractionBlock`] or
//! [`representation::Representation`] they plug in.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated potential settings and their builder
//! - **Context** ([`context`]) - Explicit per-call execution context (device)
//! - **Error Handling** ([`error`]) - The error type every fallible engine call returns
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events for workflows
//! - **Interaction Blocks** ([`interaction`]) - SchNet, PaiNN and attention message passing
//! - **Representations** ([`representation`]) - Message-passing stack and ANI environment vectors
//! - **Readout** ([`readout`]) - Per-atom energy head
//! - **Postprocessing** ([`postprocessing`]) - Energy rescaling and self-energy correction
//! - **Potential** ([`potential`]) - The assembled model: forward pass and forces

pub mod config;
pub mod context;
pub mod error;
pub mod interaction;
pub mod postprocessing;
pub mod potential;
pub mod progress;
pub mod readout;
pub mod representation;
