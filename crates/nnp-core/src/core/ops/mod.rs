//! # Operations Module
//!
//! Tensor operations the network needs beyond what the tensor backend offers directly.
//!
//! - [`scatter`] - Scatter-add, weighted receiver-wise softmax and mean, atom-to-molecule reduction
//! - [`activation`] - Shifted softplus

pub mod activation;
pub mod scatter;
