//! Feedforward neural network with resilient backpropagation (Rprop) training

mod net;
mod trainer;

pub use net::*;
pub use trainer::*;
