//! Core of an interactive teaching demo: a user paints a two-color image,
//! points sampled from it on a regular grid become training data, and a small
//! feed-forward network learns to reproduce the painted pattern via resilient
//! backpropagation. Rendering the trained network back into an image is one
//! `propagate` call per pixel.

pub mod feedforward;
pub mod grid;
pub mod session;
