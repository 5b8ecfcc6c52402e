//! Threat Module
//!
//! Separates actionable alerts from known-benign noise.

pub mod classifier;

pub use classifier::NoiseFilter;
