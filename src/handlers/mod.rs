//! HTTP handlers

pub mod health;
pub mod alerts;
pub mod blocks;
pub mod stats;
