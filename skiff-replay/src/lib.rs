//! Library side of the `skiff-replay` diagnostic tool.

pub mod config;
pub mod trace;
