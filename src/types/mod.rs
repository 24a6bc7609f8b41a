//! Shared support types for the estimation core.

pub mod linalg;
