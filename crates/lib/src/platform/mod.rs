//! Platform-specific directory resolution.

pub mod paths;
