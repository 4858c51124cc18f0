//! Shared utilities.
//!
//! Hashing helpers used for capsule identity and source fingerprints.

pub mod hash;
