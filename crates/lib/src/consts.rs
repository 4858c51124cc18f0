//! Constants shared across the crate.

pub const APP_NAME: &str = "pipewright";

/// Default name of the workspace configuration file.
pub const CONFIG_FILENAME: &str = "pipewright.toml";

/// Marker file written into a capsule once it is fully materialized.
pub const CAPSULE_MARKER: &str = ".pipewright-capsule";

/// Format version written into new capsule markers.
pub const CAPSULE_MARKER_VERSION: u32 = 1;

/// Environment variable overriding the capsule root directory.
pub const CAPSULES_DIR_ENV: &str = "PIPEWRIGHT_CAPSULES";

/// Number of hex characters of the component-id hash used in capsule directory names.
pub const CAPSULE_HASH_PREFIX_LEN: usize = 12;
