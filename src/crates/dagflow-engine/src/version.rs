// Version information module for dagflow-engine
//
// Provides version constants for the engine crate

/// Version string for the engine crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Build timestamp (if available)
pub const BUILD_TIMESTAMP: &str = "unknown";
