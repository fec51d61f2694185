pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for generated fragment names:
///     __{timestamp_micros}
///
pub const FRAGMENT_NAME_PREFIX: &str = "__";
