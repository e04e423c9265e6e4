use std::fmt;

use serde::Serialize;

/// Build metadata stamped into a binary at compile time.
///
/// Fields are populated from each crate's `build.rs` and fall back to
/// `"unknown"` when a stamp is unavailable, e.g. building from a source
/// tarball without git history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub package: &'static str,
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.package, self.version)?;
        writeln!(f, "profile: {}", self.build_profile)?;
        writeln!(f, "built:   {}", self.build_timestamp)?;
        write!(f, "rustc:   {}", self.rust_version)
    }
}

/// Captures the calling crate's build stamps.
///
/// Expands at the call site so every binary reports its own package name
/// and `build.rs` output rather than this crate's.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            package: env!("CARGO_PKG_NAME"),
            version: option_env!("REPO_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")),
            build_profile: option_env!("BUILD_PROFILE").unwrap_or("unknown"),
            build_timestamp: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            rust_version: option_env!("RUST_VERSION").unwrap_or("unknown"),
        }
    };
}

/// Build stamps for this crate.
pub fn build_info() -> BuildInfo {
    crate::build_info!()
}
