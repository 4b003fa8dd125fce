use std::fmt;

/// Build metadata baked in by `build.rs`
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub repo_version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub target: &'static str,
    pub host: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        repo_version: env!("REPO_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        rust_version: env!("RUST_VERSION"),
        target: env!("BUILD_TARGET"),
        host: env!("BUILD_HOST"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hubkit {} ({})", self.version, self.repo_version)?;
        writeln!(f, "profile:  {}", self.build_profile)?;
        writeln!(f, "features: {}", self.build_features)?;
        writeln!(f, "built:    {}", self.build_timestamp)?;
        writeln!(f, "rustc:    {}", self.rust_version)?;
        write!(f, "target:   {} (host {})", self.target, self.host)
    }
}

pub fn report_build_info() {
    let build = build_info();

    tracing::debug!(
        version = build.version,
        repo_version = build.repo_version,
        build_profile = build.build_profile,
        features = build.build_features,
        rust_version = build.rust_version,
        "build info"
    );
}
