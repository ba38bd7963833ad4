//! Version output parsing with regex extraction.

use regex::Regex;
use semver::Version;
use std::sync::OnceLock;
use thiserror::Error;

/// Output did not contain a `major.minor.patch` version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no semantic version in {0:?}")]
pub struct VersionParseError(pub String);

/// Parse a semantic version from version-command output.
///
/// Extracts the first `major.minor.patch` triple, so all of these work:
///
/// - `v20.11.0` -> 20.11.0
/// - `git version 2.45.1.windows.1` -> 2.45.1
/// - `Chocolatey v2.2.2` -> 2.2.2
/// - `1.0.72 (Claude Code)` -> 1.0.72
pub fn parse_version(output: &str) -> Result<Version, VersionParseError> {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let re = VERSION.get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("Invalid regex pattern"));

    re.find(output)
        .and_then(|m| Version::parse(m.as_str()).ok())
        .ok_or_else(|| VersionParseError(output.trim().to_string()))
}
