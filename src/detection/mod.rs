//! Package-manager detection and executable lookup.
//!
//! - [`PackageManagerDetector`]: version query, directory scan, then
//!   PATH reload and retry
//! - [`find_executable_in`]: executable lookup over explicit directories
//! - [`parse_version`]: regex-based version extraction from command output

mod package_manager;
mod parser;
mod path_finder;

pub use package_manager::{Detection, DetectionStatus, PackageManagerDetector};
pub use parser::{parse_version, VersionParseError};
pub use path_finder::find_executable_in;
