//! Access to the OS-level environment stores.
//!
//! Everything the provisioning core needs from the host goes through the
//! [`PlatformEnvironment`] trait: the two persistent environment stores
//! (machine and user scope), the environment-change notification, token
//! expansion, and the current process's own `PATH`.
//!
//! Two implementations ship with the crate:
//!
//! - `WindowsEnvironment` (Windows only) backed by the registry and
//!   `WM_SETTINGCHANGE`
//! - [`InMemoryEnvironment`] for tests and for exercising the pipeline on
//!   hosts without a registry

mod memory;
#[cfg(windows)]
mod windows;

pub use memory::InMemoryEnvironment;
#[cfg(windows)]
pub use self::windows::WindowsEnvironment;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which persistent environment store a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// `HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Session Manager\Environment`.
    ///
    /// Writes require an elevated process.
    Machine,
    /// `HKEY_CURRENT_USER\Environment`.
    User,
}

impl Scope {
    /// Name used by PowerShell's `[Environment]` API for this scope.
    pub fn dotnet_target(&self) -> &'static str {
        match self {
            Self::Machine => "Machine",
            Self::User => "User",
        }
    }

    /// PowerShell registry-provider path of the scope's environment key.
    pub fn provider_key(&self) -> &'static str {
        match self {
            Self::Machine => {
                r"HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Environment"
            }
            Self::User => r"HKCU:\Environment",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Machine => f.write_str("machine"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Storage type of an environment value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// `REG_SZ`: stored and read back literally.
    Plain,
    /// `REG_EXPAND_SZ`: `%VAR%` tokens are expanded by consumers at read time.
    Expandable,
}

/// Errors raised by a [`PlatformEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// The store rejected the write (machine scope without elevation).
    #[error("permission denied writing {scope} environment: {message}")]
    PermissionDenied {
        /// Store the write targeted.
        scope: Scope,
        /// OS message.
        message: String,
    },

    /// Any other OS failure.
    #[error("{scope} environment access failed: {message}")]
    Io {
        /// Store being accessed.
        scope: Scope,
        /// OS message.
        message: String,
    },
}

impl PlatformError {
    /// Whether this is the distinguishable permission condition.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// The host environment as seen by the provisioning core.
///
/// Implementations hold no cached view of the stores: every read goes to
/// the backing store so callers always see the latest persisted state.
pub trait PlatformEnvironment: Send + Sync {
    /// Read a named value from a store. `Ok(None)` if the value is absent.
    fn read_value(&self, scope: Scope, name: &str) -> Result<Option<String>, PlatformError>;

    /// Replace a named value in a store.
    fn write_value(
        &self,
        scope: Scope,
        name: &str,
        value: &str,
        kind: ValueKind,
    ) -> Result<(), PlatformError>;

    /// Delete a named value. Returns `false` if it did not exist.
    fn delete_value(&self, scope: Scope, name: &str) -> Result<bool, PlatformError>;

    /// Blocking "environment changed" notification to all top-level windows.
    ///
    /// Must give up on hung receivers. Returns `true` if the OS reported
    /// the message delivered.
    fn send_change_notification(&self, timeout: Duration) -> bool;

    /// Non-blocking "environment changed" notification. Returns `true` if
    /// the message was queued.
    fn post_change_notification(&self) -> bool;

    /// Expand `%VAR%` tokens using this environment's variables.
    fn expand_tokens(&self, value: &str) -> String;

    /// The current process's in-memory `PATH`.
    fn process_path(&self) -> Option<String>;

    /// Overwrite the current process's in-memory `PATH`.
    fn set_process_path(&self, value: &str);
}
