//! In-memory environment stores.

use super::{PlatformEnvironment, PlatformError, Scope, ValueKind};
use crate::path::expand_with;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A [`PlatformEnvironment`] that keeps both stores in memory.
///
/// Value names are case-insensitive, like the registry. Writes to either
/// scope can be made to fail with `PermissionDenied`, and the two
/// notification channels can be made to report failure. Counters record
/// every mutation so tests can assert on side effects.
///
/// # Example
///
/// ```rust
/// use devtool_provision::{InMemoryEnvironment, PlatformEnvironment, Scope};
///
/// let env = InMemoryEnvironment::new()
///     .with_path(Scope::Machine, r"C:\Windows\system32;C:\Windows")
///     .with_variable("APPDATA", r"C:\Users\dev\AppData\Roaming");
///
/// assert_eq!(
///     env.expand_tokens(r"%APPDATA%\npm"),
///     r"C:\Users\dev\AppData\Roaming\npm"
/// );
/// assert_eq!(env.write_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEnvironment {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    values: HashMap<(Scope, String), (String, ValueKind)>,
    variables: HashMap<String, String>,
    process_path: Option<String>,
    machine_writable: bool,
    user_writable: bool,
    send_succeeds: bool,
    post_succeeds: bool,
    writes: usize,
    sends: usize,
    posts: usize,
    process_path_updates: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            variables: HashMap::new(),
            process_path: None,
            machine_writable: true,
            user_writable: true,
            send_succeeds: true,
            post_succeeds: true,
            writes: 0,
            sends: 0,
            posts: 0,
            process_path_updates: 0,
        }
    }
}

impl InMemoryEnvironment {
    /// Empty stores, everything writable, both notification channels working.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a scope's `Path` value (stored as expandable).
    pub fn with_path(self, scope: Scope, value: &str) -> Self {
        self.with_value(scope, "Path", value, ValueKind::Expandable)
    }

    /// Seed an arbitrary stored value.
    pub fn with_value(self, scope: Scope, name: &str, value: &str, kind: ValueKind) -> Self {
        self.state()
            .values
            .insert((scope, name.to_ascii_lowercase()), (value.to_string(), kind));
        self
    }

    /// Define a variable used for `%VAR%` expansion.
    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.state()
            .variables
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Seed the simulated process `PATH`.
    pub fn with_process_path(self, value: &str) -> Self {
        self.state().process_path = Some(value.to_string());
        self
    }

    /// Make machine-scope writes fail as a non-elevated process would.
    pub fn deny_machine_writes(self) -> Self {
        self.state().machine_writable = false;
        self
    }

    /// Make user-scope writes fail.
    pub fn deny_user_writes(self) -> Self {
        self.state().user_writable = false;
        self
    }

    /// Choose what the blocking and non-blocking notifications report.
    pub fn with_notifications(self, send_succeeds: bool, post_succeeds: bool) -> Self {
        {
            let mut state = self.state();
            state.send_succeeds = send_succeeds;
            state.post_succeeds = post_succeeds;
        }
        self
    }

    /// Raw stored value, exactly as written.
    pub fn raw_value(&self, scope: Scope, name: &str) -> Option<String> {
        self.state()
            .values
            .get(&(scope, name.to_ascii_lowercase()))
            .map(|(value, _)| value.clone())
    }

    /// Storage type of a stored value.
    pub fn value_kind(&self, scope: Scope, name: &str) -> Option<ValueKind> {
        self.state()
            .values
            .get(&(scope, name.to_ascii_lowercase()))
            .map(|(_, kind)| *kind)
    }

    /// Number of successful writes and deletes across both scopes.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Number of blocking notifications attempted.
    pub fn send_count(&self) -> usize {
        self.state().sends
    }

    /// Number of non-blocking notifications attempted.
    pub fn post_count(&self) -> usize {
        self.state().posts
    }

    /// Number of times the process `PATH` was overwritten.
    pub fn process_path_updates(&self) -> usize {
        self.state().process_path_updates
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlatformEnvironment for InMemoryEnvironment {
    fn read_value(&self, scope: Scope, name: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.raw_value(scope, name))
    }

    fn write_value(
        &self,
        scope: Scope,
        name: &str,
        value: &str,
        kind: ValueKind,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        let writable = match scope {
            Scope::Machine => state.machine_writable,
            Scope::User => state.user_writable,
        };
        if !writable {
            return Err(PlatformError::PermissionDenied {
                scope,
                message: "Access is denied.".to_string(),
            });
        }
        state
            .values
            .insert((scope, name.to_ascii_lowercase()), (value.to_string(), kind));
        state.writes += 1;
        Ok(())
    }

    fn delete_value(&self, scope: Scope, name: &str) -> Result<bool, PlatformError> {
        let mut state = self.state();
        let writable = match scope {
            Scope::Machine => state.machine_writable,
            Scope::User => state.user_writable,
        };
        if !writable {
            return Err(PlatformError::PermissionDenied {
                scope,
                message: "Access is denied.".to_string(),
            });
        }
        let removed = state
            .values
            .remove(&(scope, name.to_ascii_lowercase()))
            .is_some();
        if removed {
            state.writes += 1;
        }
        Ok(removed)
    }

    fn send_change_notification(&self, _timeout: Duration) -> bool {
        let mut state = self.state();
        state.sends += 1;
        state.send_succeeds
    }

    fn post_change_notification(&self) -> bool {
        let mut state = self.state();
        state.posts += 1;
        state.post_succeeds
    }

    fn expand_tokens(&self, value: &str) -> String {
        let state = self.state();
        expand_with(value, |name| {
            state.variables.get(&name.to_ascii_lowercase()).cloned()
        })
    }

    fn process_path(&self) -> Option<String> {
        self.state().process_path.clone()
    }

    fn set_process_path(&self, value: &str) {
        let mut state = self.state();
        state.process_path = Some(value.to_string());
        state.process_path_updates += 1;
    }
}
