//! Typed access to the persisted PATH values.

use super::entry::{
    comparison_key, join_entries, split_entries, tokenize_appdata, PROCESS_SEPARATOR,
};
use crate::platform::{PlatformEnvironment, PlatformError, Scope, ValueKind};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const PATH_VALUE: &str = "Path";

/// Result of [`RegistryStore::add_unique`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Entries appended, in the form they were stored.
    pub added: Vec<String>,
    /// Candidates already present (or repeated within the candidate list).
    pub skipped: Vec<String>,
}

impl AddOutcome {
    /// Whether the stored value was rewritten.
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Result of [`RegistryStore::remove_entry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Entries dropped, as they were stored.
    pub removed: Vec<String>,
}

impl RemoveOutcome {
    /// Whether the stored value was rewritten.
    pub fn changed(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Read/write primitive over the machine and user `Path` values.
///
/// Holds no cached state: every call goes back to the platform. Apart from
/// [`add_unique`](Self::add_unique) it does not deduplicate; callers decide
/// the entry set.
///
/// # Example
///
/// ```rust
/// use devtool_provision::{InMemoryEnvironment, RegistryStore, Scope};
/// use std::sync::Arc;
///
/// let env = Arc::new(InMemoryEnvironment::new().with_path(Scope::User, r"C:\bin"));
/// let store = RegistryStore::new(env);
///
/// let outcome = store.add_unique(Scope::User, &[r"C:\BIN\", r"C:\tools"]).unwrap();
/// assert_eq!(outcome.added, vec![r"C:\tools".to_string()]);
/// assert_eq!(store.read_path(Scope::User).unwrap(), vec![r"C:\bin", r"C:\tools"]);
/// ```
#[derive(Clone)]
pub struct RegistryStore {
    env: Arc<dyn PlatformEnvironment>,
}

impl std::fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStore").finish_non_exhaustive()
    }
}

impl RegistryStore {
    /// Wrap a platform environment.
    pub fn new(env: Arc<dyn PlatformEnvironment>) -> Self {
        Self { env }
    }

    /// The underlying platform environment.
    pub fn environment(&self) -> &Arc<dyn PlatformEnvironment> {
        &self.env
    }

    /// Ordered entries of a scope's `Path`. An absent value reads as empty.
    pub fn read_path(&self, scope: Scope) -> Result<Vec<String>, PlatformError> {
        let raw = self.env.read_value(scope, PATH_VALUE)?.unwrap_or_default();
        Ok(split_entries(&raw))
    }

    /// Replace a scope's `Path` with `entries`, stored as an expandable string.
    pub fn write_path<S: AsRef<str>>(&self, scope: Scope, entries: &[S]) -> Result<(), PlatformError> {
        let value = join_entries(entries);
        debug!(scope = %scope, entries = entries.len(), "writing Path");
        self.env
            .write_value(scope, PATH_VALUE, &value, ValueKind::Expandable)
    }

    /// Append the candidates that are not already present.
    ///
    /// Both sides are compared after token expansion, case-insensitively.
    /// Existing entries keep their order and new ones are appended in
    /// candidate order. Nothing is written when nothing is new. For user
    /// scope, candidates under the roaming profile are stored as
    /// `%APPDATA%\...`.
    pub fn add_unique<S: AsRef<str>>(
        &self,
        scope: Scope,
        candidates: &[S],
    ) -> Result<AddOutcome, PlatformError> {
        let mut entries = self.read_path(scope)?;
        let mut seen: HashSet<String> = entries
            .iter()
            .map(|entry| comparison_key(&self.env.expand_tokens(entry)))
            .collect();

        let mut outcome = AddOutcome::default();
        for candidate in candidates {
            let stored = self.storage_form(scope, candidate.as_ref());
            let key = comparison_key(&self.env.expand_tokens(&stored));
            if key.is_empty() {
                continue;
            }
            if seen.insert(key) {
                entries.push(stored.clone());
                outcome.added.push(stored);
            } else {
                outcome.skipped.push(stored);
            }
        }

        if outcome.changed() {
            self.write_path(scope, &entries)?;
            info!(scope = %scope, added = ?outcome.added, "PATH entries added");
        } else {
            debug!(scope = %scope, "PATH already contains all candidates");
        }
        Ok(outcome)
    }

    /// Drop every entry equal to `dir` under the duplicate comparison.
    ///
    /// `C:\Tools\X\`, `c:\tools\x` and a `%VAR%` form that expands to
    /// the same directory all match. The remaining entries keep their order
    /// and raw form. Nothing is written when nothing matched.
    pub fn remove_entry(&self, scope: Scope, dir: &str) -> Result<RemoveOutcome, PlatformError> {
        let target = comparison_key(&self.env.expand_tokens(dir));
        let mut outcome = RemoveOutcome::default();
        if target.is_empty() {
            return Ok(outcome);
        }

        let (removed, kept): (Vec<String>, Vec<String>) = self
            .read_path(scope)?
            .into_iter()
            .partition(|entry| comparison_key(&self.env.expand_tokens(entry)) == target);
        outcome.removed = removed;

        if outcome.changed() {
            self.write_path(scope, &kept)?;
            info!(scope = %scope, removed = ?outcome.removed, "PATH entries removed");
        } else {
            debug!(scope = %scope, dir, "PATH has no matching entry");
        }
        Ok(outcome)
    }

    /// The form a candidate directory takes when stored in `scope`.
    pub fn storage_form(&self, scope: Scope, dir: &str) -> String {
        let dir = dir.trim();
        match scope {
            Scope::User => {
                let appdata = self.env.expand_tokens("%APPDATA%");
                tokenize_appdata(dir, &appdata)
            }
            Scope::Machine => dir.to_string(),
        }
    }

    /// Read an arbitrary environment variable from a store.
    pub fn read_var(&self, scope: Scope, name: &str) -> Result<Option<String>, PlatformError> {
        self.env.read_value(scope, name)
    }

    /// Write an arbitrary environment variable as a plain string.
    pub fn write_var(&self, scope: Scope, name: &str, value: &str) -> Result<(), PlatformError> {
        self.env.write_value(scope, name, value, ValueKind::Plain)
    }

    /// Delete an arbitrary environment variable. `Ok(false)` if it was absent.
    pub fn delete_var(&self, scope: Scope, name: &str) -> Result<bool, PlatformError> {
        self.env.delete_value(scope, name)
    }

    /// Expanded machine entries followed by expanded user entries.
    pub fn fresh_entries(&self) -> Result<Vec<String>, PlatformError> {
        let mut entries = Vec::new();
        for scope in [Scope::Machine, Scope::User] {
            entries.extend(
                self.read_path(scope)?
                    .iter()
                    .map(|entry| self.env.expand_tokens(entry.trim())),
            );
        }
        Ok(entries)
    }

    /// The machine+user union as a process `PATH` string.
    pub fn fresh_union(&self) -> Result<String, PlatformError> {
        Ok(self
            .fresh_entries()?
            .join(&PROCESS_SEPARATOR.to_string()))
    }

    /// Overwrite the current process's `PATH` with the fresh union.
    pub fn refresh_process_path(&self) -> Result<String, PlatformError> {
        let union = self.fresh_union()?;
        self.env.set_process_path(&union);
        debug!(length = union.len(), "process PATH refreshed from stores");
        Ok(union)
    }
}
