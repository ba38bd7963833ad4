//! PATH entry parsing and comparison.

use crate::platform::Scope;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Separator used inside the persisted `Path` values.
pub const STORE_SEPARATOR: char = ';';

/// Separator the host OS uses for a process `PATH`.
pub const PROCESS_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// A directory destined for one of the PATH stores.
///
/// `dir` is kept in its original form, tokens included. Comparison goes
/// through [`comparison_key`] after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Directory as it is (or will be) stored.
    pub dir: String,
    /// Store it belongs to.
    pub scope: Scope,
}

impl PathEntry {
    /// Create an entry.
    pub fn new(dir: impl Into<String>, scope: Scope) -> Self {
        Self {
            dir: dir.into(),
            scope,
        }
    }

    /// Duplicate-detection key, expanding tokens with `expand`.
    pub fn key_with(&self, expand: impl FnOnce(&str) -> String) -> String {
        comparison_key(&expand(&self.dir))
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"%([^%;]+)%").expect("Invalid regex pattern"))
}

/// Replace `%NAME%` tokens using `lookup`.
///
/// Tokens for which `lookup` returns `None` are left in place, matching how
/// the OS expands `REG_EXPAND_SZ` values.
///
/// # Example
///
/// ```rust
/// use devtool_provision::expand_with;
///
/// let out = expand_with(r"%APPDATA%\npm;%MISSING%", |name| {
///     (name == "APPDATA").then(|| r"C:\Roaming".to_string())
/// });
/// assert_eq!(out, r"C:\Roaming\npm;%MISSING%");
/// ```
pub fn expand_with<F>(value: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    token_regex()
        .replace_all(value, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Normalize an already-expanded directory for duplicate detection.
///
/// Trims whitespace and surrounding quotes, drops trailing separators and
/// lowercases. `C:\Tools\X\`, `"c:\tools\x"` and `C:/TOOLS/X/` all collapse
/// to the same key except for the inner slash direction.
pub fn comparison_key(expanded: &str) -> String {
    expanded
        .trim()
        .trim_matches('"')
        .trim()
        .trim_end_matches(['\\', '/'])
        .to_lowercase()
}

/// Split a stored `Path` value into entries.
///
/// Empty and whitespace-only segments are dropped. Everything else is kept
/// verbatim, so joining the result reproduces a well-formed value exactly.
pub fn split_entries(raw: &str) -> Vec<String> {
    raw.split(STORE_SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Join entries into a stored `Path` value.
pub fn join_entries<S: AsRef<str>>(entries: &[S]) -> String {
    entries
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&STORE_SEPARATOR.to_string())
}

/// Rewrite a directory under the roaming profile as `%APPDATA%\...`.
///
/// `appdata` is the expanded roaming directory. Directories outside it are
/// returned unchanged.
pub fn tokenize_appdata(dir: &str, appdata: &str) -> String {
    let base = appdata.trim_end_matches(['\\', '/']);
    if base.is_empty() || base.contains('%') {
        return dir.to_string();
    }
    let (Some(head), Some(rest)) = (dir.get(..base.len()), dir.get(base.len()..)) else {
        return dir.to_string();
    };
    let at_boundary = rest.is_empty() || rest.starts_with(['\\', '/']);
    if head.eq_ignore_ascii_case(base) && at_boundary {
        format!("%APPDATA%{rest}")
    } else {
        dir.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name.to_ascii_uppercase().as_str() {
            "APPDATA" => Some(r"C:\Users\dev\AppData\Roaming".to_string()),
            "PROGRAMFILES" => Some(r"C:\Program Files".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_known_and_unknown_tokens() {
        assert_eq!(
            expand_with(r"%APPDATA%\npm", lookup),
            r"C:\Users\dev\AppData\Roaming\npm"
        );
        assert_eq!(expand_with(r"%NOPE%\bin", lookup), r"%NOPE%\bin");
        assert_eq!(expand_with("100%", lookup), "100%");
    }

    #[test]
    fn test_comparison_key_normalizes() {
        assert_eq!(comparison_key(r"C:\Tools\X\"), r"c:\tools\x");
        assert_eq!(comparison_key(r#"  "C:\Tools\X"  "#), r"c:\tools\x");
        assert_eq!(comparison_key(r"c:\tools\x"), comparison_key(r"C:\TOOLS\X"));
    }

    #[test]
    fn test_entry_key_expands_tokens() {
        let entry = PathEntry::new(r"%ProgramFiles%\nodejs\", Scope::Machine);
        let key = entry.key_with(|d| expand_with(d, lookup));
        assert_eq!(key, r"c:\program files\nodejs");
    }

    #[test]
    fn test_split_drops_empty_segments() {
        let entries = split_entries(r"C:\a;;  ;C:\b ;");
        assert_eq!(entries, vec![r"C:\a".to_string(), r"C:\b ".to_string()]);
    }

    #[test]
    fn test_split_join_round_trip() {
        let raw = r"C:\Windows\system32;%SystemRoot%;C:\Program Files\Git\cmd";
        assert_eq!(join_entries(&split_entries(raw)), raw);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_entries("").is_empty());
        assert_eq!(join_entries::<String>(&[]), "");
    }

    #[test]
    fn test_tokenize_appdata() {
        let appdata = r"C:\Users\dev\AppData\Roaming";
        assert_eq!(
            tokenize_appdata(r"c:\users\dev\appdata\roaming\npm", appdata),
            r"%APPDATA%\npm"
        );
        assert_eq!(tokenize_appdata(appdata, appdata), "%APPDATA%");
        assert_eq!(
            tokenize_appdata(r"C:\Users\dev\AppData\RoamingX\npm", appdata),
            r"C:\Users\dev\AppData\RoamingX\npm"
        );
        assert_eq!(tokenize_appdata(r"C:\Tools", appdata), r"C:\Tools");
        assert_eq!(tokenize_appdata(r"C:\Tools", "%APPDATA%"), r"C:\Tools");
    }
}
