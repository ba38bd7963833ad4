//! Registry- and window-message-backed environment.

use super::{PlatformEnvironment, PlatformError, Scope, ValueKind};
use crate::path::expand_with;
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::time::Duration;
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    PostMessageW, SendMessageTimeoutW, HWND_BROADCAST, SMTO_ABORTIFHUNG, SMTO_BLOCK,
    WM_SETTINGCHANGE,
};
use winreg::enums::{
    HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_SET_VALUE, REG_EXPAND_SZ, REG_SZ,
};
use winreg::{RegKey, RegValue};

const SYSTEM_ENV_KEY: &str = r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";
const USER_ENV_KEY: &str = "Environment";

/// The real Windows environment stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsEnvironment;

impl WindowsEnvironment {
    /// Create a handle. Holds no state; every call goes to the registry.
    pub fn new() -> Self {
        Self
    }

    fn root(scope: Scope) -> (RegKey, &'static str) {
        match scope {
            Scope::Machine => (RegKey::predef(HKEY_LOCAL_MACHINE), SYSTEM_ENV_KEY),
            Scope::User => (RegKey::predef(HKEY_CURRENT_USER), USER_ENV_KEY),
        }
    }

    fn map_err(scope: Scope, err: io::Error) -> PlatformError {
        if err.kind() == io::ErrorKind::PermissionDenied {
            PlatformError::PermissionDenied {
                scope,
                message: err.to_string(),
            }
        } else {
            PlatformError::Io {
                scope,
                message: err.to_string(),
            }
        }
    }
}

impl PlatformEnvironment for WindowsEnvironment {
    fn read_value(&self, scope: Scope, name: &str) -> Result<Option<String>, PlatformError> {
        let (root, subkey) = Self::root(scope);
        let key = match root.open_subkey_with_flags(subkey, KEY_READ) {
            Ok(key) => key,
            // HKCU\Environment may not exist until the first write
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::map_err(scope, e)),
        };
        match key.get_raw_value(name) {
            Ok(raw) => Ok(Some(decode_utf16_reg(&raw.bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_err(scope, e)),
        }
    }

    fn write_value(
        &self,
        scope: Scope,
        name: &str,
        value: &str,
        kind: ValueKind,
    ) -> Result<(), PlatformError> {
        let (root, subkey) = Self::root(scope);
        let key = match scope {
            Scope::Machine => root
                .open_subkey_with_flags(subkey, KEY_SET_VALUE)
                .map_err(|e| Self::map_err(scope, e))?,
            Scope::User => {
                root.create_subkey_with_flags(subkey, KEY_SET_VALUE)
                    .map_err(|e| Self::map_err(scope, e))?
                    .0
            }
        };
        let raw = RegValue {
            bytes: encode_utf16_reg(value),
            vtype: match kind {
                ValueKind::Plain => REG_SZ,
                ValueKind::Expandable => REG_EXPAND_SZ,
            },
        };
        key.set_raw_value(name, &raw)
            .map_err(|e| Self::map_err(scope, e))
    }

    fn delete_value(&self, scope: Scope, name: &str) -> Result<bool, PlatformError> {
        let (root, subkey) = Self::root(scope);
        let key = match root.open_subkey_with_flags(subkey, KEY_SET_VALUE) {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Self::map_err(scope, e)),
        };
        match key.delete_value(name) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_err(scope, e)),
        }
    }

    fn send_change_notification(&self, timeout: Duration) -> bool {
        let payload = to_wide("Environment");
        let mut result = 0usize;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        // SAFETY: `payload` is a NUL-terminated UTF-16 buffer that outlives the call.
        let ret = unsafe {
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(payload.as_ptr() as isize),
                SMTO_BLOCK | SMTO_ABORTIFHUNG,
                timeout_ms,
                Some(&mut result as *mut usize),
            )
        };
        ret.0 != 0
    }

    fn post_change_notification(&self) -> bool {
        // Posted messages cannot carry pointers across processes, so no payload.
        // SAFETY: plain message post with scalar parameters.
        unsafe { PostMessageW(HWND_BROADCAST, WM_SETTINGCHANGE, WPARAM(0), LPARAM(0)).is_ok() }
    }

    fn expand_tokens(&self, value: &str) -> String {
        expand_with(value, |name| std::env::var(name).ok())
    }

    fn process_path(&self) -> Option<String> {
        std::env::var("PATH").ok()
    }

    fn set_process_path(&self, value: &str) {
        std::env::set_var("PATH", value);
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

fn decode_utf16_reg(bytes: &[u8]) -> String {
    if bytes.len() < 2 {
        return String::new();
    }

    let mut utf16: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    while utf16.last() == Some(&0) {
        utf16.pop();
    }

    String::from_utf16_lossy(&utf16)
}

fn encode_utf16_reg(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .chain(Some(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}
