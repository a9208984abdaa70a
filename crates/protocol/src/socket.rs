//! Socket path helpers for connecting to the display server.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable naming the per-user runtime directory. Required.
pub const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

/// Environment variable naming the socket inside the runtime directory.
pub const DISPLAY_ENV: &str = "WAYLAND_DISPLAY";

/// Socket name used when [`DISPLAY_ENV`] is unset.
pub const DEFAULT_DISPLAY: &str = "wayland-0";

/// Longest path a `sockaddr_un` can hold, excluding the NUL terminator.
pub const MAX_SOCKET_PATH: usize = 107;

/// Error type for socket address resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The runtime-directory variable is unset or empty.
    #[error("{0} is not set")]
    ConfigMissing(&'static str),

    /// The resolved path does not fit into a local socket address.
    #[error("socket path {path:?} is {len} bytes, limit is {max}")]
    AddressTooLong { path: PathBuf, len: usize, max: usize },
}

/// Resolve the socket path from the process environment.
///
/// Resolution:
/// 1. `$XDG_RUNTIME_DIR` must be set
/// 2. `$WAYLAND_DISPLAY` names the socket, defaulting to `wayland-0`
/// 3. The path is `<runtime dir>/<socket name>`; an absolute socket name
///    replaces the runtime directory entirely
pub fn get_socket_path() -> Result<PathBuf, AddressError> {
    let runtime_dir: Option<OsString> = std::env::var_os(RUNTIME_DIR_ENV);
    let display: Option<OsString> = std::env::var_os(DISPLAY_ENV);
    resolve_socket_path(runtime_dir.as_deref(), display.as_deref())
}

/// Resolve the socket path from explicit variable values.
pub fn resolve_socket_path(
    runtime_dir: Option<&OsStr>,
    display: Option<&OsStr>,
) -> Result<PathBuf, AddressError> {
    let runtime_dir = runtime_dir
        .filter(|dir| !dir.is_empty())
        .ok_or(AddressError::ConfigMissing(RUNTIME_DIR_ENV))?;

    let display = display
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| OsStr::new(DEFAULT_DISPLAY));

    let path = PathBuf::from(runtime_dir).join(display);

    let len = path.as_os_str().len();
    if len > MAX_SOCKET_PATH {
        return Err(AddressError::AddressTooLong {
            path,
            len,
            max: MAX_SOCKET_PATH,
        });
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(s: &str) -> Option<&OsStr> {
        Some(OsStr::new(s))
    }

    #[test]
    fn test_default_display_constant() {
        assert_eq!(DEFAULT_DISPLAY, "wayland-0");
    }

    #[test]
    fn test_resolve_default_display() {
        let path = resolve_socket_path(os("/run/user/1000"), None).unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1000/wayland-0"));
    }

    #[test]
    fn test_resolve_named_display() {
        let path = resolve_socket_path(os("/run/user/1000"), os("wayland-1")).unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1000/wayland-1"));
    }

    #[test]
    fn test_empty_display_uses_default() {
        let path = resolve_socket_path(os("/tmp"), os("")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/wayland-0"));
    }

    #[test]
    fn test_absolute_display_replaces_runtime_dir() {
        let path = resolve_socket_path(os("/run/user/1000"), os("/tmp/nested.sock")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/nested.sock"));
    }

    #[test]
    fn test_missing_runtime_dir() {
        assert_eq!(
            resolve_socket_path(None, os("wayland-0")),
            Err(AddressError::ConfigMissing(RUNTIME_DIR_ENV))
        );
        assert_eq!(
            resolve_socket_path(os(""), None),
            Err(AddressError::ConfigMissing(RUNTIME_DIR_ENV))
        );
    }

    #[test]
    fn test_address_too_long() {
        let long_dir = format!("/{}", "d".repeat(120));
        let err = resolve_socket_path(os(&long_dir), None).unwrap_err();
        assert!(matches!(err, AddressError::AddressTooLong { max: 107, .. }));
    }

    #[test]
    fn test_path_at_limit_is_accepted() {
        // "/" + dir + "/" + "wayland-0" == 107 bytes
        let dir = format!("/{}", "d".repeat(107 - 1 - 1 - DEFAULT_DISPLAY.len()));
        let path = resolve_socket_path(os(&dir), None).unwrap();
        assert_eq!(path.as_os_str().len(), MAX_SOCKET_PATH);
    }

    // Tests that require unsafe env manipulation - only run if explicitly requested
    #[test]
    #[ignore = "requires unsafe env manipulation, run with --ignored"]
    fn test_get_socket_path_from_env() {
        // SAFETY: Test is run in isolation with --test-threads=1
        unsafe {
            std::env::set_var(RUNTIME_DIR_ENV, "/run/user/1000");
            std::env::set_var(DISPLAY_ENV, "wayland-7");
        }

        let path = get_socket_path().unwrap();
        assert_eq!(path, PathBuf::from("/run/user/1000/wayland-7"));

        // SAFETY: Test is run in isolation with --test-threads=1
        unsafe {
            std::env::remove_var(DISPLAY_ENV);
        }
    }
}
