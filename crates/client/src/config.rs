//! Session parameters for the event loop.

use serde::{Deserialize, Serialize};
use waylite_protocol::{Interface, ShmFormat};

/// Fewest buffers the pool carves; one drawn into while the other is in flight.
pub const MIN_BUFFERS: usize = 2;

/// What window to open and which globals must exist before opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Window title (top-level windows only)
    pub title: String,

    /// Application id used by the window system to group windows
    pub app_id: String,

    /// Initial surface width in pixels
    pub width: u32,

    /// Initial surface height in pixels
    pub height: u32,

    /// Buffers carved from the pool; values below 2 are raised to 2
    pub buffer_count: usize,

    /// Pixel format of every buffer
    pub format: ShmFormat,

    /// Create a top-level window. When off, a bare surface is used and no
    /// configure handshake takes place.
    pub window_shell: bool,

    /// Globals that must be bound before surface setup starts
    pub required_globals: Vec<Interface>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            title: "waylite".to_string(),
            app_id: "org.waylite.demo".to_string(),
            width: 640,
            height: 480,
            buffer_count: MIN_BUFFERS,
            format: ShmFormat::default(),
            window_shell: true,
            required_globals: Interface::BINDABLE.to_vec(),
        }
    }
}

impl ClientConfig {
    /// Buffer count with the double-buffering floor applied.
    #[must_use]
    pub fn effective_buffer_count(&self) -> usize {
        self.buffer_count.max(MIN_BUFFERS)
    }

    /// Bytes per buffer row.
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }

    /// Initial pool size: every buffer at the initial dimensions.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.stride() as usize * self.height as usize * self.effective_buffer_count()
    }

    /// Required globals, plus the window shell when one is requested.
    #[must_use]
    pub fn required(&self) -> Vec<Interface> {
        let mut required = self.required_globals.clone();
        if self.window_shell && !required.contains(&Interface::XdgWmBase) {
            required.push(Interface::XdgWmBase);
        }
        if !required.contains(&Interface::Compositor) {
            required.push(Interface::Compositor);
        }
        if !required.contains(&Interface::Shm) {
            required.push(Interface::Shm);
        }
        required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.buffer_count, 2);
        assert!(config.window_shell);
        assert_eq!(config.required_globals.len(), 4);
    }

    #[test]
    fn test_buffer_count_floor() {
        let config = ClientConfig {
            buffer_count: 1,
            ..Default::default()
        };
        assert_eq!(config.effective_buffer_count(), 2);

        let config = ClientConfig {
            buffer_count: 3,
            ..Default::default()
        };
        assert_eq!(config.effective_buffer_count(), 3);
    }

    #[test]
    fn test_pool_size() {
        let config = ClientConfig {
            width: 4,
            height: 4,
            ..Default::default()
        };
        assert_eq!(config.stride(), 16);
        assert_eq!(config.pool_size(), 128);
    }

    #[test]
    fn test_required_always_has_surface_and_memory() {
        let config = ClientConfig {
            window_shell: false,
            required_globals: Vec::new(),
            ..Default::default()
        };
        let required = config.required();
        assert!(required.contains(&Interface::Compositor));
        assert!(required.contains(&Interface::Shm));
        assert!(!required.contains(&Interface::XdgWmBase));
    }
}
