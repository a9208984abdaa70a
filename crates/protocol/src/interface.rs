//! Interface catalogue: names, supported versions, opcodes and flag types.
//!
//! Opcodes are the index of the request or event in the interface's
//! published definition.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Interfaces this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interface {
    #[serde(rename = "wl_display")]
    Display,
    #[serde(rename = "wl_registry")]
    Registry,
    #[serde(rename = "wl_callback")]
    Callback,
    #[serde(rename = "wl_compositor")]
    Compositor,
    #[serde(rename = "wl_surface")]
    Surface,
    #[serde(rename = "wl_shm")]
    Shm,
    #[serde(rename = "wl_shm_pool")]
    ShmPool,
    #[serde(rename = "wl_buffer")]
    Buffer,
    #[serde(rename = "wl_seat")]
    Seat,
    #[serde(rename = "wl_pointer")]
    Pointer,
    #[serde(rename = "wl_keyboard")]
    Keyboard,
    #[serde(rename = "xdg_wm_base")]
    XdgWmBase,
    #[serde(rename = "xdg_surface")]
    XdgSurface,
    #[serde(rename = "xdg_toplevel")]
    XdgToplevel,
}

impl Interface {
    /// Globals the client binds when the peer announces them.
    pub const BINDABLE: [Interface; 4] = [
        Interface::Compositor,
        Interface::Shm,
        Interface::Seat,
        Interface::XdgWmBase,
    ];

    /// Protocol name of the interface.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Display => "wl_display",
            Self::Registry => "wl_registry",
            Self::Callback => "wl_callback",
            Self::Compositor => "wl_compositor",
            Self::Surface => "wl_surface",
            Self::Shm => "wl_shm",
            Self::ShmPool => "wl_shm_pool",
            Self::Buffer => "wl_buffer",
            Self::Seat => "wl_seat",
            Self::Pointer => "wl_pointer",
            Self::Keyboard => "wl_keyboard",
            Self::XdgWmBase => "xdg_wm_base",
            Self::XdgSurface => "xdg_surface",
            Self::XdgToplevel => "xdg_toplevel",
        }
    }

    /// Look up an interface by protocol name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "wl_display" => Self::Display,
            "wl_registry" => Self::Registry,
            "wl_callback" => Self::Callback,
            "wl_compositor" => Self::Compositor,
            "wl_surface" => Self::Surface,
            "wl_shm" => Self::Shm,
            "wl_shm_pool" => Self::ShmPool,
            "wl_buffer" => Self::Buffer,
            "wl_seat" => Self::Seat,
            "wl_pointer" => Self::Pointer,
            "wl_keyboard" => Self::Keyboard,
            "xdg_wm_base" => Self::XdgWmBase,
            "xdg_surface" => Self::XdgSurface,
            "xdg_toplevel" => Self::XdgToplevel,
            _ => return None,
        })
    }

    /// Highest version whose requests and events this client implements.
    ///
    /// Binding at a higher version would invite events with unknown layouts.
    #[must_use]
    pub const fn max_version(self) -> u32 {
        match self {
            Self::Compositor => 4,
            Self::Seat => 5,
            _ => 1,
        }
    }

    /// Whether a freshly bound object of this interface is considered pending
    /// until the peer sends its first descriptive event (formats, capabilities).
    #[must_use]
    pub const fn expects_ack(self) -> bool {
        matches!(self, Self::Shm | Self::Seat)
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Request opcodes, grouped by interface.
pub mod request {
    pub mod wl_display {
        pub const SYNC: u16 = 0;
        pub const GET_REGISTRY: u16 = 1;
    }
    pub mod wl_registry {
        pub const BIND: u16 = 0;
    }
    pub mod wl_compositor {
        pub const CREATE_SURFACE: u16 = 0;
    }
    pub mod wl_surface {
        pub const DESTROY: u16 = 0;
        pub const ATTACH: u16 = 1;
        pub const DAMAGE: u16 = 2;
        pub const FRAME: u16 = 3;
        pub const COMMIT: u16 = 6;
        /// Since version 4.
        pub const DAMAGE_BUFFER: u16 = 9;
    }
    pub mod wl_shm {
        pub const CREATE_POOL: u16 = 0;
    }
    pub mod wl_shm_pool {
        pub const CREATE_BUFFER: u16 = 0;
        pub const DESTROY: u16 = 1;
        pub const RESIZE: u16 = 2;
    }
    pub mod wl_buffer {
        pub const DESTROY: u16 = 0;
    }
    pub mod wl_seat {
        pub const GET_POINTER: u16 = 0;
        pub const GET_KEYBOARD: u16 = 1;
    }
    pub mod xdg_wm_base {
        pub const DESTROY: u16 = 0;
        pub const GET_XDG_SURFACE: u16 = 2;
        pub const PONG: u16 = 3;
    }
    pub mod xdg_surface {
        pub const DESTROY: u16 = 0;
        pub const GET_TOPLEVEL: u16 = 1;
        pub const ACK_CONFIGURE: u16 = 4;
    }
    pub mod xdg_toplevel {
        pub const DESTROY: u16 = 0;
        pub const SET_TITLE: u16 = 2;
        pub const SET_APP_ID: u16 = 3;
    }
}

/// Event opcodes, grouped by interface.
pub mod event {
    pub mod wl_display {
        pub const ERROR: u16 = 0;
        pub const DELETE_ID: u16 = 1;
    }
    pub mod wl_registry {
        pub const GLOBAL: u16 = 0;
        pub const GLOBAL_REMOVE: u16 = 1;
    }
    pub mod wl_callback {
        pub const DONE: u16 = 0;
    }
    pub mod wl_surface {
        pub const ENTER: u16 = 0;
        pub const LEAVE: u16 = 1;
    }
    pub mod wl_shm {
        pub const FORMAT: u16 = 0;
    }
    pub mod wl_buffer {
        pub const RELEASE: u16 = 0;
    }
    pub mod wl_seat {
        pub const CAPABILITIES: u16 = 0;
        pub const NAME: u16 = 1;
    }
    pub mod wl_pointer {
        pub const ENTER: u16 = 0;
        pub const LEAVE: u16 = 1;
        pub const MOTION: u16 = 2;
        pub const BUTTON: u16 = 3;
    }
    pub mod wl_keyboard {
        pub const KEYMAP: u16 = 0;
        pub const ENTER: u16 = 1;
        pub const LEAVE: u16 = 2;
        pub const KEY: u16 = 3;
        pub const MODIFIERS: u16 = 4;
    }
    pub mod xdg_wm_base {
        pub const PING: u16 = 0;
    }
    pub mod xdg_surface {
        pub const CONFIGURE: u16 = 0;
    }
    pub mod xdg_toplevel {
        pub const CONFIGURE: u16 = 0;
        pub const CLOSE: u16 = 1;
    }
}

bitflags! {
    /// Input device classes a seat offers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeatCapabilities: u32 {
        const POINTER = 1;
        const KEYBOARD = 2;
        const TOUCH = 4;
    }
}

bitflags! {
    /// Mouse buttons currently held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PointerButtons: u32 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

impl PointerButtons {
    /// Map a Linux evdev button code (`BTN_LEFT` = 0x110, ...) to a flag.
    #[must_use]
    pub const fn from_evdev(code: u32) -> Option<Self> {
        match code {
            0x110 => Some(Self::LEFT),
            0x111 => Some(Self::RIGHT),
            0x112 => Some(Self::MIDDLE),
            _ => None,
        }
    }
}

bitflags! {
    /// Keyboard modifier masks as laid out by the default keymap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const ALT = 1 << 3;
    }
}

/// Pixel formats for shared-memory buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShmFormat {
    /// 32-bit ARGB, little-endian. Always supported by the peer.
    #[default]
    Argb8888,
    /// 32-bit RGB with unused alpha. Always supported by the peer.
    Xrgb8888,
}

impl ShmFormat {
    /// Wire value of the format.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Argb8888 => 0,
            Self::Xrgb8888 => 1,
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Argb8888),
            1 => Some(Self::Xrgb8888),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_names_roundtrip() {
        for iface in [
            Interface::Display,
            Interface::Registry,
            Interface::Callback,
            Interface::Compositor,
            Interface::Surface,
            Interface::Shm,
            Interface::ShmPool,
            Interface::Buffer,
            Interface::Seat,
            Interface::Pointer,
            Interface::Keyboard,
            Interface::XdgWmBase,
            Interface::XdgSurface,
            Interface::XdgToplevel,
        ] {
            assert_eq!(Interface::from_name(iface.name()), Some(iface));
        }
        assert_eq!(Interface::from_name("wl_output"), None);
    }

    #[test]
    fn test_damage_buffer_needs_compositor_v4() {
        assert!(Interface::Compositor.max_version() >= 4);
    }

    #[test]
    fn test_pointer_buttons_from_evdev() {
        assert_eq!(PointerButtons::from_evdev(0x110), Some(PointerButtons::LEFT));
        assert_eq!(PointerButtons::from_evdev(0x112), Some(PointerButtons::MIDDLE));
        assert_eq!(PointerButtons::from_evdev(0x113), None);
    }

    #[test]
    fn test_shm_format_codes() {
        assert_eq!(ShmFormat::from_code(ShmFormat::Xrgb8888.code()), Some(ShmFormat::Xrgb8888));
        assert_eq!(ShmFormat::from_code(0x3432_4152), None);
    }

    #[test]
    fn test_seat_capabilities_truncate() {
        let caps = SeatCapabilities::from_bits_truncate(0b1011);
        assert!(caps.contains(SeatCapabilities::POINTER | SeatCapabilities::KEYBOARD));
        assert!(!caps.contains(SeatCapabilities::TOUCH));
    }
}
