//! Typed events decoded from raw messages.
//!
//! Events carry no type information on the wire, only the sender id and an
//! opcode. The receiver resolves the sender's interface through its object
//! registry and decodes by `(interface, opcode)`.

use crate::interface::{Interface, SeatCapabilities, event as op};
use crate::wire::{Decoder, WireError};

/// An event this client knows how to interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Fatal error raised by the peer against one of our objects.
    DisplayError {
        object_id: u32,
        code: u32,
        message: String,
    },
    /// The peer has forgotten `id`; it may never be referenced again.
    DeleteId { id: u32 },

    /// A global was announced.
    Global {
        name: u32,
        interface: String,
        version: u32,
    },
    /// A previously announced global went away.
    GlobalRemove { name: u32 },

    /// One-shot callback fired (sync round trip or frame pacing).
    CallbackDone { data: u32 },

    SurfaceEnter { output: u32 },
    SurfaceLeave { output: u32 },

    /// The shm global supports this pixel format code.
    ShmFormat { format: u32 },

    /// The peer finished reading the buffer's contents.
    BufferRelease,

    SeatCapabilities { capabilities: SeatCapabilities },
    SeatName { name: String },

    PointerEnter {
        serial: u32,
        surface: u32,
        x: f64,
        y: f64,
    },
    PointerLeave { serial: u32, surface: u32 },
    PointerMotion { time: u32, x: f64, y: f64 },
    PointerButton {
        serial: u32,
        time: u32,
        button: u32,
        pressed: bool,
    },

    /// Keymap description; the file descriptor travels as ancillary data.
    KeyboardKeymap { format: u32, size: u32 },
    KeyboardEnter {
        serial: u32,
        surface: u32,
        keys: Vec<u32>,
    },
    KeyboardLeave { serial: u32, surface: u32 },
    KeyboardKey {
        serial: u32,
        time: u32,
        key: u32,
        pressed: bool,
    },
    KeyboardModifiers {
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },

    /// Liveness check; must be answered with a pong carrying the same serial.
    WmBasePing { serial: u32 },
    XdgSurfaceConfigure { serial: u32 },
    ToplevelConfigure {
        width: i32,
        height: i32,
        states: Vec<u32>,
    },
    ToplevelClose,
}

impl Event {
    /// Decode the payload of an event sent by an object of `interface`.
    ///
    /// Returns `Ok(None)` for opcodes this client does not handle; the caller
    /// should skip the message using its declared length.
    pub fn decode(
        interface: Interface,
        opcode: u16,
        payload: &[u8],
    ) -> Result<Option<Self>, WireError> {
        let mut args = Decoder::new(payload);
        let a = &mut args;

        let event = match (interface, opcode) {
            (Interface::Display, op::wl_display::ERROR) => Self::DisplayError {
                object_id: a.read_u32()?,
                code: a.read_u32()?,
                message: a.read_string()?,
            },
            (Interface::Display, op::wl_display::DELETE_ID) => Self::DeleteId { id: a.read_u32()? },

            (Interface::Registry, op::wl_registry::GLOBAL) => Self::Global {
                name: a.read_u32()?,
                interface: a.read_string()?,
                version: a.read_u32()?,
            },
            (Interface::Registry, op::wl_registry::GLOBAL_REMOVE) => {
                Self::GlobalRemove { name: a.read_u32()? }
            }

            (Interface::Callback, op::wl_callback::DONE) => Self::CallbackDone { data: a.read_u32()? },

            (Interface::Surface, op::wl_surface::ENTER) => Self::SurfaceEnter { output: a.read_u32()? },
            (Interface::Surface, op::wl_surface::LEAVE) => Self::SurfaceLeave { output: a.read_u32()? },

            (Interface::Shm, op::wl_shm::FORMAT) => Self::ShmFormat { format: a.read_u32()? },

            (Interface::Buffer, op::wl_buffer::RELEASE) => Self::BufferRelease,

            (Interface::Seat, op::wl_seat::CAPABILITIES) => Self::SeatCapabilities {
                capabilities: SeatCapabilities::from_bits_truncate(a.read_u32()?),
            },
            (Interface::Seat, op::wl_seat::NAME) => Self::SeatName { name: a.read_string()? },

            (Interface::Pointer, op::wl_pointer::ENTER) => Self::PointerEnter {
                serial: a.read_u32()?,
                surface: a.read_u32()?,
                x: a.read_fixed()?,
                y: a.read_fixed()?,
            },
            (Interface::Pointer, op::wl_pointer::LEAVE) => Self::PointerLeave {
                serial: a.read_u32()?,
                surface: a.read_u32()?,
            },
            (Interface::Pointer, op::wl_pointer::MOTION) => Self::PointerMotion {
                time: a.read_u32()?,
                x: a.read_fixed()?,
                y: a.read_fixed()?,
            },
            (Interface::Pointer, op::wl_pointer::BUTTON) => Self::PointerButton {
                serial: a.read_u32()?,
                time: a.read_u32()?,
                button: a.read_u32()?,
                pressed: a.read_u32()? != 0,
            },

            (Interface::Keyboard, op::wl_keyboard::KEYMAP) => Self::KeyboardKeymap {
                format: a.read_u32()?,
                size: a.read_u32()?,
            },
            (Interface::Keyboard, op::wl_keyboard::ENTER) => Self::KeyboardEnter {
                serial: a.read_u32()?,
                surface: a.read_u32()?,
                keys: words(&a.read_array()?),
            },
            (Interface::Keyboard, op::wl_keyboard::LEAVE) => Self::KeyboardLeave {
                serial: a.read_u32()?,
                surface: a.read_u32()?,
            },
            (Interface::Keyboard, op::wl_keyboard::KEY) => Self::KeyboardKey {
                serial: a.read_u32()?,
                time: a.read_u32()?,
                key: a.read_u32()?,
                pressed: a.read_u32()? != 0,
            },
            (Interface::Keyboard, op::wl_keyboard::MODIFIERS) => Self::KeyboardModifiers {
                serial: a.read_u32()?,
                depressed: a.read_u32()?,
                latched: a.read_u32()?,
                locked: a.read_u32()?,
                group: a.read_u32()?,
            },

            (Interface::XdgWmBase, op::xdg_wm_base::PING) => Self::WmBasePing { serial: a.read_u32()? },
            (Interface::XdgSurface, op::xdg_surface::CONFIGURE) => {
                Self::XdgSurfaceConfigure { serial: a.read_u32()? }
            }
            (Interface::XdgToplevel, op::xdg_toplevel::CONFIGURE) => Self::ToplevelConfigure {
                width: a.read_i32()?,
                height: a.read_i32()?,
                states: words(&a.read_array()?),
            },
            (Interface::XdgToplevel, op::xdg_toplevel::CLOSE) => Self::ToplevelClose,

            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Number of file descriptors the event carries out of band.
    #[must_use]
    pub fn fd_count(&self) -> usize {
        match self {
            Self::KeyboardKeymap { .. } => 1,
            _ => 0,
        }
    }
}

// Arrays of u32 (pressed keys, toplevel states) in native byte order.
fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Encoder, double_to_fixed};

    fn payload(f: impl FnOnce(&mut Encoder) -> Result<(), WireError>) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(256);
        f(&mut enc).unwrap();
        enc.into_bytes()
    }

    #[test]
    fn test_decode_global() {
        let bytes = payload(|e| {
            e.write_u32(12)?;
            e.write_string("wl_shm")?;
            e.write_u32(1)
        });
        let event = Event::decode(Interface::Registry, 0, &bytes).unwrap();
        assert_eq!(
            event,
            Some(Event::Global {
                name: 12,
                interface: "wl_shm".to_string(),
                version: 1
            })
        );
    }

    #[test]
    fn test_decode_display_error() {
        let bytes = payload(|e| {
            e.write_u32(5)?;
            e.write_u32(2)?;
            e.write_string("invalid stride")
        });
        match Event::decode(Interface::Display, 0, &bytes).unwrap() {
            Some(Event::DisplayError {
                object_id,
                code,
                message,
            }) => {
                assert_eq!(object_id, 5);
                assert_eq!(code, 2);
                assert_eq!(message, "invalid stride");
            }
            other => panic!("expected DisplayError, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_pointer_motion_fixed() {
        let bytes = payload(|e| {
            e.write_u32(1000)?;
            e.write_u32(double_to_fixed(10.5))?;
            e.write_u32(256)
        });
        assert_eq!(
            Event::decode(Interface::Pointer, 2, &bytes).unwrap(),
            Some(Event::PointerMotion {
                time: 1000,
                x: 10.5,
                y: 1.0
            })
        );
    }

    #[test]
    fn test_decode_toplevel_configure_states() {
        let states: Vec<u8> = [1u32, 4].iter().flat_map(|s| s.to_ne_bytes()).collect();
        let bytes = payload(|e| {
            e.write_i32(800)?;
            e.write_i32(600)?;
            e.write_array(&states)
        });
        assert_eq!(
            Event::decode(Interface::XdgToplevel, 0, &bytes).unwrap(),
            Some(Event::ToplevelConfigure {
                width: 800,
                height: 600,
                states: vec![1, 4]
            })
        );
    }

    #[test]
    fn test_decode_release_has_no_args() {
        assert_eq!(
            Event::decode(Interface::Buffer, 0, &[]).unwrap(),
            Some(Event::BufferRelease)
        );
    }

    #[test]
    fn test_unknown_opcode_is_none() {
        // wl_pointer.frame (5) is not interpreted
        assert_eq!(Event::decode(Interface::Pointer, 5, &[]).unwrap(), None);
        // events are never sent by wl_compositor
        assert_eq!(Event::decode(Interface::Compositor, 0, &[]).unwrap(), None);
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let bytes = 7u32.to_ne_bytes();
        assert!(matches!(
            Event::decode(Interface::Pointer, 3, &bytes),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_keymap_carries_fd() {
        let bytes = payload(|e| {
            e.write_u32(1)?;
            e.write_u32(4096)
        });
        let event = Event::decode(Interface::Keyboard, 0, &bytes).unwrap().unwrap();
        assert_eq!(event.fd_count(), 1);
        assert_eq!(Event::BufferRelease.fd_count(), 0);
    }
}
