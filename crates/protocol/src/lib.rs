//! Waylite Protocol - wire format for a socket-based display object protocol.
//!
//! This crate provides:
//! - [`Encoder`] and [`Decoder`] cursors for protocol primitives
//! - [`MessageHeader`] framing and the [`MessageBuffer`] receive accumulator
//! - [`Request`] encoders and [`Event`] decoders for the supported interfaces
//! - Socket path resolution via [`get_socket_path`]
//!
//! # Wire Format
//!
//! Each message is an 8-byte header (object id, then `size << 16 | opcode`)
//! followed by 32-bit aligned arguments in native byte order. Strings and
//! arrays are u32 length-prefixed and zero-padded to a 4-byte boundary.
//!
//! # Example
//!
//! ```rust
//! use waylite_protocol::{Event, Interface, MessageBuffer, Request};
//!
//! // Ask the display (object 1) for the registry, allocating id 2
//! let bytes = Request::GetRegistry { registry: 2 }.encode(1).unwrap();
//! assert_eq!(bytes.len(), 12);
//!
//! // Frame incoming bytes and decode by the sender's interface
//! let mut inbox = MessageBuffer::new();
//! inbox.push(&bytes);
//! let msg = inbox.next_message().unwrap().unwrap();
//! assert_eq!(msg.header.opcode, 1);
//! assert_eq!(Event::decode(Interface::Compositor, 0, &msg.payload).unwrap(), None);
//! ```

mod event;
mod interface;
mod message;
mod request;
mod socket;
mod wire;

// Re-export main types at crate root
pub use event::Event;
pub use interface::{
    Interface, Modifiers, PointerButtons, SeatCapabilities, ShmFormat, event as event_opcode,
    request as request_opcode,
};
pub use message::{
    HEADER_SIZE, MAX_MESSAGE_SIZE, MessageBuffer, MessageHeader, RawMessage, encode_message,
};
pub use request::Request;
pub use socket::{
    AddressError, DEFAULT_DISPLAY, DISPLAY_ENV, MAX_SOCKET_PATH, RUNTIME_DIR_ENV, get_socket_path,
    resolve_socket_path,
};
pub use wire::{Decoder, Encoder, WireError, double_to_fixed, fixed_to_double, roundup_4};

/// Object id of the display singleton. Exists from connection setup on and
/// is never allocated to any other object.
pub const DISPLAY_ID: u32 = 1;
