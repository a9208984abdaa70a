//! Waylite Client - protocol engine for a display-server client.
//!
//! This crate provides:
//! - [`Transport`]: the connection socket, with descriptor passing
//! - [`ObjectRegistry`]: id allocation, bound globals and retired ids
//! - [`BufferPool`]: shared-memory buffers and their release cycle
//! - [`EventLoop`]: framing, event routing and frame pacing, driving a
//!   [`Collaborator`] that draws and consumes input
//!
//! # Example
//!
//! ```no_run
//! use waylite_client::{Canvas, ClientConfig, Collaborator, EventLoop};
//!
//! struct Blank;
//!
//! impl Collaborator for Blank {
//!     fn on_redraw_needed(&mut self, canvas: &mut Canvas<'_>) {
//!         canvas.clear(0xff20_2020);
//!     }
//! }
//!
//! let mut event_loop = EventLoop::connect(ClientConfig::default(), Blank)?;
//! event_loop.run()?;
//! # Ok::<(), waylite_client::ClientError>(())
//! ```

mod canvas;
mod config;
mod dispatch;
mod error;
mod keymap;
mod pool;
mod registry;
mod transport;

pub use canvas::Canvas;
pub use config::{ClientConfig, MIN_BUFFERS};
pub use dispatch::{Collaborator, EventLoop, Phase, PointerState, list_globals};
pub use error::ClientError;
pub use keymap::KeyboardState;
pub use pool::{BufferPool, BufferState, BufferView, SharedMemory, request_frame_callback};
pub use registry::{
    Global, ObjectId, ObjectRegistry, RETIRED_CAPACITY, RegistryEntry, RetiredRing,
};
pub use transport::{RequestSink, Transport, wait_readable};

pub use waylite_protocol as protocol;
pub use waylite_protocol::{Interface, PointerButtons, ShmFormat};
