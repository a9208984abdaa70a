//! Requests the client sends, with their argument layouts.

use crate::interface::{Interface, request as op};
use crate::message::encode_message;
use crate::wire::WireError;

/// A request addressed to one object.
///
/// `new_id` arguments are allocated by the caller before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    Sync { callback: u32 },
    GetRegistry { registry: u32 },

    /// Untyped bind: the interface name and version travel with the new id.
    Bind {
        name: u32,
        interface: &'a str,
        version: u32,
        id: u32,
    },

    CreateSurface { id: u32 },

    SurfaceDestroy,
    Attach { buffer: u32, x: i32, y: i32 },
    Damage {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    DamageBuffer {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Frame { callback: u32 },
    Commit,

    /// The pool's file descriptor travels as ancillary data.
    CreatePool { id: u32, size: i32 },

    CreateBuffer {
        id: u32,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    },
    PoolDestroy,
    PoolResize { size: i32 },

    BufferDestroy,

    GetPointer { id: u32 },
    GetKeyboard { id: u32 },

    WmBaseDestroy,
    GetXdgSurface { id: u32, surface: u32 },
    Pong { serial: u32 },

    XdgSurfaceDestroy,
    GetToplevel { id: u32 },
    AckConfigure { serial: u32 },

    ToplevelDestroy,
    SetTitle { title: &'a str },
    SetAppId { app_id: &'a str },
}

impl Request<'_> {
    /// Interface of the object this request must be sent to.
    #[must_use]
    pub const fn interface(&self) -> Interface {
        match self {
            Self::Sync { .. } | Self::GetRegistry { .. } => Interface::Display,
            Self::Bind { .. } => Interface::Registry,
            Self::CreateSurface { .. } => Interface::Compositor,
            Self::SurfaceDestroy
            | Self::Attach { .. }
            | Self::Damage { .. }
            | Self::DamageBuffer { .. }
            | Self::Frame { .. }
            | Self::Commit => Interface::Surface,
            Self::CreatePool { .. } => Interface::Shm,
            Self::CreateBuffer { .. } | Self::PoolDestroy | Self::PoolResize { .. } => {
                Interface::ShmPool
            }
            Self::BufferDestroy => Interface::Buffer,
            Self::GetPointer { .. } | Self::GetKeyboard { .. } => Interface::Seat,
            Self::WmBaseDestroy | Self::GetXdgSurface { .. } | Self::Pong { .. } => {
                Interface::XdgWmBase
            }
            Self::XdgSurfaceDestroy | Self::GetToplevel { .. } | Self::AckConfigure { .. } => {
                Interface::XdgSurface
            }
            Self::ToplevelDestroy | Self::SetTitle { .. } | Self::SetAppId { .. } => {
                Interface::XdgToplevel
            }
        }
    }

    #[must_use]
    pub const fn opcode(&self) -> u16 {
        match self {
            Self::Sync { .. } => op::wl_display::SYNC,
            Self::GetRegistry { .. } => op::wl_display::GET_REGISTRY,
            Self::Bind { .. } => op::wl_registry::BIND,
            Self::CreateSurface { .. } => op::wl_compositor::CREATE_SURFACE,
            Self::SurfaceDestroy => op::wl_surface::DESTROY,
            Self::Attach { .. } => op::wl_surface::ATTACH,
            Self::Damage { .. } => op::wl_surface::DAMAGE,
            Self::DamageBuffer { .. } => op::wl_surface::DAMAGE_BUFFER,
            Self::Frame { .. } => op::wl_surface::FRAME,
            Self::Commit => op::wl_surface::COMMIT,
            Self::CreatePool { .. } => op::wl_shm::CREATE_POOL,
            Self::CreateBuffer { .. } => op::wl_shm_pool::CREATE_BUFFER,
            Self::PoolDestroy => op::wl_shm_pool::DESTROY,
            Self::PoolResize { .. } => op::wl_shm_pool::RESIZE,
            Self::BufferDestroy => op::wl_buffer::DESTROY,
            Self::GetPointer { .. } => op::wl_seat::GET_POINTER,
            Self::GetKeyboard { .. } => op::wl_seat::GET_KEYBOARD,
            Self::WmBaseDestroy => op::xdg_wm_base::DESTROY,
            Self::GetXdgSurface { .. } => op::xdg_wm_base::GET_XDG_SURFACE,
            Self::Pong { .. } => op::xdg_wm_base::PONG,
            Self::XdgSurfaceDestroy => op::xdg_surface::DESTROY,
            Self::GetToplevel { .. } => op::xdg_surface::GET_TOPLEVEL,
            Self::AckConfigure { .. } => op::xdg_surface::ACK_CONFIGURE,
            Self::ToplevelDestroy => op::xdg_toplevel::DESTROY,
            Self::SetTitle { .. } => op::xdg_toplevel::SET_TITLE,
            Self::SetAppId { .. } => op::xdg_toplevel::SET_APP_ID,
        }
    }

    /// Whether sending this request destroys the target object.
    #[must_use]
    pub const fn is_destructor(&self) -> bool {
        matches!(
            self,
            Self::SurfaceDestroy
                | Self::PoolDestroy
                | Self::BufferDestroy
                | Self::WmBaseDestroy
                | Self::XdgSurfaceDestroy
                | Self::ToplevelDestroy
        )
    }

    /// Encode the request as a complete message addressed to `object_id`.
    pub fn encode(&self, object_id: u32) -> Result<Vec<u8>, WireError> {
        encode_message(object_id, self.opcode(), |e| match *self {
            Self::Sync { callback: id }
            | Self::GetRegistry { registry: id }
            | Self::CreateSurface { id }
            | Self::Frame { callback: id }
            | Self::GetPointer { id }
            | Self::GetKeyboard { id }
            | Self::GetToplevel { id } => e.write_u32(id),
            Self::Bind {
                name,
                interface,
                version,
                id,
            } => {
                e.write_u32(name)?;
                e.write_string(interface)?;
                e.write_u32(version)?;
                e.write_u32(id)
            }
            Self::Attach { buffer, x, y } => {
                e.write_u32(buffer)?;
                e.write_i32(x)?;
                e.write_i32(y)
            }
            Self::Damage {
                x,
                y,
                width,
                height,
            }
            | Self::DamageBuffer {
                x,
                y,
                width,
                height,
            } => {
                e.write_i32(x)?;
                e.write_i32(y)?;
                e.write_i32(width)?;
                e.write_i32(height)
            }
            Self::CreatePool { id, size } => {
                e.write_u32(id)?;
                e.write_i32(size)
            }
            Self::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                e.write_u32(id)?;
                e.write_i32(offset)?;
                e.write_i32(width)?;
                e.write_i32(height)?;
                e.write_i32(stride)?;
                e.write_u32(format)
            }
            Self::PoolResize { size } => e.write_i32(size),
            Self::GetXdgSurface { id, surface } => {
                e.write_u32(id)?;
                e.write_u32(surface)
            }
            Self::Pong { serial } | Self::AckConfigure { serial } => e.write_u32(serial),
            Self::SetTitle { title: s } | Self::SetAppId { app_id: s } => e.write_string(s),
            Self::SurfaceDestroy
            | Self::Commit
            | Self::PoolDestroy
            | Self::BufferDestroy
            | Self::WmBaseDestroy
            | Self::XdgSurfaceDestroy
            | Self::ToplevelDestroy => Ok(()),
        })
    }
}
