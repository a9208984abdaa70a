//! Shared-memory pool and the buffer views carved out of it.
//!
//! One pool owns one memfd-backed mapping. Buffers are rectangular views into
//! the mapping, each moving through
//! `Free -> Attached -> Committed -> InFlight -> Free`. Only `Free` buffers
//! can be drawn into; the peer may be reading the others.

use std::collections::BTreeMap;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};

use waylite_protocol::{Interface, Request, ShmFormat};

use crate::canvas::Canvas;
use crate::error::ClientError;
use crate::registry::{ObjectId, ObjectRegistry};
use crate::transport::RequestSink;

/// An anonymous memory file mapped read/write into this process.
#[derive(Debug)]
pub struct SharedMemory {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

impl SharedMemory {
    /// Create and map a region of `size` bytes.
    pub fn create(size: usize) -> Result<Self, ClientError> {
        if size == 0 {
            return Err(ClientError::AllocationFailed {
                size,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty pool"),
            });
        }

        // SAFETY: the name is a valid NUL-terminated string.
        let raw = unsafe { libc::memfd_create(c"waylite-shm".as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(allocation_failed(size));
        }
        // SAFETY: memfd_create returned a fresh descriptor we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        truncate(&fd, size)?;
        let ptr = map(&fd, size)?;
        tracing::debug!(size = size, "Mapped shared memory");
        Ok(Self { fd, ptr, len: size })
    }

    /// Extend the file and remap it. Shrinking is a no-op.
    pub fn grow(&mut self, new_size: usize) -> Result<(), ClientError> {
        if new_size <= self.len {
            return Ok(());
        }
        truncate(&self.fd, new_size)?;
        let ptr = map(&self.fd, new_size)?;
        // SAFETY: ptr/len describe the mapping created by the previous map().
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        self.ptr = ptr;
        self.len = new_size;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutable access to `len` bytes at `offset`, if in range.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        // SAFETY: the range is inside the mapping, which lives as long as
        // self, and the &mut self borrow rules out aliasing slices.
        Some(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) })
    }
}

impl AsFd for SharedMemory {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe a live mapping owned by self.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

fn allocation_failed(size: usize) -> ClientError {
    ClientError::AllocationFailed {
        size,
        source: io::Error::last_os_error(),
    }
}

fn truncate(fd: &OwnedFd, size: usize) -> Result<(), ClientError> {
    let len = libc::off_t::try_from(size).map_err(|_| ClientError::AllocationFailed {
        size,
        source: io::Error::new(io::ErrorKind::InvalidInput, "size exceeds off_t"),
    })?;
    // SAFETY: fd is a valid descriptor.
    if unsafe { libc::ftruncate(fd.as_raw_fd(), len) } < 0 {
        return Err(allocation_failed(size));
    }
    Ok(())
}

fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>, ClientError> {
    // SAFETY: a fresh shared mapping of a descriptor we own; no existing
    // memory is affected.
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(allocation_failed(size));
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| allocation_failed(size))
}

/// Where a buffer is in its round trip to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Owned by the client; safe to draw into.
    Free,
    /// Handed to a surface, commit not yet sent.
    Attached,
    /// Commit being sent.
    Committed,
    /// Committed; the peer may read it until it sends release.
    InFlight,
}

/// One rectangular view into the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferView {
    pub id: ObjectId,
    pub offset: usize,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: ShmFormat,
    pub state: BufferState,
    /// Surface the buffer is attached to while not `Free`.
    pub surface: Option<ObjectId>,
    /// Destroy once the peer releases it.
    pub destroy_on_release: bool,
}

impl BufferView {
    /// Bytes covered by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.len()
    }
}

fn wire_i32(value: usize) -> Result<i32, ClientError> {
    i32::try_from(value)
        .map_err(|_| ClientError::InvalidState(format!("{value} exceeds the wire range")))
}

/// One `wl_shm_pool` with its buffers.
#[derive(Debug)]
pub struct BufferPool {
    id: ObjectId,
    memory: SharedMemory,
    buffers: BTreeMap<ObjectId, BufferView>,
}

impl BufferPool {
    /// Map `size` bytes and hand the descriptor to the peer as a new pool.
    pub fn create(
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        size: usize,
    ) -> Result<Self, ClientError> {
        let shm = registry
            .bound(Interface::Shm)
            .ok_or_else(|| ClientError::MissingGlobal(vec![Interface::Shm.name()]))?;
        let wire_size = wire_i32(size)?;
        let memory = SharedMemory::create(size)?;

        let id = registry.insert(Interface::ShmPool, 1);
        registry.send_with_fd(
            sink,
            shm,
            &Request::CreatePool {
                id,
                size: wire_size,
            },
            memory.as_fd(),
        )?;
        tracing::info!(pool = id, size = size, "Created shared memory pool");

        Ok(Self {
            id,
            memory,
            buffers: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Current pool size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn buffer(&self, id: ObjectId) -> Option<&BufferView> {
        self.buffers.get(&id)
    }

    #[must_use]
    pub fn state(&self, id: ObjectId) -> Option<BufferState> {
        self.buffers.get(&id).map(|b| b.state)
    }

    /// Buffers in id order.
    pub fn buffers(&self) -> impl Iterator<Item = &BufferView> {
        self.buffers.values()
    }

    /// Register a view at an explicit offset.
    ///
    /// Fails with `OutOfBounds` if `offset + stride * height` exceeds the pool
    /// size; nothing is sent in that case.
    #[allow(clippy::too_many_arguments)]
    pub fn create_buffer(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        offset: usize,
        width: u32,
        height: u32,
        stride: u32,
        format: ShmFormat,
    ) -> Result<ObjectId, ClientError> {
        let len = stride as usize * height as usize;
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.size() {
            return Err(ClientError::OutOfBounds {
                offset,
                len,
                pool_size: self.size(),
            });
        }
        if width == 0 || height == 0 {
            return Err(ClientError::InvalidState(format!(
                "empty buffer {width}x{height}"
            )));
        }
        if u64::from(stride) < u64::from(width) * u64::from(format.bytes_per_pixel()) {
            return Err(ClientError::InvalidState(format!(
                "stride {stride} too small for width {width}"
            )));
        }
        if let Some(other) = self
            .buffers
            .values()
            .find(|b| offset < b.end() && b.offset < end)
        {
            return Err(ClientError::InvalidState(format!(
                "range {offset}..{end} overlaps buffer {}",
                other.id
            )));
        }

        let request_offset = wire_i32(offset)?;
        let id = registry.insert(Interface::Buffer, 1);
        registry.send(
            sink,
            self.id,
            &Request::CreateBuffer {
                id,
                offset: request_offset,
                width: wire_i32(width as usize)?,
                height: wire_i32(height as usize)?,
                stride: wire_i32(stride as usize)?,
                format: format.code(),
            },
        )?;

        self.buffers.insert(
            id,
            BufferView {
                id,
                offset,
                width,
                height,
                stride,
                format,
                state: BufferState::Free,
                surface: None,
                destroy_on_release: false,
            },
        );
        tracing::debug!(buffer = id, offset = offset, width = width, height = height, "Created buffer");
        Ok(id)
    }

    /// Carve a tightly packed view after the last existing one, growing the
    /// pool when it does not fit.
    pub fn allocate_buffer(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        width: u32,
        height: u32,
        format: ShmFormat,
    ) -> Result<ObjectId, ClientError> {
        let stride = width * format.bytes_per_pixel();
        let offset = self.buffers.values().map(BufferView::end).max().unwrap_or(0);
        let needed = offset + stride as usize * height as usize;
        if needed > self.size() {
            self.resize(registry, sink, needed)?;
        }
        self.create_buffer(registry, sink, offset, width, height, stride, format)
    }

    /// Grow the pool to `new_size` bytes. Pools never shrink.
    pub fn resize(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        new_size: usize,
    ) -> Result<(), ClientError> {
        if new_size <= self.size() {
            return Ok(());
        }
        let wire_size = wire_i32(new_size)?;
        self.memory.grow(new_size)?;
        registry.send(sink, self.id, &Request::PoolResize { size: wire_size })?;
        tracing::info!(pool = self.id, size = new_size, "Resized shared memory pool");
        Ok(())
    }

    /// Lowest-id buffer that is free to draw into.
    #[must_use]
    pub fn acquire_free(&self) -> Option<ObjectId> {
        self.buffers
            .values()
            .find(|b| b.state == BufferState::Free && !b.destroy_on_release)
            .map(|b| b.id)
    }

    /// Writable pixels of a `Free` buffer.
    pub fn canvas(&mut self, id: ObjectId) -> Result<Canvas<'_>, ClientError> {
        let view = self
            .buffers
            .get(&id)
            .ok_or_else(|| ClientError::InvalidState(format!("no buffer {id}")))?;
        if view.state != BufferState::Free {
            return Err(ClientError::InvalidState(format!(
                "buffer {id} is {:?}, not writable",
                view.state
            )));
        }
        let (offset, len) = (view.offset, view.len());
        let (width, height, stride, format) = (view.width, view.height, view.stride, view.format);
        let pool_size = self.size();
        let data = self
            .memory
            .slice_mut(offset, len)
            .ok_or(ClientError::OutOfBounds {
                offset,
                len,
                pool_size,
            })?;
        Ok(Canvas::new(data, width, height, stride, format))
    }

    /// Hand a `Free` buffer to `surface`.
    ///
    /// A buffer attached to the same surface but not yet committed is
    /// displaced and becomes `Free` again.
    pub fn attach(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        surface: ObjectId,
        buffer: ObjectId,
    ) -> Result<(), ClientError> {
        match self.state(buffer) {
            Some(BufferState::Free) => {}
            Some(state) => {
                return Err(ClientError::InvalidState(format!(
                    "cannot attach buffer {buffer} while {state:?}"
                )));
            }
            None => return Err(ClientError::InvalidState(format!("no buffer {buffer}"))),
        }

        registry.send(sink, surface, &Request::Attach { buffer, x: 0, y: 0 })?;

        for view in self.buffers.values_mut() {
            if view.state == BufferState::Attached && view.surface == Some(surface) {
                view.state = BufferState::Free;
                view.surface = None;
            }
        }
        if let Some(view) = self.buffers.get_mut(&buffer) {
            view.state = BufferState::Attached;
            view.surface = Some(surface);
        }
        Ok(())
    }

    /// Damage and commit `surface`, moving its attached buffer in flight.
    ///
    /// Uses buffer-coordinate damage when the surface version supports it.
    /// Returns the buffer that went in flight, if one was attached.
    pub fn commit(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        surface: ObjectId,
    ) -> Result<Option<ObjectId>, ClientError> {
        let attached = self
            .buffers
            .values()
            .find(|b| b.state == BufferState::Attached && b.surface == Some(surface))
            .map(|b| (b.id, b.width, b.height));

        if let Some((_, width, height)) = attached {
            let (w, h) = (wire_i32(width as usize)?, wire_i32(height as usize)?);
            let damage = if registry.version_of(surface).unwrap_or(1) >= 4 {
                Request::DamageBuffer {
                    x: 0,
                    y: 0,
                    width: w,
                    height: h,
                }
            } else {
                Request::Damage {
                    x: 0,
                    y: 0,
                    width: w,
                    height: h,
                }
            };
            registry.send(sink, surface, &damage)?;
        }

        let Some((id, ..)) = attached else {
            registry.send(sink, surface, &Request::Commit)?;
            return Ok(None);
        };

        if let Some(view) = self.buffers.get_mut(&id) {
            view.state = BufferState::Committed;
        }
        registry.send(sink, surface, &Request::Commit)?;
        if let Some(view) = self.buffers.get_mut(&id) {
            view.state = BufferState::InFlight;
        }
        tracing::trace!(surface = surface, buffer = id, "Committed buffer");
        Ok(Some(id))
    }

    /// Handle the peer's release of `buffer`.
    ///
    /// Returns whether the buffer became `Free`. Releases for buffers that
    /// are not in flight are logged and ignored. Buffers marked for
    /// destruction are destroyed here instead.
    pub fn on_release(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        buffer: ObjectId,
    ) -> Result<bool, ClientError> {
        let Some(view) = self.buffers.get_mut(&buffer) else {
            tracing::warn!(buffer = buffer, "Release for unknown buffer");
            return Ok(false);
        };
        match view.state {
            BufferState::InFlight | BufferState::Committed => {}
            state => {
                tracing::warn!(buffer = buffer, state = ?state, "Ignoring release");
                return Ok(false);
            }
        }

        view.state = BufferState::Free;
        view.surface = None;
        if view.destroy_on_release {
            self.destroy_now(registry, sink, buffer)?;
            return Ok(false);
        }
        tracing::trace!(buffer = buffer, "Buffer released");
        Ok(true)
    }

    /// Destroy a buffer, or mark it for destruction if the peer holds it.
    pub fn destroy_buffer(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        buffer: ObjectId,
    ) -> Result<(), ClientError> {
        match self.state(buffer) {
            None => Err(ClientError::InvalidState(format!("no buffer {buffer}"))),
            Some(BufferState::Free | BufferState::Attached) => {
                self.destroy_now(registry, sink, buffer)
            }
            Some(BufferState::Committed | BufferState::InFlight) => {
                if let Some(view) = self.buffers.get_mut(&buffer) {
                    view.destroy_on_release = true;
                }
                Ok(())
            }
        }
    }

    /// Destroy every buffer and carve `count` fresh ones of the new size.
    ///
    /// Buffers still in flight are destroyed when released, and their memory
    /// stays reserved until then.
    pub fn reallocate(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        count: usize,
        width: u32,
        height: u32,
        format: ShmFormat,
    ) -> Result<Vec<ObjectId>, ClientError> {
        let ids: Vec<ObjectId> = self.buffers.keys().copied().collect();
        for id in ids {
            self.destroy_buffer(registry, sink, id)?;
        }
        (0..count)
            .map(|_| self.allocate_buffer(registry, sink, width, height, format))
            .collect()
    }

    /// Destroy every buffer and the pool itself. The mapping is unmapped on
    /// drop.
    pub fn destroy(
        mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
    ) -> Result<(), ClientError> {
        let ids: Vec<ObjectId> = self.buffers.keys().copied().collect();
        for id in ids {
            self.destroy_now(registry, sink, id)?;
        }
        registry.send(sink, self.id, &Request::PoolDestroy)?;
        registry.destroy(self.id);
        tracing::debug!(pool = self.id, "Destroyed pool");
        Ok(())
    }

    fn destroy_now(
        &mut self,
        registry: &mut ObjectRegistry,
        sink: &mut impl RequestSink,
        buffer: ObjectId,
    ) -> Result<(), ClientError> {
        self.buffers.remove(&buffer);
        if registry.role_of(buffer).is_some() {
            registry.send(sink, buffer, &Request::BufferDestroy)?;
            registry.destroy(buffer);
        }
        tracing::trace!(buffer = buffer, "Destroyed buffer");
        Ok(())
    }
}

/// Ask for a one-shot "good time to draw" callback on `surface`.
///
/// Takes effect with the next commit. The id is retired when its `done`
/// arrives and is never reused.
pub fn request_frame_callback(
    registry: &mut ObjectRegistry,
    sink: &mut impl RequestSink,
    surface: ObjectId,
) -> Result<ObjectId, ClientError> {
    registry.ensure_live(surface)?;
    let callback = registry.insert(Interface::Callback, 1);
    registry.send(sink, surface, &Request::Frame { callback })?;
    Ok(callback)
}
