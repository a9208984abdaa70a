//! The event loop: framing, routing and the render/commit cycle.
//!
//! A session moves through
//! `Disconnected -> Connecting -> RegistryBinding -> SurfaceSetup -> Running -> ShuttingDown`.
//! Everything runs on the calling thread. The loop only blocks in
//! [`wait_readable`], on the connection plus any descriptors the collaborator
//! owns.

use std::os::fd::{AsRawFd, RawFd};

use waylite_protocol::{
    DISPLAY_ID, Event, Interface, MessageBuffer, PointerButtons, RawMessage, Request,
    SeatCapabilities,
};

use crate::canvas::Canvas;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::keymap::KeyboardState;
use crate::pool::{BufferPool, request_frame_callback};
use crate::registry::{Global, ObjectId, ObjectRegistry};
use crate::transport::{Transport, wait_readable};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No connection. A failed connect ends here.
    Disconnected,
    /// Socket open, registry not requested yet.
    Connecting,
    /// Binding required globals as they are announced.
    RegistryBinding,
    /// Surface, window and buffers created; waiting for the first configure.
    SurfaceSetup,
    /// Normal operation.
    Running,
    /// Closed by the window system, the collaborator or a fatal error.
    ShuttingDown,
}

/// The front end the loop drives: it draws frames and consumes input.
pub trait Collaborator {
    /// Draw the next frame into a free buffer.
    fn on_redraw_needed(&mut self, canvas: &mut Canvas<'_>);

    /// Bytes produced by a key press.
    fn on_key_input(&mut self, _bytes: &[u8]) {}

    /// Pointer moved or a button changed. Coordinates are surface-local.
    fn on_pointer_event(&mut self, _x: f64, _y: f64, _buttons: PointerButtons) {}

    /// The window system picked a new size.
    fn on_resize(&mut self, _width: u32, _height: u32) {}

    /// Extra descriptors to wait on alongside the connection.
    fn aux_fds(&self) -> Vec<RawFd> {
        Vec::new()
    }

    /// One of [`aux_fds`](Self::aux_fds) became readable.
    fn on_aux_readable(&mut self, _fd: RawFd) {}

    /// Whether the frame has changed since it was last drawn.
    fn needs_redraw(&self) -> bool {
        true
    }

    /// Polled after every wakeup; `true` ends the session.
    fn wants_close(&self) -> bool {
        false
    }

    /// The window was closed by the window system.
    fn on_close(&mut self) {}
}

/// Last known pointer position and buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    pub x: f64,
    pub y: f64,
    pub buttons: PointerButtons,
    /// The pointer is over our surface.
    pub focused: bool,
}

/// Event loop for one connection.
pub struct EventLoop<C> {
    config: ClientConfig,
    transport: Transport,
    inbox: MessageBuffer,
    registry: ObjectRegistry,
    pool: Option<BufferPool>,
    phase: Phase,
    collaborator: C,

    surface: Option<ObjectId>,
    xdg_surface: Option<ObjectId>,
    toplevel: Option<ObjectId>,
    pointer_id: Option<ObjectId>,
    keyboard_id: Option<ObjectId>,
    sync_callback: Option<ObjectId>,
    frame_callback: Option<ObjectId>,

    width: u32,
    height: u32,
    pending_size: Option<(u32, u32)>,
    redraw_deferred: bool,
    pointer: PointerState,
    keyboard: KeyboardState,
    shm_formats: Vec<u32>,
}

impl<C: Collaborator> EventLoop<C> {
    /// Connect to the socket named by the environment.
    pub fn connect(config: ClientConfig, collaborator: C) -> Result<Self, ClientError> {
        match Transport::connect() {
            Ok(transport) => Ok(Self::with_transport(config, transport, collaborator)),
            Err(err) => {
                tracing::error!(error = %err, phase = ?Phase::Disconnected, "Connect failed");
                Err(err)
            }
        }
    }

    /// Drive an already connected transport.
    pub fn with_transport(config: ClientConfig, transport: Transport, collaborator: C) -> Self {
        Self {
            width: config.width,
            height: config.height,
            config,
            transport,
            inbox: MessageBuffer::new(),
            registry: ObjectRegistry::new(),
            pool: None,
            phase: Phase::Connecting,
            collaborator,
            surface: None,
            xdg_surface: None,
            toplevel: None,
            pointer_id: None,
            keyboard_id: None,
            sync_callback: None,
            frame_callback: None,
            pending_size: None,
            redraw_deferred: false,
            pointer: PointerState::default(),
            keyboard: KeyboardState::new(),
            shm_formats: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    #[must_use]
    pub fn surface(&self) -> Option<ObjectId> {
        self.surface
    }

    #[must_use]
    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    /// Current surface size.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel format codes the shm global advertised.
    #[must_use]
    pub fn shm_formats(&self) -> &[u32] {
        &self.shm_formats
    }

    /// Whether a redraw is waiting for a buffer release.
    #[must_use]
    pub fn redraw_deferred(&self) -> bool {
        self.redraw_deferred
    }

    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }

    pub fn collaborator_mut(&mut self) -> &mut C {
        &mut self.collaborator
    }

    /// Request the registry and a sync round trip that marks the end of the
    /// initial global announcements.
    pub fn start(&mut self) -> Result<(), ClientError> {
        if self.phase != Phase::Connecting {
            return Err(ClientError::InvalidState(format!(
                "cannot start from {:?}",
                self.phase
            )));
        }
        let registry = self.registry.insert_registry();
        self.registry.send(
            &mut self.transport,
            DISPLAY_ID,
            &Request::GetRegistry { registry },
        )?;
        let callback = self.registry.insert(Interface::Callback, 1);
        self.registry
            .send(&mut self.transport, DISPLAY_ID, &Request::Sync { callback })?;
        self.sync_callback = Some(callback);
        self.set_phase(Phase::RegistryBinding);
        Ok(())
    }

    /// Run until the session ends, then tear it down.
    ///
    /// Returns the fatal error that ended the session, if any.
    pub fn run(&mut self) -> Result<(), ClientError> {
        let result = self.run_until_closed();
        if let Err(err) = &result {
            tracing::error!(error = %err, phase = ?self.phase, "Session failed");
        }
        self.shutdown();
        result
    }

    fn run_until_closed(&mut self) -> Result<(), ClientError> {
        if self.phase == Phase::Connecting {
            self.start()?;
        }
        while self.phase != Phase::ShuttingDown {
            self.pump(-1)?;
        }
        Ok(())
    }

    /// Wait once for input, read it and dispatch every complete message.
    ///
    /// A negative timeout waits forever. Only fatal errors are returned.
    pub fn pump(&mut self, timeout_ms: i32) -> Result<(), ClientError> {
        let aux = self.collaborator.aux_fds();
        let mut fds = Vec::with_capacity(aux.len() + 1);
        fds.push(self.transport.as_raw_fd());
        fds.extend_from_slice(&aux);

        let ready = wait_readable(&fds, timeout_ms).map_err(ClientError::disconnected)?;
        for (&fd, _) in aux.iter().zip(&ready[1..]).filter(|(_, ready)| **ready) {
            self.collaborator.on_aux_readable(fd);
        }

        if ready[0] {
            if let Err(err) = self.transport.recv_into(&mut self.inbox) {
                return Err(self.connection_lost(err));
            }
        }
        self.dispatch_pending()?;

        if self.phase != Phase::ShuttingDown && self.collaborator.wants_close() {
            tracing::info!("Collaborator requested close");
            self.set_phase(Phase::ShuttingDown);
        }
        if self.phase == Phase::Running
            && self.frame_callback.is_none()
            && self.collaborator.needs_redraw()
        {
            let result = self.redraw().map(|_| ());
            self.recover(result)?;
        }
        Ok(())
    }

    /// Dispatch every complete buffered message, leaving any partial tail.
    ///
    /// Recoverable handler errors are logged and skipped. Returns the number
    /// of messages handled.
    pub fn dispatch_pending(&mut self) -> Result<usize, ClientError> {
        let mut handled = 0;
        while let Some(msg) = self.inbox.next_message()? {
            let result = self.dispatch(&msg);
            self.recover(result)?;
            handled += 1;
            if self.phase == Phase::ShuttingDown {
                break;
            }
        }
        Ok(handled)
    }

    /// Draw into a free buffer, attach it, ask for a frame callback and
    /// commit.
    ///
    /// Returns `false` when every buffer is still held by the peer; the
    /// redraw then happens on the next release.
    pub fn redraw(&mut self) -> Result<bool, ClientError> {
        if !matches!(self.phase, Phase::SurfaceSetup | Phase::Running) {
            return Err(ClientError::InvalidState(format!(
                "cannot draw while {:?}",
                self.phase
            )));
        }
        let (Some(surface), Some(pool)) = (self.surface, self.pool.as_mut()) else {
            return Err(ClientError::InvalidState("no surface to draw on".into()));
        };
        let Some(buffer) = pool.acquire_free() else {
            tracing::debug!("No free buffer, deferring redraw");
            self.redraw_deferred = true;
            return Ok(false);
        };

        {
            let mut canvas = pool.canvas(buffer)?;
            self.collaborator.on_redraw_needed(&mut canvas);
        }
        pool.attach(&mut self.registry, &mut self.transport, surface, buffer)?;
        let callback = request_frame_callback(&mut self.registry, &mut self.transport, surface)?;
        self.frame_callback = Some(callback);
        pool.commit(&mut self.registry, &mut self.transport, surface)?;
        self.redraw_deferred = false;
        Ok(true)
    }

    /// Destroy the window, surface and pool, then forget every object.
    ///
    /// Any partial message left in the accumulator is discarded. Safe to call
    /// more than once.
    pub fn shutdown(&mut self) {
        self.set_phase(Phase::ShuttingDown);
        if let Err(err) = self.destroy_objects() {
            tracing::debug!(error = %err, "Teardown incomplete");
        }
        self.registry.clear();
        let dropped = self.inbox.discard();
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "Discarded partial message");
        }
    }

    fn destroy_objects(&mut self) -> Result<(), ClientError> {
        if let Some(toplevel) = self.toplevel.take() {
            self.destroy_object(toplevel, &Request::ToplevelDestroy)?;
        }
        if let Some(xdg_surface) = self.xdg_surface.take() {
            self.destroy_object(xdg_surface, &Request::XdgSurfaceDestroy)?;
        }
        if let Some(pool) = self.pool.take() {
            pool.destroy(&mut self.registry, &mut self.transport)?;
        }
        if let Some(surface) = self.surface.take() {
            self.destroy_object(surface, &Request::SurfaceDestroy)?;
        }
        Ok(())
    }

    fn destroy_object(&mut self, id: ObjectId, request: &Request<'_>) -> Result<(), ClientError> {
        let result = self.registry.send(&mut self.transport, id, request);
        self.registry.destroy(id);
        result
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::info!(from = ?self.phase, to = ?phase, "Phase change");
            self.phase = phase;
        }
    }

    /// Log and swallow errors local to one operation.
    fn recover(&self, result: Result<(), ClientError>) -> Result<(), ClientError> {
        match result {
            Err(ClientError::UnknownObjectOrOpcode { object_id, opcode }) => {
                tracing::debug!(object_id = object_id, opcode = opcode, "Skipped event");
                Ok(())
            }
            Err(err) if !err.is_fatal() => {
                tracing::warn!(error = %err, "Recovered from error");
                Ok(())
            }
            other => other,
        }
    }

    /// A dropped connection during registry binding means the globals never
    /// arrived.
    fn connection_lost(&self, err: ClientError) -> ClientError {
        let missing = self.missing_globals();
        if self.phase == Phase::RegistryBinding
            && matches!(err, ClientError::Disconnected(_))
            && !missing.is_empty()
        {
            return ClientError::MissingGlobal(missing);
        }
        err
    }

    fn missing_globals(&self) -> Vec<&'static str> {
        self.config
            .required()
            .into_iter()
            .filter(|iface| self.registry.bound(*iface).is_none())
            .map(Interface::name)
            .collect()
    }

    fn dispatch(&mut self, msg: &RawMessage) -> Result<(), ClientError> {
        let id = msg.header.object_id;
        let opcode = msg.header.opcode;
        let Some(role) = self.registry.role_of(id) else {
            if self.registry.is_retired(id) {
                tracing::trace!(object_id = id, opcode = opcode, "Event for retired object");
                return Ok(());
            }
            return Err(ClientError::UnknownObjectOrOpcode {
                object_id: id,
                opcode,
            });
        };
        let Some(event) = Event::decode(role, opcode, &msg.payload)? else {
            return Err(ClientError::UnknownObjectOrOpcode {
                object_id: id,
                opcode,
            });
        };
        tracing::trace!(object_id = id, event = ?event, "Event");
        self.handle(id, event)
    }

    fn handle(&mut self, id: ObjectId, event: Event) -> Result<(), ClientError> {
        match event {
            Event::DisplayError {
                object_id,
                code,
                message,
            } => {
                return Err(ClientError::Protocol {
                    object_id,
                    code,
                    message,
                });
            }
            Event::DeleteId { id: deleted } => {
                self.registry.retire(deleted);
            }
            Event::Global {
                name,
                interface,
                version,
            } => self.on_global(Global {
                name,
                interface,
                version,
            })?,
            Event::GlobalRemove { name } => {
                self.registry.remove_global(name);
            }
            Event::CallbackDone { .. } => self.on_callback_done(id)?,
            Event::SurfaceEnter { output } | Event::SurfaceLeave { output } => {
                tracing::trace!(output = output, "Surface output changed");
            }
            Event::ShmFormat { format } => {
                self.registry.acknowledge(id);
                if !self.shm_formats.contains(&format) {
                    self.shm_formats.push(format);
                }
            }
            Event::BufferRelease => {
                let freed = match self.pool.as_mut() {
                    Some(pool) => pool.on_release(&mut self.registry, &mut self.transport, id)?,
                    None => false,
                };
                if freed && self.redraw_deferred {
                    self.redraw()?;
                }
            }
            Event::SeatCapabilities { capabilities } => self.on_capabilities(id, capabilities)?,
            Event::SeatName { name } => {
                tracing::debug!(seat = %name, "Seat name");
            }
            Event::PointerEnter { x, y, .. } => {
                self.pointer.focused = true;
                self.pointer.x = x;
                self.pointer.y = y;
                self.notify_pointer();
            }
            Event::PointerLeave { .. } => {
                self.pointer.focused = false;
                self.pointer.buttons = PointerButtons::empty();
            }
            Event::PointerMotion { x, y, .. } => {
                self.pointer.x = x;
                self.pointer.y = y;
                self.notify_pointer();
            }
            Event::PointerButton {
                button, pressed, ..
            } => {
                if let Some(flag) = PointerButtons::from_evdev(button) {
                    self.pointer.buttons.set(flag, pressed);
                    self.notify_pointer();
                }
            }
            Event::KeyboardKeymap { format, size } => {
                // Translation uses a fixed layout; the keymap file is closed.
                let fd = self.transport.take_fd();
                tracing::debug!(
                    format = format,
                    size = size,
                    received = fd.is_some(),
                    "Keymap"
                );
            }
            Event::KeyboardEnter { .. } => {}
            Event::KeyboardLeave { .. } => self.keyboard.reset(),
            Event::KeyboardKey { key, pressed, .. } => {
                if let Some(bytes) = self.keyboard.translate(key, pressed) {
                    self.collaborator.on_key_input(&bytes);
                }
            }
            Event::KeyboardModifiers {
                depressed,
                latched,
                locked,
                ..
            } => self.keyboard.set_modifiers(depressed, latched, locked),
            Event::WmBasePing { serial } => {
                self.registry
                    .send(&mut self.transport, id, &Request::Pong { serial })?;
                tracing::trace!(serial = serial, "Answered ping");
            }
            Event::XdgSurfaceConfigure { serial } => self.on_configure(id, serial)?,
            Event::ToplevelConfigure { width, height, .. } => {
                if width > 0 && height > 0 {
                    self.pending_size = Some((width.unsigned_abs(), height.unsigned_abs()));
                }
            }
            Event::ToplevelClose => {
                tracing::info!("Window closed by the window system");
                self.collaborator.on_close();
                self.set_phase(Phase::ShuttingDown);
            }
        }
        Ok(())
    }

    fn on_global(&mut self, global: Global) -> Result<(), ClientError> {
        let bindable = Interface::from_name(&global.interface)
            .filter(|iface| Interface::BINDABLE.contains(iface))
            .filter(|iface| *iface != Interface::XdgWmBase || self.config.window_shell);
        self.registry.announce(global);

        if let Some(iface) = bindable {
            let active = matches!(
                self.phase,
                Phase::RegistryBinding | Phase::SurfaceSetup | Phase::Running
            );
            if active && self.registry.bound(iface).is_none() {
                self.registry
                    .bind(&mut self.transport, iface, iface.max_version())?;
            }
        }

        if self.phase == Phase::RegistryBinding && self.missing_globals().is_empty() {
            self.setup_surface()?;
        }
        Ok(())
    }

    fn on_callback_done(&mut self, id: ObjectId) -> Result<(), ClientError> {
        // Callbacks are one-shot
        self.registry.retire(id);

        if self.sync_callback == Some(id) {
            self.sync_callback = None;
            if self.phase == Phase::RegistryBinding {
                return Err(ClientError::MissingGlobal(self.missing_globals()));
            }
        } else if self.frame_callback == Some(id) {
            self.frame_callback = None;
            if self.phase == Phase::Running && self.collaborator.needs_redraw() {
                self.redraw()?;
            }
        }
        Ok(())
    }

    fn on_capabilities(
        &mut self,
        seat: ObjectId,
        capabilities: SeatCapabilities,
    ) -> Result<(), ClientError> {
        self.registry.acknowledge(seat);
        tracing::debug!(capabilities = ?capabilities, "Seat capabilities");
        let version = self.registry.version_of(seat).unwrap_or(1);

        if capabilities.contains(SeatCapabilities::POINTER) && self.pointer_id.is_none() {
            let id = self.registry.insert(Interface::Pointer, version);
            self.registry
                .send(&mut self.transport, seat, &Request::GetPointer { id })?;
            self.pointer_id = Some(id);
        }
        if capabilities.contains(SeatCapabilities::KEYBOARD) && self.keyboard_id.is_none() {
            let id = self.registry.insert(Interface::Keyboard, version);
            self.registry
                .send(&mut self.transport, seat, &Request::GetKeyboard { id })?;
            self.keyboard_id = Some(id);
        }
        Ok(())
    }

    fn on_configure(&mut self, xdg_surface: ObjectId, serial: u32) -> Result<(), ClientError> {
        self.registry.send(
            &mut self.transport,
            xdg_surface,
            &Request::AckConfigure { serial },
        )?;

        let mut resized = false;
        if let Some((width, height)) = self.pending_size.take() {
            if (width, height) != (self.width, self.height) {
                self.resize(width, height)?;
                resized = true;
            }
        }

        if self.phase == Phase::SurfaceSetup {
            self.set_phase(Phase::Running);
            self.redraw()?;
        } else if resized {
            self.redraw()?;
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), ClientError> {
        tracing::info!(width = width, height = height, "Resizing surface");
        self.width = width;
        self.height = height;
        self.collaborator.on_resize(width, height);
        if let Some(pool) = self.pool.as_mut() {
            pool.reallocate(
                &mut self.registry,
                &mut self.transport,
                self.config.effective_buffer_count(),
                width,
                height,
                self.config.format,
            )?;
        }
        self.redraw_deferred = false;
        Ok(())
    }

    fn setup_surface(&mut self) -> Result<(), ClientError> {
        self.set_phase(Phase::SurfaceSetup);

        let compositor = self
            .registry
            .bound(Interface::Compositor)
            .ok_or_else(|| ClientError::MissingGlobal(vec![Interface::Compositor.name()]))?;
        let version = self.registry.version_of(compositor).unwrap_or(1);
        let surface = self.registry.insert(Interface::Surface, version);
        self.registry.send(
            &mut self.transport,
            compositor,
            &Request::CreateSurface { id: surface },
        )?;
        self.surface = Some(surface);

        let mut pool =
            BufferPool::create(&mut self.registry, &mut self.transport, self.config.pool_size())?;
        for _ in 0..self.config.effective_buffer_count() {
            pool.allocate_buffer(
                &mut self.registry,
                &mut self.transport,
                self.width,
                self.height,
                self.config.format,
            )?;
        }
        self.pool = Some(pool);

        if !self.config.window_shell {
            // No configure handshake for a bare surface
            self.set_phase(Phase::Running);
            self.redraw()?;
            return Ok(());
        }

        let wm_base = self
            .registry
            .bound(Interface::XdgWmBase)
            .ok_or_else(|| ClientError::MissingGlobal(vec![Interface::XdgWmBase.name()]))?;
        let xdg_surface = self.registry.insert(Interface::XdgSurface, 1);
        self.registry.send(
            &mut self.transport,
            wm_base,
            &Request::GetXdgSurface {
                id: xdg_surface,
                surface,
            },
        )?;
        self.xdg_surface = Some(xdg_surface);

        let toplevel = self.registry.insert(Interface::XdgToplevel, 1);
        self.registry.send(
            &mut self.transport,
            xdg_surface,
            &Request::GetToplevel { id: toplevel },
        )?;
        self.toplevel = Some(toplevel);
        self.registry.send(
            &mut self.transport,
            toplevel,
            &Request::SetTitle {
                title: &self.config.title,
            },
        )?;
        self.registry.send(
            &mut self.transport,
            toplevel,
            &Request::SetAppId {
                app_id: &self.config.app_id,
            },
        )?;

        // A buffer may only be attached after the first configure
        self.registry
            .send(&mut self.transport, surface, &Request::Commit)?;
        Ok(())
    }

    fn notify_pointer(&mut self) {
        self.collaborator
            .on_pointer_event(self.pointer.x, self.pointer.y, self.pointer.buttons);
    }
}

/// Connect, collect the advertised globals and return them.
///
/// Runs a get-registry plus sync round trip on a fresh registry; nothing is
/// bound.
pub fn list_globals(transport: &mut Transport) -> Result<Vec<Global>, ClientError> {
    let mut registry = ObjectRegistry::new();
    let mut inbox = MessageBuffer::new();

    let registry_id = registry.insert_registry();
    registry.send(
        &mut *transport,
        DISPLAY_ID,
        &Request::GetRegistry {
            registry: registry_id,
        },
    )?;
    let callback = registry.insert(Interface::Callback, 1);
    registry.send(&mut *transport, DISPLAY_ID, &Request::Sync { callback })?;

    loop {
        transport.recv_into(&mut inbox)?;
        while let Some(msg) = inbox.next_message()? {
            let Some(role) = registry.role_of(msg.header.object_id) else {
                continue;
            };
            match Event::decode(role, msg.header.opcode, &msg.payload)? {
                Some(Event::Global {
                    name,
                    interface,
                    version,
                }) => registry.announce(Global {
                    name,
                    interface,
                    version,
                }),
                Some(Event::CallbackDone { .. }) if msg.header.object_id == callback => {
                    return Ok(registry.globals().cloned().collect());
                }
                Some(Event::DisplayError {
                    object_id,
                    code,
                    message,
                }) => {
                    return Err(ClientError::Protocol {
                        object_id,
                        code,
                        message,
                    });
                }
                _ => {}
            }
        }
    }
}

impl<C> std::fmt::Debug for EventLoop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("phase", &self.phase)
            .field("surface", &self.surface)
            .field("size", &(self.width, self.height))
            .field("live_objects", &self.registry.live_count())
            .finish_non_exhaustive()
    }
}
