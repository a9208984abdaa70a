//! Client-side object bookkeeping.
//!
//! This module manages:
//! - Object id allocation (monotonic, starting after the display)
//! - Live objects and the interface each one implements
//! - Globals announced by the peer and the singletons bound from them
//! - A short history of retired ids for duplicate-deletion diagnostics

use std::collections::{BTreeMap, HashMap};
use std::os::fd::BorrowedFd;

use waylite_protocol::{DISPLAY_ID, Interface, Request};

use crate::error::ClientError;
use crate::transport::RequestSink;

/// Protocol object identifier.
pub type ObjectId = u32;

/// Capacity of the retired-id history.
pub const RETIRED_CAPACITY: usize = 256;

/// A global announced by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Peer-issued numeric name, echoed back in bind requests.
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

/// A live object known to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: ObjectId,
    pub interface: Interface,
    pub version: u32,
    /// Bound but still waiting for the peer's first descriptive event.
    pub pending: bool,
}

/// Fixed-size FIFO of recently retired ids.
///
/// When full, the oldest id is overwritten. Membership is only meaningful for
/// the last [`RETIRED_CAPACITY`] retirements.
#[derive(Debug, Clone)]
pub struct RetiredRing {
    ids: [ObjectId; RETIRED_CAPACITY],
    next: usize,
    len: usize,
}

impl RetiredRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: [0; RETIRED_CAPACITY],
            next: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, id: ObjectId) {
        self.ids[self.next] = id;
        self.next = (self.next + 1) % RETIRED_CAPACITY;
        self.len = (self.len + 1).min(RETIRED_CAPACITY);
    }

    /// Linear scan of the retained history.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids[..self.len].contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for RetiredRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Object registry for one connection.
#[derive(Debug)]
pub struct ObjectRegistry {
    next_id: ObjectId,
    entries: HashMap<ObjectId, RegistryEntry>,
    globals: BTreeMap<u32, Global>,
    bound: HashMap<Interface, ObjectId>,
    retired: RetiredRing,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            DISPLAY_ID,
            RegistryEntry {
                id: DISPLAY_ID,
                interface: Interface::Display,
                version: 1,
                pending: false,
            },
        );
        Self {
            next_id: DISPLAY_ID + 1,
            entries,
            globals: BTreeMap::new(),
            bound: HashMap::new(),
            retired: RetiredRing::new(),
        }
    }

    /// Allocate a fresh id. Ids are never handed out twice.
    pub fn next_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocate an id for a client-created object and record it as live.
    pub fn insert(&mut self, interface: Interface, version: u32) -> ObjectId {
        let id = self.next_id();
        self.entries.insert(
            id,
            RegistryEntry {
                id,
                interface,
                version,
                pending: false,
            },
        );
        tracing::trace!(id = id, interface = %interface, "Object created");
        id
    }

    /// Record the wl_registry object so binds can be sent through it.
    pub fn insert_registry(&mut self) -> ObjectId {
        let id = self.insert(Interface::Registry, 1);
        self.bound.insert(Interface::Registry, id);
        id
    }

    /// Record a global announcement.
    pub fn announce(&mut self, global: Global) {
        tracing::debug!(
            name = global.name,
            interface = %global.interface,
            version = global.version,
            "Global announced"
        );
        self.globals.insert(global.name, global);
    }

    /// Forget a global the peer withdrew.
    pub fn remove_global(&mut self, name: u32) -> Option<Global> {
        let removed = self.globals.remove(&name);
        if let Some(global) = &removed {
            tracing::info!(name = name, interface = %global.interface, "Global removed");
        }
        removed
    }

    /// All announced globals, ordered by name.
    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.values()
    }

    /// Bind the announced global implementing `interface`.
    ///
    /// The bound version is the lowest of `version`, the advertised version
    /// and what this client implements. Roles that describe themselves through
    /// a first event (shm formats, seat capabilities) stay pending until
    /// [`acknowledge`](Self::acknowledge) is called.
    pub fn bind(
        &mut self,
        sink: &mut impl RequestSink,
        interface: Interface,
        version: u32,
    ) -> Result<ObjectId, ClientError> {
        if let Some(&id) = self.bound.get(&interface) {
            return Err(ClientError::InvalidState(format!(
                "{interface} already bound as object {id}"
            )));
        }
        let registry = self
            .bound
            .get(&Interface::Registry)
            .copied()
            .ok_or_else(|| ClientError::InvalidState("registry not requested yet".into()))?;
        let global = self
            .globals
            .values()
            .find(|g| g.interface == interface.name())
            .cloned()
            .ok_or_else(|| ClientError::MissingGlobal(vec![interface.name()]))?;

        let version = version.min(global.version).min(interface.max_version());
        let id = self.next_id();
        self.send(
            sink,
            registry,
            &Request::Bind {
                name: global.name,
                interface: interface.name(),
                version,
                id,
            },
        )?;

        self.entries.insert(
            id,
            RegistryEntry {
                id,
                interface,
                version,
                pending: interface.expects_ack(),
            },
        );
        self.bound.insert(interface, id);
        tracing::info!(id = id, interface = %interface, version = version, "Bound global");
        Ok(id)
    }

    /// Mark a pending entry as acknowledged by the peer.
    pub fn acknowledge(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.pending = false;
        }
    }

    /// Object bound for a singleton global, if any.
    #[must_use]
    pub fn bound(&self, interface: Interface) -> Option<ObjectId> {
        self.bound.get(&interface).copied()
    }

    #[must_use]
    pub fn entry(&self, id: ObjectId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// Interface of a live object.
    #[must_use]
    pub fn role_of(&self, id: ObjectId) -> Option<Interface> {
        self.entries.get(&id).map(|e| e.interface)
    }

    #[must_use]
    pub fn version_of(&self, id: ObjectId) -> Option<u32> {
        self.entries.get(&id).map(|e| e.version)
    }

    /// Number of live objects, the display included.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    /// Forget an object after sending its destructor.
    ///
    /// The id only enters the retired history once the peer confirms the
    /// deletion.
    pub fn destroy(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.remove(&id) {
            self.bound.retain(|_, bound| *bound != id);
            tracing::trace!(id = id, interface = %entry.interface, "Object destroyed");
        }
    }

    /// Handle a deletion notification for `id`.
    ///
    /// Returns `false` if `id` was already in the retired history.
    pub fn retire(&mut self, id: ObjectId) -> bool {
        self.destroy(id);
        if self.retired.contains(id) {
            tracing::debug!(id = id, "Duplicate deletion notification");
            return false;
        }
        self.retired.push(id);
        true
    }

    /// Whether `id` is in the retired history.
    #[must_use]
    pub fn is_retired(&self, id: ObjectId) -> bool {
        self.retired.contains(id)
    }

    /// Refuse requests aimed at retired ids.
    pub fn ensure_live(&self, id: ObjectId) -> Result<(), ClientError> {
        if self.is_retired(id) {
            return Err(ClientError::UseAfterRetire(id));
        }
        Ok(())
    }

    /// Encode `request` for `target` and send it.
    ///
    /// Checks that the target is live and implements the request's interface.
    pub fn send(
        &self,
        sink: &mut impl RequestSink,
        target: ObjectId,
        request: &Request<'_>,
    ) -> Result<(), ClientError> {
        let bytes = self.prepare(target, request)?;
        sink.send(&bytes)
    }

    /// Like [`send`](Self::send), attaching `fd` as ancillary data.
    pub fn send_with_fd(
        &self,
        sink: &mut impl RequestSink,
        target: ObjectId,
        request: &Request<'_>,
        fd: BorrowedFd<'_>,
    ) -> Result<(), ClientError> {
        let bytes = self.prepare(target, request)?;
        sink.send_with_fd(&bytes, fd)
    }

    fn prepare(&self, target: ObjectId, request: &Request<'_>) -> Result<Vec<u8>, ClientError> {
        self.ensure_live(target)?;
        match self.role_of(target) {
            Some(role) if role == request.interface() => {}
            Some(role) => {
                return Err(ClientError::InvalidState(format!(
                    "object {target} is a {role}, request needs {}",
                    request.interface()
                )));
            }
            None => {
                return Err(ClientError::InvalidState(format!(
                    "object {target} is not live"
                )));
            }
        }
        tracing::trace!(target = target, request = ?request, "Request");
        Ok(request.encode(target)?)
    }

    /// Drop every entry except the display. Used on shutdown.
    pub fn clear(&mut self) {
        self.entries.retain(|&id, _| id == DISPLAY_ID);
        self.bound.clear();
        self.globals.clear();
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use waylite_protocol::MessageBuffer;

    /// Records requests instead of sending them.
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub inbox: MessageBuffer,
        pub fds_sent: usize,
    }

    impl Recorder {
        pub fn messages(&mut self) -> Vec<waylite_protocol::RawMessage> {
            let mut out = Vec::new();
            while let Some(msg) = self.inbox.next_message().unwrap() {
                out.push(msg);
            }
            out
        }
    }

    impl RequestSink for Recorder {
        fn send(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
            self.inbox.push(bytes);
            Ok(())
        }

        fn send_with_fd(&mut self, bytes: &[u8], _fd: BorrowedFd<'_>) -> Result<(), ClientError> {
            self.fds_sent += 1;
            self.inbox.push(bytes);
            Ok(())
        }
    }

    fn global(name: u32, interface: &str, version: u32) -> Global {
        Global {
            name,
            interface: interface.to_string(),
            version,
        }
    }

    #[test]
    fn test_next_id_monotonic_and_skips_display() {
        let mut registry = ObjectRegistry::new();
        let mut last = DISPLAY_ID;
        for _ in 0..1000 {
            let id = registry.next_id();
            assert_ne!(id, DISPLAY_ID);
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_bind_sends_request_and_records_entry() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        let reg_id = registry.insert_registry();
        registry.announce(global(5, "wl_compositor", 6));

        let id = registry.bind(&mut sink, Interface::Compositor, 4).unwrap();
        assert_eq!(registry.role_of(id), Some(Interface::Compositor));
        assert_eq!(registry.version_of(id), Some(4));
        assert_eq!(registry.bound(Interface::Compositor), Some(id));

        let msgs = sink.messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].header.object_id, reg_id);
        let mut args = msgs[0].args();
        assert_eq!(args.read_u32().unwrap(), 5);
        assert_eq!(args.read_string().unwrap(), "wl_compositor");
        assert_eq!(args.read_u32().unwrap(), 4);
        assert_eq!(args.read_u32().unwrap(), id);
    }

    #[test]
    fn test_bind_version_negotiation() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        registry.insert_registry();
        registry.announce(global(1, "wl_seat", 3));
        registry.announce(global(2, "wl_shm", 2));

        let seat = registry.bind(&mut sink, Interface::Seat, 9).unwrap();
        let shm = registry.bind(&mut sink, Interface::Shm, 9).unwrap();
        assert_eq!(registry.version_of(seat), Some(3));
        assert_eq!(registry.version_of(shm), Some(1));
    }

    #[test]
    fn test_pending_until_acknowledged() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        registry.insert_registry();
        registry.announce(global(1, "wl_shm", 1));
        registry.announce(global(2, "wl_compositor", 4));

        let shm = registry.bind(&mut sink, Interface::Shm, 1).unwrap();
        let comp = registry.bind(&mut sink, Interface::Compositor, 4).unwrap();
        assert!(registry.entry(shm).unwrap().pending);
        assert!(!registry.entry(comp).unwrap().pending);

        registry.acknowledge(shm);
        assert!(!registry.entry(shm).unwrap().pending);
    }

    #[test]
    fn test_bind_unannounced_global() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        registry.insert_registry();
        assert!(matches!(
            registry.bind(&mut sink, Interface::XdgWmBase, 1),
            Err(ClientError::MissingGlobal(_))
        ));
    }

    #[test]
    fn test_bind_twice_rejected() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        registry.insert_registry();
        registry.announce(global(1, "wl_shm", 1));
        registry.bind(&mut sink, Interface::Shm, 1).unwrap();
        assert!(matches!(
            registry.bind(&mut sink, Interface::Shm, 1),
            Err(ClientError::InvalidState(_))
        ));
    }

    #[test]
    fn test_retire_and_use_after_retire() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        let surface = registry.insert(Interface::Surface, 4);

        assert!(registry.retire(surface));
        assert!(registry.is_retired(surface));
        assert_eq!(registry.role_of(surface), None);
        assert!(matches!(
            registry.send(&mut sink, surface, &Request::Commit),
            Err(ClientError::UseAfterRetire(id)) if id == surface
        ));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_duplicate_retire_detected() {
        let mut registry = ObjectRegistry::new();
        let id = registry.insert(Interface::Callback, 1);
        assert!(registry.retire(id));
        assert!(!registry.retire(id));
    }

    #[test]
    fn test_retired_ring_overwrites_oldest() {
        let mut ring = RetiredRing::new();
        for id in 2..(2 + RETIRED_CAPACITY as u32) {
            ring.push(id);
        }
        assert_eq!(ring.len(), RETIRED_CAPACITY);
        assert!(ring.contains(2));

        ring.push(10_000);
        assert!(!ring.contains(2));
        assert!(ring.contains(3));
        assert!(ring.contains(10_000));
        assert_eq!(ring.len(), RETIRED_CAPACITY);
    }

    #[test]
    fn test_send_checks_interface() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        let buffer = registry.insert(Interface::Buffer, 1);
        assert!(matches!(
            registry.send(&mut sink, buffer, &Request::Commit),
            Err(ClientError::InvalidState(_))
        ));
        registry.send(&mut sink, buffer, &Request::BufferDestroy).unwrap();
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_destroy_then_send_rejected() {
        let mut registry = ObjectRegistry::new();
        let mut sink = Recorder::default();
        let surface = registry.insert(Interface::Surface, 1);
        registry.destroy(surface);
        assert!(!registry.is_retired(surface));
        assert!(registry.send(&mut sink, surface, &Request::Commit).is_err());
    }

    #[test]
    fn test_clear_keeps_display() {
        let mut registry = ObjectRegistry::new();
        registry.insert_registry();
        registry.insert(Interface::Surface, 1);
        registry.clear();
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.role_of(DISPLAY_ID), Some(Interface::Display));
    }
}
