//! Connection socket ownership and raw I/O.
//!
//! Requests go out through `sendmsg` so a file descriptor can ride along as
//! `SCM_RIGHTS` ancillary data in the same call. Reads go through `recvmsg`
//! for the same reason: descriptors sent by the peer (keymaps) are collected
//! into a queue and handed to the event that announced them.

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use waylite_protocol::{MAX_MESSAGE_SIZE, MessageBuffer, get_socket_path};

use crate::error::ClientError;

/// Most descriptors the peer attaches to a single chunk of stream data.
const MAX_FDS_IN: usize = 28;

/// Destination for encoded requests.
///
/// Implemented by [`Transport`]; the registry and buffer pool only need this
/// seam, which keeps them testable without a socket.
pub trait RequestSink {
    /// Write every byte or fail.
    fn send(&mut self, bytes: &[u8]) -> Result<(), ClientError>;

    /// Write every byte, attaching `fd` to the first chunk.
    fn send_with_fd(&mut self, bytes: &[u8], fd: BorrowedFd<'_>) -> Result<(), ClientError>;
}

/// Owner of the connection socket.
#[derive(Debug)]
pub struct Transport {
    stream: UnixStream,
    fds: VecDeque<OwnedFd>,
}

impl Transport {
    /// Connect to the socket named by the environment.
    pub fn connect() -> Result<Self, ClientError> {
        let path = get_socket_path()?;
        Self::connect_to(&path)
    }

    /// Connect to an explicit socket path.
    pub fn connect_to(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path).map_err(|source| ClientError::ConnectFailed {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(socket = %path.display(), "Connected to display server");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream,
            fds: VecDeque::new(),
        }
    }

    /// Read whatever is available into `inbox`.
    ///
    /// Blocks until at least one byte arrives. The bytes may end mid-message
    /// or span several messages; framing is the accumulator's job. Returns
    /// `Ok(0)` only if the socket was switched to non-blocking mode and had
    /// nothing to read.
    pub fn recv_into(&mut self, inbox: &mut MessageBuffer) -> Result<usize, ClientError> {
        let mut data = [0u8; MAX_MESSAGE_SIZE];
        let fd_bytes = std::mem::size_of::<libc::c_int>() * MAX_FDS_IN;
        // CMSG_SPACE includes the cmsghdr header overhead.
        let cmsg_space = unsafe { libc::CMSG_SPACE(fd_bytes as u32) } as usize;
        let mut cmsg_buf = vec![0u8; cmsg_space];

        loop {
            let mut iov = libc::iovec {
                iov_base: data.as_mut_ptr() as *mut libc::c_void,
                iov_len: data.len(),
            };
            // SAFETY: msghdr is a plain C struct; all-zero is a valid empty header.
            let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = cmsg_buf.len() as _;

            // SAFETY: msg points at buffers that outlive the call.
            let n = unsafe {
                libc::recvmsg(self.stream.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC)
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => return Ok(0),
                    _ => return Err(ClientError::disconnected(err)),
                }
            }
            if n == 0 {
                return Err(ClientError::peer_closed());
            }

            // SAFETY: the kernel filled msg_control; walk it with the CMSG macros.
            unsafe { self.collect_fds(&msg) };

            let n = n as usize;
            inbox.push(&data[..n]);
            tracing::trace!(bytes = n, buffered = inbox.len(), "Received");
            return Ok(n);
        }
    }

    /// Extract `SCM_RIGHTS` descriptors from a received message header.
    ///
    /// # Safety
    ///
    /// `msg` must be a header just filled in by a successful `recvmsg`.
    unsafe fn collect_fds(&mut self, msg: &libc::msghdr) {
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(msg) };
        while !cmsg.is_null() {
            let header = unsafe { &*cmsg };
            if header.cmsg_level == libc::SOL_SOCKET && header.cmsg_type == libc::SCM_RIGHTS {
                let data = unsafe { libc::CMSG_DATA(cmsg) };
                let count = (header.cmsg_len as usize - unsafe { libc::CMSG_LEN(0) } as usize)
                    / std::mem::size_of::<libc::c_int>();
                for i in 0..count {
                    let raw: libc::c_int = unsafe {
                        std::ptr::read_unaligned(
                            data.add(i * std::mem::size_of::<libc::c_int>()) as *const libc::c_int
                        )
                    };
                    // SAFETY: the kernel installed a fresh descriptor we now own.
                    self.fds.push_back(unsafe { OwnedFd::from_raw_fd(raw) });
                }
            }
            cmsg = unsafe { libc::CMSG_NXTHDR(msg, cmsg) };
        }
    }

    /// Take the oldest received descriptor.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fds.pop_front()
    }

    /// Number of received descriptors not yet claimed.
    #[must_use]
    pub fn pending_fds(&self) -> usize {
        self.fds.len()
    }

    // One sendmsg call; `fd` is attached as SCM_RIGHTS when present.
    fn sendmsg(&self, bytes: &[u8], fd: Option<RawFd>) -> io::Result<usize> {
        let fd_size = std::mem::size_of::<libc::c_int>();
        let cmsg_space = unsafe { libc::CMSG_SPACE(fd_size as u32) } as usize;
        let mut cmsg_buf = vec![0u8; cmsg_space];

        let mut iov = libc::iovec {
            iov_base: bytes.as_ptr() as *mut libc::c_void,
            iov_len: bytes.len(),
        };
        // SAFETY: msghdr is a plain C struct; all-zero is a valid empty header.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;

        if let Some(fd) = fd {
            msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = cmsg_space as _;
            // Populate cmsghdr with SOL_SOCKET / SCM_RIGHTS and the FD value.
            unsafe {
                let cmsg = libc::CMSG_FIRSTHDR(&msg);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len = libc::CMSG_LEN(fd_size as u32) as _;
                let data_ptr = libc::CMSG_DATA(cmsg) as *mut libc::c_int;
                std::ptr::write_unaligned(data_ptr, fd);
            }
        }

        // SAFETY: msg points at buffers that outlive the call.
        let n = unsafe { libc::sendmsg(self.stream.as_raw_fd(), &msg, libc::MSG_NOSIGNAL) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn send_all(&mut self, bytes: &[u8], fd: Option<RawFd>) -> Result<(), ClientError> {
        let mut written = 0;
        let mut pending_fd = fd;

        while written < bytes.len() {
            match self.sendmsg(&bytes[written..], pending_fd) {
                Ok(0) => {
                    return Err(ClientError::ShortWrite {
                        written,
                        expected: bytes.len(),
                    });
                }
                Ok(n) => {
                    written += n;
                    // the descriptor went out with the first chunk
                    pending_fd = None;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ClientError::disconnected(err)),
            }
        }

        tracing::trace!(bytes = written, with_fd = fd.is_some(), "Sent");
        Ok(())
    }
}

impl RequestSink for Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.send_all(bytes, None)
    }

    fn send_with_fd(&mut self, bytes: &[u8], fd: BorrowedFd<'_>) -> Result<(), ClientError> {
        self.send_all(bytes, Some(fd.as_raw_fd()))
    }
}

impl AsFd for Transport {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// Block until at least one descriptor is readable.
///
/// Hang-ups and errors count as readable so the next read observes them.
/// A negative `timeout_ms` waits forever. Returns one flag per input fd.
pub fn wait_readable(fds: &[RawFd], timeout_ms: i32) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    loop {
        // SAFETY: pollfds is a valid, correctly sized array.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}
