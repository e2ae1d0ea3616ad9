//! Filesystem watches
//!
//! The engine only needs to know when a trigger file is accessed or opened.
//! [`Watcher`] and [`EventSource`] are the seams the watch table and the event loop are written
//! against; [`Inotify`] implements both on Linux

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

/// Change kinds a trigger watch is interested in
pub const WATCH_MASK: u32 = libc::IN_ACCESS | libc::IN_OPEN;

/// Size of the fixed part of an `inotify_event`: `wd`, `mask`, `cookie`, `len`
const EVENT_HEADER_SIZE: usize = 16;

const EVENT_BUF_SIZE: usize = 64 * 1024;

/// A decoded change record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent {
    pub wd: i32,
    pub mask: u32,
}

impl WatchEvent {
    pub fn is_access_or_open(&self) -> bool {
        self.mask & WATCH_MASK != 0
    }
}

pub trait Watcher {
    /// Watch `path` for accesses and opens, returning its watch descriptor
    ///
    /// Watching the same path twice yields the same descriptor
    fn add_watch(&mut self, path: &Path) -> io::Result<i32>;

    fn remove_watch(&mut self, wd: i32) -> io::Result<()>;
}

pub trait EventSource {
    /// Block for at most `timeout` and return the change records queued so far
    ///
    /// An empty result means nothing happened (or the wait was interrupted)
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<WatchEvent>>;
}

/// An inotify instance
#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
    buf: Vec<u8>,
}

impl Inotify {
    pub fn new() -> io::Result<Self> {
        // SAFETY: no pointers involved, the result is checked
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC | libc::IN_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::debug!(fd, "initialized inotify");
        Ok(Inotify {
            // SAFETY: `fd` was just created and nothing else owns it
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            buf: vec![0u8; EVENT_BUF_SIZE],
        })
    }

    fn read_events(&mut self) -> io::Result<Vec<WatchEvent>> {
        // SAFETY: the buffer is valid for `buf.len()` bytes
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
            )
        };
        if n < 0 {
            let error = io::Error::last_os_error();
            return match error.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(Vec::new()),
                _ => Err(error),
            };
        }

        Ok(decode_events(&self.buf[..n as usize]))
    }
}

impl Watcher for Inotify {
    fn add_watch(&mut self, path: &Path) -> io::Result<i32> {
        let path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `path` is a valid nul-terminated string for the duration of the call
        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), path.as_ptr(), WATCH_MASK) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(wd)
    }

    fn remove_watch(&mut self, wd: i32) -> io::Result<()> {
        // SAFETY: no pointers involved, the result is checked
        if unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl EventSource for Inotify {
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<WatchEvent>> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a single valid pollfd
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(error);
        }

        if ready == 0 || pfd.revents & libc::POLLIN == 0 {
            return Ok(Vec::new());
        }

        self.read_events()
    }
}

fn field(buf: &[u8], at: usize) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    bytes
}

/// Decode the records of an inotify read
///
/// A truncated trailing record is dropped
pub fn decode_events(buf: &[u8]) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    let mut cursor = 0;
    while cursor + EVENT_HEADER_SIZE <= buf.len() {
        let wd = i32::from_ne_bytes(field(buf, cursor));
        let mask = u32::from_ne_bytes(field(buf, cursor + 4));
        let name_len = u32::from_ne_bytes(field(buf, cursor + 12)) as usize;

        events.push(WatchEvent { wd, mask });
        cursor += EVENT_HEADER_SIZE + name_len;
    }

    events
}
