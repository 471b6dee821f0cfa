//! `EventFdNotifier` — the engine's wake signal.
//!
//! The owner writes to an eventfd after enqueuing commands; the engine has
//! the same fd registered in its epoll set, so a blocked `epoll_wait`
//! returns. Coalescing: multiple `notify()` calls before the engine drains
//! the counter produce a single wakeup.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use sockhub_core::Notifier;

use crate::error::Result;

#[derive(Debug)]
pub struct EventFdNotifier {
    fd: OwnedFd,
}

impl EventFdNotifier {
    /// Create a non-blocking, close-on-exec eventfd. The fd is closed on drop.
    pub fn create() -> Result<Self> {
        let fd = Errno::result(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) })?;
        // SAFETY: eventfd just returned this descriptor and nothing else owns it.
        Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    /// Reset the counter. Returns how many notifications were coalesced
    /// (0 if none were pending).
    pub fn drain(&self) -> Result<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        match Errno::result(ret) {
            Ok(_) => Ok(val),
            Err(Errno::EAGAIN) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl AsRawFd for EventFdNotifier {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Notifier for EventFdNotifier {
    fn notify(&self) -> io::Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        match Errno::result(ret) {
            Ok(_) => Ok(()),
            // Counter would overflow: a wakeup is already pending.
            Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_coalesce() {
        let n = EventFdNotifier::create().unwrap();
        assert_eq!(n.drain().unwrap(), 0);
        n.notify().unwrap();
        n.notify().unwrap();
        n.notify().unwrap();
        assert_eq!(n.drain().unwrap(), 3);
        assert_eq!(n.drain().unwrap(), 0);
    }

    #[test]
    fn test_wakes_from_another_thread() {
        let n = std::sync::Arc::new(EventFdNotifier::create().unwrap());
        let remote = n.clone();
        std::thread::spawn(move || remote.notify().unwrap()).join().unwrap();
        assert_eq!(n.drain().unwrap(), 1);
    }
}
