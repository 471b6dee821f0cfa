//! Thin epoll wrapper.
//!
//! Level-triggered. Every registration carries a [`Token`]; `wait` blocks
//! until at least one registered fd is ready (or the optional timeout
//! passes) and the caller then walks [`Poller::ready`].

use std::ops::BitOrAssign;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use sockhub_core::ClientId;

use crate::error::Result;

/// Identifies a registration in readiness results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

impl Token {
    pub const LISTENER: Token = Token(u64::MAX);
    pub const WAKE: Token = Token(u64::MAX - 1);

    #[inline]
    pub fn client(id: ClientId) -> Token {
        Token(id.as_u32() as u64)
    }

    /// The client this token was registered for, if it is a client token.
    #[inline]
    pub fn as_client(self) -> Option<ClientId> {
        u32::try_from(self.0).ok().map(ClientId::new)
    }
}

/// Registration interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest { readable: true, writable: false };
    pub const READ_WRITE: Interest = Interest { readable: true, writable: true };

    fn to_epoll(self) -> u32 {
        let mut events = 0;
        if self.readable {
            events |= libc::EPOLLIN | libc::EPOLLRDHUP;
        }
        if self.writable {
            events |= libc::EPOLLOUT;
        }
        events as u32
    }
}

/// Readiness reported for one registration. Accumulates with `|=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ready(u32);

impl Ready {
    pub const EMPTY: Ready = Ready(0);

    #[inline]
    pub fn from_epoll(events: u32) -> Ready {
        Ready(events)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Error and hangup count as readable so the next read reports them.
    #[inline]
    pub fn is_readable(self) -> bool {
        self.0 & (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.0 & (libc::EPOLLOUT | libc::EPOLLERR) as u32 != 0
    }
}

impl BitOrAssign for Ready {
    fn bitor_assign(&mut self, rhs: Ready) {
        self.0 |= rhs.0;
    }
}

pub struct Poller {
    epfd: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Poller {
    /// `max_events` bounds how many readiness results one `wait` returns.
    pub fn new(max_events: usize) -> Result<Self> {
        let fd = Errno::result(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        Ok(Self {
            // SAFETY: epoll_create1 just returned this descriptor.
            epfd: unsafe { OwnedFd::from_raw_fd(fd) },
            events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    pub fn add(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
    }

    pub fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
    }

    pub fn delete(&self, fd: RawFd) -> Result<()> {
        // Kernels before 2.6.9 required a non-null event even for DEL.
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        Errno::result(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut ev) })?;
        Ok(())
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: interest.to_epoll(),
            u64: token.0,
        };
        Errno::result(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) })?;
        Ok(())
    }

    /// Block until something is ready or `timeout` passes. Returns the
    /// number of results, 0 on timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };
        loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.epfd.as_raw_fd(),
                    self.events.as_mut_ptr(),
                    self.events.len() as libc::c_int,
                    timeout_ms,
                )
            };
            match Errno::result(n) {
                Ok(n) => return Ok(n as usize),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Results of the last `wait`.
    pub fn ready(&self, n: usize) -> impl Iterator<Item = (Token, Ready)> + '_ {
        self.events[..n.min(self.events.len())].iter().map(|ev| {
            // Copy out of the (packed on x86_64) struct before use.
            let token = ev.u64;
            let events = ev.events;
            (Token(token), Ready::from_epoll(events))
        })
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("epfd", &self.epfd.as_raw_fd())
            .field("max_events", &self.events.len())
            .finish()
    }
}
