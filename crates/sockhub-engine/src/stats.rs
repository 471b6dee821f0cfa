//! Engine counters.
//!
//! Written by the engine thread with `Relaxed` increments, read by anyone
//! holding the handle. Counters are independent; a snapshot is not a
//! consistent cut across them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
    pub(crate) accepts: AtomicU64,
    pub(crate) closes: AtomicU64,
    pub(crate) messages_in: AtomicU64,
    pub(crate) messages_out: AtomicU64,
    pub(crate) bytes_in: AtomicU64,
    pub(crate) bytes_out: AtomicU64,
    pub(crate) io_errors: AtomicU64,
    pub(crate) accept_errors: AtomicU64,
    pub(crate) protocol_violations: AtomicU64,
    pub(crate) frames_rejected: AtomicU64,
    pub(crate) events_dropped: AtomicU64,
    pub(crate) sends_dropped: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            accepts: get(&self.accepts),
            closes: get(&self.closes),
            messages_in: get(&self.messages_in),
            messages_out: get(&self.messages_out),
            bytes_in: get(&self.bytes_in),
            bytes_out: get(&self.bytes_out),
            io_errors: get(&self.io_errors),
            accept_errors: get(&self.accept_errors),
            protocol_violations: get(&self.protocol_violations),
            frames_rejected: get(&self.frames_rejected),
            events_dropped: get(&self.events_dropped),
            sends_dropped: get(&self.sends_dropped),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections admitted
    pub accepts: u64,
    /// Clients torn down, for any reason
    pub closes: u64,
    /// Packets delivered to the owner as Message events
    pub messages_in: u64,
    /// Packets queued to client sockets
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Client sockets that failed with an OS error
    pub io_errors: u64,
    pub accept_errors: u64,
    /// Clients dropped for an oversized or otherwise unusable frame
    pub protocol_violations: u64,
    /// Frames the validator refused
    pub frames_rejected: u64,
    /// Events lost to a full event queue
    pub events_dropped: u64,
    /// Sends lost to a full client outbound buffer
    pub sends_dropped: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepts={} close={} msg_in={} msg_out={} bytes_in={} bytes_out={} io_err={} accept_err={} violations={} rejected={} ev_drop={} send_drop={}",
            self.accepts,
            self.closes,
            self.messages_in,
            self.messages_out,
            self.bytes_in,
            self.bytes_out,
            self.io_errors,
            self.accept_errors,
            self.protocol_violations,
            self.frames_rejected,
            self.events_dropped,
            self.sends_dropped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_bumps() {
        let stats = EngineStats::default();
        bump(&stats.accepts, 2);
        bump(&stats.bytes_in, 512);
        bump(&stats.events_dropped, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.accepts, 2);
        assert_eq!(snap.bytes_in, 512);
        assert_eq!(snap.events_dropped, 1);
        assert_eq!(snap.closes, 0);
        assert!(snap.to_string().contains("ev_drop=1"));
    }
}
