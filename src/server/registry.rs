use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use dashmap::DashMap;

use crate::common::SessionId;

/// Per-connection counters shared between the handler and the registry.
#[derive(Debug)]
pub struct SessionStats {
    pub peer: SocketAddr,
    pub connected_at: Instant,
    streaming: AtomicBool,
    frames_served: AtomicU64,
    bytes_served: AtomicU64,
}

impl SessionStats {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            connected_at: Instant::now(),
            streaming: AtomicBool::new(false),
            frames_served: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
        }
    }

    /// Marks the session as a streaming client. Returns true the first time.
    pub fn mark_streaming(&self) -> bool {
        !self.streaming.swap(true, Ordering::Relaxed)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    pub fn record_frame(&self, len: usize) {
        self.frames_served.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub open: usize,
    pub streaming: usize,
    pub frames_served: u64,
    pub bytes_served: u64,
}

/// Open sessions of one server process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionStats>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: SocketAddr) -> (SessionId, Arc<SessionStats>) {
        let id = SessionId::generate();
        let stats = Arc::new(SessionStats::new(peer));
        self.sessions.insert(id.clone(), stats.clone());
        (id, stats)
    }

    pub fn unregister(&self, id: &SessionId) -> Option<Arc<SessionStats>> {
        self.sessions.remove(id).map(|(_, stats)| stats)
    }

    /// The value answered to `load`: sessions that have requested at least one frame.
    pub fn load(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_streaming())
            .count()
    }

    pub fn open(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> RegistryStats {
        self.sessions
            .iter()
            .fold(RegistryStats::default(), |mut acc, entry| {
                let session = entry.value();
                acc.open += 1;
                if session.is_streaming() {
                    acc.streaming += 1;
                }
                acc.frames_served += session.frames_served();
                acc.bytes_served += session.bytes_served();
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn load_counts_only_streaming_sessions() {
        let registry = SessionRegistry::new();
        let (_probe, _) = registry.register(peer(50000));
        let (viewer, viewer_stats) = registry.register(peer(50001));
        assert_eq!(registry.load(), 0);

        assert!(viewer_stats.mark_streaming());
        assert!(!viewer_stats.mark_streaming());
        assert_eq!(registry.load(), 1);
        assert_eq!(registry.open(), 2);

        registry.unregister(&viewer);
        assert_eq!(registry.load(), 0);
        assert_eq!(registry.open(), 1);
    }

    #[test]
    fn stats_aggregate_counters() {
        let registry = SessionRegistry::new();
        let (_, a) = registry.register(peer(1));
        let (_, b) = registry.register(peer(2));
        a.mark_streaming();
        a.record_frame(10);
        a.record_frame(5);
        b.record_frame(1);

        assert_eq!(
            registry.stats(),
            RegistryStats {
                open: 2,
                streaming: 1,
                frames_served: 3,
                bytes_served: 16,
            }
        );
    }
}
