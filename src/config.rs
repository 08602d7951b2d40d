//! # Download Configuration
//!
//! Tunables for the peer engine. Defaults match what public swarms expect:
//! 16KB blocks, five pipelined requests, and short dial/handshake bounds so
//! dead peers are dropped quickly.

use std::time::Duration;

/// Default port announced to the tracker.
pub const DEFAULT_PORT: u16 = 6881;
/// Maximum number of unanswered block requests per peer.
pub const DEFAULT_MAX_BACKLOG: u32 = 5;
/// Largest block requested in one message (16KB).
pub const DEFAULT_BLOCK_SIZE: u32 = 16384;
/// Corrupt pieces a worker may produce before it gives up on its peer.
pub const DEFAULT_MAX_INTEGRITY_FAILURES: u32 = 3;

/// Settings shared (read-only) by the orchestrator and every worker.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Bound on the TCP dial.
    pub connect_timeout: Duration,
    /// Bound on the handshake exchange and the bitfield that follows it.
    pub handshake_timeout: Duration,
    /// Deadline for one attempt at fetching one piece.
    pub piece_timeout: Duration,
    pub max_backlog: u32,
    pub block_size: u32,
    /// Set to 1 to drop a peer on its first corrupt piece.
    pub max_integrity_failures: u32,
    /// Pause taken after a full pass over work the peer cannot serve.
    pub idle_backoff: Duration,
    pub tracker_timeout: Duration,
    pub port: u16,
    pub show_progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            piece_timeout: Duration::from_secs(30),
            max_backlog: DEFAULT_MAX_BACKLOG,
            block_size: DEFAULT_BLOCK_SIZE,
            max_integrity_failures: DEFAULT_MAX_INTEGRITY_FAILURES,
            idle_backoff: Duration::from_millis(100),
            tracker_timeout: Duration::from_secs(15),
            port: DEFAULT_PORT,
            show_progress: true,
        }
    }
}
