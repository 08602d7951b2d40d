//! # BitTorrent Worker Thread
//!
//! One worker per peer. Each worker owns its connection and talks to the
//! rest of the download only through the worklist and the results channel.
//!
//! ## Download Process
//!
//! 1. **Connection**: dial, handshake and read the peer's bitfield
//! 2. **Stance**: send CHOKE then INTERESTED
//! 3. **Claim loop**: pop a piece from the worklist
//!    - peer lacks it: push it back and claim again
//!    - peer has it: fetch it, verify it, send HAVE, emit the result
//! 4. **Exit** once the worklist is closed, or once repeated passes over
//!    it turn up nothing the peer has
//!
//! ## Failure Policy
//!
//! - Setup failure: the worker exits before claiming anything
//! - IO or protocol failure mid-fetch: the piece goes back and the worker
//!   exits, since the stream can no longer be trusted
//! - Integrity failure: the piece goes back and the worker keeps going,
//!   until it has produced `max_integrity_failures` corrupt pieces
//! - Nothing to serve: after `IDLE_PASSES` full passes over the worklist
//!   without a piece the peer advertises, the worker leaves. It only reads
//!   from the peer while fetching, so its bitfield cannot grow while idle.

use crate::client::Client;
use crate::config::DownloadConfig;
use crate::fetch::attempt_download_piece;
use crate::peer::{Peer, PeerId};
use crate::piece::PieceResult;
use crate::worklist::WorkQueue;

use crossbeam_channel::Sender;

use std::sync::Arc;
use std::thread;

/// Unproductive passes over the worklist before a worker gives up.
const IDLE_PASSES: u32 = 3;

/// Downloads pieces from a single peer.
pub struct Worker {
    /// Remote peer this worker is bound to
    peer: Peer,
    /// Our identifier, sent in the handshake
    peer_id: PeerId,
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    info_hash: [u8; 20],
    /// Pieces not yet completed by anyone
    work: WorkQueue,
    /// Verified pieces, consumed by the orchestrator
    results: Sender<PieceResult>,
    config: Arc<DownloadConfig>,
}

impl Worker {
    pub fn new(
        peer: Peer,
        peer_id: PeerId,
        info_hash: [u8; 20],
        work: WorkQueue,
        results: Sender<PieceResult>,
        config: Arc<DownloadConfig>,
    ) -> Worker {
        Worker {
            peer,
            peer_id,
            info_hash,
            work,
            results,
            config,
        }
    }

    /// Runs the worker until the worklist closes or the peer fails.
    pub fn start_download(self) {
        let peer = self.peer.clone();

        let mut client = match Client::connect(peer, &self.peer_id, &self.info_hash, &self.config)
        {
            Ok(client) => client,
            Err(e) => {
                debug!("Could not set up peer {}: {}", self.peer, e);
                return;
            }
        };

        info!("Completed handshake with peer {}", self.peer);

        if let Err(e) = client.send_choke().and_then(|_| client.send_interested()) {
            debug!("Could not announce interest to peer {}: {}", self.peer, e);
            return;
        }

        self.claim_loop(&mut client);
        client.shutdown();
    }

    fn claim_loop(&self, client: &mut Client) {
        let mut integrity_failures = 0;
        let mut skipped = 0;
        let mut idle_passes = 0;

        while let Some(piece) = self.work.pop() {
            // Peer does not have the piece: put it back for someone else
            if !client.has_piece(piece.index) {
                self.work.push(piece);

                skipped += 1;
                if skipped > self.work.len() {
                    idle_passes += 1;
                    if idle_passes >= IDLE_PASSES {
                        info!(
                            "Peer {} has none of the {} remaining pieces",
                            self.peer,
                            self.work.len()
                        );
                        break;
                    }
                    thread::sleep(self.config.idle_backoff);
                    skipped = 0;
                }
                continue;
            }
            skipped = 0;
            idle_passes = 0;

            let data = match attempt_download_piece(client, &piece, &self.config) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        "Giving up on peer {} after failing piece {}: {}",
                        self.peer, piece.index, e
                    );
                    self.work.push(piece);
                    return;
                }
            };

            if let Err(e) = piece.verify(&data) {
                self.work.push(piece);

                integrity_failures += 1;
                warn!(
                    "Peer {} sent a corrupt piece ({}/{}): {}",
                    self.peer, integrity_failures, self.config.max_integrity_failures, e
                );
                if integrity_failures >= self.config.max_integrity_failures {
                    return;
                }
                continue;
            }

            if let Err(e) = client.send_have(piece.index) {
                debug!("Could not send HAVE to peer {}: {}", self.peer, e);
            }

            if self
                .results
                .send(PieceResult::new(piece.index, data))
                .is_err()
            {
                // Nobody is collecting results anymore
                return;
            }
        }

        if let Err(e) = client.send_not_interested() {
            trace!("Could not send NOT_INTERESTED to peer {}: {}", self.peer, e);
        }
        debug!("Worker for peer {} exiting", self.peer);
    }
}
