//! # Download Orchestration
//!
//! Turns a torrent and a list of peers into the file's bytes.
//!
//! 1. **Seed** the worklist with one item per piece
//! 2. **Spawn** one worker thread per peer
//! 3. **Collect** verified pieces from the results channel and copy each to
//!    its offset in the output buffer
//! 4. **Close** the worklist once every piece has arrived
//!
//! The orchestrator never retries anything itself; retries happen by
//! workers returning pieces to the worklist. Workers hold the only senders
//! of the results channel, so when the last one exits with pieces still
//! missing the channel disconnects and the download fails instead of
//! waiting forever.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::peer::{Peer, PeerId};
use crate::piece::PieceResult;
use crate::torrent::Torrent;
use crate::worker::Worker;
use crate::worklist::WorkQueue;

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};

use std::sync::Arc;
use std::thread;

/// Downloads every piece of `torrent` from `peers` and returns the
/// assembled file.
pub fn download(
    torrent: &Torrent,
    peers: &[Peer],
    peer_id: &PeerId,
    config: &DownloadConfig,
) -> Result<Vec<u8>> {
    let piece_count = torrent.piece_count();
    info!(
        "Downloading {:?} ({} pieces) from {} peers",
        torrent.name(),
        piece_count,
        peers.len()
    );

    let (work, closer) = WorkQueue::new(torrent.piece_works()?);
    let (result_tx, result_rx): (Sender<PieceResult>, Receiver<PieceResult>) = unbounded();
    let config = Arc::new(config.clone());

    for peer in peers {
        let worker = Worker::new(
            peer.clone(),
            *peer_id,
            *torrent.info_hash(),
            work.clone(),
            result_tx.clone(),
            Arc::clone(&config),
        );

        thread::Builder::new()
            .name(format!("peer-{}", peer.id))
            .spawn(move || worker.start_download())?;
    }

    // Only workers may keep the results channel open
    drop(result_tx);

    let pb = progress_bar(torrent.length(), config.show_progress);

    let mut data: Vec<u8> = vec![0; torrent.length() as usize];
    let mut nb_pieces_downloaded = 0;
    while nb_pieces_downloaded < piece_count {
        let piece_result = match result_rx.recv() {
            Ok(piece_result) => piece_result,
            Err(_) => {
                pb.abandon();
                return Err(Error::Stalled {
                    remaining: piece_count - nb_pieces_downloaded,
                });
            }
        };

        let (begin, end) = torrent.piece_bounds(piece_result.index)?;
        if piece_result.data.len() != end - begin {
            return Err(Error::Protocol(format!(
                "piece {} has {} bytes, expected {}",
                piece_result.index,
                piece_result.data.len(),
                end - begin
            )));
        }
        data[begin..end].copy_from_slice(&piece_result.data);

        pb.inc((end - begin) as u64);
        nb_pieces_downloaded += 1;

        debug!(
            "Assembled piece {} ({}/{})",
            piece_result.index, nb_pieces_downloaded, piece_count
        );
    }

    pb.finish();

    // Workers blocked on the worklist wake up and leave
    drop(closer);

    Ok(data)
}

fn progress_bar(length: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(length);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::torrent::fixture;

    use std::time::{Duration, Instant};

    /// Torrent whose info hash the fake peers answer to.
    fn torrent_for(content: &[u8], piece_length: u32) -> Torrent {
        fixture::torrent("file.bin", content, piece_length)
    }

    fn pieces_of(content: &[u8], piece_length: usize) -> Vec<Vec<u8>> {
        content.chunks(piece_length).map(|c| c.to_vec()).collect()
    }

    fn fake(torrent: &Torrent, pieces: Vec<Vec<u8>>) -> FakePeer {
        FakePeer::new(pieces).with_info_hash(*torrent.info_hash())
    }

    #[test]
    fn two_pieces_from_one_peer() {
        let content = b"abcdef";
        let torrent = torrent_for(content, 4);
        assert_eq!(torrent.piece_count(), 2);

        let (peer, _fake) = fake(&torrent, pieces_of(content, 4)).spawn();

        let data = download(&torrent, &[peer], &LOCAL_PEER_ID, &test_config()).unwrap();
        assert_eq!(data, content.to_vec());
    }

    #[test]
    fn pieces_spread_over_peers() {
        let content: Vec<u8> = (0..100u8).collect();
        let torrent = torrent_for(&content, 16);
        let pieces = pieces_of(&content, 16);
        assert_eq!(pieces.len(), 7);

        // Each peer holds a different, overlapping subset
        let (even, _a) = fake(&torrent, pieces.clone())
            .with_bitfield(vec![0b1010_1010])
            .spawn();
        let (odd, _b) = fake(&torrent, pieces.clone())
            .with_bitfield(vec![0b0101_0110])
            .spawn();
        let dead = closed_port_peer();

        let data =
            download(&torrent, &[even, dead, odd], &LOCAL_PEER_ID, &test_config()).unwrap();
        assert_eq!(data, content);
    }

    #[test]
    fn corrupt_piece_is_retried_elsewhere() {
        let content: Vec<u8> = (0..40u8).collect();
        let torrent = torrent_for(&content, 10);
        let pieces = pieces_of(&content, 10);

        let (bad, _bad) = fake(&torrent, pieces.clone()).corrupt().spawn();
        let (good, _good) = fake(&torrent, pieces).spawn();

        let config = DownloadConfig {
            max_integrity_failures: 1,
            ..test_config()
        };
        let data = download(&torrent, &[bad, good], &LOCAL_PEER_ID, &config).unwrap();
        assert_eq!(data, content);
        for (index, chunk) in data.chunks(10).enumerate() {
            let work = &torrent.piece_works().unwrap()[index];
            assert!(work.verify(chunk).is_ok());
        }
    }

    #[test]
    fn no_live_peers_fails_instead_of_hanging() {
        let content = b"abcdef";
        let torrent = torrent_for(content, 4);

        let started = Instant::now();
        let err = download(
            &torrent,
            &[closed_port_peer(), closed_port_peer()],
            &LOCAL_PEER_ID,
            &test_config(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Stalled { remaining: 2 }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn only_corrupt_peers_stall() {
        let content = b"abcdef";
        let torrent = torrent_for(content, 4);

        let (bad, _bad) = fake(&torrent, pieces_of(content, 4)).corrupt().spawn();
        let config = DownloadConfig {
            max_integrity_failures: 1,
            ..test_config()
        };

        let err = download(&torrent, &[bad], &LOCAL_PEER_ID, &config).unwrap_err();
        assert!(matches!(err, Error::Stalled { remaining: 2 }));
    }

    #[test]
    fn partial_peer_cannot_finish_what_corrupt_peer_dropped() {
        let content = b"abcdef";
        let torrent = torrent_for(content, 4);

        let (bad, _bad) = fake(&torrent, pieces_of(content, 4)).corrupt().spawn();
        let (partial, _partial) = fake(&torrent, pieces_of(content, 4))
            .with_bitfield(vec![0b1000_0000])
            .spawn();
        let config = DownloadConfig {
            max_integrity_failures: 1,
            ..test_config()
        };

        let started = Instant::now();
        let err = download(&torrent, &[bad, partial], &LOCAL_PEER_ID, &config).unwrap_err();

        // Piece 1 is held only by the corrupt peer, which has left
        assert!(matches!(err, Error::Stalled { remaining } if remaining >= 1));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn wrong_swarm_peer_is_ignored() {
        let content = b"abcdef";
        let torrent = torrent_for(content, 4);

        let (stranger, _s) = FakePeer::new(pieces_of(content, 4))
            .with_info_hash([0xee; 20])
            .spawn();
        let (good, _g) = fake(&torrent, pieces_of(content, 4)).spawn();

        let data = download(&torrent, &[stranger, good], &LOCAL_PEER_ID, &test_config()).unwrap();
        assert_eq!(data, content.to_vec());
    }
}
