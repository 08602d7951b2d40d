//! # Piece Worklist
//!
//! Shared queue of pieces nobody has completed yet. Popping a piece hands it
//! to exactly one worker; the worker either turns it into a result or
//! pushes it back, so a piece is never in progress at two workers at once.
//!
//! The orchestrator holds a [`WorkCloser`]. Dropping it closes the
//! worklist: blocked and future pops return `None`.

use crate::piece::PieceWork;

use crossbeam_channel::{select, unbounded, Receiver, Sender, TryRecvError};

/// Handle shared by every worker.
#[derive(Clone)]
pub struct WorkQueue {
    tx: Sender<PieceWork>,
    rx: Receiver<PieceWork>,
    closed: Receiver<()>,
}

/// Closes the worklist when dropped.
pub struct WorkCloser {
    _tx: Sender<()>,
}

impl WorkQueue {
    /// Creates a worklist seeded with `pieces`.
    pub fn new<I>(pieces: I) -> (WorkQueue, WorkCloser)
    where
        I: IntoIterator<Item = PieceWork>,
    {
        let (tx, rx) = unbounded();
        let (closed_tx, closed) = unbounded();

        let queue = WorkQueue { tx, rx, closed };
        for piece in pieces {
            queue.push(piece);
        }

        (queue, WorkCloser { _tx: closed_tx })
    }

    /// Returns a piece to the worklist. Never blocks.
    pub fn push(&self, piece: PieceWork) {
        // The queue owns a receiver, so sending cannot fail
        let _ = self.tx.send(piece);
    }

    /// Claims the next piece, blocking while the worklist is empty.
    /// Returns `None` once the worklist has been closed.
    pub fn pop(&self) -> Option<PieceWork> {
        if self.is_closed() {
            return None;
        }

        select! {
            recv(self.rx) -> piece => piece.ok(),
            recv(self.closed) -> _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.closed.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Number of pieces waiting to be claimed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
