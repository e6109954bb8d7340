//! The pipelined block-request pump for a single piece on a single peer.
//!
//! Keeps up to `MAX_BACKLOG` block requests in flight at once to hide a
//! peer's round-trip latency, in 16 KiB blocks -- the de-facto maximum
//! block size real peers honour.
use std::time::Duration;

use crate::peer::{Message, MessageId, PeerClient, PeerError, PeerResult};

pub const MAX_BLOCK_SIZE: u32 = 16384;
pub const MAX_BACKLOG: u32 = 5;
const PIECE_TIMEOUT: Duration = Duration::from_secs(30);

/// A unit of work handed out by the swarm coordinator: re-enqueued whole on
/// any failure, never split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    pub index: u32,
    pub hash: [u8; 20],
    pub length: u32,
}

/// A verified piece, produced by a worker and consumed by the coordinator
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Scoped to a single `(peer, piece)` attempt; never shared across workers.
struct PieceProgress {
    index: u32,
    length: u32,
    buf: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

impl PieceProgress {
    fn new(index: u32, length: u32) -> Self {
        Self {
            index,
            length,
            buf: vec![0u8; length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    /// Processes one already-read message against this piece's progress.
    fn apply(&mut self, client: &mut PeerClient, message: Message) -> PeerResult<()> {
        match message.id {
            MessageId::Unchoke => client.choked = false,
            MessageId::Choke => client.choked = true,
            MessageId::Have => {
                let index = crate::peer::message::parse_have(&message)?;
                client.bitfield.set(index as usize);
            }
            MessageId::Piece => {
                let n = crate::peer::message::parse_piece(self.index, &mut self.buf, &message)?;
                self.downloaded += n as u32;
                self.backlog = self.backlog.saturating_sub(1);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Downloads one piece from `client`, pipelining requests up to
/// `MAX_BACKLOG` in flight. Applies a 30-second socket timeout for the
/// whole operation and clears it on every exit path -- success, protocol
/// error, or I/O error -- via the `Drop`-adjacent `finally`-style guard
/// below.
pub fn attempt_download_piece(client: &mut PeerClient, work: &PieceWork) -> PeerResult<Vec<u8>> {
    client.set_timeout(Some(PIECE_TIMEOUT))?;
    let result = attempt_download_piece_inner(client, work);
    // Always clears, success or failure -- but never lets a cleanup error
    // on an already-broken socket mask the real failure.
    let _ = client.clear_timeout();
    result
}

fn attempt_download_piece_inner(client: &mut PeerClient, work: &PieceWork) -> PeerResult<Vec<u8>> {
    let mut progress = PieceProgress::new(work.index, work.length);

    while progress.downloaded < progress.length {
        while !client.choked && progress.backlog < MAX_BACKLOG && progress.requested < progress.length
        {
            let block_size = MAX_BLOCK_SIZE.min(progress.length - progress.requested);
            client.request(progress.index, progress.requested, block_size)?;
            progress.backlog += 1;
            progress.requested += block_size;
        }

        match client.read_next_message()? {
            Some(message) => progress.apply(client, message)?,
            None => {} // keep-alive
        }
    }

    Ok(progress.buf)
}

/// `SHA1(data) == work.hash`, per spec.md §4.8/§7 `IntegrityFailure`.
pub fn verify_integrity(work: &PieceWork, data: &[u8]) -> Result<(), PeerError> {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    if digest.as_slice() == work.hash {
        Ok(())
    } else {
        Err(PeerError::IntegrityFailure { index: work.index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_hash() {
        use sha1::{Digest, Sha1};
        let data = b"hello world".to_vec();
        let mut hasher = Sha1::new();
        hasher.update(&data);
        let hash: [u8; 20] = hasher.finalize().into();
        let work = PieceWork { index: 0, hash, length: data.len() as u32 };
        assert!(verify_integrity(&work, &data).is_ok());
    }

    #[test]
    fn rejects_mismatching_hash() {
        let work = PieceWork { index: 0, hash: [0u8; 20], length: 5 };
        assert!(verify_integrity(&work, b"hello").is_err());
    }
}
