//! Per-peer connection object: owns the TCP socket, the remote bitfield, and
//! the `choked` flag. Construction performs the first two states of the
//! per-peer state machine (handshake, then the mandatory first bitfield).
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use super::handshake::Handshake;
use super::message::{self, Message, MessageId};
use super::{Bitfield, PeerError, PeerResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);

/// A single peer's connection: owned exclusively by the worker that created
/// it, never shared across workers.
pub struct PeerClient {
    conn: TcpStream,
    pub bitfield: Bitfield,
    pub choked: bool,
}

impl PeerClient {
    /// Connects to `addr`, performs the handshake, and reads the mandatory
    /// first `BITFIELD` message. Any failure in this sequence is a per-peer
    /// error: the caller should log and discard this peer for the run.
    #[tracing::instrument(skip(info_hash, peer_id), fields(%addr))]
    pub fn connect(addr: SocketAddr, info_hash: [u8; 20], peer_id: [u8; 20]) -> PeerResult<Self> {
        let mut conn = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| PeerError::ConnectFailed(e.to_string()))?;
        conn.set_read_timeout(Some(CONNECT_TIMEOUT))?;
        conn.set_write_timeout(Some(CONNECT_TIMEOUT))?;

        Handshake::new(info_hash, peer_id).write(&mut conn)?;
        let reply = Handshake::read(&mut conn)?;
        if reply.info_hash != info_hash {
            return Err(PeerError::HandshakeMismatch);
        }

        conn.set_read_timeout(Some(BITFIELD_TIMEOUT))?;
        let bitfield = match message::read_message(&mut conn)? {
            Some(Message { id: MessageId::Bitfield, payload }) => Bitfield::from_bytes(payload),
            _ => return Err(PeerError::ExpectedBitfield),
        };
        conn.set_read_timeout(None)?;
        conn.set_write_timeout(None)?;

        Ok(Self {
            conn,
            bitfield,
            choked: true,
        })
    }

    /// Reads the next wire message, or `None` for a keep-alive.
    pub fn read_next_message(&mut self) -> PeerResult<Option<Message>> {
        message::read_message(&mut self.conn)
    }

    /// Applies the socket read timeout that bounds a single piece download.
    /// Cleared via [`Self::clear_timeout`] on every exit path.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> PeerResult<()> {
        self.conn.set_read_timeout(timeout)?;
        self.conn.set_write_timeout(timeout)?;
        Ok(())
    }

    pub fn clear_timeout(&mut self) -> PeerResult<()> {
        self.set_timeout(None)
    }

    fn send(&mut self, message: &Message) -> PeerResult<()> {
        self.conn.write_all(&message.serialize())?;
        Ok(())
    }

    pub fn unchoke(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::Unchoke, vec![]))
    }

    pub fn interested(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::Interested, vec![]))
    }

    pub fn not_interested(&mut self) -> PeerResult<()> {
        self.send(&Message::new(MessageId::NotInterested, vec![]))
    }

    pub fn have(&mut self, index: u32) -> PeerResult<()> {
        self.send(&message::format_have(index))
    }

    pub fn request(&mut self, index: u32, begin: u32, length: u32) -> PeerResult<()> {
        self.send(&message::format_request(index, begin, length))
    }
}
