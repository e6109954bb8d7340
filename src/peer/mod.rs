//! Per-peer protocol state machine: handshake, length-prefixed messages,
//! the remote bitfield, and the blocking TCP connection itself.
use thiserror::Error;

pub mod bitfield;
pub mod client;
pub mod handshake;
pub mod message;

pub use bitfield::Bitfield;
pub use client::PeerClient;
pub use handshake::Handshake;
pub use message::{Message, MessageId};

/// Errors raised while talking to a single peer. All of these are per-peer:
/// the worker that hits one exits and the peer is discarded for this run.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection to peer failed: {0}")]
    ConnectFailed(String),

    #[error("peer handshake is malformed: {0}")]
    InvalidHandshake(String),

    #[error("peer handshake info-hash did not match ours")]
    HandshakeMismatch,

    #[error("expected a BITFIELD message but got something else")]
    ExpectedBitfield,

    #[error("malformed PIECE message: {0}")]
    BadPiece(String),

    #[error("malformed message: {0}")]
    BadMessage(String),

    #[error("piece #{index} failed its SHA-1 integrity check")]
    IntegrityFailure { index: u32 },
}

impl PeerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PeerError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock)
    }
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
