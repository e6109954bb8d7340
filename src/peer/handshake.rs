//! The fixed 68-byte greeting that opens every peer connection.
use super::{PeerError, PeerResult};
use crate::wire;
use std::io::{Read, Write};

const PSTR: &[u8; 19] = b"BitTorrent protocol";

/// `<1 byte pstrlen><pstrlen bytes protocol id><8 reserved><20 info-hash><20 peer-id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serializes to the canonical 68-byte frame, with the 8 reserved bytes
    /// zeroed and `pstrlen` fixed at 19.
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = PSTR.len() as u8;
        buf[1..20].copy_from_slice(PSTR);
        // buf[20..28] reserved, already zero
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> PeerResult<()> {
        writer.write_all(&self.serialize())?;
        Ok(())
    }

    /// Reads a handshake off the wire. `pstrlen == 0` and any short read
    /// both fail with `InvalidHandshake`.
    pub fn read<R: Read>(reader: &mut R) -> PeerResult<Self> {
        let mut pstrlen_buf = [0u8; 1];
        wire::read_exact(reader, &mut pstrlen_buf)
            .map_err(|_| PeerError::InvalidHandshake("unexpected EOF reading pstrlen".into()))?;
        let pstrlen = pstrlen_buf[0] as usize;
        if pstrlen == 0 {
            return Err(PeerError::InvalidHandshake("pstrlen cannot be 0".into()));
        }

        let rest = wire::read_exact_vec(reader, 48 + pstrlen)
            .map_err(|_| PeerError::InvalidHandshake("unexpected EOF reading payload".into()))?;

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&rest[pstrlen + 8..pstrlen + 28]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&rest[pstrlen + 28..pstrlen + 48]);

        Ok(Self { info_hash, peer_id })
    }
}
