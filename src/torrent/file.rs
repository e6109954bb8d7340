//! Metainfo (`.torrent`) parsing into a `TorrentSpec`.
//!
//! Single-file torrents only -- multi-file torrents and the announce-list
//! fallback are explicit non-goals (see spec.md §1).
use crate::bencode::BencodeValue;
use crate::torrent::info_hash;

use super::{TorrentError, TorrentResult};

/// Everything the swarm coordinator needs to drive a download, derived once
/// from a metainfo file and treated as immutable thereafter.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TorrentSpec {
    pub announce: String,
    pub info_hash: [u8; 20],
    pub name: String,
    pub total_length: u64,
    pub piece_length: u32,
    pub piece_hashes: Vec<[u8; 20]>,
}

impl TorrentSpec {
    /// Number of pieces in the torrent.
    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Byte length of the piece at `index`: `piece_length` for every piece
    /// but the last, whose length is whatever remains of `total_length`.
    pub fn piece_size(&self, index: usize) -> u64 {
        if index >= self.num_pieces() {
            return 0;
        }
        let piece_length = u64::from(self.piece_length);
        if index < self.num_pieces() - 1 {
            piece_length
        } else {
            self.total_length - (self.num_pieces() as u64 - 1) * piece_length
        }
    }

    /// Parses a bencoded metainfo blob into a `TorrentSpec`, deriving the
    /// info-hash from the exact bytes of the re-encoded `info` dictionary.
    #[tracing::instrument(skip(data), level = "debug")]
    pub fn parse(data: BencodeValue) -> TorrentResult<TorrentSpec> {
        let mut dict = match data {
            BencodeValue::Dict(d) => d,
            _ => return Err(TorrentError::InvalidMetainfo("root is not a dictionary".into())),
        };

        let announce = match dict.remove(b"announce".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8(s)
                .map_err(|e| TorrentError::InvalidMetainfo(format!("announce is not UTF-8: {e}")))?,
            _ => return Err(TorrentError::missing_field("announce")),
        };

        let info_value = dict
            .remove(b"info".as_slice())
            .ok_or_else(|| TorrentError::missing_field("info"))?;

        let info_dict = match &info_value {
            BencodeValue::Dict(d) => d.clone(),
            _ => return Err(TorrentError::InvalidMetainfo("info is not a dictionary".into())),
        };

        let name = match info_dict.get(b"name".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8(s.clone())
                .map_err(|e| TorrentError::InvalidMetainfo(format!("name is not UTF-8: {e}")))?,
            _ => return Err(TorrentError::missing_field("name")),
        };

        let total_length = match info_dict.get(b"length".as_slice()) {
            Some(BencodeValue::Integer(i)) if *i >= 0 => *i as u64,
            _ => return Err(TorrentError::missing_field("length")),
        };

        let piece_length = match info_dict.get(b"piece length".as_slice()) {
            Some(BencodeValue::Integer(i)) if *i > 0 => *i as u32,
            _ => return Err(TorrentError::missing_field("piece length")),
        };

        let pieces_bytes = match info_dict.get(b"pieces".as_slice()) {
            Some(BencodeValue::String(s)) => s.clone(),
            _ => return Err(TorrentError::missing_field("pieces")),
        };

        let piece_hashes = parse_pieces(&pieces_bytes)?;

        let expected_pieces = total_length.div_ceil(u64::from(piece_length)) as usize;
        if piece_hashes.len() != expected_pieces {
            return Err(TorrentError::InvalidMetainfo(format!(
                "pieces count {} does not match ceil(length / piece length) = {}",
                piece_hashes.len(),
                expected_pieces
            )));
        }

        let info_hash = info_hash::calculate_info_hash(&info_dict)?;

        Ok(TorrentSpec {
            announce,
            info_hash,
            name,
            total_length,
            piece_length,
            piece_hashes,
        })
    }
}

/// Splits the concatenated SHA-1 hashes from the `pieces` string into
/// individual 20-byte arrays. The order corresponds directly to piece index.
fn parse_pieces(pieces_bytes: &[u8]) -> TorrentResult<Vec<[u8; 20]>> {
    if pieces_bytes.len() % 20 != 0 {
        return Err(TorrentError::InvalidMetainfo(
            "pieces length is not a multiple of 20".into(),
        ));
    }
    Ok(pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}
