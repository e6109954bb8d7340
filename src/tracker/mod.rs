//! HTTP tracker client: builds the announce URL, issues the GET, and parses
//! the compact peer list out of the bencoded response.
use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

use crate::bencode::{self, BencodeValue};

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker is unreachable: {0}")]
    Unreachable(String),

    #[error("tracker response is not valid bencode: {0}")]
    Bencode(#[from] bencode::BencodeError),

    #[error("tracker announce URL is invalid: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("tracker returned a malformed peer list: {0}")]
    MalformedPeers(String),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A peer endpoint as returned by the tracker's compact peer list: a value
/// type, freely copied, carrying no connection state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(std::net::IpAddr::V4(self.ip), self.port)
    }
}

impl std::fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Builds the announce GET URL: query parameters in the fixed order
/// `info_hash`, `peer_id`, `port`, `uploaded=0`, `downloaded=0`,
/// `compact=1`, `left`. `info_hash` and `peer_id` are percent-encoded
/// byte-wise per RFC 3986, with non-unreserved bytes escaped as uppercase
/// `%XX` -- this is hand-rolled rather than delegated to the `url` crate's
/// query builder because that API escapes whole strings, not raw byte
/// slices that happen to contain binary data.
pub fn build_announce_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> TrackerResult<String> {
    let base = url::Url::parse(announce)?;
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        percent_encode(info_hash),
        percent_encode(peer_id),
        port,
        left,
    );
    let separator = if base.query().is_some() { "&" } else { "?" };
    Ok(format!("{announce}{separator}{query}"))
}

/// Percent-encodes `bytes` per RFC 3986: bytes in the unreserved set
/// (`A-Za-z0-9-._~`) pass through unchanged, everything else becomes an
/// uppercase `%XX`.
fn percent_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Issues the announce GET against `announce_url`, parses the bencoded
/// body, and returns the compact peer list.
#[tracing::instrument(skip(info_hash, peer_id), fields(%announce_url))]
pub fn announce(
    announce_url: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> TrackerResult<Vec<PeerEndpoint>> {
    let url = build_announce_url(announce_url, info_hash, peer_id, port, left)?;
    tracing::debug!(%url, "announcing to tracker");

    let client = reqwest::blocking::Client::builder()
        .timeout(ANNOUNCE_TIMEOUT)
        .build()
        .map_err(|e| TrackerError::Unreachable(e.to_string()))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|e| TrackerError::Unreachable(e.to_string()))?;
    let body = response
        .bytes()
        .map_err(|e| TrackerError::Unreachable(e.to_string()))?;

    parse_announce_response(&body)
}

fn parse_announce_response(body: &[u8]) -> TrackerResult<Vec<PeerEndpoint>> {
    let value = bencode::decode(body)?;
    let dict = value
        .as_dict()
        .ok_or_else(|| TrackerError::MalformedPeers("response is not a dictionary".into()))?;
    let peers_bytes = match dict.get(b"peers".as_slice()) {
        Some(BencodeValue::String(s)) => s,
        _ => return Err(TrackerError::MalformedPeers("missing peers key".into())),
    };
    parse_compact_peers(peers_bytes)
}

/// Parses the compact peer format: 6 bytes per peer, 4-byte big-endian IPv4
/// address followed by a 2-byte big-endian port.
fn parse_compact_peers(bytes: &[u8]) -> TrackerResult<Vec<PeerEndpoint>> {
    if bytes.len() % 6 != 0 {
        return Err(TrackerError::MalformedPeers(format!(
            "peers length {} is not a multiple of 6",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| PeerEndpoint {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_with_percent_encoded_binary_fields() {
        let info_hash: [u8; 20] = [
            0xD8, 0xF7, 0x39, 0xCE, 0xC3, 0x28, 0x95, 0x6C, 0xCC, 0x5B, 0xBF, 0x1F, 0x86, 0xD9,
            0xFD, 0xCF, 0xDB, 0xA8, 0xCE, 0xB6,
        ];
        let peer_id: [u8; 20] = {
            let mut p = [0u8; 20];
            for (i, b) in p.iter_mut().enumerate() {
                *b = (i + 1) as u8;
            }
            p
        };
        let url =
            build_announce_url("http://bttracker.debian.org:6969/announce", &info_hash, &peer_id, 6882, 351272960)
                .unwrap();
        assert!(url.starts_with("http://bttracker.debian.org:6969/announce?"));
        assert!(url.contains("info_hash=%D8%F79%CE%C3%28%95l%CC%5B%BF%1F%86%D9%FD%CF%DB%A8%CE%B6"));
        assert!(url.contains("peer_id=%01%02%03%04%05%06%07%08%09%0A%0B%0C%0D%0E%0F%10%11%12%13%14"));
        assert!(url.contains("&port=6882&uploaded=0&downloaded=0&compact=1&left=351272960"));
    }

    #[test]
    fn parses_compact_peer_list() {
        let bytes = [127, 0, 0, 1, 0x00, 0x50, 1, 1, 1, 1, 0x01, 0xBB];
        let peers = parse_compact_peers(&bytes).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip.to_string(), "127.0.0.1");
        assert_eq!(peers[0].port, 80);
        assert_eq!(peers[1].ip.to_string(), "1.1.1.1");
        assert_eq!(peers[1].port, 443);
    }

    #[test]
    fn rejects_peers_not_multiple_of_six() {
        assert!(parse_compact_peers(&[1, 2, 3]).is_err());
    }

    #[test]
    fn parses_full_announce_response() {
        let body = b"d8:intervali900e5:peers12:\xC0\x00\x02\x7B\x1A\xE1\x7F\x00\x00\x01\x1A\xE9e";
        let peers = parse_announce_response(body).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip.to_string(), "192.0.2.123");
        assert_eq!(peers[0].port, 6881);
        assert_eq!(peers[1].ip.to_string(), "127.0.0.1");
        assert_eq!(peers[1].port, 6889);
    }
}
