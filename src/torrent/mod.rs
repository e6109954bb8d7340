//! Metainfo parsing and error handling logic.
//!
//! This module provides types and error handling for working with .torrent
//! files: parsing, info-hash derivation, and validation. Errors here are
//! always fatal for the run (spec error kind `InvalidMetainfo`).
use thiserror::Error;

pub mod file;
pub mod info_hash;

pub use file::TorrentSpec;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid metainfo: {0}")]
    InvalidMetainfo(String),
}

impl TorrentError {
    pub fn missing_field(field: &str) -> Self {
        TorrentError::InvalidMetainfo(format!("missing or invalid field: {field}"))
    }
}

/// Result type for torrent operations derived from `std::result`.
pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
