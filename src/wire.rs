//! Exact-size reads from a byte-oriented stream.
use std::io::{self, Read};

/// Reads exactly `buf.len()` bytes, treating any short read (including a
/// clean EOF) as `UnexpectedEof`. Mirrors `std::io::Read::read_exact` but
/// keeps the terminology the rest of the peer-wire code expects.
pub fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    reader.read_exact(buf)
}

/// Reads exactly `len` bytes into a freshly allocated buffer.
pub fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}
