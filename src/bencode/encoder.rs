//! Bencode encoding.
use super::BencodeResult;
use super::BencodeValue;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::instrument;

#[instrument(skip(writer, s), level = "trace")]
fn encode_string<W: Write>(writer: &mut W, s: &[u8]) -> BencodeResult<()> {
    write!(writer, "{}:", s.len())?;
    writer.write_all(s)?;
    Ok(())
}

#[instrument(skip(writer), level = "trace")]
fn encode_integer<W: Write>(writer: &mut W, i: i64) -> BencodeResult<()> {
    write!(writer, "i{}e", i)?;
    Ok(())
}

#[instrument(skip(writer, list), level = "trace")]
fn encode_list<W: Write>(writer: &mut W, list: &[BencodeValue]) -> BencodeResult<()> {
    writer.write_all(b"l")?;
    for item in list {
        encode_value(writer, item)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

/// Encodes a dictionary. `BTreeMap` iterates in ascending key order already,
/// so the canonical sorted-key-output invariant needs no sort step here.
#[instrument(skip(writer, dict), level = "trace")]
fn encode_dict<W: Write>(
    writer: &mut W,
    dict: &BTreeMap<Vec<u8>, BencodeValue>,
) -> BencodeResult<()> {
    writer.write_all(b"d")?;
    for (key, value) in dict {
        encode_string(writer, key)?;
        encode_value(writer, value)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

#[instrument(skip(writer), level = "trace")]
fn encode_value<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    match value {
        BencodeValue::String(s) => encode_string(writer, s),
        BencodeValue::Integer(i) => encode_integer(writer, *i),
        BencodeValue::List(list) => encode_list(writer, list),
        BencodeValue::Dict(dict) => encode_dict(writer, dict),
    }
}

/// Encodes a `BencodeValue` into its canonical bencode form, writing it to
/// `writer`. Dictionary keys are always emitted in ascending lexicographic
/// byte order, and integers in minimal decimal form.
#[instrument(skip(writer), level = "debug")]
pub fn encode<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    encode_value(writer, value)
}

/// Convenience wrapper returning the encoded bytes directly.
pub fn encode_to_vec(value: &BencodeValue) -> BencodeResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode(&mut buf, value)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::super::decoder::decode;
    use super::*;

    #[test]
    fn round_trips_simple_values() {
        let value = BencodeValue::Integer(42);
        let encoded = encode_to_vec(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn sorts_dictionary_keys() {
        let mut dict = BTreeMap::new();
        dict.insert(b"zebra".to_vec(), BencodeValue::Integer(1));
        dict.insert(b"apple".to_vec(), BencodeValue::Integer(2));
        let encoded = encode_to_vec(&BencodeValue::Dict(dict)).unwrap();
        assert_eq!(encoded, b"d5:applei2e5:zebrai1ee");
    }

    #[test]
    fn round_trips_nested_dict() {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), BencodeValue::String(b"file.iso".to_vec()));
        info.insert(b"length".to_vec(), BencodeValue::Integer(42));
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(16384));
        info.insert(b"pieces".to_vec(), BencodeValue::String(b"abcd".repeat(5)));

        let mut root = BTreeMap::new();
        root.insert(
            b"announce".to_vec(),
            BencodeValue::String(b"http://tracker".to_vec()),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let value = BencodeValue::Dict(root);

        let encoded = encode_to_vec(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn encodes_zero_in_minimal_form() {
        let encoded = encode_to_vec(&BencodeValue::Integer(0)).unwrap();
        assert_eq!(encoded, b"i0e");
    }
}
