use crate::bencode;
use crate::bencode::BencodeValue;
use crate::torrent::TorrentResult;
use sha1::Digest;
use sha1::Sha1;
use std::collections::BTreeMap;

/// Calculates the SHA-1 hash of a bencode-encoded info dictionary.
///
/// This is the info-hash: trackers and peers key the whole swarm by this
/// value, so the re-encode must be bit-exact. It relies on the encoder's
/// `BTreeMap`-backed sorted-key-output invariant, not on the order the
/// dictionary happened to be decoded in.
pub fn calculate_info_hash(info_dict: &BTreeMap<Vec<u8>, BencodeValue>) -> TorrentResult<[u8; 20]> {
    let buffer = bencode::encoder::encode_to_vec(&BencodeValue::Dict(info_dict.clone()))?;

    let mut hasher = Sha1::new();
    hasher.update(&buffer);
    let digest = hasher.finalize();

    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&digest);
    Ok(info_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic_regardless_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert(b"name".to_vec(), BencodeValue::String(b"x".to_vec()));
        a.insert(b"length".to_vec(), BencodeValue::Integer(1));

        let mut b = BTreeMap::new();
        b.insert(b"length".to_vec(), BencodeValue::Integer(1));
        b.insert(b"name".to_vec(), BencodeValue::String(b"x".to_vec()));

        assert_eq!(calculate_info_hash(&a).unwrap(), calculate_info_hash(&b).unwrap());
    }
}
