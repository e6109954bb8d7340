//! Length-prefixed peer-wire messages.
use super::{PeerError, PeerResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
}

impl MessageId {
    fn from_byte(byte: u8) -> PeerResult<Self> {
        Ok(match byte {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => return Err(PeerError::BadMessage(format!("unknown message id {other}"))),
        })
    }

    fn to_byte(self) -> u8 {
        match self {
            MessageId::Choke => 0,
            MessageId::Unchoke => 1,
            MessageId::Interested => 2,
            MessageId::NotInterested => 3,
            MessageId::Have => 4,
            MessageId::Bitfield => 5,
            MessageId::Request => 6,
            MessageId::Piece => 7,
            MessageId::Cancel => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let length = (self.payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + length as usize);
        buf.write_u32::<BigEndian>(length).expect("write to Vec never fails");
        buf.write_u8(self.id.to_byte()).expect("write to Vec never fails");
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Serializes a keep-alive: a bare four zero bytes with no message id.
pub fn serialize_keep_alive() -> [u8; 4] {
    [0, 0, 0, 0]
}

/// Reads one message from `reader`. `Ok(None)` means a keep-alive.
pub fn read_message<R: Read>(reader: &mut R) -> PeerResult<Option<Message>> {
    let length = reader.read_u32::<BigEndian>()?;
    if length == 0 {
        return Ok(None);
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;
    let id = MessageId::from_byte(payload[0])?;
    Ok(Some(Message::new(id, payload[1..].to_vec())))
}

/// Writes a whole-frame message.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> PeerResult<()> {
    writer.write_all(&message.serialize())?;
    Ok(())
}

pub fn format_request(index: u32, begin: u32, length: u32) -> Message {
    let mut payload = Vec::with_capacity(12);
    payload.write_u32::<BigEndian>(index).unwrap();
    payload.write_u32::<BigEndian>(begin).unwrap();
    payload.write_u32::<BigEndian>(length).unwrap();
    Message::new(MessageId::Request, payload)
}

pub fn format_have(index: u32) -> Message {
    let mut payload = Vec::with_capacity(4);
    payload.write_u32::<BigEndian>(index).unwrap();
    Message::new(MessageId::Have, payload)
}

/// Parses a `HAVE` payload into the announced piece index.
pub fn parse_have(msg: &Message) -> PeerResult<u32> {
    if msg.id != MessageId::Have {
        return Err(PeerError::BadPiece(format!("expected HAVE, got {:?}", msg.id)));
    }
    if msg.payload.len() != 4 {
        return Err(PeerError::BadPiece("HAVE payload must be 4 bytes".into()));
    }
    let mut cursor = &msg.payload[..];
    Ok(cursor.read_u32::<BigEndian>()?)
}

/// Validates and copies a `PIECE` message's block into `buf`, returning the
/// number of bytes copied. `buf` is the whole piece buffer; `begin` and the
/// block length must both lie within it.
pub fn parse_piece(expected_index: u32, buf: &mut [u8], msg: &Message) -> PeerResult<usize> {
    if msg.id != MessageId::Piece {
        return Err(PeerError::BadPiece(format!("expected PIECE, got {:?}", msg.id)));
    }
    if msg.payload.len() < 8 {
        return Err(PeerError::BadPiece("PIECE payload shorter than 8 bytes".into()));
    }

    let mut cursor = &msg.payload[..8];
    let index = cursor.read_u32::<BigEndian>()?;
    let begin = cursor.read_u32::<BigEndian>()? as usize;

    if index != expected_index {
        return Err(PeerError::BadPiece(format!(
            "expected piece index {expected_index}, got {index}"
        )));
    }
    if begin >= buf.len() {
        return Err(PeerError::BadPiece(format!(
            "begin offset {begin} is past buffer length {}",
            buf.len()
        )));
    }

    let block = &msg.payload[8..];
    let end = begin + block.len();
    if end > buf.len() {
        return Err(PeerError::BadPiece(format!(
            "block end {end} exceeds buffer length {}",
            buf.len()
        )));
    }

    buf[begin..end].copy_from_slice(block);
    Ok(block.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_message_kind() {
        let messages = vec![
            Message::new(MessageId::Choke, vec![]),
            Message::new(MessageId::Unchoke, vec![]),
            Message::new(MessageId::Interested, vec![]),
            Message::new(MessageId::NotInterested, vec![]),
            format_have(7),
            format_request(1, 2, 3),
            Message::new(MessageId::Bitfield, vec![0xFF, 0x00]),
            Message::new(MessageId::Piece, vec![0, 0, 0, 1, 0, 0, 0, 0, 9, 9]),
            Message::new(MessageId::Cancel, vec![0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]),
        ];
        for m in messages {
            let bytes = m.serialize();
            let mut cursor = std::io::Cursor::new(bytes);
            let parsed = read_message(&mut cursor).unwrap().unwrap();
            assert_eq!(parsed, m);
        }
    }

    #[test]
    fn keep_alive_serializes_to_four_zero_bytes() {
        assert_eq!(serialize_keep_alive(), [0, 0, 0, 0]);
    }

    #[test]
    fn reads_keep_alive_as_none() {
        let mut cursor = std::io::Cursor::new(serialize_keep_alive().to_vec());
        assert_eq!(read_message(&mut cursor).unwrap(), None);
    }

    #[test]
    fn parse_piece_rejects_wrong_index() {
        let msg = Message::new(MessageId::Piece, vec![0, 0, 0, 2, 0, 0, 0, 0, 1]);
        let mut buf = [0u8; 10];
        assert!(parse_piece(1, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_piece_rejects_begin_past_buffer() {
        let msg = Message::new(MessageId::Piece, vec![0, 0, 0, 1, 0, 0, 0, 20, 1]);
        let mut buf = [0u8; 10];
        assert!(parse_piece(1, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_piece_rejects_overrun() {
        let msg = Message::new(MessageId::Piece, vec![0, 0, 0, 1, 0, 0, 0, 8, 1, 2, 3]);
        let mut buf = [0u8; 10];
        assert!(parse_piece(1, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_piece_copies_block_into_buffer() {
        let msg = Message::new(MessageId::Piece, vec![0, 0, 0, 1, 0, 0, 0, 2, 7, 8, 9]);
        let mut buf = [0u8; 10];
        let n = parse_piece(1, &mut buf, &msg).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[2..5], &[7, 8, 9]);
    }

    #[test]
    fn parse_have_extracts_index() {
        let msg = format_have(42);
        assert_eq!(parse_have(&msg).unwrap(), 42);
    }
}
