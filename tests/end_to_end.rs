//! Drives a full download against an in-process fake tracker and a single
//! fake peer, per spec.md §8 scenario 6: an 8-byte payload split into two
//! 4-byte pieces, served over a real TCP handshake and real wire messages.
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use rstc::bencode::{self, BencodeValue};
use rstc::peer::handshake::Handshake;
use rstc::peer::message::{self, Message};
use rstc::peer::MessageId;
use rstc::torrent::TorrentSpec;
use rstc::{swarm, tracker};

use sha1::{Digest, Sha1};

fn sha1_20(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[test]
fn downloads_two_pieces_from_a_fake_tracker_and_peer() {
    let payload = b"ABCDEFGH".to_vec();
    let piece_length = 4u32;
    let hash0 = sha1_20(&payload[0..4]);
    let hash1 = sha1_20(&payload[4..8]);
    let mut pieces_bytes = Vec::new();
    pieces_bytes.extend_from_slice(&hash0);
    pieces_bytes.extend_from_slice(&hash1);

    let peer_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_port = peer_listener.local_addr().unwrap().port();
    let peer_payload = payload.clone();
    let peer_thread = thread::spawn(move || {
        let (mut stream, _) = peer_listener.accept().unwrap();

        let incoming = Handshake::read(&mut stream).unwrap();
        Handshake::new(incoming.info_hash, [9u8; 20])
            .write(&mut stream)
            .unwrap();

        // Both pieces set: bit 7 and bit 6 of byte 0.
        stream
            .write_all(&Message::new(MessageId::Bitfield, vec![0b1100_0000]).serialize())
            .unwrap();

        // Drain the client's courtesy UNCHOKE + INTERESTED, then unchoke it.
        let _ = message::read_message(&mut stream).unwrap();
        let _ = message::read_message(&mut stream).unwrap();
        stream
            .write_all(&Message::new(MessageId::Unchoke, vec![]).serialize())
            .unwrap();

        // Serve REQUESTs (piece length 4 fits one block each, so order
        // doesn't matter here), ignoring the client's courtesy HAVEs, until
        // the client closes the connection after it has everything.
        let mut served = 0;
        loop {
            let msg = match message::read_message(&mut stream) {
                Ok(msg) => msg,
                Err(_) => break,
            };
            let Some(msg) = msg else { continue };
            if msg.id != MessageId::Request || served >= 2 {
                continue;
            }
            let index = u32::from_be_bytes(msg.payload[0..4].try_into().unwrap());
            let begin = u32::from_be_bytes(msg.payload[4..8].try_into().unwrap()) as usize;
            let length = u32::from_be_bytes(msg.payload[8..12].try_into().unwrap()) as usize;
            let piece = if index == 0 {
                &peer_payload[0..4]
            } else {
                &peer_payload[4..8]
            };
            let block = &piece[begin..begin + length];

            let mut response_payload = Vec::with_capacity(8 + block.len());
            response_payload.extend_from_slice(&index.to_be_bytes());
            response_payload.extend_from_slice(&(begin as u32).to_be_bytes());
            response_payload.extend_from_slice(block);
            stream
                .write_all(&Message::new(MessageId::Piece, response_payload).serialize())
                .unwrap();
            served += 1;
        }
    });

    let tracker_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let tracker_port = tracker_listener.local_addr().unwrap().port();
    let tracker_thread = thread::spawn(move || {
        let (mut stream, _) = tracker_listener.accept().unwrap();
        let mut discard = [0u8; 1024];
        let _ = stream.read(&mut discard);

        let mut peers_bytes = Vec::new();
        peers_bytes.extend_from_slice(&[127, 0, 0, 1]);
        peers_bytes.extend_from_slice(&peer_port.to_be_bytes());

        let mut dict = BTreeMap::new();
        dict.insert(b"interval".to_vec(), BencodeValue::Integer(900));
        dict.insert(b"peers".to_vec(), BencodeValue::String(peers_bytes));
        let body = bencode::encode_to_vec(&BencodeValue::Dict(dict)).unwrap();

        let headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(headers.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
    });

    let announce_url = format!("http://127.0.0.1:{tracker_port}/announce");
    let mut info = BTreeMap::new();
    info.insert(b"name".to_vec(), BencodeValue::String(b"sample.bin".to_vec()));
    info.insert(b"length".to_vec(), BencodeValue::Integer(payload.len() as i64));
    info.insert(
        b"piece length".to_vec(),
        BencodeValue::Integer(piece_length as i64),
    );
    info.insert(b"pieces".to_vec(), BencodeValue::String(pieces_bytes));
    let mut root = BTreeMap::new();
    root.insert(
        b"announce".to_vec(),
        BencodeValue::String(announce_url.into_bytes()),
    );
    root.insert(b"info".to_vec(), BencodeValue::Dict(info));

    let spec = TorrentSpec::parse(BencodeValue::Dict(root)).unwrap();

    let peer_id = [7u8; 20];
    let peers = tracker::announce(&spec.announce, &spec.info_hash, &peer_id, 6881, spec.total_length)
        .expect("fake tracker announce");
    assert_eq!(peers.len(), 1);

    let downloaded = swarm::download(&spec, peers, peer_id).expect("swarm download");
    assert_eq!(downloaded, payload);

    tracker_thread.join().unwrap();
    peer_thread.join().unwrap();
}
