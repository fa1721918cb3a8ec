use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;
use crate::bencode::{decode, encode, Value};

fn build_torrent(length: i64, piece_length: i64, num_pieces: usize) -> Vec<u8> {
    let mut pieces = Vec::with_capacity(num_pieces * 20);
    for i in 0..num_pieces {
        pieces.extend_from_slice(&[i as u8; 20]);
    }

    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"length"), Value::Integer(length));
    info.insert(Bytes::from_static(b"name"), Value::string("sample.txt"));
    info.insert(
        Bytes::from_static(b"piece length"),
        Value::Integer(piece_length),
    );
    info.insert(Bytes::from_static(b"pieces"), Value::Bytes(pieces.into()));

    let mut root = BTreeMap::new();
    root.insert(
        Bytes::from_static(b"announce"),
        Value::string("http://tracker.example.com/announce"),
    );
    root.insert(Bytes::from_static(b"info"), Value::Dict(info));

    encode(&Value::Dict(root)).unwrap()
}

#[test]
fn test_parse_metainfo() {
    let data = build_torrent(92063, 32768, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(metainfo.announce, "http://tracker.example.com/announce");
    assert_eq!(metainfo.info.name, "sample.txt");
    assert_eq!(metainfo.info.length, 92063);
    assert_eq!(metainfo.info.piece_length, 32768);
    assert_eq!(metainfo.info.num_pieces(), 3);
    assert_eq!(metainfo.info.pieces[1], [1u8; 20]);
}

#[test]
fn test_info_hash_matches_raw_info() {
    let data = build_torrent(92063, 32768, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    // The raw info dictionary round-trips through the codec and hashes to
    // the recorded info hash.
    let reparsed = decode(metainfo.raw_info()).unwrap();
    assert_eq!(encode(&reparsed).unwrap(), metainfo.raw_info().as_ref());
    assert_eq!(
        metainfo.info_hash,
        InfoHash::from_info_bytes(metainfo.raw_info())
    );
}

#[test]
fn test_piece_size() {
    let data = build_torrent(92063, 32768, 3);
    let info = Metainfo::from_bytes(&data).unwrap().info;

    assert_eq!(info.piece_size(0), 32768);
    assert_eq!(info.piece_size(1), 32768);
    // 92063 - 2 * 32768
    assert_eq!(info.piece_size(2), 26527);
}

#[test]
fn test_piece_size_exact_multiple() {
    let data = build_torrent(65536, 32768, 2);
    let info = Metainfo::from_bytes(&data).unwrap().info;

    assert_eq!(info.piece_size(0), 32768);
    assert_eq!(info.piece_size(1), 32768);
}

#[test]
fn test_piece_count_mismatch_rejected() {
    // 92063 bytes at 32768 per piece needs 3 hashes, not 2.
    let data = build_torrent(92063, 32768, 2);
    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_missing_announce() {
    let mut info = BTreeMap::new();
    info.insert(Bytes::from_static(b"length"), Value::Integer(1));
    let mut root = BTreeMap::new();
    root.insert(Bytes::from_static(b"info"), Value::Dict(info));
    let data = encode(&Value::Dict(root)).unwrap();

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::MissingField("announce"))
    ));
}

#[test]
fn test_info_from_raw() {
    let data = build_torrent(92063, 32768, 3);
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    let info = Info::from_raw(metainfo.raw_info()).unwrap();
    assert_eq!(info.length, 92063);
    assert_eq!(info.num_pieces(), 3);
}

#[test]
fn test_info_hash_hex() {
    let hash = InfoHash::from_hex("C12FE1C06BBA254A9DC9F519B335AA7C1367A88A").unwrap();
    assert_eq!(hash.to_hex(), "c12fe1c06bba254a9dc9f519b335aa7c1367a88a");

    assert!(InfoHash::from_hex("c12fe1").is_err());
    assert!(InfoHash::from_hex("zz2fe1c06bba254a9dc9f519b335aa7c1367a88a").is_err());
}

#[test]
fn test_info_hash_url_encode() {
    let hash = InfoHash::from_bytes([0xab; 20]);
    assert!(hash.url_encode().starts_with("%ab%ab"));
    assert_eq!(hash.url_encode().len(), 60);
}

#[test]
fn test_magnet_parse() {
    let uri = "magnet:?xt=urn:btih:ad42ce8109f54c99613ce38f9b4d87e70f24a165\
               &dn=magnet1.gif&tr=http%3A%2F%2Fbittorrent-test-tracker.codecrafters.io%2Fannounce";
    let magnet = MagnetLink::parse(uri).unwrap();

    assert_eq!(
        magnet.info_hash.to_hex(),
        "ad42ce8109f54c99613ce38f9b4d87e70f24a165"
    );
    assert_eq!(magnet.display_name.as_deref(), Some("magnet1.gif"));
    assert_eq!(
        magnet.tracker,
        "http://bittorrent-test-tracker.codecrafters.io/announce"
    );
}

#[test]
fn test_magnet_parse_params_any_order() {
    let uri = "magnet:?tr=http%3A%2F%2Ft.example%2Fannounce\
               &xt=urn:btih:AD42CE8109F54C99613CE38F9B4D87E70F24A165";
    let magnet = MagnetLink::parse(uri).unwrap();
    assert_eq!(
        magnet.info_hash.to_hex(),
        "ad42ce8109f54c99613ce38f9b4d87e70f24a165"
    );
    assert!(magnet.display_name.is_none());
}

#[test]
fn test_magnet_parse_invalid() {
    // Wrong scheme
    assert!(MagnetLink::parse("http://example.com").is_err());
    // Missing xt
    assert!(MagnetLink::parse("magnet:?tr=http%3A%2F%2Ft.example").is_err());
    // Wrong topic type
    assert!(MagnetLink::parse(
        "magnet:?xt=urn:sha1:ad42ce8109f54c99613ce38f9b4d87e70f24a165&tr=x"
    )
    .is_err());
    // Truncated hash
    assert!(MagnetLink::parse("magnet:?xt=urn:btih:ad42ce&tr=x").is_err());
    // Missing tracker
    assert!(MagnetLink::parse(
        "magnet:?xt=urn:btih:ad42ce8109f54c99613ce38f9b4d87e70f24a165"
    )
    .is_err());
}
