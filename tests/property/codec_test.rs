// tests/property/codec_test.rs

//! Property-based tests for reply line framing

use bytes::BytesMut;
use hbwarden::core::heartbeat::codec::{Charset, PingCodec};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

proptest! {
    #[test]
    fn test_lines_survive_arbitrary_chunking(
        lines in prop::collection::vec("[ -~]{0,40}", 1..=10),
        chunk in 1usize..=16
    ) {
        let wire: Vec<u8> = lines
            .iter()
            .flat_map(|l| format!("{l}\r\n").into_bytes())
            .collect();

        let mut codec = PingCodec::new(Charset::Utf8, 64);
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(line) = codec.decode(&mut buf).unwrap() {
                decoded.push(line);
            }
        }

        prop_assert_eq!(decoded, lines);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_latin1_decodes_every_byte(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut input: Vec<u8> = bytes.into_iter().filter(|b| *b != b'\n').collect();
        let mut expected: String = input.iter().map(|&b| b as char).collect();
        if expected.ends_with('\r') {
            expected.pop();
        }
        input.push(b'\n');

        let mut codec = PingCodec::new(Charset::Latin1, 128);
        let mut buf = BytesMut::from(&input[..]);
        let line = codec.decode(&mut buf).unwrap();
        prop_assert!(line.is_some());
        prop_assert_eq!(line.unwrap(), expected);
    }
}
