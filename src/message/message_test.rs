use std::net::{Ipv4Addr, Ipv6Addr};

use super::header::Header;
use super::name::Name;
use super::question::Question;
use super::record::{RData, Record};
use super::*;

fn name(s: &str) -> Name {
    Name::new(s).unwrap()
}

// A 12-byte header followed by raw body bytes.
fn packet(questions: u16, answers: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 12];
    bytes[4] = (questions >> 8) as u8;
    bytes[5] = questions as u8;
    bytes[6] = (answers >> 8) as u8;
    bytes[7] = answers as u8;
    bytes.extend_from_slice(body);
    bytes
}

#[test]
fn test_round_trip_all_record_types() {
    let msg = Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        questions: vec![Question::new(name("_ipp._tcp.local."), RecordType::Ptr)],
        answers: vec![Record::ptr(
            name("_ipp._tcp.local."),
            name("printer._ipp._tcp.local."),
            4500,
        )],
        authorities: vec![Record::new(
            name("sub.local."),
            120,
            RData::Ns(name("host.local.")),
        )],
        additionals: vec![
            Record::srv(name("printer._ipp._tcp.local."), 631, name("host.local."), 120),
            Record::txt(
                name("printer._ipp._tcp.local."),
                vec!["pdl=application/pdf".to_string(), "rp=ipp/print".to_string()],
                120,
            ),
            {
                let mut a = Record::a(name("host.local."), Ipv4Addr::new(192, 0, 2, 5), 120);
                a.cache_flush = true;
                a
            },
            Record::aaaa(name("host.local."), Ipv6Addr::LOCALHOST, 120),
            Record::new(name("alias.local."), 120, RData::Cname(name("host.local."))),
            Record::new(name("opaque.local."), 60, RData::Raw(0x1234, vec![1, 2, 3, 4])),
        ],
    };

    let bytes = msg.pack().unwrap();
    let decoded = Message::unpack(&bytes).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_round_trip_empty_txt() {
    let msg = Message {
        header: Header::response(),
        answers: vec![Record::txt(name("quiet._http._tcp.local."), vec![], 120)],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();
    // An empty TXT is a single zero-length string on the wire.
    let decoded = Message::unpack(&bytes).unwrap();
    assert_eq!(decoded.answers, msg.answers);
}

#[test]
fn test_case_insensitive_names() {
    assert_eq!(name("Printer._IPP._tcp.Local."), name("printer._ipp._tcp.local."));
    assert_eq!(
        name("HOST.local.").key(),
        name("host.LOCAL.").key()
    );
}

#[test]
fn test_compression_shrinks_repeated_names() {
    let single = Message {
        header: Header::response(),
        answers: vec![Record::ptr(
            name("_ipp._tcp.local."),
            name("printer._ipp._tcp.local."),
            4500,
        )],
        ..Default::default()
    };
    let double = Message {
        header: Header::response(),
        answers: vec![
            single.answers[0].clone(),
            Record::ptr(
                name("_ipp._tcp.local."),
                name("copier._ipp._tcp.local."),
                4500,
            ),
        ],
        ..Default::default()
    };

    let single_bytes = single.pack().unwrap();
    let double_bytes = double.pack().unwrap();
    // The second record reuses both the owner name and the rdata suffix.
    assert!(double_bytes.len() < 2 * single_bytes.len() - 12);

    let decoded = Message::unpack(&double_bytes).unwrap();
    assert_eq!(decoded, double);
}

#[test]
fn test_pointer_out_of_bounds() {
    // A question name that is a compression pointer to offset 0xFFF,
    // far beyond the packet.
    let bytes = packet(1, 0, &[0xCF, 0xFF, 0x00, 0x0C, 0x00, 0x01]);
    assert_eq!(Message::unpack(&bytes), Err(Error::ErrInvalidPtr));
}

#[test]
fn test_pointer_to_self() {
    // A pointer at offset 12 referencing offset 12.
    let bytes = packet(1, 0, &[0xC0, 0x0C, 0x00, 0x0C, 0x00, 0x01]);
    assert_eq!(Message::unpack(&bytes), Err(Error::ErrInvalidPtr));
}

#[test]
fn test_pointer_chain_limit() {
    // Record 1 smuggles a descending chain of pointers in as opaque
    // rdata; record 2's PTR rdata enters the chain at its head. The
    // decoder must give up on hop count, not wander forever.
    let mut body = Vec::new();
    // record 1: name "a.", unknown type 0x0999, rdlen 42
    body.extend_from_slice(&[0x01, b'a', 0x00]);
    body.extend_from_slice(&[0x09, 0x99, 0x00, 0x01]);
    body.extend_from_slice(&[0x00, 0x00, 0x00, 0x78]);
    body.extend_from_slice(&[0x00, 42]);
    let chain_base = 12 + body.len(); // offset of the first pointer
    for k in 0..21usize {
        let target = if k == 0 { 12 } else { chain_base + 2 * (k - 1) };
        body.push(0xC0 | (target >> 8) as u8);
        body.push(target as u8);
    }
    let chain_head = chain_base + 2 * 20;
    // record 2: name "b.", type PTR, rdata = pointer to the chain head
    body.extend_from_slice(&[0x01, b'b', 0x00]);
    body.extend_from_slice(&[0x00, 0x0C, 0x00, 0x01]);
    body.extend_from_slice(&[0x00, 0x00, 0x00, 0x78]);
    body.extend_from_slice(&[0x00, 2]);
    body.push(0xC0 | (chain_head >> 8) as u8);
    body.push(chain_head as u8);

    let bytes = packet(0, 2, &body);
    assert_eq!(Message::unpack(&bytes), Err(Error::ErrTooManyPtr));
}

#[test]
fn test_reserved_label_prefixes() {
    for prefix in [0x40u8, 0x80u8] {
        let bytes = packet(1, 0, &[prefix, 0x00, 0x00, 0x0C, 0x00, 0x01]);
        assert_eq!(Message::unpack(&bytes), Err(Error::ErrReserved));
    }
}

#[test]
fn test_name_at_255_byte_limit() {
    // Three 63-byte labels and one 61-byte label: 255 bytes encoded.
    let l63 = "a".repeat(63);
    let l61 = "b".repeat(61);
    let max_name = Name::new(&format!("{l63}.{l63}.{l63}.{l61}.")).unwrap();

    let msg = Message {
        header: Header::default(),
        questions: vec![Question::new(max_name.clone(), RecordType::A)],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();
    let decoded = Message::unpack(&bytes).unwrap();
    assert_eq!(decoded.questions[0].name, max_name);

    // One byte longer no longer fits.
    let l62 = "b".repeat(62);
    assert_eq!(
        Name::new(&format!("{l63}.{l63}.{l63}.{l62}.")),
        Err(Error::ErrNameTooLong)
    );
}

#[test]
fn test_decoded_name_over_255_bytes() {
    // Four 63-byte labels: 257 bytes encoded, over the limit.
    let mut body = Vec::new();
    for _ in 0..4 {
        body.push(63);
        body.extend_from_slice(&[b'a'; 63]);
    }
    body.push(0);
    body.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    let bytes = packet(1, 0, &body);
    assert_eq!(Message::unpack(&bytes), Err(Error::ErrNameTooLong));
}

#[test]
fn test_label_too_long_on_build() {
    let l64 = "a".repeat(64);
    assert_eq!(Name::new(&format!("{l64}.local.")), Err(Error::ErrSegTooLong));
    assert_eq!(Name::new("a..local."), Err(Error::ErrZeroSegLen));
    assert_eq!(Name::new(""), Err(Error::ErrHostnameEmpty));
}

#[test]
fn test_truncated_packets() {
    assert!(Message::unpack(&[]).is_err());
    assert!(Message::unpack(&[0x00; 5]).is_err());
    // Claims one question but ends after the header.
    let bytes = packet(1, 0, &[]);
    assert_eq!(Message::unpack(&bytes), Err(Error::ErrBaseLen));
    // A record whose rdata length runs past the packet end.
    let bytes = packet(
        0,
        1,
        &[0x01, b'a', 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x78, 0x00, 0x0A, 0x7F],
    );
    assert!(Message::unpack(&bytes).is_err());
}

#[test]
fn test_decode_never_panics_on_garbage() {
    // A spread of adversarial inputs; they must all fail cleanly.
    let cases: Vec<Vec<u8>> = vec![
        vec![0xFF; 12],
        vec![0xFF; 64],
        packet(0xFFFF, 0xFFFF, &[0x00; 32]),
        packet(1, 0, &[0xC0]),
        packet(1, 0, &[63, b'a']),
        packet(0, 1, &[0x00, 0x00, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xFF]),
    ];
    for bytes in cases {
        let result = Message::unpack(&bytes);
        assert!(result.is_err(), "expected failure for {bytes:?}");
        assert!(result.unwrap_err().is_malformed());
    }
}

#[test]
fn test_cache_flush_bit() {
    let mut record = Record::a(name("host.local."), Ipv4Addr::new(192, 0, 2, 5), 120);
    record.cache_flush = true;
    let msg = Message {
        header: Header::response(),
        answers: vec![record],
        ..Default::default()
    };

    let bytes = msg.pack().unwrap();
    let decoded = Message::unpack(&bytes).unwrap();
    assert!(decoded.answers[0].cache_flush);
    assert_eq!(decoded.answers[0].class, CLASS_IN);

    // The wire class field carries the top bit.
    let class_off = bytes.len() - 4 - 4 - 2 - 2;
    assert_eq!(bytes[class_off] & 0x80, 0x80);
}

#[test]
fn test_header_flags_round_trip() {
    let msg = Message {
        header: Header {
            response: true,
            authoritative: true,
            truncated: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let decoded = Message::unpack(&msg.pack().unwrap()).unwrap();
    assert!(decoded.header.response);
    assert!(decoded.header.authoritative);
    assert!(decoded.header.truncated);
    assert_eq!(decoded.header.id, 0);
}

#[test]
fn test_pack_rejects_oversize() {
    // 40 TXT records of ~250 bytes each cannot fit the 9000 byte cap.
    let entry = "x".repeat(248);
    let answers: Vec<Record> = (0..40)
        .map(|i| {
            Record::txt(
                Name::new(&format!("big{i}.local.")).unwrap(),
                vec![entry.clone()],
                120,
            )
        })
        .collect();
    let msg = Message {
        header: Header::response(),
        answers,
        ..Default::default()
    };
    assert_eq!(msg.pack(), Err(Error::ErrPacketTooBig));
}

#[test]
fn test_srv_target_not_compressed() {
    // The SRV target matches the owner name suffix but must be written
    // out in full.
    let msg = Message {
        header: Header::response(),
        answers: vec![Record::srv(
            name("printer._ipp._tcp.local."),
            631,
            name("printer._ipp._tcp.local."),
            120,
        )],
        ..Default::default()
    };
    let bytes = msg.pack().unwrap();
    let decoded = Message::unpack(&bytes).unwrap();
    assert_eq!(decoded, msg);

    // rdata = priority + weight + port (6 bytes) + uncompressed name.
    let encoded_name_len = "printer._ipp._tcp.local.".len() + 1;
    let expected_rdata = 6 + encoded_name_len;
    let rdata = &bytes[bytes.len() - expected_rdata..];
    assert_eq!(rdata[6..].len(), encoded_name_len);
    assert_eq!(rdata[6] as usize, "printer".len());
}
