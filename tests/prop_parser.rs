use netsift::dns::{from_dotted, parse_question, to_dotted};
use netsift::frame::FrameBuilder;
use netsift::parser::{Cursor, Packet};
use netsift::tls::recognize;
use netsift::tuple::extract;
use netsift::{Config, Engine, HookContext};
use netsift_common::ConnTuple;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Property: tuple extraction never panics on arbitrary bytes
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn extract_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let _ = extract(&Packet::new(&data));
    }
}

// ---------------------------------------------------------------------------
// Property: every strict prefix of a valid frame's headers is rejected
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn truncated_headers_are_rejected(
        src in any::<[u8; 4]>(),
        dst in any::<[u8; 4]>(),
        sport in any::<u16>(),
        dport in any::<u16>(),
        tcp in any::<bool>(),
    ) {
        let builder = FrameBuilder::v4(src, dst);
        let frame = if tcp {
            builder.tcp(sport, dport, 0x10, b"")
        } else {
            builder.udp(sport, dport, b"")
        };
        prop_assert!(extract(&Packet::new(&frame)).is_some());
        for cut in 0..frame.len() {
            prop_assert!(extract(&Packet::new(&frame[..cut])).is_none());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: flipping a tuple twice is the identity
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn flip_is_involutive(
        saddr in any::<[u8; 16]>(),
        daddr in any::<[u8; 16]>(),
        sport in any::<u16>(),
        dport in any::<u16>(),
        metadata in 0u32..4,
    ) {
        let tup = ConnTuple::v6(saddr, daddr, sport, dport, metadata);
        prop_assert_eq!(tup.flipped().flipped(), tup);
        prop_assert_eq!(tup.flipped().sport, dport);
    }
}

// ---------------------------------------------------------------------------
// Property: DNS and TLS parsers never panic
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn parse_question_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let _ = parse_question(&mut Cursor::new(&data));
    }

    #[test]
    fn recognize_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        if let Some(record) = recognize(&data) {
            prop_assert!(record.length as usize <= data.len() - 5);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: dotted names survive encoding
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn dotted_names_roundtrip(
        labels in proptest::collection::vec("[a-z0-9]{1,20}", 1..6),
    ) {
        let dotted = labels.join(".");
        let name = from_dotted(&dotted).unwrap();
        prop_assert_eq!(to_dotted(&name), dotted);
    }
}

// ---------------------------------------------------------------------------
// Property: hooks always pass garbage
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn hooks_accept_arbitrary_bytes(
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let engine = Engine::new(&Config::default()).unwrap();
        let packet = Packet::new(&data);
        prop_assert_eq!(engine.ingress(&packet, HookContext::default()), netsift::Verdict::Accept);
        prop_assert_eq!(engine.egress(&packet, HookContext::default()), netsift::Verdict::Accept);
        prop_assert_eq!(engine.socket(&packet, HookContext::default()), netsift::Verdict::Accept);
    }
}
