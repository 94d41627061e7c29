//! Decoder and session properties over arbitrary byte streams.
//!
//! - valid frames decode to exactly the encoded integer
//! - frame-shaped slices with a bad prefix, marker or suffix never yield a sample
//! - splitting a stream into arbitrary chunks does not change what gets dispatched

use std::time::{Duration, Instant};

use proptest::prelude::*;
use weigher_core::mocks::MemorySink;
use weigher_core::{
    DispatchOutcome, DispatchPolicy, Dispatcher, Identity, PolicyCfg, RawBuffer, Scan, Session,
    StabilityCfg, encode_frame, is_valid_frame, parse_weight, scan,
};

fn dispatcher(sink: MemorySink) -> Dispatcher<MemorySink> {
    Dispatcher::new(
        DispatchPolicy::new(PolicyCfg {
            min_send_interval: Duration::ZERO,
        }),
        sink,
        Identity {
            source_id: "PC-1".into(),
            group_id: "SITE".into(),
        },
    )
}

fn run_chunked(stream: &[u8], sizes: &[usize]) -> (Vec<DispatchOutcome>, Vec<i32>) {
    let sink = MemorySink::new();
    let d = dispatcher(sink.clone());
    let mut session = Session::new(StabilityCfg::default(), 100);
    let now = Instant::now();
    let mut out = Vec::new();
    let mut rest = stream;
    let mut sizes = sizes.iter().copied().cycle();
    while !rest.is_empty() {
        let n = sizes.next().unwrap_or(rest.len()).clamp(1, rest.len());
        let (head, tail) = rest.split_at(n);
        out.extend(session.ingest(head, &d, now));
        rest = tail;
    }
    (out, sink.weights())
}

/// Well-formed frames with garbage between them: three stable runs
/// (1250, -40 rejected, 0 accepted) and a noisy tail that never settles.
fn mixed_stream() -> Vec<u8> {
    let mut s = Vec::new();
    s.extend_from_slice(b"XX");
    for _ in 0..3 {
        s.extend_from_slice(b"ww   1250kg");
    }
    s.extend_from_slice(b"YYw");
    for _ in 0..3 {
        s.extend_from_slice(b"wn    -40kg");
    }
    s.extend_from_slice(b"\r\n");
    for _ in 0..3 {
        s.extend_from_slice(b"ww      0kg");
    }
    s.extend_from_slice(b"ww    100kgww    300kgww    500kg");
    s
}

const SHORT_FRAME_STREAM: &[u8] = b"XXww  1 00kgYYwn 1-5 kgww  1 00kgww  1 00kg";

#[test]
fn mixed_stream_in_one_chunk() {
    let stream = mixed_stream();
    let (out, weights) = run_chunked(&stream, &[stream.len()]);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0], DispatchOutcome::Recorded(1250));
    assert!(matches!(out[1], DispatchOutcome::Rejected { weight: -40, .. }));
    assert_eq!(out[2], DispatchOutcome::Recorded(0));
    assert_eq!(weights, vec![1250, 0]);
}

#[test]
fn short_frames_in_stream_yield_nothing() {
    // every 'w' run in this stream is ten bytes long, so no candidate validates
    let (out, weights) = run_chunked(SHORT_FRAME_STREAM, &[SHORT_FRAME_STREAM.len()]);
    assert!(out.is_empty());
    assert!(weights.is_empty());
}

#[test]
fn two_hundred_garbage_bytes_do_not_accumulate() {
    let mut buf = RawBuffer::new(100);
    for _ in 0..4 {
        buf.extend(&[b'Z'; 50]);
        assert_eq!(buf.next_sample(), None);
        assert!(buf.len() <= 100);
    }
    assert!(buf.len() <= 100);
    // resyncs on the next good frame
    buf.extend(b"ww     77kg");
    assert_eq!(buf.next_sample(), Some(77));
}

proptest! {
    #[test]
    fn chunking_does_not_change_dispatches(sizes in proptest::collection::vec(1usize..16, 1..24)) {
        let stream = mixed_stream();
        let whole = run_chunked(&stream, &[stream.len()]);
        prop_assert_eq!(run_chunked(&stream, &sizes), whole);
    }

    #[test]
    fn chunking_the_short_frame_stream_is_stable(sizes in proptest::collection::vec(1usize..12, 1..12)) {
        let whole = run_chunked(SHORT_FRAME_STREAM, &[SHORT_FRAME_STREAM.len()]);
        prop_assert_eq!(run_chunked(SHORT_FRAME_STREAM, &sizes), whole);
    }

    #[test]
    fn encoded_frames_decode_exactly(w in -999_999i32..=9_999_999) {
        let frame = encode_frame(w).expect("fits in seven characters");
        prop_assert!(is_valid_frame(&frame));
        prop_assert_eq!(parse_weight(&frame), Ok(w));
        let again = encode_frame(parse_weight(&frame).unwrap()).unwrap();
        prop_assert_eq!(&again[2..9], &frame[2..9]);
    }

    #[test]
    fn nonconforming_slices_never_decode(
        field in proptest::collection::vec(any::<u8>(), 7),
        b0 in any::<u8>(),
        b1 in any::<u8>(),
        suffix in proptest::collection::vec(any::<u8>(), 2),
    ) {
        prop_assume!(b0 != b'w' || !matches!(b1, b'w' | b'n') || suffix != b"kg");
        let mut cand = vec![b0, b1];
        cand.extend_from_slice(&field);
        cand.extend_from_slice(&suffix);
        prop_assert!(!is_valid_frame(&cand));
        // a lone 11-byte slice only ever matches at offset 0
        prop_assert_eq!(scan(&cand), Scan::Incomplete);
    }

    #[test]
    fn garbage_never_panics_the_buffer(bytes in proptest::collection::vec(any::<u8>(), 0..400)) {
        let mut buf = RawBuffer::new(100);
        for chunk in bytes.chunks(7) {
            buf.extend(chunk);
            while buf.next_sample().is_some() {}
            prop_assert!(buf.len() <= 100 + 7);
        }
    }
}
