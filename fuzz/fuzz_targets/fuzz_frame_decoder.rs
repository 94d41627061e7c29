#![no_main]
use libfuzzer_sys::fuzz_target;
use weigher_core::{RawBuffer, encode_frame, is_valid_frame, parse_weight};

fuzz_target!(|data: &[u8]| {
    // chunk size comes from the input so split points vary
    let Some((&step, bytes)) = data.split_first() else {
        return;
    };
    let step = usize::from(step % 32).max(1);
    let mut buf = RawBuffer::new(100);
    for chunk in bytes.chunks(step) {
        buf.extend(chunk);
        while let Some(w) = buf.next_sample() {
            // every decoded value re-encodes to a valid frame
            if let Some(f) = encode_frame(w) {
                assert!(is_valid_frame(&f));
                assert_eq!(parse_weight(&f), Ok(w));
            }
        }
        assert!(buf.len() <= 100 + step);
    }
});
