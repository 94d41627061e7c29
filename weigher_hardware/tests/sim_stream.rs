use std::time::Duration;

use weigher_hardware::{SimProfile, SimulatedEnumerator};
use weigher_traits::{LinkSettings, PortEnumerator, ScalePort};

#[test]
fn simulated_stream_is_whole_frames() {
    let profile = SimProfile {
        steps: vec![(0, 2), (1250, 3)],
        period: Duration::from_millis(2),
    };
    let e = SimulatedEnumerator::new("SIM9", profile);
    let names = e.list().unwrap();
    let mut port = e
        .open(&names[0], &LinkSettings::default())
        .expect("open simulated port");
    port.set_read_timeout(Duration::from_millis(20)).unwrap();

    let mut collected = Vec::new();
    let mut buf = [0u8; 32];
    while collected.len() < 11 * 10 {
        let n = port.read_chunk(&mut buf).unwrap();
        collected.extend_from_slice(&buf[..n]);
    }
    for frame in collected.chunks_exact(11) {
        assert_eq!(frame[0], b'w');
        assert_eq!(&frame[9..], b"kg");
    }
    let weights: Vec<&[u8]> = collected.chunks_exact(11).take(5).map(|f| &f[2..9]).collect();
    assert_eq!(
        weights,
        vec![
            &b"      0"[..],
            &b"      0"[..],
            &b"   1250"[..],
            &b"   1250"[..],
            &b"   1250"[..],
        ]
    );
}
