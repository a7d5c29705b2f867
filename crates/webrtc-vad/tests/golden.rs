//! Golden-vector tests against the reference speech capture.
//!
//! The fixture `tests/data/test-audio.raw` is 8 kHz, 16-bit mono PCM.
//! The expected per-frame bit patterns come from the reference
//! implementation; they pin down the full fixed-point pipeline, one
//! character per 30 ms frame. The tests are skipped when the fixture has
//! not been checked out.

use std::fs;
use std::path::Path;

use webrtc_vad::{Vad, VadMode};

const FIXTURE: &str = "tests/data/test-audio.raw";

const EXPECTED: [(VadMode, &str); 4] = [
    (VadMode::Quality, "011110111111111111111111111100"),
    (VadMode::LowBitrate, "011110111111111111111111111100"),
    (VadMode::Aggressive, "000000111111111111111111110000"),
    (VadMode::VeryAggressive, "000000111111111111111100000000"),
];

#[test]
fn thirty_ms_frames_at_8khz_match_the_reference_patterns() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(FIXTURE);
    let Ok(data) = fs::read(&path) else {
        eprintln!("fixture {FIXTURE} not found; skipping");
        return;
    };

    // 30 ms at 8 kHz: 240 samples, 480 bytes per frame.
    let frame_bytes = 480;

    for (mode, expected) in EXPECTED {
        let mut vad = Vad::new(mode);
        let mut pattern = String::new();
        for frame in data.chunks_exact(frame_bytes) {
            let voiced = vad.is_speech(frame, 8000).unwrap();
            pattern.push(if voiced { '1' } else { '0' });
        }
        assert_eq!(pattern, expected, "mode {mode:?}");
    }
}

#[test]
fn mode_changes_mid_stream_stay_deterministic() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(FIXTURE);
    let Ok(data) = fs::read(&path) else {
        eprintln!("fixture {FIXTURE} not found; skipping");
        return;
    };

    let run = || {
        let mut vad = Vad::new(VadMode::Quality);
        let mut pattern = String::new();
        for (i, frame) in data.chunks_exact(480).enumerate() {
            if i == 10 {
                vad.set_mode(VadMode::VeryAggressive).unwrap();
            }
            pattern.push(if vad.is_speech(frame, 8000).unwrap() { '1' } else { '0' });
        }
        pattern
    };

    assert_eq!(run(), run());
}
