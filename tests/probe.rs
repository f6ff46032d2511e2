//! Metadata and probing integration tests.

use std::path::Path;

use stillcut::{FrameRate, MediaProbe, StillcutError, parse_ffprobe_csv};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

// ── ffprobe output ─────────────────────────────────────────────────

#[test]
fn parses_typical_ffprobe_line() {
    let metadata = parse_ffprobe_csv("1280,720,30000/1001,1798\n").expect("parse");
    assert_eq!(metadata.width, 1280);
    assert_eq!(metadata.height, 720);
    assert_eq!(metadata.frame_count, 1798);
    assert_eq!(metadata.frame_rate, FrameRate::new(30000, 1001).expect("rate"));
}

#[test]
fn skips_blank_lines_and_ignores_extra_fields() {
    let metadata = parse_ffprobe_csv("\n  \n640,480,25/1,250,extra\n1,1,1/1,1\n").expect("parse");
    assert_eq!((metadata.width, metadata.height), (640, 480));
    assert_eq!(metadata.frame_count, 250);
}

#[test]
fn rejects_malformed_ffprobe_output() {
    for text in ["", "640,480,25/1", "wide,480,25/1,10", "640,480,25/0,10", "0,480,25/1,10"] {
        let result = parse_ffprobe_csv(text);
        assert!(result.is_err(), "accepted {text:?}");
    }
    assert!(matches!(
        parse_ffprobe_csv("640,480,fast,10"),
        Err(StillcutError::InvalidFrameRate(_))
    ));
}

// ── Frame rates ────────────────────────────────────────────────────

#[test]
fn frame_rate_forms() {
    let ntsc: FrameRate = "30000/1001".parse().expect("fraction");
    assert!((ntsc.as_f64() - 29.97).abs() < 0.001);
    assert_eq!(ntsc.to_string(), "30000/1001");

    let whole: FrameRate = "24".parse().expect("integer");
    assert_eq!(whole.to_string(), "24");
    assert!((whole.frame_duration_secs() - 1.0 / 24.0).abs() < 1e-12);

    let decimal: FrameRate = "29.97".parse().expect("decimal");
    assert_eq!((decimal.numerator(), decimal.denominator()), (29970, 1000));

    assert!("0/1".parse::<FrameRate>().is_err());
    assert!("25/0".parse::<FrameRate>().is_err());
    assert!("-5".parse::<FrameRate>().is_err());
}

#[test]
fn oversized_frame_rates_are_rejected() {
    assert!(matches!(
        "3000000000/1".parse::<FrameRate>(),
        Err(StillcutError::InvalidFrameRate(_))
    ));
    assert!(FrameRate::new(u32::MAX, 1).is_err());
    assert!(parse_ffprobe_csv("640,480,1/4294967295,10").is_err());
}

#[test]
fn frames_convert_to_seconds() {
    let rate = FrameRate::new(10, 1).expect("rate");
    assert!((rate.frames_to_seconds(4) - 0.4).abs() < 1e-12);
    assert_eq!(rate.frames_to_seconds(0), 0.0);
}

// ── FFmpeg probe ───────────────────────────────────────────────────

#[test]
fn probing_missing_file_fails_to_open() {
    let result = MediaProbe::probe("tests/fixtures/does_not_exist.mp4");
    assert!(matches!(result, Err(StillcutError::FileOpen { .. })));
}

#[test]
fn probe_sample_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let metadata = MediaProbe::probe(path).expect("Failed to probe sample video");
    assert!(metadata.width > 0);
    assert!(metadata.height > 0);
    assert!(metadata.frame_count > 0);
    assert!(metadata.frame_rate.as_f64() > 0.0);
    assert!(metadata.codec.is_some());
}
