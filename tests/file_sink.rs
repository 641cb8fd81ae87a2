//! File sink writes against a temporary directory.

use pi_cam_shutter::output::{Destination, FileSink, MetadataFormat, OutputSink};
use pi_cam_shutter::traits::{FourCC, Frame, FrameMetadata, StreamInfo};
use std::fs;
use std::time::Duration;

fn jpeg_frame() -> Frame {
    let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
    Frame {
        metadata: FrameMetadata {
            sequence: 42,
            timestamp: Duration::from_millis(1386),
            bytes_used: 8,
        },
        data,
    }
}

fn still_info() -> StreamInfo {
    StreamInfo {
        width: 1920,
        height: 1080,
        stride: 0,
        fourcc: FourCC::MJPG,
    }
}

#[test]
fn test_write_image_to_file() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("still.jpg");
    let frame = jpeg_frame();

    let mut sink = FileSink::default();
    sink.write_image(&frame, &still_info(), &Destination::File(path.clone()), "vivid")
        .expect("write failed");

    assert_eq!(fs::read(&path).expect("read failed"), frame.data);
    assert_eq!(sink.written(), 1);
}

#[test]
fn test_write_image_overwrites() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("still.jpg");
    fs::write(&path, vec![0u8; 1024]).expect("seed failed");

    let frame = jpeg_frame();
    let mut sink = FileSink::default();
    sink.write_image(&frame, &still_info(), &Destination::File(path.clone()), "vivid")
        .expect("write failed");
    assert_eq!(fs::read(&path).expect("read failed").len(), frame.data.len());
}

#[test]
fn test_write_image_into_missing_directory_fails() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("missing").join("still.jpg");
    let mut sink = FileSink::default();
    let result = sink.write_image(&jpeg_frame(), &still_info(), &Destination::File(path), "x");
    assert!(result.is_err());
    assert_eq!(sink.written(), 0);
}

#[test]
fn test_write_json_metadata() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("still.json");
    let frame = jpeg_frame();

    let mut sink = FileSink::default();
    sink.write_metadata(&Destination::File(path.clone()), MetadataFormat::Json, &frame.metadata)
        .expect("write failed");

    let text = fs::read_to_string(&path).expect("read failed");
    let value: serde_json::Value = serde_json::from_str(&text).expect("invalid json");
    assert_eq!(value["sequence"], 42);
    assert_eq!(value["timestamp"], 1_386_000);
    assert_eq!(value["bytes_used"], 8);
}

#[test]
fn test_write_txt_metadata() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("still.txt");

    let mut sink = FileSink::default();
    sink.write_metadata(
        &Destination::File(path.clone()),
        MetadataFormat::Txt,
        &jpeg_frame().metadata,
    )
    .expect("write failed");

    let text = fs::read_to_string(&path).expect("read failed");
    assert!(text.lines().any(|line| line == "sequence=42"));
}

#[test]
fn test_counter_destination() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let pattern = Destination::File(dir.path().join("img%03d.jpg"));
    let mut sink = FileSink::default();
    for index in 0..2 {
        sink.write_image(&jpeg_frame(), &still_info(), &pattern.for_capture(index), "x")
            .expect("write failed");
    }
    assert!(dir.path().join("img000.jpg").exists());
    assert!(dir.path().join("img001.jpg").exists());
}
