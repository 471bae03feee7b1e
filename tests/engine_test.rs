//! Format detection, lifecycle and cancellation through the public API.

use std::fs;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ghinstall::{
    sniff, ArchiveFormat, CancelToken, Error, ErrorKind, ExtractionRequest, Extractor,
};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn zip_with(count: usize) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..count {
        zip.start_file(format!("file{}.txt", i), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(format!("content {}", i).as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_sniff_prefixes() {
    assert_eq!(sniff(&[0x1F, 0x8B, 0x08, 0x00]).unwrap(), ArchiveFormat::TarGz);
    assert_eq!(sniff(b"PK\x03\x04").unwrap(), ArchiveFormat::Zip);
    assert_eq!(sniff(b"7z\xBC\xAF").unwrap(), ArchiveFormat::Unknown);
    assert!(matches!(
        sniff(b"PK\x03"),
        Err(Error::TruncatedInput { available: 3 })
    ));
}

#[test]
fn test_short_input_is_truncated() {
    let dest = tempdir().unwrap();

    let err = Extractor::new()
        .extract(Cursor::new(b"\x1F\x8B"), dest.path())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TruncatedInput);
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[test]
fn test_unknown_format_is_unsupported() {
    let dest = tempdir().unwrap();

    let err = Extractor::new()
        .extract(Cursor::new(b"BZh91AY&SY".to_vec()), dest.path())
        .unwrap_err();

    match err {
        Error::UnsupportedFormat { magic } => assert_eq!(magic, b"BZh9"),
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
}

#[test]
fn test_destination_is_a_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();

    let err = Extractor::new()
        .extract(Cursor::new(zip_with(1)), &file)
        .unwrap_err();

    assert!(matches!(err, Error::DestinationNotDirectory { .. }));
}

#[test]
fn test_missing_destination_is_created() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("a/b/c");

    let report = Extractor::new()
        .extract(Cursor::new(zip_with(2)), &dest)
        .unwrap();

    assert_eq!(report.files_extracted, 2);
    assert!(dest.join("file1.txt").exists());
}

#[test]
fn test_progress_reports_each_entry() {
    let dest = tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    Extractor::new()
        .on_progress(move |p| {
            sink.lock()
                .unwrap()
                .push((p.entry_index, p.entry_name.to_string(), p.bytes_written));
        })
        .extract(Cursor::new(zip_with(3)), dest.path())
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (0, "file0.txt".to_string(), 9),
            (1, "file1.txt".to_string(), 18),
            (2, "file2.txt".to_string(), 27),
        ]
    );
}

#[test]
fn test_cancel_between_entries() {
    let dest = tempdir().unwrap();
    let token = CancelToken::new();
    let trip = token.clone();

    let extractor = Extractor::new().on_progress(move |p| {
        if p.entry_index == 1 {
            trip.cancel();
        }
    });
    let request = ExtractionRequest::new(Cursor::new(zip_with(5)), dest.path()).cancel(token);
    let err = extractor.run(request).unwrap_err();

    assert!(matches!(err, Error::Cancelled { entries_processed: 2 }));
    assert!(dest.path().join("file1.txt").exists());
    assert!(!dest.path().join("file2.txt").exists());
}

#[test]
fn test_expired_deadline_cancels_before_first_entry() {
    let dest = tempdir().unwrap();
    let token = CancelToken::with_deadline(Instant::now() - Duration::from_secs(1));

    let request = ExtractionRequest::new(Cursor::new(zip_with(2)), dest.path()).cancel(token);
    let err = Extractor::new().run_seekable(request).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[test]
fn test_tiny_copy_buffer() {
    let dest = tempdir().unwrap();

    let report = Extractor::new()
        .buffer_size(1)
        .extract(Cursor::new(zip_with(3)), dest.path())
        .unwrap();

    assert_eq!(report.bytes_written, 27);
    assert_eq!(
        fs::read_to_string(dest.path().join("file2.txt")).unwrap(),
        "content 2"
    );
}

// ============================================================================
// Same archive, both formats
// ============================================================================

fn tar_gz_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_hello_world_scenario() {
    let files: &[(&str, &[u8])] = &[
        ("test.txt", b"Hello, World!"),
        ("subdir/nested.txt", b"Nested file content"),
    ];

    for data in [tar_gz_of(files), zip_of(files)] {
        let dest = tempdir().unwrap();
        let report = Extractor::new().extract(Cursor::new(data), dest.path()).unwrap();

        assert_eq!(report.files_extracted, 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("test.txt")).unwrap(),
            "Hello, World!"
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("subdir/nested.txt")).unwrap(),
            "Nested file content"
        );
    }
}

#[test]
fn test_etc_passwd_scenario() {
    let files: &[(&str, &[u8])] = &[("../../../etc/passwd", b"root::0:0::/:/bin/sh")];

    for data in [tar_gz_of(files), zip_of(files)] {
        let parent = tempdir().unwrap();
        let dest = parent.path().join("a/b/c");

        let err = Extractor::new().extract(Cursor::new(data), &dest).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PathRejected);
        assert!(!parent.path().join("etc").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }
}

#[cfg(unix)]
#[test]
fn test_packed_tree_round_trips() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempdir().unwrap();
    fs::create_dir_all(src.path().join("bin")).unwrap();
    fs::create_dir_all(src.path().join("share/doc")).unwrap();
    fs::write(src.path().join("bin/tool"), b"\x7fELF...").unwrap();
    fs::set_permissions(src.path().join("bin/tool"), fs::Permissions::from_mode(0o750)).unwrap();
    fs::write(src.path().join("share/doc/README"), b"docs").unwrap();
    fs::set_permissions(
        src.path().join("share/doc/README"),
        fs::Permissions::from_mode(0o640),
    )
    .unwrap();
    let files = [("bin/tool", 0o750), ("share/doc/README", 0o640)];

    let mut tar = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    tar.append_dir_all("pkg", src.path()).unwrap();
    let tar_gz = tar.into_inner().unwrap().finish().unwrap();

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, mode) in files {
        let options = SimpleFileOptions::default().unix_permissions(mode);
        zip.start_file(format!("pkg/{}", name), options).unwrap();
        zip.write_all(&fs::read(src.path().join(name)).unwrap()).unwrap();
    }
    let zip = zip.finish().unwrap().into_inner();

    for data in [tar_gz, zip] {
        let dest = tempdir().unwrap();
        Extractor::new().extract(Cursor::new(data), dest.path()).unwrap();

        for (name, mode) in files {
            let out = dest.path().join("pkg").join(name);
            assert_eq!(fs::read(&out).unwrap(), fs::read(src.path().join(name)).unwrap());
            assert_eq!(fs::metadata(&out).unwrap().permissions().mode() & 0o777, mode);
        }
    }
}
