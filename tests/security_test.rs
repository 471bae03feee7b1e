use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use ghinstall::{validate, validate_link, Error, Extractor, PathVerdict, RejectReason};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

// ============================================================================
// Helper Functions
// ============================================================================

/// Zip with the given files, names written verbatim.
fn create_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// tar.gz with regular files, names written into the raw header.
fn create_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
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

fn both_formats(files: &[(&str, &[u8])]) -> [(&'static str, Vec<u8>); 2] {
    [("zip", create_zip(files)), ("tar.gz", create_tar_gz(files))]
}

fn extract(data: &[u8], dest: &Path) -> Result<ghinstall::Report, Error> {
    Extractor::new().extract(Cursor::new(data), dest)
}

fn rejection(result: Result<ghinstall::Report, Error>) -> RejectReason {
    match result {
        Err(Error::PathRejected { reason, .. }) => reason,
        other => panic!("❌ expected PathRejected, got {:?}", other),
    }
}

// ============================================================================
// Lexical guard
// ============================================================================

#[test]
fn test_guard_is_segment_aligned() {
    let root = Path::new("/srv/dst");

    assert_eq!(
        validate(root, "a/b.txt"),
        PathVerdict::Admit("/srv/dst/a/b.txt".into())
    );
    assert!(matches!(
        validate(root, "../dst-evil/x"),
        PathVerdict::Reject(RejectReason::EscapesRoot { .. })
    ));
    assert!(matches!(
        validate(root, "a/../../dst2"),
        PathVerdict::Reject(RejectReason::EscapesRoot { .. })
    ));
    // climbing out and back in resolves inside
    assert_eq!(
        validate(root, "../dst/inner"),
        PathVerdict::Admit("/srv/dst/inner".into())
    );
}

#[test]
fn test_guard_link_targets_resolve_from_link_directory() {
    let root = Path::new("/srv/dst");

    assert_eq!(
        validate_link(root, "bin/tool", "../lib/tool"),
        PathVerdict::Admit("/srv/dst/lib/tool".into())
    );
    assert!(matches!(
        validate_link(root, "tool", "../lib/tool"),
        PathVerdict::Reject(RejectReason::LinkEscapesRoot { .. })
    ));
    assert!(matches!(
        validate_link(root, "tool", "/usr/bin/tool"),
        PathVerdict::Reject(RejectReason::AbsoluteLinkTarget { .. })
    ));
}

// ============================================================================
// Hostile archives
// ============================================================================

/// Attack: "../dst-evil/payload" lands in a sibling whose name shares the
/// destination's prefix.
#[test]
fn test_sibling_prefix_escape() {
    for (format, data) in both_formats(&[("../dst-evil/payload", b"evil")]) {
        let parent = tempdir().unwrap();
        let dest = parent.path().join("dst");

        let reason = rejection(extract(&data, &dest));

        assert!(
            matches!(reason, RejectReason::EscapesRoot { .. }),
            "{}: {:?}",
            format,
            reason
        );
        assert!(!parent.path().join("dst-evil").exists(), "{}", format);
    }
    println!("✅ Sibling-prefix escape blocked for both formats");
}

#[test]
fn test_deep_traversal() {
    for (format, data) in both_formats(&[("a/b/../../../../../../etc/cron.d/x", b"* * * * *")]) {
        let dest = tempdir().unwrap();
        let reason = rejection(extract(&data, dest.path()));
        assert!(
            matches!(reason, RejectReason::EscapesRoot { .. }),
            "{}: {:?}",
            format,
            reason
        );
    }
}

#[test]
fn test_backslash_rejection() {
    for (format, data) in both_formats(&[("foo\\..\\..\\bar.txt", b"data")]) {
        let dest = tempdir().unwrap();
        let reason = rejection(extract(&data, dest.path()));
        assert!(
            reason.to_string().contains("backslash"),
            "{}: {}",
            format,
            reason
        );
    }
}

/// Attack: "image.png\0.exe", the OS might truncate at the null byte.
#[test]
fn test_null_byte_rejection() {
    let dest = tempdir().unwrap();
    let data = create_zip(&[("harmless.txt\0.exe", b"malware")]);

    let reason = rejection(extract(&data, dest.path()));

    assert!(reason.to_string().contains("control"), "{}", reason);
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[test]
fn test_overlong_component_rejection() {
    let dest = tempdir().unwrap();
    let name = format!("dir/{}", "x".repeat(300));
    let data = create_zip(&[(&name, b"data")]);

    let reason = rejection(extract(&data, dest.path()));

    assert!(matches!(reason, RejectReason::InvalidName(_)), "{:?}", reason);
}

#[test]
fn test_absolute_path_rejection() {
    for (format, data) in both_formats(&[("/tmp/ghinstall-evil.txt", b"evil")]) {
        let dest = tempdir().unwrap();
        let reason = rejection(extract(&data, dest.path()));
        assert_eq!(reason, RejectReason::Absolute, "{}", format);
    }
    assert!(!Path::new("/tmp/ghinstall-evil.txt").exists());
}

/// Attack: the destination already holds a symlink to somewhere else, and
/// the archive writes below it.
#[cfg(unix)]
#[test]
fn test_preexisting_symlinked_directory() {
    let outside = tempdir().unwrap();
    let dest = tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), dest.path().join("plugins")).unwrap();

    let data = create_zip(&[("plugins/evil.so", b"evil")]);
    let reason = rejection(extract(&data, dest.path()));

    assert!(
        matches!(reason, RejectReason::ResolvesOutside { .. }),
        "{:?}",
        reason
    );
    assert!(!outside.path().join("evil.so").exists());
    println!("✅ Write through pre-existing symlink blocked");
}

/// Attack: archive plants "link -> target", then writes "link" hoping the
/// write follows the link.
#[cfg(unix)]
#[test]
fn test_symlink_then_file_in_same_archive() {
    let dest = tempdir().unwrap();
    fs::write(dest.path().join("target.txt"), "original").unwrap();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    builder.append_link(&mut header, "link", "target.txt").unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_size(11);
    header.set_mode(0o644);
    builder.append_data(&mut header, "link", &b"overwritten"[..]).unwrap();
    let data = builder.into_inner().unwrap().finish().unwrap();

    extract(&data, dest.path()).unwrap();

    let link = dest.path().join("link");
    assert!(!link.is_symlink(), "Should no longer be a symlink");
    assert_eq!(fs::read_to_string(&link).unwrap(), "overwritten");
    assert_eq!(
        fs::read_to_string(dest.path().join("target.txt")).unwrap(),
        "original"
    );
    println!("✅ Symlink replaced with file safely (didn't follow symlink)");
}

/// Attack: "a/b -> .." makes `a/b` the destination itself, so a second link
/// "a/b/c -> .." lands at `dst/c` and points at the destination's parent,
/// although both targets look contained when read off the archive.
#[cfg(unix)]
#[test]
fn test_link_through_planted_directory_link() {
    let parent = tempdir().unwrap();
    fs::write(parent.path().join("secret.txt"), "outside").unwrap();
    let dest = parent.path().join("dst");

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (kind, name, link) in [
        (tar::EntryType::Directory, "a/", None),
        (tar::EntryType::Symlink, "a/b", Some("..")),
        (tar::EntryType::Symlink, "a/b/c", Some("..")),
    ] {
        let mut header = tar::Header::new_gnu();
        let old = header.as_old_mut();
        old.name[..name.len()].copy_from_slice(name.as_bytes());
        if let Some(link) = link {
            old.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
        header.set_entry_type(kind);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, &[][..]).unwrap();
    }
    let data = builder.into_inner().unwrap().finish().unwrap();

    let reason = rejection(extract(&data, &dest));

    assert!(
        matches!(reason, RejectReason::LinkResolvesOutside { .. }),
        "{:?}",
        reason
    );
    assert!(fs::symlink_metadata(dest.join("c")).is_err());
    assert!(fs::read_to_string(dest.join("c/secret.txt")).is_err());
    println!("✅ Link planted through a directory symlink blocked");
}

