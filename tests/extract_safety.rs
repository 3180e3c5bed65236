use std::fs;
use tempfile::tempdir;

use archforge::types::{
    AddRequest, EntryAttributes, EntryPayload, ExtractRequest, TarCompression,
};
use archforge::tar_handler::TarHandler;
use archforge::zip_handler::ZipHandler;

fn extract_req(output_dir: &std::path::Path, vulnerable: bool) -> ExtractRequest {
    ExtractRequest {
        entry_path: None,
        output_dir: output_dir.to_path_buf(),
        vulnerable,
        normalize_permissions: false,
        verbose: 0,
    }
}

fn zip_add(handler: &ZipHandler, archive: &std::path::Path, req: AddRequest) {
    handler.add(archive, &req).unwrap();
}

fn content(path: &str, bytes: &[u8]) -> AddRequest {
    AddRequest {
        entry_path: path.to_string(),
        payload: EntryPayload::Content(bytes.to_vec()),
        attrs: EntryAttributes::default(),
        verbose: 0,
    }
}

#[test]
fn zip_traversal_is_contained_by_default() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("trav.zip");
    let out = dir.path().join("out");
    let handler = ZipHandler::new(false);

    zip_add(&handler, &archive, content("../../etc/passwd", b"pwned"));
    handler.extract(&archive, &extract_req(&out, false)).unwrap();

    assert_eq!(fs::read(out.join("etc/passwd")).unwrap(), b"pwned");
    assert!(!dir.path().join("etc/passwd").exists());
}

#[test]
fn zip_traversal_escapes_when_vulnerable() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("trav.zip");
    let out = dir.path().join("deep/out");
    fs::create_dir_all(&out).unwrap();
    let handler = ZipHandler::new(false);

    // Stays inside the tempdir but outside the chosen output directory.
    zip_add(&handler, &archive, content("../escaped.txt", b"out"));
    handler.extract(&archive, &extract_req(&out, true)).unwrap();

    assert_eq!(fs::read(dir.path().join("deep/escaped.txt")).unwrap(), b"out");
    assert!(!out.join("escaped.txt").exists());
}

#[test]
fn zip_symlink_entry_becomes_placeholder_file() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("sym.zip");
    let out = dir.path().join("out");
    let handler = ZipHandler::new(false);

    zip_add(
        &handler,
        &archive,
        AddRequest {
            entry_path: "evil-link".into(),
            payload: EntryPayload::Symlink("/etc/shadow".into()),
            attrs: EntryAttributes::default(),
            verbose: 0,
        },
    );
    handler.extract(&archive, &extract_req(&out, false)).unwrap();

    let placeholder = out.join("evil-link");
    assert!(placeholder.is_file());
    assert!(!placeholder.is_symlink());
    assert_eq!(
        fs::read_to_string(&placeholder).unwrap(),
        "Symlink to: /etc/shadow"
    );
}

#[cfg(unix)]
#[test]
fn zip_symlink_entry_materializes_when_vulnerable() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("sym.zip");
    let out = dir.path().join("out");
    let handler = ZipHandler::new(false);

    zip_add(
        &handler,
        &archive,
        AddRequest {
            entry_path: "the-link".into(),
            payload: EntryPayload::Symlink("target-file".into()),
            attrs: EntryAttributes::default(),
            verbose: 0,
        },
    );
    handler.extract(&archive, &extract_req(&out, true)).unwrap();

    let link = out.join("the-link");
    assert!(link.is_symlink());
    assert_eq!(fs::read_link(&link).unwrap().to_str(), Some("target-file"));
}

#[cfg(unix)]
#[test]
fn zip_extract_preserves_permissions_unless_normalized() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let archive = dir.path().join("perm.zip");
    let handler = ZipHandler::new(false);

    let mut req = content("script.sh", b"#!/bin/sh\n");
    req.attrs.mode = Some(0o700);
    zip_add(&handler, &archive, req);

    let preserved = dir.path().join("preserved");
    handler.extract(&archive, &extract_req(&preserved, false)).unwrap();
    let mode = fs::metadata(preserved.join("script.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);

    let normalized = dir.path().join("normalized");
    let mut req = extract_req(&normalized, false);
    req.normalize_permissions = true;
    handler.extract(&archive, &req).unwrap();
    let mode = fs::metadata(normalized.join("script.sh")).unwrap().permissions().mode();
    assert_ne!(mode & 0o777, 0o700);
}

#[test]
fn tar_setuid_symlink_scenario() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("x.tar");
    let out = dir.path().join("out");
    let handler = TarHandler::new(TarCompression::None);

    handler
        .add(
            &archive,
            &AddRequest {
                entry_path: "s".into(),
                payload: EntryPayload::Symlink("/etc/shadow".into()),
                attrs: EntryAttributes {
                    mode: Some(0o4777),
                    ..EntryAttributes::default()
                },
                verbose: 0,
            },
        )
        .unwrap();

    // Header carries exactly what was asked for.
    let raw = archforge::tar_raw::scan(&fs::read(&archive).unwrap()[..]).unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].header.typeflag, b'2');
    assert_eq!(raw[0].linkname, "/etc/shadow");
    assert_eq!(raw[0].header.mode, 0o4777);

    // Safe extraction refuses to create the link.
    handler.extract(&archive, &extract_req(&out, false)).unwrap();
    let placeholder = out.join("s");
    assert!(placeholder.is_file());
    assert!(!placeholder.is_symlink());
    assert_eq!(
        fs::read_to_string(&placeholder).unwrap(),
        "symlink to: /etc/shadow"
    );
}

#[cfg(unix)]
#[test]
fn tar_hardlink_vulnerable_extraction_links_target() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("h.tar");
    let out = dir.path().join("out");
    let handler = TarHandler::new(TarCompression::None);

    handler.add(&archive, &content("original.txt", b"shared")).unwrap();
    handler
        .add(
            &archive,
            &AddRequest {
                entry_path: "alias.txt".into(),
                payload: EntryPayload::Hardlink("original.txt".into()),
                attrs: EntryAttributes::default(),
                verbose: 0,
            },
        )
        .unwrap();

    handler.extract(&archive, &extract_req(&out, true)).unwrap();
    assert_eq!(fs::read(out.join("alias.txt")).unwrap(), b"shared");
}

#[test]
fn tar_extract_filters_by_path() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("f.tar");
    let out = dir.path().join("out");
    let handler = TarHandler::new(TarCompression::None);

    handler.add(&archive, &content("keep/a.txt", b"a")).unwrap();
    handler.add(&archive, &content("skip/b.txt", b"b")).unwrap();

    let mut req = extract_req(&out, false);
    req.entry_path = Some("keep".into());
    handler.extract(&archive, &req).unwrap();

    assert!(out.join("keep/a.txt").exists());
    assert!(!out.join("skip/b.txt").exists());

    let mut req = extract_req(&out, false);
    req.entry_path = Some("nope".into());
    let err = handler.extract(&archive, &req).unwrap_err();
    assert!(err.to_string().contains("not found in the archive"));
}
