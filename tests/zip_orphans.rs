use std::fs;
use tempfile::tempdir;

use archforge::codec::crc32_ieee;
use archforge::extzip::{EntryStatus, ExtZip};

// Hand-rolled record emitters so the fixtures exercise exactly the malformed
// layouts the scanner must survive.

fn lfh(name: &str, content: &str) -> Vec<u8> {
    let name = name.as_bytes();
    let content = content.as_bytes();
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x03\x04");
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // stored
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&crc32_ieee(content).to_le_bytes());
    out.extend_from_slice(&(content.len() as u32).to_le_bytes());
    out.extend_from_slice(&(content.len() as u32).to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(content);
    out
}

fn cdh(name: &str, content: &str, lfh_offset: u32) -> Vec<u8> {
    let name = name.as_bytes();
    let content = content.as_bytes();
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x01\x02");
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1000u16.to_le_bytes());
    out.extend_from_slice(&1000u16.to_le_bytes());
    out.extend_from_slice(&crc32_ieee(content).to_le_bytes());
    out.extend_from_slice(&(content.len() as u32).to_le_bytes());
    out.extend_from_slice(&(content.len() as u32).to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x8180_0000u32.to_le_bytes());
    out.extend_from_slice(&lfh_offset.to_le_bytes());
    out.extend_from_slice(name);
    out
}

fn eocd(cd_offset: u32, cd_size: u32, entry_count: u16, comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
    out
}

/// An archive with a normal entry, an LFH with no CDH anywhere, an LFH whose
/// CDH hides inside the EOCD comment, a second normal entry, and a hidden CDH
/// pointing at a local header that does not exist.
fn complex_orphaned_zip() -> Vec<u8> {
    let mut zip = Vec::new();

    let offset1 = zip.len() as u32;
    zip.extend_from_slice(&lfh("normal.txt", "This is a normal file with LFH and CDH"));

    zip.extend_from_slice(&lfh("orphaned_alone.txt", "This LFH has no CDH anywhere!"));

    let offset3 = zip.len() as u32;
    zip.extend_from_slice(&lfh(
        "orphaned_with_cdh.txt",
        "This LFH has a CDH but CDH is in EOCD comment",
    ));

    let offset4 = zip.len() as u32;
    zip.extend_from_slice(&lfh("normal2.txt", "Second normal file"));

    let cd_offset = zip.len() as u32;
    let mut cd = Vec::new();
    cd.extend_from_slice(&cdh(
        "normal.txt",
        "This is a normal file with LFH and CDH",
        offset1,
    ));
    cd.extend_from_slice(&cdh("normal2.txt", "Second normal file", offset4));
    zip.extend_from_slice(&cd);

    let mut comment = b"Hidden CDHs: ".to_vec();
    comment.extend_from_slice(&cdh(
        "orphaned_with_cdh.txt",
        "This LFH has a CDH but CDH is in EOCD comment",
        offset3,
    ));
    comment.extend_from_slice(&cdh(
        "nonexistent.txt",
        "This CDH points to nowhere",
        0x0999_9999,
    ));

    zip.extend_from_slice(&eocd(cd_offset, cd.len() as u32, 2, &comment));
    zip
}

#[test]
fn orphan_scan_finds_everything() {
    let zip = ExtZip::from_bytes(complex_orphaned_zip(), true).unwrap();

    let names = zip.name_list();
    assert_eq!(
        names,
        vec![
            "normal.txt",
            "normal2.txt",
            "orphaned_alone.txt",
            "orphaned_with_cdh.txt",
            "nonexistent.txt",
        ]
    );

    assert_eq!(zip.get_info("normal.txt").unwrap().status, EntryStatus::Paired);
    assert_eq!(zip.get_info("normal2.txt").unwrap().status, EntryStatus::Paired);
    assert_eq!(
        zip.get_info("orphaned_alone.txt").unwrap().status,
        EntryStatus::OrphanedLfh
    );
    assert_eq!(
        zip.get_info("orphaned_with_cdh.txt").unwrap().status,
        EntryStatus::OrphanedLfhHiddenCdh
    );
    assert_eq!(
        zip.get_info("nonexistent.txt").unwrap().status,
        EntryStatus::OrphanedCdh
    );
}

#[test]
fn orphans_hidden_without_deep_scan() {
    let zip = ExtZip::from_bytes(complex_orphaned_zip(), false).unwrap();
    assert_eq!(zip.name_list(), vec!["normal.txt", "normal2.txt"]);
}

#[test]
fn orphan_payloads_are_readable() {
    let zip = ExtZip::from_bytes(complex_orphaned_zip(), true).unwrap();

    let alone = zip.get_info("orphaned_alone.txt").unwrap();
    assert_eq!(
        zip.read_entry_bytes(alone).unwrap(),
        b"This LFH has no CDH anywhere!"
    );

    let with_cdh = zip.get_info("orphaned_with_cdh.txt").unwrap();
    assert_eq!(
        zip.read_entry_bytes(with_cdh).unwrap(),
        b"This LFH has a CDH but CDH is in EOCD comment"
    );
    // The hidden CDH contributed its attributes.
    assert_eq!(with_cdh.external_attr, 0x8180_0000);

    // A CDH pointing at nothing has no data to read.
    let phantom = zip.get_info("nonexistent.txt").unwrap();
    assert!(zip.read_entry_bytes(phantom).is_err());
}

#[test]
fn hidden_cdh_is_discoverable_by_offset() {
    let zip = ExtZip::from_bytes(complex_orphaned_zip(), true).unwrap();
    let entry = zip.get_info("orphaned_with_cdh.txt").unwrap();
    let lfh_offset = entry.lfh_offset.unwrap();

    let cdh = zip.find_cdh_for(lfh_offset).unwrap();
    assert_eq!(cdh.name, "orphaned_with_cdh.txt");
    // The record lives inside the EOCD comment, past the EOCD's own offset.
    let eocd = &zip.eocds[zip.main_eocd.unwrap()];
    assert!(cdh.offset > eocd.offset);
}

#[test]
fn duplicate_cdh_references_are_diagnosed() {
    // Two hidden CDHs pointing at the same orphaned LFH.
    let mut zip_bytes = Vec::new();
    let orphan_offset = zip_bytes.len() as u32;
    zip_bytes.extend_from_slice(&lfh("twice.txt", "claimed twice"));

    let cd_offset = zip_bytes.len() as u32;
    let mut comment = Vec::new();
    comment.extend_from_slice(&cdh("twice.txt", "claimed twice", orphan_offset));
    comment.extend_from_slice(&cdh("twice-again.txt", "claimed twice", orphan_offset));
    zip_bytes.extend_from_slice(&eocd(cd_offset, 0, 0, &comment));

    let zip = ExtZip::from_bytes(zip_bytes, true).unwrap();
    let entry = zip.get_info("twice.txt").unwrap();
    assert_eq!(entry.status, EntryStatus::OrphanedLfhHiddenCdh);
    // First CDH in scan order wins, the ambiguity lands in diagnostics.
    assert_eq!(entry.cdh_filename.as_deref(), Some("twice.txt"));
    assert_eq!(zip.diagnostics.len(), 1);
    assert!(zip.diagnostics[0].contains("multiple CDHs"));
}

#[test]
fn mutation_preserves_orphan_visibility() {
    // Rewriting through the orphan-aware handler materializes orphaned LFH
    // entries as ordinary ones.
    use archforge::types::{AddRequest, EntryAttributes, EntryPayload};
    use archforge::zip_handler::ZipHandler;

    let dir = tempdir().unwrap();
    let path = dir.path().join("orphans.zip");
    fs::write(&path, complex_orphaned_zip()).unwrap();

    let handler = ZipHandler::new(true);
    handler
        .add(
            &path,
            &AddRequest {
                entry_path: "added.txt".into(),
                payload: EntryPayload::Content(b"fresh".to_vec()),
                attrs: EntryAttributes::default(),
                verbose: 0,
            },
        )
        .unwrap();

    let zip = ExtZip::open(&path, true).unwrap();
    let names = zip.name_list();
    assert!(names.contains(&"orphaned_alone.txt".to_string()));
    assert!(names.contains(&"orphaned_with_cdh.txt".to_string()));
    assert!(names.contains(&"added.txt".to_string()));
    assert!(zip.extended_entries().iter().all(|e| e.status == EntryStatus::Paired));
}
