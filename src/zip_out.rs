use anyhow::bail;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use crate::codec::crc32_ieee;
use crate::extzip::{
    EXTRA_EXTENDED_TIMESTAMP, EXTRA_INFOZIP_UNIX3, EXTRA_UNICODE_PATH, FLAG_UTF8, extra_fields,
};

/// Unix host (3) in the high byte, PKZIP 2.0 in the low byte.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 20;
pub const VERSION_NEEDED: u16 = 20;

const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const DOS_DIRECTORY: u32 = 0x10;

/// One entry to be written. The writer emits exactly what is here; nothing is
/// sanity-checked against anything else, which is the point.
#[derive(Debug, Clone)]
pub struct ZipEntryOut {
    /// Raw filename bytes as stored in both headers.
    pub name: Vec<u8>,
    /// Uncompressed payload (symlink entries carry their target text here).
    pub payload: Vec<u8>,
    /// 0 = stored, 8 = deflate. Anything else refuses to build.
    pub method: u16,
    pub external_attr: u32,
    /// Extra field bytes, written to both the LFH and the CDH.
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub mod_time: u16,
    pub mod_date: u16,
    pub internal_attr: u16,
}

impl ZipEntryOut {
    pub fn new(name: &str) -> Self {
        ZipEntryOut {
            name: name.as_bytes().to_vec(),
            payload: Vec::new(),
            method: 0,
            external_attr: 0,
            extra: Vec::new(),
            comment: Vec::new(),
            // DOS epoch, 1980-01-01 00:00:00
            mod_date: 0x0021,
            mod_time: 0,
            internal_attr: 0,
        }
    }

    fn flags(&self) -> u16 {
        if self.name.iter().any(|&b| b > 0x7f) {
            FLAG_UTF8
        } else {
            0
        }
    }
}

fn deflate(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Serialize entries into a complete ZIP image: local headers with their data
/// first, then the central directory, then the EOCD. Every CDH's stored
/// local-header offset and the EOCD's central directory offset/size/count are
/// derived from what was actually laid down.
pub fn build_archive(entries: &[ZipEntryOut]) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut lfh_offsets = Vec::with_capacity(entries.len());
    let mut compressed_payloads = Vec::with_capacity(entries.len());
    let mut crcs = Vec::with_capacity(entries.len());

    for entry in entries {
        let crc = crc32_ieee(&entry.payload);
        let compressed = match entry.method {
            0 => entry.payload.clone(),
            8 => deflate(&entry.payload)?,
            method => bail!("cannot write compression method {method}"),
        };

        lfh_offsets.push(out.len() as u32);

        // local file header
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&entry.flags().to_le_bytes());
        out.extend_from_slice(&entry.method.to_le_bytes());
        out.extend_from_slice(&entry.mod_time.to_le_bytes());
        out.extend_from_slice(&entry.mod_date.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&entry.name);
        out.extend_from_slice(&entry.extra);
        out.extend_from_slice(&compressed);

        compressed_payloads.push(compressed);
        crcs.push(crc);
    }

    let cd_offset = out.len() as u32;
    for (i, entry) in entries.iter().enumerate() {
        // central directory header
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&entry.flags().to_le_bytes());
        out.extend_from_slice(&entry.method.to_le_bytes());
        out.extend_from_slice(&entry.mod_time.to_le_bytes());
        out.extend_from_slice(&entry.mod_date.to_le_bytes());
        out.extend_from_slice(&crcs[i].to_le_bytes());
        out.extend_from_slice(&(compressed_payloads[i].len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        out.extend_from_slice(&entry.internal_attr.to_le_bytes());
        out.extend_from_slice(&entry.external_attr.to_le_bytes());
        out.extend_from_slice(&lfh_offsets[i].to_le_bytes());
        out.extend_from_slice(&entry.name);
        out.extend_from_slice(&entry.extra);
        out.extend_from_slice(&entry.comment);
    }
    let cd_size = out.len() as u32 - cd_offset;

    // end of central directory
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment length

    Ok(out)
}

/// A ZIP with no entries: a lone EOCD record.
pub fn empty_archive() -> Vec<u8> {
    build_archive(&[]).expect("empty archive always builds")
}

/// How to pick the Unix file-type nibble when encoding `external_attr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermSpec {
    pub mode: Option<u32>,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Copy the type nibble from `original_attr` instead of deriving it.
    pub preserve_type: bool,
    pub original_attr: Option<u32>,
}

/// Encode the 32-bit external attributes: full Unix mode in the high 16 bits,
/// DOS attributes in the low byte.
pub fn external_attr(spec: &PermSpec) -> u32 {
    let mode = spec.mode.unwrap_or(if spec.is_dir {
        0o775
    } else if spec.is_symlink {
        0o755
    } else {
        0o644
    });

    let type_bits = if spec.preserve_type && spec.original_attr.is_some() {
        (spec.original_attr.unwrap() >> 16) & 0o170000
    } else if spec.is_symlink {
        S_IFLNK
    } else if spec.is_dir {
        S_IFDIR
    } else {
        S_IFREG
    };

    let full_mode = (mode & 0o7777) | type_bits;
    let dos_attr = if spec.is_dir { DOS_DIRECTORY } else { 0 };

    (full_mode << 16) | dos_attr
}

/// Copy every well-formed extra-field record except those with `id`.
fn strip_extra_field(extra: &[u8], id: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    for (field_id, data) in extra_fields(extra) {
        if field_id == id {
            continue;
        }
        out.extend_from_slice(&field_id.to_le_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

fn minimal_le_bytes(value: u64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 && bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

/// Append an Info-ZIP Unix type-3 field (0x7875) carrying uid/gid with
/// minimal-width little-endian encoding, replacing any existing one.
pub fn set_uid_gid_extra(extra: &mut Vec<u8>, uid: u64, gid: u64) {
    let mut out = strip_extra_field(extra, EXTRA_INFOZIP_UNIX3);

    let uid_bytes = minimal_le_bytes(uid);
    let gid_bytes = minimal_le_bytes(gid);

    let mut field = Vec::with_capacity(3 + uid_bytes.len() + gid_bytes.len());
    field.push(1); // version
    field.push(uid_bytes.len() as u8);
    field.extend_from_slice(&uid_bytes);
    field.push(gid_bytes.len() as u8);
    field.extend_from_slice(&gid_bytes);

    out.extend_from_slice(&EXTRA_INFOZIP_UNIX3.to_le_bytes());
    out.extend_from_slice(&(field.len() as u16).to_le_bytes());
    out.extend_from_slice(&field);

    *extra = out;
}

/// Append an extended timestamp field (0x5455) carrying the modification
/// time, replacing any existing one.
pub fn set_extended_timestamp_extra(extra: &mut Vec<u8>, mtime: i64) {
    let mut out = strip_extra_field(extra, EXTRA_EXTENDED_TIMESTAMP);

    out.extend_from_slice(&EXTRA_EXTENDED_TIMESTAMP.to_le_bytes());
    out.extend_from_slice(&5u16.to_le_bytes());
    out.push(1); // mod time present
    out.extend_from_slice(&(mtime as u32).to_le_bytes());

    *extra = out;
}

/// Append an Info-ZIP Unicode Path field (0x7075), replacing any existing
/// one. The embedded CRC-32 is computed over the *main* filename, not the
/// override, so consumers that verify it will notice the disagreement.
pub fn set_unicode_path_extra(extra: &mut Vec<u8>, main_name: &[u8], override_path: &[u8]) {
    let mut out = strip_extra_field(extra, EXTRA_UNICODE_PATH);

    let mut field = Vec::with_capacity(5 + override_path.len());
    field.push(1); // version
    field.extend_from_slice(&crc32_ieee(main_name).to_le_bytes());
    field.extend_from_slice(override_path);

    out.extend_from_slice(&EXTRA_UNICODE_PATH.to_le_bytes());
    out.extend_from_slice(&(field.len() as u16).to_le_bytes());
    out.extend_from_slice(&field);

    *extra = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_u32_le;
    use crate::extzip::{EntryStatus, ExtZip, uid_gid_from_extra, unicode_path_from_extra};

    fn entry(name: &str, payload: &[u8]) -> ZipEntryOut {
        let mut e = ZipEntryOut::new(name);
        e.payload = payload.to_vec();
        e.external_attr = external_attr(&PermSpec {
            mode: None,
            ..PermSpec::default()
        });
        e
    }

    #[test]
    fn offsets_agree_with_layout() {
        let bytes =
            build_archive(&[entry("a.txt", b"first"), entry("b.txt", b"second")]).unwrap();
        let zip = ExtZip::from_bytes(bytes, true).unwrap();

        assert_eq!(zip.extended_entries().len(), 2);
        for e in zip.extended_entries() {
            assert_eq!(e.status, EntryStatus::Paired);
            let cdh = zip.find_cdh_for(e.lfh_offset.unwrap()).unwrap();
            assert_eq!(cdh.fields.lfh_offset as usize, e.lfh_offset.unwrap());
        }

        let eocd = &zip.eocds[zip.main_eocd.unwrap()];
        assert_eq!(eocd.cd_offset as usize, zip.cdhs[0].offset);
        assert_eq!(eocd.total_entries, 2);
        let cd_bytes: usize = zip
            .cdhs
            .iter()
            .map(|c| {
                crate::extzip::CDH_FIXED_SIZE
                    + c.fields.name_len as usize
                    + c.fields.extra_len as usize
                    + c.fields.comment_len as usize
            })
            .sum();
        assert_eq!(eocd.cd_size as usize, cd_bytes);
    }

    #[test]
    fn lfh_and_cdh_fields_match() {
        let bytes = build_archive(&[entry("same.txt", b"payload")]).unwrap();
        let zip = ExtZip::from_bytes(bytes, false).unwrap();
        let e = &zip.extended_entries()[0];
        let lfh = zip.find_lfh(e.lfh_offset.unwrap()).unwrap();
        let cdh = zip.find_cdh_for(e.lfh_offset.unwrap()).unwrap();

        assert_eq!(lfh.fields.crc32, cdh.fields.crc32);
        assert_eq!(lfh.fields.compressed_size, cdh.fields.compressed_size);
        assert_eq!(lfh.fields.uncompressed_size, cdh.fields.uncompressed_size);
        assert_eq!(lfh.name_bytes, cdh.name_bytes);
    }

    #[test]
    fn non_ascii_name_sets_utf8_flag() {
        let bytes = build_archive(&[entry("snö.txt", b"x")]).unwrap();
        let zip = ExtZip::from_bytes(bytes, false).unwrap();
        let e = &zip.extended_entries()[0];
        assert_ne!(e.flags & FLAG_UTF8, 0);
        assert_eq!(e.name, "snö.txt");
    }

    #[test]
    fn deflate_entries_round_trip() {
        let mut e = entry("z.txt", &b"abc".repeat(100));
        e.method = 8;
        let bytes = build_archive(&[e]).unwrap();
        let zip = ExtZip::from_bytes(bytes, false).unwrap();
        let parsed = &zip.extended_entries()[0];
        assert_eq!(parsed.method, 8);
        assert!( (parsed.compressed_size as usize) < 300);
        assert_eq!(zip.read_entry_bytes(parsed).unwrap(), b"abc".repeat(100));
    }

    #[test]
    fn external_attr_defaults_and_types() {
        assert_eq!(
            external_attr(&PermSpec { is_dir: true, ..Default::default() }),
            (0o040775 << 16) | 0x10
        );
        assert_eq!(
            external_attr(&PermSpec { is_symlink: true, ..Default::default() }),
            0o120755 << 16
        );
        assert_eq!(external_attr(&PermSpec::default()), 0o100644 << 16);
        // preserve_type copies the nibble from the original attributes
        assert_eq!(
            external_attr(&PermSpec {
                mode: Some(0o600),
                preserve_type: true,
                original_attr: Some(0o120777 << 16),
                ..Default::default()
            }),
            0o120600 << 16
        );
    }

    #[test]
    fn uid_gid_extra_replaces_prior_field() {
        let mut extra = Vec::new();
        set_uid_gid_extra(&mut extra, 1000, 50);
        set_uid_gid_extra(&mut extra, 0, 0);
        assert_eq!(uid_gid_from_extra(&extra), Some((0, 0)));
        // exactly one field left
        assert_eq!(extra_fields(&extra).len(), 1);
    }

    #[test]
    fn extended_timestamp_records_mtime() {
        use crate::extzip::mtime_from_extra;

        let mut extra = Vec::new();
        set_extended_timestamp_extra(&mut extra, 1_234_567_890);
        assert_eq!(mtime_from_extra(&extra), Some(1_234_567_890));

        set_extended_timestamp_extra(&mut extra, 0);
        assert_eq!(mtime_from_extra(&extra), Some(0));
        assert_eq!(extra_fields(&extra).len(), 1);
    }

    #[test]
    fn unicode_path_crc_covers_main_name() {
        let mut extra = Vec::new();
        set_unicode_path_extra(&mut extra, b"file.txt", b"../../evil");
        assert_eq!(unicode_path_from_extra(&extra).as_deref(), Some("../../evil"));

        let (_, data) = extra_fields(&extra)[0];
        let stored_crc = read_u32_le(data, 1).unwrap();
        assert_eq!(stored_crc, crc32_ieee(b"file.txt"));
        assert_ne!(stored_crc, crc32_ieee(b"../../evil"));
    }
}
