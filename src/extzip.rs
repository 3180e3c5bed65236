use anyhow::{Context, bail};
use flate2::read::DeflateDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::codec::{escape_non_utf8, read_u16_le, read_u32_le};

pub const LFH_FIXED_SIZE: usize = 30;
pub const CDH_FIXED_SIZE: usize = 46;
pub const EOCD_FIXED_SIZE: usize = 22;

pub const LFH_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
pub const CDH_SIGNATURE: &[u8; 4] = b"PK\x01\x02";
pub const EOCD_SIGNATURE: &[u8; 4] = b"PK\x05\x06";

/// Flag bit 11: filename and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

pub const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;
pub const EXTRA_INFOZIP_UNIX: u16 = 0x7855;
pub const EXTRA_INFOZIP_UNIX3: u16 = 0x7875;
pub const EXTRA_UNICODE_PATH: u16 = 0x7075;
pub const EXTRA_NTFS: u16 = 0x000A;

// CP437 table: index -> Unicode char, used to decode filenames when the UTF-8
// flag is not set. Table taken from the CP437 specification.
const CP437_TABLE: [char; 256] = [
    '\u{0000}', '\u{0001}', '\u{0002}', '\u{0003}', '\u{0004}', '\u{0005}', '\u{0006}', '\u{0007}',
    '\u{0008}', '\u{0009}', '\u{000A}', '\u{000B}', '\u{000C}', '\u{000D}', '\u{000E}', '\u{000F}',
    '\u{0010}', '\u{0011}', '\u{0012}', '\u{0013}', '\u{0014}', '\u{0015}', '\u{0016}', '\u{0017}',
    '\u{0018}', '\u{0019}', '\u{001A}', '\u{001B}', '\u{001C}', '\u{001D}', '\u{001E}', '\u{001F}',
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', '0', '1', '2',
    '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', '@', 'A', 'B', 'C', 'D', 'E',
    'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '[', '\\', ']', '^', '_', '`', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k',
    'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '{', '|', '}', '~',
    '\u{007F}', '\u{00C7}', '\u{00FC}', '\u{00E9}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E5}',
    '\u{00E7}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00EF}', '\u{00EE}', '\u{00EC}', '\u{00C4}',
    '\u{00C5}', '\u{00C9}', '\u{00E6}', '\u{00C6}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00FB}',
    '\u{00F9}', '\u{00FF}', '\u{00D6}', '\u{00DC}', '\u{00A2}', '\u{00A3}', '\u{00A5}', '\u{20A7}',
    '\u{0192}', '\u{00E1}', '\u{00ED}', '\u{00F3}', '\u{00FA}', '\u{00F1}', '\u{00D1}', '\u{00AA}',
    '\u{00BA}', '\u{00BF}', '\u{2310}', '\u{00AC}', '\u{00BD}', '\u{00BC}', '\u{00A1}', '\u{00AB}',
    '\u{00BB}', '\u{2591}', '\u{2592}', '\u{2593}', '\u{2502}', '\u{2524}', '\u{2561}', '\u{2562}',
    '\u{2556}', '\u{2555}', '\u{2563}', '\u{2551}', '\u{2557}', '\u{255D}', '\u{255C}', '\u{255B}',
    '\u{2510}', '\u{2514}', '\u{2534}', '\u{252C}', '\u{251C}', '\u{2500}', '\u{253C}', '\u{255E}',
    '\u{255F}', '\u{255A}', '\u{2554}', '\u{2569}', '\u{2566}', '\u{2560}', '\u{2550}', '\u{256C}',
    '\u{2567}', '\u{2568}', '\u{2564}', '\u{2565}', '\u{2559}', '\u{2558}', '\u{2552}', '\u{2553}',
    '\u{256B}', '\u{256A}', '\u{2518}', '\u{250C}', '\u{2588}', '\u{2584}', '\u{258C}', '\u{2590}',
    '\u{2580}', '\u{03B1}', '\u{00DF}', '\u{0393}', '\u{03C0}', '\u{03A3}', '\u{03C3}', '\u{00B5}',
    '\u{03C4}', '\u{03A6}', '\u{0398}', '\u{03A9}', '\u{03B4}', '\u{221E}', '\u{03C6}', '\u{03B5}',
    '\u{2229}', '\u{2261}', '\u{00B1}', '\u{2265}', '\u{2264}', '\u{2320}', '\u{2321}', '\u{00F7}',
    '\u{2248}', '\u{00B0}', '\u{2219}', '\u{00B7}', '\u{221A}', '\u{207F}', '\u{00B2}', '\u{25A0}',
    '\u{00A0}',
];

fn decode_cp437(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| CP437_TABLE[b as usize]).collect()
}

/// Decode a stored filename: UTF-8 when flag bit 11 is set (undecodable bytes
/// escaped, never replaced), CP437 otherwise.
pub fn decode_name(bytes: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        escape_non_utf8(bytes)
    } else {
        decode_cp437(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Lfh,
    Cdh,
    Eocd,
    DataDescriptor,
    Zip64Eocd,
    Zip64EocdLocator,
}

#[derive(Debug, Clone, Copy)]
pub struct PkSignature {
    pub offset: usize,
    pub kind: SignatureKind,
}

/// The 26 bytes of LFH fixed fields after the signature, decoded verbatim.
#[derive(Debug, Clone, Copy)]
pub struct LfhFields {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

#[derive(Debug, Clone)]
pub struct ParsedLfh {
    pub offset: usize,
    pub fields: LfhFields,
    pub name_bytes: Vec<u8>,
    pub name: String,
    pub extra: Vec<u8>,
    /// Offset where the entry's file data begins.
    pub data_offset: usize,
}

/// The 42 bytes of CDH fixed fields after the signature, decoded verbatim.
#[derive(Debug, Clone, Copy)]
pub struct CdhFields {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
    pub comment_len: u16,
    pub disk_start: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub lfh_offset: u32,
}

#[derive(Debug, Clone)]
pub struct ParsedCdh {
    pub offset: usize,
    pub fields: CdhFields,
    pub name_bytes: Vec<u8>,
    pub name: String,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ParsedEocd {
    pub offset: usize,
    pub disk_number: u16,
    pub cd_disk: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Referenced by the main central directory.
    Paired,
    /// Local header with no central directory record anywhere.
    OrphanedLfh,
    /// Central directory record (possibly hidden in the EOCD comment) whose
    /// local header does not exist.
    OrphanedCdh,
    /// Local header outside the main central directory, but some stray CDH
    /// still points at it.
    OrphanedLfhHiddenCdh,
}

/// The joined per-entry view: whatever the local header, central directory
/// record and extra fields claim, side by side, plus the orphan status.
#[derive(Debug, Clone)]
pub struct ExtendedEntry {
    pub name: String,
    pub name_bytes: Vec<u8>,
    pub lfh_filename: Option<String>,
    pub cdh_filename: Option<String>,
    pub unicode_path: Option<String>,
    pub lfh_offset: Option<usize>,
    pub cdh_offset: Option<usize>,
    pub data_offset: Option<usize>,
    pub method: u16,
    pub flags: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub external_attr: u32,
    pub internal_attr: u16,
    /// Central directory extra field when present, local extra otherwise.
    pub extra: Vec<u8>,
    pub lfh_extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub status: EntryStatus,
}

impl ExtendedEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn unix_mode(&self) -> u32 {
        self.external_attr >> 16
    }

    pub fn is_symlink(&self) -> bool {
        self.unix_mode() & 0o170000 == 0o120000
    }

    pub fn is_orphaned(&self) -> bool {
        self.status != EntryStatus::Paired
    }
}

/// Walk an extra field as (header id, data) pairs, stopping at the first
/// truncated record.
pub fn extra_fields(extra: &[u8]) -> Vec<(u16, &[u8])> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let id = read_u16_le(extra, pos).expect("bounds checked");
        let size = read_u16_le(extra, pos + 2).expect("bounds checked") as usize;
        if pos + 4 + size > extra.len() {
            break;
        }
        out.push((id, &extra[pos + 4..pos + 4 + size]));
        pos += 4 + size;
    }
    out
}

/// Extract the Info-ZIP Unicode Path (0x7075) from an extra field:
/// version byte, 4-byte CRC of the main name, then the UTF-8 path.
pub fn unicode_path_from_extra(extra: &[u8]) -> Option<String> {
    for (id, data) in extra_fields(extra) {
        if id == EXTRA_UNICODE_PATH && data.len() >= 5 {
            return Some(escape_non_utf8(&data[5..]));
        }
    }
    None
}

/// Extract uid/gid from an Info-ZIP Unix type-3 field (0x7875).
pub fn uid_gid_from_extra(extra: &[u8]) -> Option<(u64, u64)> {
    for (id, data) in extra_fields(extra) {
        if id != EXTRA_INFOZIP_UNIX3 || data.len() < 2 || data[0] != 1 {
            continue;
        }
        let uid_size = data[1] as usize;
        if 2 + uid_size + 1 > data.len() {
            continue;
        }
        let gid_size = data[2 + uid_size] as usize;
        if 2 + uid_size + 1 + gid_size > data.len() {
            continue;
        }
        let le_int = |bytes: &[u8]| {
            bytes
                .iter()
                .take(8)
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        };
        return Some((
            le_int(&data[2..2 + uid_size]),
            le_int(&data[2 + uid_size + 1..2 + uid_size + 1 + gid_size]),
        ));
    }
    None
}

/// Modification time from an extended timestamp field (0x5455), when present.
pub fn mtime_from_extra(extra: &[u8]) -> Option<i64> {
    for (id, data) in extra_fields(extra) {
        if id == EXTRA_EXTENDED_TIMESTAMP && !data.is_empty() && data[0] & 1 != 0 && data.len() >= 5
        {
            return Some(i64::from(read_u32_le(data, 1)?));
        }
    }
    None
}

/// Locate the end-of-central-directory record by scanning backwards from the
/// end of the buffer, allowing for the maximum 65535-byte comment.
pub fn find_eocd_backwards(data: &[u8]) -> Option<usize> {
    if data.len() < EOCD_FIXED_SIZE {
        return None;
    }
    let start = data.len() - EOCD_FIXED_SIZE;
    let floor = start.saturating_sub(u16::MAX as usize);
    (floor..=start)
        .rev()
        .find(|&i| &data[i..i + 4] == EOCD_SIGNATURE)
}

fn parse_lfh(data: &[u8], offset: usize) -> Option<ParsedLfh> {
    if offset + LFH_FIXED_SIZE > data.len() || &data[offset..offset + 4] != LFH_SIGNATURE {
        return None;
    }

    let fields = LfhFields {
        version_needed: read_u16_le(data, offset + 4)?,
        flags: read_u16_le(data, offset + 6)?,
        method: read_u16_le(data, offset + 8)?,
        mod_time: read_u16_le(data, offset + 10)?,
        mod_date: read_u16_le(data, offset + 12)?,
        crc32: read_u32_le(data, offset + 14)?,
        compressed_size: read_u32_le(data, offset + 18)?,
        uncompressed_size: read_u32_le(data, offset + 22)?,
        name_len: read_u16_le(data, offset + 26)?,
        extra_len: read_u16_le(data, offset + 28)?,
    };

    let name_start = offset + LFH_FIXED_SIZE;
    let name_end = name_start + fields.name_len as usize;
    let extra_end = name_end + fields.extra_len as usize;
    if extra_end > data.len() {
        return None;
    }

    let name_bytes = data[name_start..name_end].to_vec();
    let name = decode_name(&name_bytes, fields.flags);

    Some(ParsedLfh {
        offset,
        fields,
        name,
        name_bytes,
        extra: data[name_end..extra_end].to_vec(),
        data_offset: extra_end,
    })
}

fn parse_cdh(data: &[u8], offset: usize) -> Option<ParsedCdh> {
    if offset + CDH_FIXED_SIZE > data.len() || &data[offset..offset + 4] != CDH_SIGNATURE {
        return None;
    }

    let fields = CdhFields {
        version_made_by: read_u16_le(data, offset + 4)?,
        version_needed: read_u16_le(data, offset + 6)?,
        flags: read_u16_le(data, offset + 8)?,
        method: read_u16_le(data, offset + 10)?,
        mod_time: read_u16_le(data, offset + 12)?,
        mod_date: read_u16_le(data, offset + 14)?,
        crc32: read_u32_le(data, offset + 16)?,
        compressed_size: read_u32_le(data, offset + 20)?,
        uncompressed_size: read_u32_le(data, offset + 24)?,
        name_len: read_u16_le(data, offset + 28)?,
        extra_len: read_u16_le(data, offset + 30)?,
        comment_len: read_u16_le(data, offset + 32)?,
        disk_start: read_u16_le(data, offset + 34)?,
        internal_attr: read_u16_le(data, offset + 36)?,
        external_attr: read_u32_le(data, offset + 38)?,
        lfh_offset: read_u32_le(data, offset + 42)?,
    };

    let name_start = offset + CDH_FIXED_SIZE;
    let name_end = name_start + fields.name_len as usize;
    let extra_end = name_end + fields.extra_len as usize;
    let comment_end = extra_end + fields.comment_len as usize;
    if comment_end > data.len() {
        return None;
    }

    let name_bytes = data[name_start..name_end].to_vec();
    let name = decode_name(&name_bytes, fields.flags);

    Some(ParsedCdh {
        offset,
        fields,
        name,
        name_bytes,
        extra: data[name_end..extra_end].to_vec(),
        comment: data[extra_end..comment_end].to_vec(),
    })
}

fn parse_eocd(data: &[u8], offset: usize) -> Option<ParsedEocd> {
    if offset + EOCD_FIXED_SIZE > data.len() || &data[offset..offset + 4] != EOCD_SIGNATURE {
        return None;
    }

    let comment_len = read_u16_le(data, offset + 20)? as usize;
    let comment_start = offset + EOCD_FIXED_SIZE;
    let comment = if comment_start + comment_len <= data.len() {
        data[comment_start..comment_start + comment_len].to_vec()
    } else {
        Vec::new()
    };

    Some(ParsedEocd {
        offset,
        disk_number: read_u16_le(data, offset + 4)?,
        cd_disk: read_u16_le(data, offset + 6)?,
        disk_entries: read_u16_le(data, offset + 8)?,
        total_entries: read_u16_le(data, offset + 10)?,
        cd_size: read_u32_le(data, offset + 12)?,
        cd_offset: read_u32_le(data, offset + 16)?,
        comment,
    })
}

/// Structural ZIP reader. One pass over the whole file collects every `PK`
/// signature; local headers, central directory records and EOCD records are
/// then parsed independently of each other and paired afterwards, so records
/// the central directory does not admit to are still visible. Malformed
/// candidates (false positives inside compressed data or comments) are
/// dropped silently; only an unreadable file is an error.
pub struct ExtZip {
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub include_orphans: bool,
    pub signatures: Vec<PkSignature>,
    pub lfhs: Vec<ParsedLfh>,
    pub cdhs: Vec<ParsedCdh>,
    pub eocds: Vec<ParsedEocd>,
    /// Index of the EOCD an extractor would use (backward scan from EOF).
    pub main_eocd: Option<usize>,
    entries: Vec<ExtendedEntry>,
    /// Structural ambiguities worth reporting, e.g. several CDHs claiming the
    /// same local header. Never fatal.
    pub diagnostics: Vec<String>,
}

impl ExtZip {
    pub fn open(path: &Path, include_orphans: bool) -> anyhow::Result<Self> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }
        let data = fs::read(path).with_context(|| format!("reading archive {:?}", path))?;
        let mut zip = Self::from_bytes(data, include_orphans)
            .with_context(|| format!("{:?} is not a valid ZIP file", path))?;
        zip.path = path.to_path_buf();
        Ok(zip)
    }

    pub fn from_bytes(data: Vec<u8>, include_orphans: bool) -> anyhow::Result<Self> {
        let Some(main_eocd_offset) = find_eocd_backwards(&data) else {
            bail!("no end of central directory record found");
        };

        let mut zip = ExtZip {
            path: PathBuf::new(),
            data,
            include_orphans,
            signatures: Vec::new(),
            lfhs: Vec::new(),
            cdhs: Vec::new(),
            eocds: Vec::new(),
            main_eocd: None,
            entries: Vec::new(),
            diagnostics: Vec::new(),
        };

        zip.sweep_signatures();
        zip.parse_signatures();
        zip.main_eocd = zip.eocds.iter().position(|e| e.offset == main_eocd_offset);
        zip.build_entries();
        Ok(zip)
    }

    /// Find every `PK` prefix in the buffer and classify it by the two bytes
    /// that follow. The scan advances past the two-byte prefix only, so
    /// signatures adversarially packed into comments still show up.
    fn sweep_signatures(&mut self) {
        let data = &self.data;
        let mut i = 0;
        while i + 2 <= data.len() {
            if &data[i..i + 2] != b"PK" {
                i += 1;
                continue;
            }
            if i + 4 <= data.len() {
                let kind = match (data[i + 2], data[i + 3]) {
                    (0x03, 0x04) => Some(SignatureKind::Lfh),
                    (0x01, 0x02) => Some(SignatureKind::Cdh),
                    (0x05, 0x06) => Some(SignatureKind::Eocd),
                    (0x07, 0x08) => Some(SignatureKind::DataDescriptor),
                    (0x06, 0x06) => Some(SignatureKind::Zip64Eocd),
                    (0x06, 0x07) => Some(SignatureKind::Zip64EocdLocator),
                    _ => None,
                };
                if let Some(kind) = kind {
                    self.signatures.push(PkSignature { offset: i, kind });
                }
            }
            i += 2;
        }
    }

    fn parse_signatures(&mut self) {
        for sig in self.signatures.clone() {
            match sig.kind {
                SignatureKind::Lfh => {
                    if let Some(parsed) = parse_lfh(&self.data, sig.offset) {
                        self.lfhs.push(parsed);
                    }
                }
                SignatureKind::Cdh => {
                    if let Some(parsed) = parse_cdh(&self.data, sig.offset) {
                        self.cdhs.push(parsed);
                    }
                }
                SignatureKind::Eocd => {
                    if let Some(parsed) = parse_eocd(&self.data, sig.offset) {
                        self.eocds.push(parsed);
                    }
                }
                _ => {}
            }
        }
    }

    /// Walk the main central directory in record order; indexes into
    /// `self.cdhs`.
    fn main_cd_indices(&self) -> Vec<usize> {
        let Some(eocd) = self.main_eocd.map(|i| &self.eocds[i]) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut pos = eocd.cd_offset as usize;
        while pos + 4 <= self.data.len()
            && pos < eocd.offset
            && &self.data[pos..pos + 4] == CDH_SIGNATURE
        {
            let Some(idx) = self.cdhs.iter().position(|c| c.offset == pos) else {
                break;
            };
            let f = &self.cdhs[idx].fields;
            out.push(idx);
            pos += CDH_FIXED_SIZE
                + f.name_len as usize
                + f.extra_len as usize
                + f.comment_len as usize;
        }
        out
    }

    fn entry_from_cdh(&self, cdh: &ParsedCdh, lfh: Option<&ParsedLfh>, status: EntryStatus) -> ExtendedEntry {
        let lfh_extra = lfh.map(|l| l.extra.clone()).unwrap_or_default();
        // The local header's extra field wins on conflict.
        let unicode_path = unicode_path_from_extra(&lfh_extra)
            .or_else(|| unicode_path_from_extra(&cdh.extra));

        ExtendedEntry {
            name: cdh.name.clone(),
            name_bytes: cdh.name_bytes.clone(),
            lfh_filename: lfh.map(|l| l.name.clone()),
            cdh_filename: Some(cdh.name.clone()),
            unicode_path,
            lfh_offset: lfh.map(|l| l.offset),
            cdh_offset: Some(cdh.offset),
            data_offset: lfh.map(|l| l.data_offset),
            method: cdh.fields.method,
            flags: cdh.fields.flags,
            mod_time: cdh.fields.mod_time,
            mod_date: cdh.fields.mod_date,
            crc32: cdh.fields.crc32,
            compressed_size: cdh.fields.compressed_size,
            uncompressed_size: cdh.fields.uncompressed_size,
            external_attr: cdh.fields.external_attr,
            internal_attr: cdh.fields.internal_attr,
            extra: cdh.extra.clone(),
            lfh_extra,
            comment: cdh.comment.clone(),
            status,
        }
    }

    fn entry_from_lfh(&self, lfh: &ParsedLfh) -> ExtendedEntry {
        ExtendedEntry {
            name: lfh.name.clone(),
            name_bytes: lfh.name_bytes.clone(),
            lfh_filename: Some(lfh.name.clone()),
            cdh_filename: None,
            unicode_path: unicode_path_from_extra(&lfh.extra),
            lfh_offset: Some(lfh.offset),
            cdh_offset: None,
            data_offset: Some(lfh.data_offset),
            method: lfh.fields.method,
            flags: lfh.fields.flags,
            mod_time: lfh.fields.mod_time,
            mod_date: lfh.fields.mod_date,
            crc32: lfh.fields.crc32,
            compressed_size: lfh.fields.compressed_size,
            uncompressed_size: lfh.fields.uncompressed_size,
            external_attr: 0,
            internal_attr: 0,
            extra: lfh.extra.clone(),
            lfh_extra: lfh.extra.clone(),
            comment: Vec::new(),
            status: EntryStatus::OrphanedLfh,
        }
    }

    fn build_entries(&mut self) {
        let main_cd = self.main_cd_indices();
        let mut referenced_lfh_offsets: Vec<usize> = Vec::new();
        let mut attached_cdhs: Vec<usize> = main_cd.clone();

        let mut entries = Vec::new();
        for &idx in &main_cd {
            let cdh = &self.cdhs[idx];
            let claimed = cdh.fields.lfh_offset as usize;
            referenced_lfh_offsets.push(claimed);
            let lfh = self.lfhs.iter().find(|l| l.offset == claimed);
            entries.push(self.entry_from_cdh(cdh, lfh, EntryStatus::Paired));
        }

        let mut diagnostics = Vec::new();
        if self.include_orphans {
            // Local headers the main central directory does not reference.
            for lfh in &self.lfhs {
                if referenced_lfh_offsets.contains(&lfh.offset) {
                    continue;
                }

                let mut matches = self
                    .cdhs
                    .iter()
                    .enumerate()
                    .filter(|(i, c)| {
                        !main_cd.contains(i) && c.fields.lfh_offset as usize == lfh.offset
                    })
                    .map(|(i, _)| i);

                if let Some(first) = matches.next() {
                    attached_cdhs.push(first);
                    for extra_match in matches {
                        attached_cdhs.push(extra_match);
                        diagnostics.push(format!(
                            "multiple CDHs reference the LFH at offset {}: kept the one at offset {}, ignored offset {}",
                            lfh.offset, self.cdhs[first].offset, self.cdhs[extra_match].offset
                        ));
                    }
                    // The entry stays anchored in its local header; the stray
                    // CDH contributes the metadata only a CDH can carry.
                    let cdh = &self.cdhs[first];
                    let mut entry = self.entry_from_lfh(lfh);
                    entry.status = EntryStatus::OrphanedLfhHiddenCdh;
                    entry.cdh_filename = Some(cdh.name.clone());
                    entry.cdh_offset = Some(cdh.offset);
                    entry.external_attr = cdh.fields.external_attr;
                    entry.comment = cdh.comment.clone();
                    if !cdh.extra.is_empty() {
                        entry.extra = cdh.extra.clone();
                    }
                    entry.unicode_path = unicode_path_from_extra(&entry.lfh_extra)
                        .or_else(|| unicode_path_from_extra(&entry.extra));
                    entries.push(entry);
                } else {
                    entries.push(self.entry_from_lfh(lfh));
                }
            }

            // Central directory records left over after pairing: hidden CDHs
            // whose local header is missing entirely.
            for (i, cdh) in self.cdhs.iter().enumerate() {
                if attached_cdhs.contains(&i) {
                    continue;
                }
                if referenced_lfh_offsets.contains(&(cdh.fields.lfh_offset as usize)) {
                    diagnostics.push(format!(
                        "stray CDH at offset {} duplicates the reference to the LFH at offset {}",
                        cdh.offset, cdh.fields.lfh_offset
                    ));
                }
                entries.push(self.entry_from_cdh(cdh, None, EntryStatus::OrphanedCdh));
            }
        }

        self.entries = entries;
        self.diagnostics.extend(diagnostics);
    }

    pub fn extended_entries(&self) -> &[ExtendedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_lfh(&self, offset: usize) -> Option<&ParsedLfh> {
        self.lfhs.iter().find(|l| l.offset == offset)
    }

    /// First CDH in scan order that claims the given local header offset.
    pub fn find_cdh_for(&self, lfh_offset: usize) -> Option<&ParsedCdh> {
        self.cdhs
            .iter()
            .find(|c| c.fields.lfh_offset as usize == lfh_offset)
    }

    /// Entry names in listing order (orphans included when orphan scanning is
    /// enabled).
    pub fn name_list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// First entry with the given name, searching standard entries before
    /// orphans.
    pub fn get_info(&self, name: &str) -> Option<&ExtendedEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Decompressed payload bytes for an entry.
    pub fn read_entry_bytes(&self, entry: &ExtendedEntry) -> anyhow::Result<Vec<u8>> {
        let Some(start) = entry.data_offset else {
            bail!("no local file data for {:?}", entry.name);
        };
        let end = start + entry.compressed_size as usize;
        if end > self.data.len() {
            bail!("file data for {:?} is truncated", entry.name);
        }
        let raw = &self.data[start..end];

        match entry.method {
            0 => Ok(raw.to_vec()),
            8 => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(raw)
                    .read_to_end(&mut out)
                    .with_context(|| format!("inflating {:?}", entry.name))?;
                Ok(out)
            }
            method => bail!("unsupported compression method {} for {:?}", method, entry.name),
        }
    }

    /// Name to show for an entry. When the Unicode Path agrees with both the
    /// LFH and CDH names it stands alone; any disagreement shows each
    /// non-empty name tagged with its source.
    pub fn get_display_name(&self, entry: &ExtendedEntry) -> String {
        let unicode = entry.unicode_path.as_deref();
        let cdh = entry.cdh_filename.as_deref();
        let lfh = entry.lfh_filename.as_deref();

        if let Some(u) = unicode {
            if cdh == Some(u) && lfh == Some(u) {
                return u.to_string();
            }
        } else if cdh == lfh {
            if let Some(c) = cdh {
                return c.to_string();
            }
        }

        let mut parts = Vec::new();
        if let Some(u) = unicode {
            parts.push(format!("{u} (U)"));
        }
        if let Some(c) = cdh {
            parts.push(format!("{c} (C)"));
        }
        if let Some(l) = lfh {
            parts.push(format!("{l} (L)"));
        }
        if parts.is_empty() {
            entry.name.clone()
        } else {
            parts.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp437_decodes_high_bytes() {
        assert_eq!(decode_cp437(b"sn\x94"), "snö");
        assert_eq!(decode_name(b"plain.txt", 0), "plain.txt");
        assert_eq!(decode_name("snö.txt".as_bytes(), FLAG_UTF8), "snö.txt");
    }

    #[test]
    fn extra_field_walk_stops_at_truncation() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x5455u16.to_le_bytes());
        extra.extend_from_slice(&2u16.to_le_bytes());
        extra.extend_from_slice(&[1, 2]);
        extra.extend_from_slice(&0x7875u16.to_le_bytes());
        extra.extend_from_slice(&99u16.to_le_bytes()); // claims more than present
        extra.push(0);

        let fields = extra_fields(&extra);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, 0x5455);
    }

    #[test]
    fn unicode_path_parses() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&EXTRA_UNICODE_PATH.to_le_bytes());
        let payload_len = 1 + 4 + 7;
        extra.extend_from_slice(&(payload_len as u16).to_le_bytes());
        extra.push(1);
        extra.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        extra.extend_from_slice(b"../evil");

        assert_eq!(unicode_path_from_extra(&extra).as_deref(), Some("../evil"));
    }

    #[test]
    fn uid_gid_variable_width() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&EXTRA_INFOZIP_UNIX3.to_le_bytes());
        extra.extend_from_slice(&6u16.to_le_bytes());
        extra.push(1); // version
        extra.push(2); // uid size
        extra.extend_from_slice(&1000u16.to_le_bytes());
        extra.push(1); // gid size
        extra.push(0);

        assert_eq!(uid_gid_from_extra(&extra), Some((1000, 0)));
    }

    #[test]
    fn eocd_backward_scan_respects_comment_window() {
        let mut data = vec![0u8; 10];
        data.extend_from_slice(EOCD_SIGNATURE);
        data.extend_from_slice(&[0u8; 18]);
        let expected = 10;
        assert_eq!(find_eocd_backwards(&data), Some(expected));

        // A comment after the record must not hide it.
        data.extend_from_slice(b"trailing comment bytes");
        assert_eq!(find_eocd_backwards(&data), Some(expected));
    }
}
