use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::tar_raw;
use crate::types::ArchiveType;

/// Detect the archive type for `path`. Existing files are classified by magic
/// bytes (with a tar header probe for magic-less tars); nonexistent files and
/// unrecognized content fall back to the extension.
pub fn detect_type(path: &Path) -> ArchiveType {
    if !path.exists() {
        return detect_from_extension(path);
    }

    let mut head = [0u8; 8];
    let read = File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .unwrap_or(0);
    let head = &head[..read];

    if head.starts_with(b"PK\x03\x04") {
        return ArchiveType::Zip;
    }
    if head.starts_with(b"\x1F\x8B") {
        return ArchiveType::TarGz;
    }
    if head.starts_with(b"\xFD7zXZ\x00") {
        return ArchiveType::TarXz;
    }
    if head.starts_with(b"BZh") {
        return ArchiveType::TarBz2;
    }
    if is_tar_file(path) {
        return ArchiveType::Tar;
    }

    detect_from_extension(path)
}

/// Probe the first blocks for a checksum-valid tar header (or an empty tar,
/// which is nothing but zero blocks).
fn is_tar_file(path: &Path) -> bool {
    let mut block = [0u8; tar_raw::BLOCK_SIZE];
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    match file.read(&mut block) {
        Ok(n) if n == tar_raw::BLOCK_SIZE => {}
        _ => return false,
    }
    if tar_raw::is_zero_block(&block) {
        // Could be an empty tar; require a second zero block.
        let mut second = [0u8; tar_raw::BLOCK_SIZE];
        return matches!(file.read(&mut second), Ok(n) if n == tar_raw::BLOCK_SIZE)
            && tar_raw::is_zero_block(&second);
    }
    tar_raw::parse_header(&block).map(|h| h.chksum_ok).unwrap_or(false)
}

pub fn detect_from_extension(path: &Path) -> ArchiveType {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        ArchiveType::TarGz
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        ArchiveType::TarXz
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        ArchiveType::TarBz2
    } else if name.ends_with(".tar") {
        ArchiveType::Tar
    } else {
        ArchiveType::Zip
    }
}
