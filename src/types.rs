use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    #[value(name = "tar.gz")]
    TarGz,
    #[value(name = "tar.xz")]
    TarXz,
    #[value(name = "tar.bz2")]
    TarBz2,
}

impl ArchiveType {
    pub fn is_zip(self) -> bool {
        matches!(self, ArchiveType::Zip)
    }

    pub fn compression(self) -> TarCompression {
        match self {
            ArchiveType::Zip | ArchiveType::Tar => TarCompression::None,
            ArchiveType::TarGz => TarCompression::Gzip,
            ArchiveType::TarXz => TarCompression::Xz,
            ArchiveType::TarBz2 => TarCompression::Bzip2,
        }
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Tar => "tar",
            ArchiveType::TarGz => "tar.gz",
            ArchiveType::TarXz => "tar.xz",
            ArchiveType::TarBz2 => "tar.bz2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Xz,
    Bzip2,
}

/// Attributes a caller may pin on an entry. `None` means "use the default for
/// the entry kind" (add) or "keep what the header had" (modify, where noted).
#[derive(Debug, Clone, Default)]
pub struct EntryAttributes {
    pub mode: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub mtime: Option<i64>,
    pub setuid: bool,
    pub setgid: bool,
    pub sticky: bool,
    pub unicode_path: Option<String>,
}

impl EntryAttributes {
    pub fn has_special_bits(&self) -> bool {
        self.setuid || self.setgid || self.sticky
    }
}

/// What goes into an added or replaced entry.
#[derive(Debug, Clone)]
pub enum EntryPayload {
    /// Regular file (or directory entry when the path ends with '/').
    Content(Vec<u8>),
    /// Symbolic link to the given target.
    Symlink(String),
    /// Hard link to the given target.
    Hardlink(String),
}

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub entry_path: String,
    pub payload: EntryPayload,
    pub attrs: EntryAttributes,
    pub verbose: u8,
}

#[derive(Debug, Clone)]
pub struct ModifyRequest {
    pub entry_path: String,
    pub symlink: Option<String>,
    pub hardlink: Option<String>,
    pub attrs: EntryAttributes,
    pub verbose: u8,
}

#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub entry_path: String,
    pub recursive: bool,
    pub verbose: u8,
}

#[derive(Debug, Clone)]
pub struct ListRequest {
    /// 0 = names only, 1 = attribute columns, 2 = full header dump.
    pub long: u8,
    pub verbose: u8,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub entry_path: String,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub entry_path: Option<String>,
    pub output_dir: PathBuf,
    pub vulnerable: bool,
    pub normalize_permissions: bool,
    pub verbose: u8,
}
