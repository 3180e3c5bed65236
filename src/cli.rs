use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::ArchiveType;

fn octal_mode(s: &str) -> Result<u32, String> {
    let trimmed = s.trim_start_matches("0o").trim_start_matches("0O");
    u32::from_str_radix(trimmed, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

#[derive(Parser, Debug)]
#[command(
    name = "archforge",
    version,
    about = "Construct and inspect ZIP/TAR archives for security testing",
    long_about = "Creates archives with attack patterns (path traversal, links, setuid bits, \
orphaned records, polyglots, Unicode-path overrides) that mainstream archive libraries refuse \
to produce, and inspects such archives without correcting them."
)]
pub struct Cli {
    /// Archive file to create or modify
    pub file: PathBuf,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Archive type (default: auto-detect from magic bytes, then extension)
    #[arg(short = 't', long = "type", value_enum)]
    pub archive_type: Option<ArchiveType>,

    /// Find orphaned entries in ZIP files (deep scan for corrupt/malicious archives)
    #[arg(short = 'f', long = "find-orphaned", alias = "fo")]
    pub find_orphaned: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ContentArgs {
    /// Content to use for the file
    #[arg(long = "content")]
    pub content: Option<String>,

    /// Path to a local file whose content should be used
    #[arg(long = "content-file")]
    pub content_file: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct AttrArgs {
    /// File mode (octal)
    #[arg(long = "mode", value_parser = octal_mode)]
    pub mode: Option<u32>,

    /// User ID
    #[arg(long = "uid")]
    pub uid: Option<u64>,

    /// Group ID
    #[arg(long = "gid")]
    pub gid: Option<u64>,

    /// Modification time (seconds since epoch)
    #[arg(long = "mtime")]
    pub mtime: Option<i64>,

    /// Set the setuid bit
    #[arg(long = "setuid")]
    pub setuid: bool,

    /// Set the setgid bit
    #[arg(long = "setgid")]
    pub setgid: bool,

    /// Set the sticky bit
    #[arg(long = "sticky")]
    pub sticky: bool,

    /// Set the ZIP Unicode Path extra field (zip only)
    #[arg(long = "unicodepath")]
    pub unicodepath: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add files to the archive
    Add {
        /// Path within the archive
        path: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Path to a local directory to add recursively
        #[arg(long = "content-directory")]
        content_directory: Option<PathBuf>,

        /// Create a symlink to this target
        #[arg(long = "symlink")]
        symlink: Option<String>,

        /// Create a hardlink to this target
        #[arg(long = "hardlink")]
        hardlink: Option<String>,

        #[command(flatten)]
        attrs: AttrArgs,
    },

    /// Replace files in the archive
    Replace {
        /// Path within the archive
        path: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Path to a local directory to add recursively
        #[arg(long = "content-directory")]
        content_directory: Option<PathBuf>,

        /// Create a symlink to this target
        #[arg(long = "symlink")]
        symlink: Option<String>,

        /// Create a hardlink to this target
        #[arg(long = "hardlink")]
        hardlink: Option<String>,

        #[command(flatten)]
        attrs: AttrArgs,
    },

    /// Append content to a file in the archive
    Append {
        /// Path within the archive
        path: String,

        #[command(flatten)]
        content: ContentArgs,
    },

    /// Modify file attributes
    Modify {
        /// Path within the archive
        path: String,

        /// Convert file to a symlink pointing to this target
        #[arg(long = "symlink")]
        symlink: Option<String>,

        /// Convert file to a hardlink pointing to this target
        #[arg(long = "hardlink")]
        hardlink: Option<String>,

        #[command(flatten)]
        attrs: AttrArgs,
    },

    /// Remove files from the archive
    #[command(alias = "rm")]
    Remove {
        /// Path within the archive to remove
        path: String,

        /// Remove entries recursively (default 1/true)
        #[arg(short = 'r', long = "recursive", default_value_t = 1)]
        recursive: u8,
    },

    /// List contents of the archive
    #[command(alias = "ls")]
    List {
        /// Detail level: 0 names only, 1 attribute columns, 2 full headers
        #[arg(short = 'l', long = "long", default_value_t = 1)]
        long: u8,

        /// Show very detailed listing with all header information
        #[arg(long = "longlong")]
        longlong: bool,
    },

    /// Read the contents of an entry to stdout
    #[command(alias = "cat")]
    Read {
        /// Path within the archive
        path: String,

        /// Index to read when several entries share the same name
        #[arg(short = 'i', long = "index", default_value_t = 0)]
        index: usize,
    },

    /// Extract files from the archive
    Extract {
        /// Path within the archive to extract (default: extract all)
        #[arg(long = "path")]
        path: Option<String>,

        /// Directory to extract files to
        #[arg(short = 'o', long = "output-dir", default_value = ".")]
        output_dir: PathBuf,

        /// Allow potentially unsafe extractions (absolute paths, traversal, real links)
        #[arg(long = "vulnerable")]
        vulnerable: bool,

        /// Do not preserve permissions from the archive
        #[arg(long = "normalize-permissions")]
        normalize_permissions: bool,
    },

    /// Prepend content to a ZIP and patch every stored offset
    Polyglot {
        #[command(flatten)]
        content: ContentArgs,
    },
}
