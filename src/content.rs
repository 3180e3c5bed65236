use anyhow::{Context, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Resolve `--content` / `--content-file` into payload bytes. Supplying both
/// is always an error; supplying neither is an error only when the operation
/// requires content.
pub fn content_bytes(
    content: &Option<String>,
    content_file: &Option<PathBuf>,
    required: bool,
) -> anyhow::Result<Vec<u8>> {
    match (content, content_file) {
        (Some(_), Some(_)) => bail!("Either --content or --content-file must be specified, not both"),
        (Some(text), None) => Ok(text.as_bytes().to_vec()),
        (None, Some(path)) => {
            if !path.exists() {
                bail!("Content file {:?} does not exist", path);
            }
            fs::read(path).with_context(|| format!("reading content file {:?}", path))
        }
        (None, None) => {
            if required {
                bail!("Either --content or --content-file must be specified");
            }
            Ok(Vec::new())
        }
    }
}

#[derive(Debug, Clone)]
pub enum IngestKind {
    Dir,
    File(Vec<u8>),
    Symlink(String),
}

/// One filesystem object picked up by `--content-directory`.
#[derive(Debug, Clone)]
pub struct IngestedEntry {
    /// Archive-side path; directories carry a trailing '/'.
    pub entry_path: String,
    pub kind: IngestKind,
    pub mode: u32,
    pub mtime: i64,
}

#[cfg(unix)]
fn entry_mode(meta: &fs::Metadata, _is_dir: bool) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o7777
}

#[cfg(not(unix))]
fn entry_mode(_meta: &fs::Metadata, is_dir: bool) -> u32 {
    if is_dir { 0o755 } else { 0o644 }
}

fn entry_mtime(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Walk `dir` and produce archive entries rooted at `base` (the requested
/// in-archive path). The base directory itself becomes an entry so empty
/// directories survive the trip.
pub fn collect_directory(dir: &Path, base: &str) -> anyhow::Result<Vec<IngestedEntry>> {
    if !dir.is_dir() {
        bail!("Content directory {:?} does not exist", dir);
    }

    let base = base.trim_end_matches('/');
    let mut out = Vec::new();

    for walked in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let walked = walked.with_context(|| format!("walking content directory {:?}", dir))?;
        let rel = walked
            .path()
            .strip_prefix(dir)
            .expect("walkdir yields children of its root");

        let mut entry_path = String::from(base);
        for part in rel.components() {
            if !entry_path.is_empty() {
                entry_path.push('/');
            }
            entry_path.push_str(&part.as_os_str().to_string_lossy());
        }
        if entry_path.is_empty() {
            // base was empty and this is the root directory itself
            continue;
        }

        let meta = walked
            .path()
            .symlink_metadata()
            .with_context(|| format!("reading metadata for {:?}", walked.path()))?;

        let kind = if walked.file_type().is_symlink() {
            let target = fs::read_link(walked.path())
                .with_context(|| format!("reading link target of {:?}", walked.path()))?;
            IngestKind::Symlink(target.to_string_lossy().into_owned())
        } else if walked.file_type().is_dir() {
            entry_path.push('/');
            IngestKind::Dir
        } else {
            IngestKind::File(
                fs::read(walked.path())
                    .with_context(|| format!("reading {:?}", walked.path()))?,
            )
        };

        out.push(IngestedEntry {
            entry_path,
            mode: entry_mode(&meta, walked.file_type().is_dir()),
            mtime: entry_mtime(&meta),
            kind,
        });
    }

    Ok(out)
}
