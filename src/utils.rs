use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Confine an archive entry name to `output_dir`: absolute prefixes and every
/// `..`/`.` component are dropped, so `../../etc/passwd` lands at
/// `output_dir/etc/passwd`.
pub fn sanitize_path(entry_name: &str, output_dir: &Path) -> PathBuf {
    let mut out = output_dir.to_path_buf();
    for part in entry_name.split(['/', '\\']) {
        if part.is_empty() || part == "." || part == ".." || part.ends_with(':') {
            continue;
        }
        out.push(part);
    }
    out
}

/// Does `name` fall to a remove of `target`? Exact match tolerates the
/// trailing slash of directory entries; recursive mode takes the whole
/// subtree, and an empty recursive target takes everything.
pub fn remove_matches(name: &str, target: &str, recursive: bool) -> bool {
    let trimmed = target.trim_end_matches('/');
    if name == target || name == format!("{trimmed}/") {
        return true;
    }
    recursive && (target.is_empty() || name.starts_with(&format!("{trimmed}/")))
}

pub fn create_parent_dirs(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating parent directories for {:?}", path))?;
        }
    }
    Ok(())
}

pub fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Atomically replace `path` with `bytes`: write a sibling `.tmp` file and
/// rename over the original. A failure before the rename unlinks the temp
/// file and leaves the original untouched.
pub fn replace_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = tmp_path(path);
    let write_result = fs::write(&tmp, bytes)
        .with_context(|| format!("writing temporary archive {:?}", tmp))
        .and_then(|_| {
            fs::rename(&tmp, path).with_context(|| format!("renaming {:?} over {:?}", tmp, path))
        });
    if write_result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    write_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal_and_roots() {
        let out = Path::new("outdir");
        assert_eq!(
            sanitize_path("../../etc/passwd", out),
            Path::new("outdir/etc/passwd")
        );
        assert_eq!(
            sanitize_path("/etc/passwd", out),
            Path::new("outdir/etc/passwd")
        );
        assert_eq!(sanitize_path("a/./b/../c", out), Path::new("outdir/a/b/c"));
        assert_eq!(
            sanitize_path("C:\\windows\\system32", out),
            Path::new("outdir/windows/system32")
        );
    }

    #[test]
    fn remove_match_rules() {
        assert!(remove_matches("a", "a", false));
        assert!(remove_matches("a/", "a", false));
        assert!(!remove_matches("a/b", "a", false));
        assert!(remove_matches("a/b", "a", true));
        assert!(remove_matches("a/c/d", "a", true));
        assert!(!remove_matches("ab", "a", true));
        assert!(remove_matches("anything", "", true));
        assert!(!remove_matches("anything", "", false));
    }

    #[test]
    fn replace_file_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.zip");
        fs::write(&target, b"old").unwrap();
        replace_file(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!tmp_path(&target).exists());
    }
}
