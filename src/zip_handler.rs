use anyhow::{Context, anyhow, bail};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::codec::{
    apply_special_bits, dos_datetime_decode, format_dos_datetime, format_mode, read_u16_le,
    read_u32_le, unix_mtime_to_dos,
};
use crate::content::{IngestKind, IngestedEntry};
use crate::extzip::{
    CDH_FIXED_SIZE, CDH_SIGNATURE, EntryStatus, ExtZip, ExtendedEntry, ParsedCdh, ParsedLfh,
    extra_fields, find_eocd_backwards, mtime_from_extra, uid_gid_from_extra,
    unicode_path_from_extra,
};
use crate::types::{
    AddRequest, EntryPayload, ExtractRequest, ListRequest, ModifyRequest, ReadRequest,
    RemoveRequest,
};
use crate::utils::{create_parent_dirs, remove_matches, replace_file, sanitize_path};
use crate::zip_out::{
    PermSpec, ZipEntryOut, build_archive, empty_archive, external_attr,
    set_extended_timestamp_extra, set_uid_gid_extra, set_unicode_path_extra,
};

/// Whole-file-rewrite mutations and inspection for ZIP archives. When
/// `include_orphans` is set, every operation sees (and listing shows) entries
/// the main central directory does not admit to.
pub struct ZipHandler {
    pub include_orphans: bool,
}

impl ZipHandler {
    pub fn new(include_orphans: bool) -> Self {
        ZipHandler { include_orphans }
    }

    fn open(&self, path: &Path) -> anyhow::Result<ExtZip> {
        ExtZip::open(path, self.include_orphans)
    }

    /// Materialize an existing entry so a rewrite can lay it down again.
    /// Hidden CDH records without any local data cannot be carried; they only
    /// exist as central directory bytes, which a rewrite does not reproduce.
    fn carry_entry(zip: &ExtZip, entry: &ExtendedEntry) -> anyhow::Result<Option<ZipEntryOut>> {
        if entry.status == EntryStatus::OrphanedCdh {
            return Ok(None);
        }
        let payload = zip
            .read_entry_bytes(entry)
            .with_context(|| format!("carrying entry {:?}", entry.name))?;

        let mut out = ZipEntryOut::new(&entry.name);
        out.name = entry.name_bytes.clone();
        out.payload = payload;
        out.method = entry.method;
        out.external_attr = entry.external_attr;
        out.internal_attr = entry.internal_attr;
        out.extra = entry.extra.clone();
        out.comment = entry.comment.clone();
        out.mod_time = entry.mod_time;
        out.mod_date = entry.mod_date;
        Ok(Some(out))
    }

    fn carry_all(zip: &ExtZip) -> anyhow::Result<Vec<ZipEntryOut>> {
        let mut out = Vec::new();
        for entry in zip.extended_entries() {
            if let Some(carried) = Self::carry_entry(zip, entry)? {
                out.push(carried);
            }
        }
        Ok(out)
    }

    fn entry_from_add(req: &AddRequest) -> ZipEntryOut {
        let mut out = ZipEntryOut::new(&req.entry_path);
        let is_dir = req.entry_path.ends_with('/');

        let (is_symlink, payload) = match &req.payload {
            EntryPayload::Symlink(target) => (true, target.as_bytes().to_vec()),
            EntryPayload::Hardlink(target) => {
                eprintln!(
                    "Warning: ZIP format doesn't support hardlinks. Creating a regular file instead."
                );
                (false, target.as_bytes().to_vec())
            }
            EntryPayload::Content(bytes) => (false, bytes.clone()),
        };

        let mut mode = req.attrs.mode;
        if !is_symlink && req.attrs.has_special_bits() {
            let base = mode.unwrap_or(if is_dir { 0o775 } else { 0o644 });
            mode = Some(apply_special_bits(
                base,
                req.attrs.setuid,
                req.attrs.setgid,
                req.attrs.sticky,
            ));
        }

        out.external_attr = external_attr(&PermSpec {
            mode,
            is_dir,
            is_symlink,
            ..PermSpec::default()
        });
        out.payload = payload;

        if req.attrs.uid.is_some() || req.attrs.gid.is_some() {
            set_uid_gid_extra(
                &mut out.extra,
                req.attrs.uid.unwrap_or(0),
                req.attrs.gid.unwrap_or(0),
            );
        }
        if let Some(unicode_path) = &req.attrs.unicode_path {
            let name = out.name.clone();
            set_unicode_path_extra(&mut out.extra, &name, unicode_path.as_bytes());
        }
        if let Some(mtime) = req.attrs.mtime {
            let (date, time) = unix_mtime_to_dos(mtime);
            out.mod_date = date;
            out.mod_time = time;
            set_extended_timestamp_extra(&mut out.extra, mtime);
        }

        out
    }

    pub fn add(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        let mut entries = if path.exists() {
            Self::carry_all(&self.open(path)?)?
        } else {
            Vec::new()
        };

        entries.push(Self::entry_from_add(req));
        replace_file(path, &build_archive(&entries)?)?;

        match &req.payload {
            EntryPayload::Symlink(target) => vprintln!(
                req.verbose,
                1,
                "Added symlink {} -> {} to {}",
                req.entry_path,
                target,
                path.display()
            ),
            _ => vprintln!(req.verbose, 1, "Added {} to {}", req.entry_path, path.display()),
        }
        Ok(())
    }

    /// Recursive directory ingestion. An already-present base path makes this
    /// a replace of the whole subtree.
    pub fn add_directory(
        &self,
        path: &Path,
        ingested: &[IngestedEntry],
        req: &AddRequest,
    ) -> anyhow::Result<()> {
        let mut entries = if path.exists() {
            let zip = self.open(path)?;
            let mut kept = Vec::new();
            for entry in zip.extended_entries() {
                let replaced = ingested
                    .iter()
                    .any(|i| remove_matches(&entry.name, &i.entry_path, true));
                if replaced {
                    continue;
                }
                if let Some(carried) = Self::carry_entry(&zip, entry)? {
                    kept.push(carried);
                }
            }
            kept
        } else {
            Vec::new()
        };

        for ingest in ingested {
            let payload = match &ingest.kind {
                IngestKind::Dir => EntryPayload::Content(Vec::new()),
                IngestKind::File(bytes) => EntryPayload::Content(bytes.clone()),
                IngestKind::Symlink(target) => EntryPayload::Symlink(target.clone()),
            };
            let mut attrs = req.attrs.clone();
            if attrs.mode.is_none() {
                attrs.mode = Some(ingest.mode);
            }
            if attrs.mtime.is_none() {
                attrs.mtime = Some(ingest.mtime);
            }
            entries.push(Self::entry_from_add(&AddRequest {
                entry_path: ingest.entry_path.clone(),
                payload,
                attrs,
                verbose: req.verbose,
            }));
            vprintln!(req.verbose, 1, "Added {} to {}", ingest.entry_path, path.display());
        }

        replace_file(path, &build_archive(&entries)?)
    }

    pub fn replace(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }

        let zip = self.open(path)?;
        let mut entries = Vec::new();
        for entry in zip.extended_entries() {
            if remove_matches(&entry.name, &req.entry_path, true) {
                continue;
            }
            if let Some(carried) = Self::carry_entry(&zip, entry)? {
                entries.push(carried);
            }
        }
        entries.push(Self::entry_from_add(req));
        replace_file(path, &build_archive(&entries)?)?;

        vprintln!(req.verbose, 1, "Replaced {} in {}", req.entry_path, path.display());
        Ok(())
    }

    pub fn append(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }

        let appended = match &req.payload {
            EntryPayload::Content(bytes) => bytes.clone(),
            _ => bail!("append takes --content or --content-file"),
        };

        let new_content = {
            let zip = self.open(path)?;
            let Some(entry) = zip.get_info(&req.entry_path) else {
                bail!("{} not found in the archive", req.entry_path);
            };
            let mut content = zip.read_entry_bytes(entry)?;
            content.extend_from_slice(&appended);
            content
        };

        self.replace(
            path,
            &AddRequest {
                entry_path: req.entry_path.clone(),
                payload: EntryPayload::Content(new_content),
                attrs: Default::default(),
                verbose: 0,
            },
        )?;

        vprintln!(req.verbose, 1, "Appended to {} in {}", req.entry_path, path.display());
        Ok(())
    }

    pub fn modify(&self, path: &Path, req: &ModifyRequest) -> anyhow::Result<()> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }
        if req.symlink.is_some() && req.hardlink.is_some() {
            bail!("Cannot specify both --symlink and --hardlink");
        }

        let zip = self.open(path)?;
        let Some(orig) = zip.get_info(&req.entry_path).cloned() else {
            bail!("{} not found in the archive", req.entry_path);
        };

        let converting = req.symlink.is_some() || req.hardlink.is_some();
        let payload = if converting {
            Vec::new()
        } else {
            zip.read_entry_bytes(&orig)?
        };

        let mut entries = Vec::new();
        for entry in zip.extended_entries() {
            if entry.name == req.entry_path {
                continue;
            }
            if let Some(carried) = Self::carry_entry(&zip, entry)? {
                entries.push(carried);
            }
        }

        let mut out = ZipEntryOut::new(&req.entry_path);
        out.name = orig.name_bytes.clone();
        out.comment = orig.comment.clone();
        out.extra = orig.extra.clone();
        out.mod_time = orig.mod_time;
        out.mod_date = orig.mod_date;
        if let Some(mtime) = req.attrs.mtime {
            let (date, time) = unix_mtime_to_dos(mtime);
            out.mod_date = date;
            out.mod_time = time;
            set_extended_timestamp_extra(&mut out.extra, mtime);
        }

        let is_dir = req.entry_path.ends_with('/');
        if let Some(target) = &req.symlink {
            out.external_attr = external_attr(&PermSpec {
                mode: req.attrs.mode,
                is_symlink: true,
                ..PermSpec::default()
            });
            out.payload = target.as_bytes().to_vec();
            vprintln!(req.verbose, 1, "Converting {} to symlink -> {}", req.entry_path, target);
        } else {
            if let Some(target) = &req.hardlink {
                eprintln!(
                    "Warning: ZIP format doesn't support hardlinks. Creating a file with hardlink target as content."
                );
                out.payload = target.as_bytes().to_vec();
            } else {
                out.payload = payload;
            }

            let mut mode = req.attrs.mode;
            if req.attrs.has_special_bits() {
                let base = mode.unwrap_or(orig.unix_mode() & 0o777);
                mode = Some(apply_special_bits(
                    base,
                    req.attrs.setuid,
                    req.attrs.setgid,
                    req.attrs.sticky,
                ));
            }
            out.external_attr = external_attr(&PermSpec {
                mode,
                is_dir,
                preserve_type: true,
                original_attr: Some(orig.external_attr),
                ..PermSpec::default()
            });
        }

        if req.attrs.uid.is_some() || req.attrs.gid.is_some() {
            set_uid_gid_extra(
                &mut out.extra,
                req.attrs.uid.unwrap_or(0),
                req.attrs.gid.unwrap_or(0),
            );
        }
        if let Some(unicode_path) = &req.attrs.unicode_path {
            let name = out.name.clone();
            set_unicode_path_extra(&mut out.extra, &name, unicode_path.as_bytes());
        }

        entries.push(out);
        replace_file(path, &build_archive(&entries)?)?;

        vprintln!(
            req.verbose,
            1,
            "Modified attributes of {} in {}",
            req.entry_path,
            path.display()
        );
        Ok(())
    }

    pub fn remove(&self, path: &Path, req: &RemoveRequest) -> anyhow::Result<()> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }

        let zip = self.open(path)?;
        let removed: Vec<String> = zip
            .extended_entries()
            .iter()
            .filter(|e| remove_matches(&e.name, &req.entry_path, req.recursive))
            .map(|e| e.name.clone())
            .collect();
        if removed.is_empty() {
            bail!("{} not found in the archive", req.entry_path);
        }

        let mut entries = Vec::new();
        for entry in zip.extended_entries() {
            if removed.contains(&entry.name) {
                continue;
            }
            if let Some(carried) = Self::carry_entry(&zip, entry)? {
                entries.push(carried);
            }
        }
        replace_file(path, &build_archive(&entries)?)?;

        if removed.len() == 1 {
            vprintln!(req.verbose, 1, "Removed {} from {}", removed[0], path.display());
        } else {
            vprintln!(req.verbose, 1, "Removed {} entries from {}", removed.len(), path.display());
            for name in &removed {
                vprintln!(req.verbose, 1, "  - {name}");
            }
        }
        Ok(())
    }

    pub fn list(&self, path: &Path, req: &ListRequest) -> anyhow::Result<()> {
        let zip = self.open(path)?;
        if zip.is_empty() {
            println!("Archive {} is empty", path.display());
            return Ok(());
        }

        if req.long >= 2 {
            self.list_long(path, &zip);
        }

        if req.long >= 1 {
            println!("{:<12} {:>10} {:>20} {}", "Permissions", "Size", "Modified", "Name");
            println!("{} {} {} {}", "-".repeat(12), "-".repeat(10), "-".repeat(20), "-".repeat(30));

            for entry in zip.extended_entries() {
                let date_str = format_dos_datetime(entry.mod_date, entry.mod_time)
                    .unwrap_or_else(|| {
                        vprintln!(
                            req.verbose,
                            1,
                            "Error: invalid date in header: date={} time={}",
                            entry.mod_date,
                            entry.mod_time
                        );
                        "INVALID_DATE".to_string()
                    });

                let mode = entry.unix_mode();
                let mut name = entry.name.clone();
                if let Some(unicode_path) = &entry.unicode_path {
                    name = format!("{name} (unicode: {unicode_path})");
                }
                if entry.is_symlink() {
                    if let Ok(target) = zip.read_entry_bytes(entry) {
                        name = format!("{} -> {}", name, String::from_utf8_lossy(&target));
                    }
                }

                println!(
                    "{} {:>10} {:>20} {}",
                    format_mode(mode),
                    entry.uncompressed_size,
                    date_str,
                    name
                );
            }
        } else {
            for entry in zip.extended_entries() {
                if entry.is_dir() {
                    continue;
                }
                println!("{}", entry.name);
            }
        }
        Ok(())
    }

    fn list_long(&self, path: &Path, zip: &ExtZip) {
        println!("Verbose header information for {}:", path.display());

        for entry in zip.extended_entries() {
            println!("\nFile: {}", zip.get_display_name(entry));
            println!("{}", "-".repeat(70));

            match entry.status {
                EntryStatus::Paired => println!("  Status: Standard entry"),
                EntryStatus::OrphanedLfh => {
                    println!("  Status: ORPHANED LFH/CDH (not in any central directory)")
                }
                EntryStatus::OrphanedLfhHiddenCdh => {
                    println!("  Status: ORPHANED LFH (not in main central directory)")
                }
                EntryStatus::OrphanedCdh => {
                    println!("  Status: ORPHANED CDH (no matching local file header)")
                }
            }

            let lfh = entry.lfh_offset.and_then(|off| zip.find_lfh(off));
            if let Some(lfh) = lfh {
                println!("\n  Local File Header (offset: {}):", lfh.offset);
                display_lfh(lfh);
            }

            let cdh = entry
                .cdh_offset
                .and_then(|off| zip.cdhs.iter().find(|c| c.offset == off));
            if let Some(cdh) = cdh {
                println!("\n  Central Directory Header (offset: {}):", cdh.offset);
                display_cdh(cdh);

                if let Some(lfh) = lfh {
                    println!("\n  Header Field Comparison (CDH vs LFH):");
                    compare_lfh_cdh_fields(lfh, cdh);
                }
            }

            println!("{}", "-".repeat(70));
        }

        if !zip.diagnostics.is_empty() {
            println!("\nStructural diagnostics:");
            for diagnostic in &zip.diagnostics {
                println!("  {diagnostic}");
            }
        }
    }

    pub fn read(&self, path: &Path, req: &ReadRequest) -> anyhow::Result<()> {
        let zip = self.open(path)?;
        let mut current = 0usize;
        for entry in zip.extended_entries() {
            if entry.name != req.entry_path {
                continue;
            }
            if current != req.index {
                current += 1;
                continue;
            }
            if entry.is_dir() {
                bail!("could not read {}, it is a directory", req.entry_path);
            }
            let payload = zip.read_entry_bytes(entry)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.flush()?;
            return Ok(());
        }

        bail!(
            "could not find {}, index {} in archive",
            req.entry_path,
            req.index
        );
    }

    pub fn extract(&self, path: &Path, req: &ExtractRequest) -> anyhow::Result<()> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }
        fs::create_dir_all(&req.output_dir)
            .with_context(|| format!("creating output directory {:?}", req.output_dir))?;

        let zip = self.open(path)?;
        let mut entries: Vec<&ExtendedEntry> = zip.extended_entries().iter().collect();
        if let Some(wanted) = &req.entry_path {
            entries.retain(|e| e.name == *wanted || e.name.starts_with(&format!("{wanted}/")));
            if entries.is_empty() {
                bail!("Path '{}' not found in the archive", wanted);
            }
        }

        // Directories first so their children have somewhere to land.
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            if entry.status == EntryStatus::OrphanedCdh {
                vprintln!(req.verbose, 1, "Skipping {} (no local file data)", entry.name);
                continue;
            }

            let output_path = if req.vulnerable {
                req.output_dir.join(&entry.name)
            } else {
                sanitize_path(&entry.name, &req.output_dir)
            };

            if entry.is_dir() {
                fs::create_dir_all(&output_path)
                    .with_context(|| format!("creating directory {:?}", output_path))?;
                if !req.normalize_permissions {
                    set_unix_mode(&output_path, entry.unix_mode() & 0o777);
                }
                vprintln!(req.verbose, 1, "Created directory: {}", output_path.display());
                continue;
            }

            if entry.is_symlink() {
                let target = String::from_utf8_lossy(&zip.read_entry_bytes(entry)?).into_owned();
                create_parent_dirs(&output_path)?;
                if req.vulnerable {
                    if output_path.exists() {
                        let _ = fs::remove_file(&output_path);
                    }
                    match make_symlink(&target, &output_path) {
                        Ok(()) => vprintln!(
                            req.verbose,
                            1,
                            "Created symlink: {} -> {}",
                            output_path.display(),
                            target
                        ),
                        Err(_) => {
                            eprintln!("Error creating symlink: {}", entry.name);
                            fs::write(&output_path, format!("Failed to create symlink to: {target}"))?;
                        }
                    }
                } else {
                    fs::write(&output_path, format!("Symlink to: {target}"))?;
                    vprintln!(
                        req.verbose,
                        1,
                        "Created file for symlink: {} (points to {})",
                        output_path.display(),
                        target
                    );
                }
                continue;
            }

            create_parent_dirs(&output_path)?;
            fs::write(&output_path, zip.read_entry_bytes(entry)?)
                .with_context(|| format!("writing {:?}", output_path))?;
            if !req.normalize_permissions {
                set_unix_mode(&output_path, entry.unix_mode() & 0o777);
            }
            vprintln!(req.verbose, 1, "Extracted: {}", output_path.display());
        }

        Ok(())
    }

    /// Prepend `content` to the archive and patch every stored offset (each
    /// CDH's local header offset, the EOCD's central directory offset) so the
    /// ZIP stays valid at its shifted position. EOCD comment bytes are copied
    /// verbatim, so records hidden in them survive untouched.
    pub fn polyglot(&self, path: &Path, content: &[u8], verbose: u8) -> anyhow::Result<()> {
        if !path.exists() {
            fs::write(path, empty_archive())
                .with_context(|| format!("creating empty archive {:?}", path))?;
        }

        let data = fs::read(path).with_context(|| format!("reading archive {:?}", path))?;
        let Some(eocd_offset) = find_eocd_backwards(&data) else {
            bail!("Could not find End of Central Directory record");
        };
        let cd_offset = read_u32_le(&data, eocd_offset + 16)
            .context("truncated End of Central Directory record")? as usize;
        if cd_offset > eocd_offset {
            bail!("central directory offset points past the End of Central Directory record");
        }

        let adjustment = content.len();
        let shift = |offset: u32| -> anyhow::Result<u32> {
            u32::try_from(offset as usize + adjustment)
                .map_err(|_| anyhow!("offset adjustment overflows the ZIP offset field"))
        };

        let mut out = Vec::with_capacity(adjustment + data.len());
        out.extend_from_slice(content);
        out.extend_from_slice(&data[..cd_offset]);

        // Walk the central directory region record by record, re-pointing
        // each local header offset. Non-record bytes pass through unchanged.
        let cd_region = &data[cd_offset..eocd_offset];
        let mut pos = 0;
        while pos < cd_region.len() {
            if cd_region.len() - pos >= CDH_FIXED_SIZE && &cd_region[pos..pos + 4] == CDH_SIGNATURE
            {
                let name_len = read_u16_le(cd_region, pos + 28).unwrap() as usize;
                let extra_len = read_u16_le(cd_region, pos + 30).unwrap() as usize;
                let comment_len = read_u16_le(cd_region, pos + 32).unwrap() as usize;
                let old_offset = read_u32_le(cd_region, pos + 42).unwrap();
                let record_end = pos + CDH_FIXED_SIZE + name_len + extra_len + comment_len;

                if record_end <= cd_region.len() {
                    out.extend_from_slice(&cd_region[pos..pos + 42]);
                    out.extend_from_slice(&shift(old_offset)?.to_le_bytes());
                    out.extend_from_slice(&cd_region[pos + CDH_FIXED_SIZE..record_end]);
                    pos = record_end;
                    continue;
                }
            }
            out.push(cd_region[pos]);
            pos += 1;
        }

        out.extend_from_slice(&data[eocd_offset..eocd_offset + 16]);
        out.extend_from_slice(&shift(cd_offset as u32)?.to_le_bytes());
        out.extend_from_slice(&data[eocd_offset + 20..]);

        replace_file(path, &out)?;
        vprintln!(verbose, 1, "Added {} bytes to the beginning of {}", adjustment, path.display());
        vprintln!(verbose, 1, "Adjusted all ZIP offsets by {} bytes", adjustment);
        Ok(())
    }
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if mode != 0 && fs::set_permissions(path, fs::Permissions::from_mode(mode)).is_err() {
        eprintln!("Warning: Could not set permissions for {}", path.display());
    }
}

#[cfg(not(unix))]
fn set_unix_mode(_path: &Path, _mode: u32) {}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks not supported on this platform"))
}

fn compression_name(method: u16) -> String {
    let name = match method {
        0 => "stored (no compression)",
        1 => "shrunk",
        2..=5 => "reduced",
        6 => "imploded",
        8 => "deflated",
        9 => "enhanced deflated",
        12 => "BZIP2",
        14 => "LZMA",
        93 => "Zstandard",
        97 => "WavPack",
        98 => "PPMd",
        other => return format!("unknown ({other})"),
    };
    name.to_string()
}

fn describe_flags(flags: u16) -> String {
    let mut parts = Vec::new();
    if flags & 0x0001 != 0 {
        parts.push("encrypted");
    }
    if flags & 0x0008 != 0 {
        parts.push("data descriptor follows");
    }
    if flags & 0x0020 != 0 {
        parts.push("compressed patched data");
    }
    if flags & 0x0040 != 0 {
        parts.push("strong encryption");
    }
    if flags & 0x0800 != 0 {
        parts.push("UTF-8 encoding");
    }
    if flags & 0x2000 != 0 {
        parts.push("encrypted central directory");
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

fn dos_time_string(date: u16, time: u16) -> String {
    let (y, mo, d, h, mi, s) = dos_datetime_decode(date, time);
    format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}")
}

fn display_extra(extra: &[u8]) {
    if extra.is_empty() {
        return;
    }
    let hex: Vec<String> = extra.iter().map(|b| format!("{b:02x}")).collect();
    println!("    extra_hex           : {}", hex.join(" "));
    println!("    extra_parsed        :");
    for (id, data) in extra_fields(extra) {
        match id {
            crate::extzip::EXTRA_EXTENDED_TIMESTAMP => {
                match mtime_from_extra(extra) {
                    Some(mtime) => println!(
                        "      0x5455 extended timestamp: mtime {} ({})",
                        mtime,
                        crate::codec::format_epoch(mtime)
                    ),
                    None => println!("      0x5455 extended timestamp: no mtime flag"),
                }
            }
            crate::extzip::EXTRA_INFOZIP_UNIX3 => match uid_gid_from_extra(extra) {
                Some((uid, gid)) => println!("      0x7875 unix uid/gid: uid {uid}, gid {gid}"),
                None => println!("      0x7875 unix uid/gid: malformed"),
            },
            crate::extzip::EXTRA_UNICODE_PATH => {
                let path = unicode_path_from_extra(extra).unwrap_or_default();
                let stored_crc = read_u32_le(data, 1).unwrap_or(0);
                println!("      0x7075 unicode path: {path:?} (name crc 0x{stored_crc:08x})");
            }
            other => {
                let hex: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
                println!("      0x{other:04x}: {}", hex.join(""));
            }
        }
    }
}

fn display_lfh(lfh: &ParsedLfh) {
    let f = &lfh.fields;
    println!("    version_needed      : {}", f.version_needed);
    println!("    flags               : {} ({})", f.flags, describe_flags(f.flags));
    println!(
        "    compression_method  : {} ({})",
        f.method,
        compression_name(f.method)
    );
    println!(
        "    last_mod             : {} {} ({})",
        f.mod_date,
        f.mod_time,
        dos_time_string(f.mod_date, f.mod_time)
    );
    println!("    crc_32              : {}", f.crc32);
    println!("    compressed_size     : {}", f.compressed_size);
    println!("    uncompressed_size   : {}", f.uncompressed_size);
    println!("    filename_length     : {}", f.name_len);
    println!("    extra_field_length  : {}", f.extra_len);
    println!("    filename            : {}", lfh.name);
    display_extra(&lfh.extra);
}

fn display_cdh(cdh: &ParsedCdh) {
    let f = &cdh.fields;
    println!("    version_made_by     : {}", f.version_made_by);
    println!("    version_needed      : {}", f.version_needed);
    println!("    flags               : {} ({})", f.flags, describe_flags(f.flags));
    println!(
        "    compression_method  : {} ({})",
        f.method,
        compression_name(f.method)
    );
    println!(
        "    last_mod             : {} {} ({})",
        f.mod_date,
        f.mod_time,
        dos_time_string(f.mod_date, f.mod_time)
    );
    println!("    crc_32              : {}", f.crc32);
    println!("    compressed_size     : {}", f.compressed_size);
    println!("    uncompressed_size   : {}", f.uncompressed_size);
    println!("    filename_length     : {}", f.name_len);
    println!("    extra_field_length  : {}", f.extra_len);
    println!("    comment_length      : {}", f.comment_len);
    println!("    disk_number_start   : {}", f.disk_start);
    println!("    internal_file_attr  : {}", f.internal_attr);
    let mode = f.external_attr >> 16;
    println!(
        "    external_file_attr  : {} (Unix mode: {:o} {})",
        f.external_attr,
        mode,
        format_mode(mode)
    );
    println!("    local_header_offset : {}", f.lfh_offset);
    println!("    filename            : {}", cdh.name);
    display_extra(&cdh.extra);
}

fn compare_lfh_cdh_fields(lfh: &ParsedLfh, cdh: &ParsedCdh) {
    let rows: Vec<(&str, String, String)> = vec![
        (
            "version_needed",
            cdh.fields.version_needed.to_string(),
            lfh.fields.version_needed.to_string(),
        ),
        ("flags", cdh.fields.flags.to_string(), lfh.fields.flags.to_string()),
        (
            "compression_method",
            cdh.fields.method.to_string(),
            lfh.fields.method.to_string(),
        ),
        (
            "last_mod_time",
            cdh.fields.mod_time.to_string(),
            lfh.fields.mod_time.to_string(),
        ),
        (
            "last_mod_date",
            cdh.fields.mod_date.to_string(),
            lfh.fields.mod_date.to_string(),
        ),
        ("crc_32", cdh.fields.crc32.to_string(), lfh.fields.crc32.to_string()),
        (
            "compressed_size",
            cdh.fields.compressed_size.to_string(),
            lfh.fields.compressed_size.to_string(),
        ),
        (
            "uncompressed_size",
            cdh.fields.uncompressed_size.to_string(),
            lfh.fields.uncompressed_size.to_string(),
        ),
        ("filename", cdh.name.clone(), lfh.name.clone()),
    ];

    for (field, cdh_value, lfh_value) in rows {
        let verdict = if cdh_value == lfh_value { "MATCH" } else { "MISMATCH" };
        println!("    {field:<20}: {verdict} - CDH: {cdh_value}, LFH: {lfh_value}");
    }
}
