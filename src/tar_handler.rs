use anyhow::{Context, bail};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression as GzCompression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::codec::{apply_special_bits, escape_non_utf8, format_epoch, format_mode};
use crate::content::{IngestKind, IngestedEntry};
use crate::tar_raw;
use crate::types::{
    AddRequest, EntryPayload, ExtractRequest, ListRequest, ModifyRequest, ReadRequest,
    RemoveRequest, TarCompression,
};
use crate::utils::{create_parent_dirs, remove_matches, replace_file, sanitize_path};

/// One loaded archive member: its raw header, the effective path/link after
/// GNU long-name resolution, and the payload bytes.
#[derive(Debug, Clone)]
struct TarMember {
    header: Header,
    path: Vec<u8>,
    link: Option<Vec<u8>>,
    payload: Vec<u8>,
}

impl TarMember {
    fn name(&self) -> String {
        escape_non_utf8(&self.path)
    }

    fn link_name(&self) -> Option<String> {
        self.link.as_deref().map(escape_non_utf8)
    }

    fn entry_type(&self) -> EntryType {
        self.header.entry_type()
    }
}

/// Copy raw bytes into a fixed header field, truncating at the field width.
/// The field is zeroed first so leftovers from a cloned header cannot bleed
/// through.
fn set_field_raw(field: &mut [u8], bytes: &[u8]) {
    field.fill(0);
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
}

/// Emit a GNU `L` (long name) or `K` (long link) record carrying `bytes` as
/// its payload; the truncated name lands in the following member's header.
fn append_gnu_long(
    builder: &mut Builder<Vec<u8>>,
    entry_type: EntryType,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut header = Header::new_gnu();
    set_field_raw(&mut header.as_old_mut().name, b"././@LongLink");
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_entry_type(entry_type);
    header.set_size(bytes.len() as u64);
    header.set_cksum();
    builder.append(&header, bytes)
}

/// Whole-file-rewrite mutations and inspection for TAR archives, compressed
/// or not. Compressed containers cannot be appended to in place, so every
/// mutation decompresses, rebuilds and recompresses the stream.
pub struct TarHandler {
    pub compression: TarCompression,
}

impl TarHandler {
    pub fn new(compression: TarCompression) -> Self {
        TarHandler { compression }
    }

    fn container_name(&self) -> &'static str {
        match self.compression {
            TarCompression::None => "TAR",
            TarCompression::Gzip => "tar.gz",
            TarCompression::Xz => "tar.xz",
            TarCompression::Bzip2 => "tar.bz2",
        }
    }

    fn decompress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self.compression {
            TarCompression::None => out.extend_from_slice(raw),
            TarCompression::Gzip => {
                GzDecoder::new(raw).read_to_end(&mut out)?;
            }
            TarCompression::Xz => {
                XzDecoder::new(raw).read_to_end(&mut out)?;
            }
            TarCompression::Bzip2 => {
                BzDecoder::new(raw).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }

    fn compress(&self, tar_bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        match self.compression {
            TarCompression::None => Ok(tar_bytes.to_vec()),
            TarCompression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
                encoder.write_all(tar_bytes)?;
                Ok(encoder.finish()?)
            }
            TarCompression::Xz => {
                let mut encoder = XzEncoder::new(Vec::new(), 6);
                encoder.write_all(tar_bytes)?;
                Ok(encoder.finish()?)
            }
            TarCompression::Bzip2 => {
                let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(tar_bytes)?;
                Ok(encoder.finish()?)
            }
        }
    }

    fn read_tar_bytes(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        if !path.exists() {
            bail!("Archive {:?} does not exist", path);
        }
        let raw = fs::read(path).with_context(|| format!("reading archive {:?}", path))?;
        self.decompress(&raw)
            .with_context(|| format!("{:?} is not a valid {} file", path, self.container_name()))
    }

    fn load_members(&self, path: &Path) -> anyhow::Result<Vec<TarMember>> {
        let bytes = self.read_tar_bytes(path)?;
        let mut archive = Archive::new(&bytes[..]);
        let mut members = Vec::new();

        let entries = archive
            .entries()
            .with_context(|| format!("{:?} is not a valid {} file", path, self.container_name()))?;
        for entry in entries {
            let mut entry = entry
                .with_context(|| format!("{:?} is not a valid {} file", path, self.container_name()))?;
            let member_path = entry.path_bytes().to_vec();
            let link = entry.link_name_bytes().map(|l| l.to_vec());
            let header = entry.header().clone();
            let mut payload = Vec::new();
            entry
                .read_to_end(&mut payload)
                .with_context(|| format!("reading member from {:?}", path))?;
            members.push(TarMember {
                header,
                path: member_path,
                link,
                payload,
            });
        }
        Ok(members)
    }

    /// Lay members down with headers written verbatim: names and link targets
    /// go into the raw 512-byte fields untouched, so `..` components and
    /// absolute targets survive exactly as requested. Overlong names get a
    /// hand-emitted GNU `L`/`K` record in front.
    fn write_members(&self, path: &Path, members: &[TarMember]) -> anyhow::Result<()> {
        let mut builder = Builder::new(Vec::new());
        for member in members {
            if member.path.len() > 100 {
                append_gnu_long(&mut builder, EntryType::GNULongName, &member.path)
                    .with_context(|| format!("writing long-name record for {:?}", member.name()))?;
            }
            if let Some(link) = &member.link {
                if link.len() > 100 {
                    append_gnu_long(&mut builder, EntryType::GNULongLink, link)
                        .with_context(|| format!("writing long-link record for {:?}", member.name()))?;
                }
            }

            let mut header = member.header.clone();
            set_field_raw(&mut header.as_old_mut().name, &member.path);
            set_field_raw(
                &mut header.as_old_mut().linkname,
                member.link.as_deref().unwrap_or(b""),
            );
            header.set_size(member.payload.len() as u64);
            header.set_cksum();

            builder
                .append(&header, &member.payload[..])
                .with_context(|| format!("writing member {:?}", member.name()))?;
        }
        let tar_bytes = builder
            .into_inner()
            .context("finishing tar stream")?;
        replace_file(path, &self.compress(&tar_bytes)?)
    }

    fn member_from_add(req: &AddRequest, entry_path: &str, payload: &EntryPayload) -> TarMember {
        let mut header = Header::new_gnu();
        header.set_uid(req.attrs.uid.unwrap_or(0));
        header.set_gid(req.attrs.gid.unwrap_or(0));
        header.set_mtime(req.attrs.mtime.unwrap_or(0).max(0) as u64);

        let mut mode = req.attrs.mode.unwrap_or(0o744);
        mode = apply_special_bits(mode, req.attrs.setuid, req.attrs.setgid, req.attrs.sticky);
        header.set_mode(mode);

        let (entry_type, link, data) = match payload {
            EntryPayload::Symlink(target) => (
                EntryType::Symlink,
                Some(target.as_bytes().to_vec()),
                Vec::new(),
            ),
            EntryPayload::Hardlink(target) => (
                EntryType::Link,
                Some(target.as_bytes().to_vec()),
                Vec::new(),
            ),
            EntryPayload::Content(bytes) => {
                if entry_path.ends_with('/') {
                    (EntryType::Directory, None, bytes.clone())
                } else {
                    (EntryType::Regular, None, bytes.clone())
                }
            }
        };
        header.set_entry_type(entry_type);
        header.set_size(data.len() as u64);

        TarMember {
            header,
            path: entry_path.as_bytes().to_vec(),
            link,
            payload: data,
        }
    }

    pub fn add(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        let mut members = if path.exists() {
            self.load_members(path)?
        } else {
            Vec::new()
        };

        members.push(Self::member_from_add(req, &req.entry_path, &req.payload));
        self.write_members(path, &members)?;

        match &req.payload {
            EntryPayload::Symlink(target) => vprintln!(
                req.verbose,
                1,
                "Added symlink {} -> {} to {}",
                req.entry_path,
                target,
                path.display()
            ),
            EntryPayload::Hardlink(target) => vprintln!(
                req.verbose,
                1,
                "Added hardlink {} -> {} to {}",
                req.entry_path,
                target,
                path.display()
            ),
            EntryPayload::Content(_) => {
                vprintln!(req.verbose, 1, "Added {} to {}", req.entry_path, path.display())
            }
        }
        Ok(())
    }

    /// Recursive directory ingestion; an already-present base path becomes a
    /// replace of the whole subtree.
    pub fn add_directory(
        &self,
        path: &Path,
        ingested: &[IngestedEntry],
        req: &AddRequest,
    ) -> anyhow::Result<()> {
        let mut members = if path.exists() {
            self.load_members(path)?
                .into_iter()
                .filter(|m| {
                    !ingested
                        .iter()
                        .any(|i| remove_matches(&m.name(), &i.entry_path, true))
                })
                .collect()
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
            let member_req = AddRequest {
                entry_path: ingest.entry_path.clone(),
                payload: payload.clone(),
                attrs,
                verbose: req.verbose,
            };
            members.push(Self::member_from_add(&member_req, &ingest.entry_path, &payload));
            vprintln!(req.verbose, 1, "Added {} to {}", ingest.entry_path, path.display());
        }

        self.write_members(path, &members)
    }

    /// Swap an entry's payload while keeping its header attributes (type and
    /// linkname included, which is exactly what makes crafted members
    /// possible).
    pub fn replace(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        let content = match &req.payload {
            EntryPayload::Content(bytes) => bytes.clone(),
            _ => bail!("replace takes --content or --content-file"),
        };

        let mut members = self.load_members(path)?;
        let Some(index) = members.iter().position(|m| m.name() == req.entry_path) else {
            bail!("{} not found in the archive", req.entry_path);
        };
        members[index].payload = content;
        self.write_members(path, &members)?;

        vprintln!(req.verbose, 1, "Replaced {} in {}", req.entry_path, path.display());
        Ok(())
    }

    pub fn append(&self, path: &Path, req: &AddRequest) -> anyhow::Result<()> {
        let appended = match &req.payload {
            EntryPayload::Content(bytes) => bytes.clone(),
            _ => bail!("append takes --content or --content-file"),
        };

        let mut members = self.load_members(path)?;
        let Some(index) = members.iter().position(|m| m.name() == req.entry_path) else {
            bail!("{} not found in the archive", req.entry_path);
        };
        if members[index].entry_type() != EntryType::Regular {
            bail!("{} is not a regular file", req.entry_path);
        }
        members[index].payload.extend_from_slice(&appended);
        self.write_members(path, &members)?;

        vprintln!(req.verbose, 1, "Appended to {} in {}", req.entry_path, path.display());
        Ok(())
    }

    pub fn modify(&self, path: &Path, req: &ModifyRequest) -> anyhow::Result<()> {
        if req.symlink.is_some() && req.hardlink.is_some() {
            bail!("Cannot specify both --symlink and --hardlink");
        }

        let mut members = self.load_members(path)?;
        let Some(index) = members.iter().position(|m| m.name() == req.entry_path) else {
            bail!("{} not found in the archive", req.entry_path);
        };

        let member = &mut members[index];
        if let Some(target) = &req.symlink {
            member.header.set_entry_type(EntryType::Symlink);
            member.link = Some(target.as_bytes().to_vec());
            member.payload = Vec::new();
            vprintln!(req.verbose, 1, "Converting {} to symlink -> {}", req.entry_path, target);
        } else if let Some(target) = &req.hardlink {
            member.header.set_entry_type(EntryType::Link);
            member.link = Some(target.as_bytes().to_vec());
            member.payload = Vec::new();
            vprintln!(req.verbose, 1, "Converting {} to hardlink -> {}", req.entry_path, target);
        }

        if let Some(uid) = req.attrs.uid {
            member.header.set_uid(uid);
        }
        if let Some(gid) = req.attrs.gid {
            member.header.set_gid(gid);
        }
        if let Some(mtime) = req.attrs.mtime {
            member.header.set_mtime(mtime.max(0) as u64);
        }

        let mut mode = req
            .attrs
            .mode
            .unwrap_or_else(|| member.header.mode().unwrap_or(0o744));
        mode = apply_special_bits(mode, req.attrs.setuid, req.attrs.setgid, req.attrs.sticky);
        member.header.set_mode(mode);

        self.write_members(path, &members)?;

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
        let members = self.load_members(path)?;
        let removed: Vec<String> = members
            .iter()
            .map(|m| m.name())
            .filter(|name| remove_matches(name, &req.entry_path, req.recursive))
            .collect();
        if removed.is_empty() {
            bail!("{} not found in the archive", req.entry_path);
        }

        let kept: Vec<TarMember> = members
            .into_iter()
            .filter(|m| !removed.contains(&m.name()))
            .collect();
        self.write_members(path, &kept)?;

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
        if req.long >= 2 {
            self.list_raw_headers(path)?;
        }

        let mut members = self.load_members(path)?;
        members.sort_by_key(|m| m.name());

        if members.is_empty() {
            println!("Archive {} is empty", path.display());
            return Ok(());
        }

        if req.long >= 1 {
            println!(
                "{:<12} {:<15} {:>10} {:>20} {}",
                "Permissions", "Owner/Group", "Size", "Modified", "Name"
            );
            println!(
                "{} {} {} {} {}",
                "-".repeat(12),
                "-".repeat(15),
                "-".repeat(10),
                "-".repeat(20),
                "-".repeat(30)
            );

            for member in &members {
                let header = &member.header;
                let mode = header.mode().unwrap_or(0) | type_bits(member.entry_type());
                let uname = header.username().ok().flatten().unwrap_or("");
                let gname = header.groupname().ok().flatten().unwrap_or("");
                let owner = if !uname.is_empty() && !gname.is_empty() {
                    format!("{uname}/{gname}")
                } else {
                    format!(
                        "{}/{}",
                        header.uid().unwrap_or(0),
                        header.gid().unwrap_or(0)
                    )
                };

                let mut name = member.name();
                match member.entry_type() {
                    EntryType::Symlink => {
                        if let Some(target) = member.link_name() {
                            name = format!("{name} -> {target}");
                        }
                    }
                    EntryType::Link => {
                        if let Some(target) = member.link_name() {
                            name = format!("{name} link to {target}");
                        }
                    }
                    _ => {}
                }

                println!(
                    "{} {:<15} {:>10} {:>20} {}",
                    format_mode(mode),
                    owner,
                    header.size().unwrap_or(0),
                    format_epoch(header.mtime().unwrap_or(0) as i64),
                    name
                );
            }
        } else {
            for member in &members {
                if member.entry_type() == EntryType::Directory {
                    continue;
                }
                println!("{}", member.name());
            }
        }
        Ok(())
    }

    /// Block-level listing straight off the 512-byte headers, including the
    /// fields the tar library would normalize away.
    fn list_raw_headers(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.read_tar_bytes(path)?;
        let entries = tar_raw::scan(&bytes[..])?;

        println!("Verbose header information for {}:", path.display());
        for entry in &entries {
            let h = &entry.header;
            println!("\nFile: {}", entry.name);
            println!("{}", "-".repeat(70));
            println!("    header_offset       : {}", entry.offset);
            println!("    name                : {}", h.name);
            println!("    mode                : {:o} ({})", h.mode, format_mode(h.mode));
            println!("    uid                 : {}", h.uid);
            println!("    gid                 : {}", h.gid);
            println!("    size                : {}", h.size);
            println!(
                "    mtime               : {} ({})",
                h.mtime,
                format_epoch(h.mtime)
            );
            println!(
                "    chksum              : {} ({})",
                h.chksum,
                if h.chksum_ok { "valid" } else { "INVALID" }
            );
            println!(
                "    typeflag            : {:?} ({})",
                h.typeflag as char,
                typeflag_name(h.typeflag)
            );
            println!("    linkname            : {}", entry.linkname);
            println!("    magic/version       : {:?} {:?}", h.magic, h.version);
            println!("    uname/gname         : {:?} {:?}", h.uname, h.gname);
            println!("    devmajor/devminor   : {} {}", h.devmajor, h.devminor);
            println!("    prefix              : {}", h.prefix);
            println!("{}", "-".repeat(70));
        }
        Ok(())
    }

    pub fn read(&self, path: &Path, req: &ReadRequest) -> anyhow::Result<()> {
        let members = self.load_members(path)?;
        let mut current = 0usize;
        for member in &members {
            if member.name() != req.entry_path {
                continue;
            }
            if current != req.index {
                current += 1;
                continue;
            }
            if member.entry_type() == EntryType::Directory {
                bail!("could not read {}, it is a directory", req.entry_path);
            }
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&member.payload)?;
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
        fs::create_dir_all(&req.output_dir)
            .with_context(|| format!("creating output directory {:?}", req.output_dir))?;

        let mut members = self.load_members(path)?;
        if let Some(wanted) = &req.entry_path {
            members.retain(|m| {
                let name = m.name();
                name == *wanted || name.starts_with(&format!("{wanted}/"))
            });
            if members.is_empty() {
                bail!("Path '{}' not found in the archive", wanted);
            }
        }
        members.sort_by_key(|m| m.name());

        // Targets must exist before links point at them: directories, then
        // regular files, then symlinks, then hardlinks, then the rest.
        let rank = |t: EntryType| match t {
            EntryType::Directory => 0,
            EntryType::Regular | EntryType::GNUSparse | EntryType::Continuous => 1,
            EntryType::Symlink => 2,
            EntryType::Link => 3,
            _ => 4,
        };
        members.sort_by_key(|m| rank(m.entry_type()));

        for member in &members {
            let name = member.name();
            let output_path = if req.vulnerable {
                req.output_dir.join(&name)
            } else {
                sanitize_path(&name, &req.output_dir)
            };
            let mode = member.header.mode().unwrap_or(0) & 0o777;

            match rank(member.entry_type()) {
                0 => {
                    fs::create_dir_all(&output_path)
                        .with_context(|| format!("creating directory {:?}", output_path))?;
                    if !req.normalize_permissions {
                        set_unix_mode(&output_path, mode);
                    }
                    vprintln!(req.verbose, 1, "Created directory: {}", output_path.display());
                }
                1 => {
                    create_parent_dirs(&output_path)?;
                    fs::write(&output_path, &member.payload)
                        .with_context(|| format!("writing {:?}", output_path))?;
                    if !req.normalize_permissions {
                        set_unix_mode(&output_path, mode);
                    }
                    vprintln!(req.verbose, 1, "Extracted: {}", output_path.display());
                }
                2 => {
                    let target = member.link_name().unwrap_or_default();
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
                                eprintln!("Error creating symlink: {name}");
                                fs::write(
                                    &output_path,
                                    format!("Failed to create symlink to: {target}"),
                                )?;
                            }
                        }
                    } else {
                        fs::write(&output_path, format!("symlink to: {target}"))?;
                        vprintln!(
                            req.verbose,
                            1,
                            "Created file for symlink: {} (points to {})",
                            output_path.display(),
                            target
                        );
                    }
                }
                3 => {
                    let target = member.link_name().unwrap_or_default();
                    create_parent_dirs(&output_path)?;
                    if req.vulnerable {
                        let target_path = req.output_dir.join(&target);
                        if target_path.exists() {
                            if output_path.exists() {
                                let _ = fs::remove_file(&output_path);
                            }
                            if fs::hard_link(&target_path, &output_path).is_err() {
                                fs::copy(&target_path, &output_path).with_context(|| {
                                    format!("copying hardlink target to {:?}", output_path)
                                })?;
                                vprintln!(
                                    req.verbose,
                                    1,
                                    "Copied file (hardlink not supported): {}",
                                    output_path.display()
                                );
                            } else {
                                vprintln!(
                                    req.verbose,
                                    1,
                                    "Created hardlink: {} -> {}",
                                    output_path.display(),
                                    target_path.display()
                                );
                            }
                        } else {
                            eprintln!("Warning: Hardlink target not found: {}", target_path.display());
                            fs::write(
                                &output_path,
                                format!("Hardlink to: {target} (target not found)"),
                            )?;
                        }
                    } else {
                        fs::write(&output_path, format!("hardlink to: {target}"))?;
                        vprintln!(
                            req.verbose,
                            1,
                            "Created file for hardlink: {} (points to {})",
                            output_path.display(),
                            target
                        );
                    }
                }
                _ => {
                    vprintln!(req.verbose, 1, "Skipping unsupported file type: {name}");
                }
            }
        }
        Ok(())
    }
}

fn type_bits(entry_type: EntryType) -> u32 {
    match entry_type {
        EntryType::Directory => 0o040000,
        EntryType::Symlink => 0o120000,
        EntryType::Char => 0o020000,
        EntryType::Block => 0o060000,
        EntryType::Fifo => 0o010000,
        _ => 0o100000,
    }
}

fn typeflag_name(typeflag: u8) -> &'static str {
    match typeflag {
        0 | b'0' => "regular file",
        b'1' => "hard link",
        b'2' => "symlink",
        b'3' => "character device",
        b'4' => "block device",
        b'5' => "directory",
        b'6' => "fifo",
        b'7' => "contiguous file",
        b'L' => "GNU long name",
        b'K' => "GNU long link",
        b'x' => "pax extended header",
        b'g' => "pax global header",
        _ => "unknown",
    }
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if fs::set_permissions(path, fs::Permissions::from_mode(mode)).is_err() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryAttributes;

    fn add_req(path: &str, payload: EntryPayload, attrs: EntryAttributes) -> AddRequest {
        AddRequest {
            entry_path: path.to_string(),
            payload,
            attrs,
            verbose: 0,
        }
    }

    fn content(path: &str, bytes: &[u8]) -> AddRequest {
        add_req(path, EntryPayload::Content(bytes.to_vec()), EntryAttributes::default())
    }

    #[test]
    fn add_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("t.tar");
        let handler = TarHandler::new(TarCompression::None);

        handler.add(&archive, &content("a.txt", b"alpha")).unwrap();
        handler.add(&archive, &content("b/c.txt", b"beta")).unwrap();

        let members = handler.load_members(&archive).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name(), "a.txt");
        assert_eq!(members[0].payload, b"alpha");
        assert_eq!(members[0].header.mode().unwrap(), 0o744);
        assert_eq!(members[1].name(), "b/c.txt");
    }

    #[test]
    fn setuid_symlink_header_fields() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("s.tar");
        let handler = TarHandler::new(TarCompression::None);

        let attrs = EntryAttributes {
            mode: Some(0o4777),
            ..EntryAttributes::default()
        };
        handler
            .add(
                &archive,
                &add_req("s", EntryPayload::Symlink("/etc/shadow".into()), attrs),
            )
            .unwrap();

        let members = handler.load_members(&archive).unwrap();
        assert_eq!(members[0].entry_type(), EntryType::Symlink);
        assert_eq!(members[0].link_name().as_deref(), Some("/etc/shadow"));
        assert_eq!(members[0].header.mode().unwrap(), 0o4777);
        assert_eq!(members[0].header.size().unwrap(), 0);
    }

    #[test]
    fn long_names_survive_via_gnu_records() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("long.tar");
        let handler = TarHandler::new(TarCompression::None);

        let long_name = format!("{}/leaf.txt", "directory-segment/".repeat(10).trim_end_matches('/'));
        assert!(long_name.len() > 100);
        handler.add(&archive, &content(&long_name, b"deep")).unwrap();

        let members = handler.load_members(&archive).unwrap();
        assert_eq!(members[0].name(), long_name);

        // The raw scanner resolves the same name through the 'L' record.
        let raw = tar_raw::scan(&fs::read(&archive).unwrap()[..]).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].name, long_name);
        assert_eq!(raw[0].header.typeflag, b'0');
    }

    #[test]
    fn compressed_rewrite_cycles() {
        for compression in [TarCompression::Gzip, TarCompression::Xz, TarCompression::Bzip2] {
            let dir = tempfile::tempdir().unwrap();
            let archive = dir.path().join("c.tar.compressed");
            let handler = TarHandler::new(compression);

            handler.add(&archive, &content("one.txt", b"1")).unwrap();
            handler.add(&archive, &content("two.txt", b"2")).unwrap();
            handler
                .remove(
                    &archive,
                    &RemoveRequest {
                        entry_path: "one.txt".into(),
                        recursive: true,
                        verbose: 0,
                    },
                )
                .unwrap();

            let members = handler.load_members(&archive).unwrap();
            assert_eq!(members.len(), 1);
            assert_eq!(members[0].name(), "two.txt");

            // The on-disk bytes must actually be compressed.
            let raw = fs::read(&archive).unwrap();
            assert_ne!(&raw[..2], &b"tw"[..]);
        }
    }

    #[test]
    fn modify_converts_to_hardlink() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("m.tar");
        let handler = TarHandler::new(TarCompression::None);

        handler.add(&archive, &content("f.txt", b"data")).unwrap();
        handler
            .modify(
                &archive,
                &ModifyRequest {
                    entry_path: "f.txt".into(),
                    symlink: None,
                    hardlink: Some("target.txt".into()),
                    attrs: EntryAttributes::default(),
                    verbose: 0,
                },
            )
            .unwrap();

        let members = handler.load_members(&archive).unwrap();
        assert_eq!(members[0].entry_type(), EntryType::Link);
        assert_eq!(members[0].link_name().as_deref(), Some("target.txt"));
        assert!(members[0].payload.is_empty());
    }

    #[test]
    fn append_requires_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar");
        let handler = TarHandler::new(TarCompression::None);

        handler
            .add(
                &archive,
                &add_req(
                    "lnk",
                    EntryPayload::Symlink("somewhere".into()),
                    EntryAttributes::default(),
                ),
            )
            .unwrap();

        let err = handler
            .append(&archive, &content("lnk", b"more"))
            .unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
