use anyhow::bail;
use std::path::Path;

use crate::cli::{AttrArgs, Cli, Command, ContentArgs};
use crate::content::{collect_directory, content_bytes};
use crate::detect::detect_type;
use crate::tar_handler::TarHandler;
use crate::types::{
    AddRequest, ArchiveType, EntryAttributes, EntryPayload, ExtractRequest, ListRequest,
    ModifyRequest, ReadRequest, RemoveRequest,
};
use crate::zip_handler::ZipHandler;

fn attrs_from(args: &AttrArgs) -> EntryAttributes {
    EntryAttributes {
        mode: args.mode,
        uid: args.uid,
        gid: args.gid,
        mtime: args.mtime,
        setuid: args.setuid,
        setgid: args.setgid,
        sticky: args.sticky,
        unicode_path: args.unicodepath.clone(),
    }
}

/// Resolve the payload for add/replace. A symlink wins over content, content
/// is mandatory for regular files but not for directory entries (trailing
/// slash), and content-spec conflicts surface before anything is written.
fn payload_from(
    content: &ContentArgs,
    symlink: &Option<String>,
    hardlink: &Option<String>,
    entry_path: &str,
) -> anyhow::Result<EntryPayload> {
    if let Some(target) = symlink {
        return Ok(EntryPayload::Symlink(target.clone()));
    }
    if let Some(target) = hardlink {
        return Ok(EntryPayload::Hardlink(target.clone()));
    }
    let required = !entry_path.ends_with('/');
    Ok(EntryPayload::Content(content_bytes(
        &content.content,
        &content.content_file,
        required,
    )?))
}

fn command_unicodepath(command: &Command) -> Option<&str> {
    match command {
        Command::Add { attrs, .. }
        | Command::Replace { attrs, .. }
        | Command::Modify { attrs, .. } => attrs.unicodepath.as_deref(),
        _ => None,
    }
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let archive_type = match cli.archive_type {
        Some(explicit) => explicit,
        None => {
            let detected = detect_type(&cli.file);
            vprintln!(cli.verbose, 1, "Auto-detected archive type: {detected}");
            detected
        }
    };

    if !archive_type.is_zip() && command_unicodepath(&cli.command).is_some() {
        bail!("--unicodepath can only be used in zip (provided type: {archive_type})");
    }

    match archive_type {
        ArchiveType::Zip => run_zip(cli, &ZipHandler::new(cli.find_orphaned)),
        _ => run_tar(cli, &TarHandler::new(archive_type.compression())),
    }
}

fn run_zip(cli: &Cli, handler: &ZipHandler) -> anyhow::Result<()> {
    let file: &Path = &cli.file;
    match &cli.command {
        Command::Add {
            path,
            content,
            content_directory,
            symlink,
            hardlink,
            attrs,
        }
        | Command::Replace {
            path,
            content,
            content_directory,
            symlink,
            hardlink,
            attrs,
        } => {
            let replace = matches!(cli.command, Command::Replace { .. });
            if let Some(dir) = content_directory {
                let ingested = collect_directory(dir, path)?;
                let req = AddRequest {
                    entry_path: path.clone(),
                    payload: EntryPayload::Content(Vec::new()),
                    attrs: attrs_from(attrs),
                    verbose: cli.verbose,
                };
                return handler.add_directory(file, &ingested, &req);
            }
            let req = AddRequest {
                entry_path: path.clone(),
                payload: payload_from(content, symlink, hardlink, path)?,
                attrs: attrs_from(attrs),
                verbose: cli.verbose,
            };
            if replace {
                handler.replace(file, &req)
            } else {
                handler.add(file, &req)
            }
        }
        Command::Append { path, content } => {
            let payload = EntryPayload::Content(content_bytes(
                &content.content,
                &content.content_file,
                true,
            )?);
            handler.append(
                file,
                &AddRequest {
                    entry_path: path.clone(),
                    payload,
                    attrs: EntryAttributes::default(),
                    verbose: cli.verbose,
                },
            )
        }
        Command::Modify {
            path,
            symlink,
            hardlink,
            attrs,
        } => handler.modify(
            file,
            &ModifyRequest {
                entry_path: path.clone(),
                symlink: symlink.clone(),
                hardlink: hardlink.clone(),
                attrs: attrs_from(attrs),
                verbose: cli.verbose,
            },
        ),
        Command::Remove { path, recursive } => handler.remove(
            file,
            &RemoveRequest {
                entry_path: path.clone(),
                recursive: *recursive != 0,
                verbose: cli.verbose,
            },
        ),
        Command::List { long, longlong } => handler.list(
            file,
            &ListRequest {
                long: if *longlong { 2 } else { *long },
                verbose: cli.verbose,
            },
        ),
        Command::Read { path, index } => handler.read(
            file,
            &ReadRequest {
                entry_path: path.clone(),
                index: *index,
            },
        ),
        Command::Extract {
            path,
            output_dir,
            vulnerable,
            normalize_permissions,
        } => handler.extract(
            file,
            &ExtractRequest {
                entry_path: path.clone(),
                output_dir: output_dir.clone(),
                vulnerable: *vulnerable,
                normalize_permissions: *normalize_permissions,
                verbose: cli.verbose,
            },
        ),
        Command::Polyglot { content } => {
            let bytes = content_bytes(&content.content, &content.content_file, true)?;
            handler.polyglot(file, &bytes, cli.verbose)
        }
    }
}

fn run_tar(cli: &Cli, handler: &TarHandler) -> anyhow::Result<()> {
    let file: &Path = &cli.file;
    match &cli.command {
        Command::Add {
            path,
            content,
            content_directory,
            symlink,
            hardlink,
            attrs,
        }
        | Command::Replace {
            path,
            content,
            content_directory,
            symlink,
            hardlink,
            attrs,
        } => {
            let replace = matches!(cli.command, Command::Replace { .. });
            if let Some(dir) = content_directory {
                let ingested = collect_directory(dir, path)?;
                let req = AddRequest {
                    entry_path: path.clone(),
                    payload: EntryPayload::Content(Vec::new()),
                    attrs: attrs_from(attrs),
                    verbose: cli.verbose,
                };
                return handler.add_directory(file, &ingested, &req);
            }
            let req = AddRequest {
                entry_path: path.clone(),
                payload: payload_from(content, symlink, hardlink, path)?,
                attrs: attrs_from(attrs),
                verbose: cli.verbose,
            };
            if replace {
                handler.replace(file, &req)
            } else {
                handler.add(file, &req)
            }
        }
        Command::Append { path, content } => {
            let payload = EntryPayload::Content(content_bytes(
                &content.content,
                &content.content_file,
                true,
            )?);
            handler.append(
                file,
                &AddRequest {
                    entry_path: path.clone(),
                    payload,
                    attrs: EntryAttributes::default(),
                    verbose: cli.verbose,
                },
            )
        }
        Command::Modify {
            path,
            symlink,
            hardlink,
            attrs,
        } => handler.modify(
            file,
            &ModifyRequest {
                entry_path: path.clone(),
                symlink: symlink.clone(),
                hardlink: hardlink.clone(),
                attrs: attrs_from(attrs),
                verbose: cli.verbose,
            },
        ),
        Command::Remove { path, recursive } => handler.remove(
            file,
            &RemoveRequest {
                entry_path: path.clone(),
                recursive: *recursive != 0,
                verbose: cli.verbose,
            },
        ),
        Command::List { long, longlong } => handler.list(
            file,
            &ListRequest {
                long: if *longlong { 2 } else { *long },
                verbose: cli.verbose,
            },
        ),
        Command::Read { path, index } => handler.read(
            file,
            &ReadRequest {
                entry_path: path.clone(),
                index: *index,
            },
        ),
        Command::Extract {
            path,
            output_dir,
            vulnerable,
            normalize_permissions,
        } => handler.extract(
            file,
            &ExtractRequest {
                entry_path: path.clone(),
                output_dir: output_dir.clone(),
                vulnerable: *vulnerable,
                normalize_permissions: *normalize_permissions,
                verbose: cli.verbose,
            },
        ),
        Command::Polyglot { .. } => {
            bail!("polyglot is only supported for zip archives")
        }
    }
}
