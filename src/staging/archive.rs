//! Gzipped tarballs with `./`-rooted member names
//!
//! The tar crate normalises `./` away from header paths, so every entry is
//! preceded by a PAX `path` record carrying the `./`-prefixed name. The
//! header itself keeps the plain relative path for readers without PAX
//! support, truncated when it does not fit. Headers are written with
//! [`Builder::append`] so no GNU long-name entry competes with the PAX
//! record.

use crate::error::{LifecycleError, LifecycleResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path};
use tar::{Builder, EntryType, Header, HeaderMode};
use tracing::debug;
use walkdir::WalkDir;

/// Write `members` (paths relative to `base`) and their descendants to `output`
pub fn write_tgz(base: &Path, members: &[String], output: &Path) -> LifecycleResult<u64> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| LifecycleError::assemble(format!("creating {}", parent.display()), e))?;
    }

    let file = File::create(output)
        .map_err(|e| LifecycleError::assemble(format!("creating {}", output.display()), e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0u64;
    for member in members {
        let root = base.join(member);
        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                LifecycleError::assemble(
                    format!("walking {}", root.display()),
                    io::Error::other(e.to_string()),
                )
            })?;
            append_entry(&mut builder, base, entry.path()).map_err(|e| {
                LifecycleError::assemble(format!("archiving {}", entry.path().display()), e)
            })?;
            count += 1;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| LifecycleError::assemble(format!("finishing {}", output.display()), e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| LifecycleError::assemble(format!("compressing {}", output.display()), e))?;
    writer
        .flush()
        .map_err(|e| LifecycleError::assemble(format!("flushing {}", output.display()), e))?;

    debug!("Wrote {} entries to {}", count, output.display());
    Ok(count)
}

/// Top-level entry names of a directory, sorted
pub fn list_children(dir: &Path) -> LifecycleResult<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| LifecycleError::assemble(format!("reading {}", dir.display()), e))?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

fn archive_name(relative: &Path, is_dir: bool) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let mut name = format!("./{}", parts.join("/"));
    if is_dir {
        name.push('/');
    }
    name
}

fn append_entry<W: Write>(builder: &mut Builder<W>, base: &Path, path: &Path) -> io::Result<()> {
    let relative = path
        .strip_prefix(base)
        .map_err(|e| io::Error::other(e.to_string()))?;
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();

    let mut header = Header::new_ustar();
    header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
    set_header_path(&mut header, relative);

    let name = archive_name(relative, file_type.is_dir());
    let mut pax: Vec<(&str, Vec<u8>)> = vec![("path", name.into_bytes())];

    if file_type.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        if header.set_link_name(&target).is_err() {
            let target = target.to_string_lossy().into_owned();
            fill(&mut header.as_old_mut().linkname, target.as_bytes());
            pax.push(("linkpath", target.into_bytes()));
        }
    }

    builder.append_pax_extensions(pax.iter().map(|(key, value)| (*key, value.as_slice())))?;
    header.set_cksum();

    if file_type.is_file() {
        builder.append(&header, File::open(path)?)
    } else {
        builder.append(&header, io::empty())
    }
}

/// Plain ustar path, truncated to the name field when it cannot fit
fn set_header_path(header: &mut Header, relative: &Path) {
    if header.set_path(relative).is_ok() {
        return;
    }
    if let Some(ustar) = header.as_ustar_mut() {
        ustar.prefix = [0; 155];
    }
    let name = relative.to_string_lossy();
    fill(&mut header.as_old_mut().name, name.as_bytes());
}

fn fill(field: &mut [u8; 100], value: &[u8]) {
    let len = value.len().min(field.len());
    *field = [0; 100];
    field[..len].copy_from_slice(&value[..len]);
}
