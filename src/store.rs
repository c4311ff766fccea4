//! Markdown fragment persistence: backups, appends and ordered listing.

use crate::error::{Error, Result};
use crate::unit::CHAPTERS_DIR;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Suffix appended to a fragment's file name for its previous generation.
pub const BACKUP_SUFFIX: &str = ".bak";

const COVER_FILE: &str = "cover.md";
const BACK_COVER_FILE: &str = "back-cover.md";
const EPILOGUE_FILE: &str = "epilogue.md";

static CHAPTER_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^chapter-(\d+)\.md$").expect("valid chapter pattern"));

/// Returns `path` with [`BACKUP_SUFFIX`] appended to its file name.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes `content` to `path`, keeping the previous content as a backup.
///
/// # Process
///
/// 1. Copies the existing file to its backup path when `backup` is set
/// 2. Creates missing parent directories
/// 3. Writes the content to a temporary sibling file
/// 4. Renames the temporary file over the target
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub fn save(path: &Path, content: &str, backup: bool) -> Result<()> {
    if backup && path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| Error::io(&backup, e))?;
        debug!("Created backup: {}", backup.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    write_atomic(path, content)?;
    trace!("Saved {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = with_suffix(path, ".tmp");
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    let written = temp_file
        .write_all(content.as_bytes())
        .and_then(|()| temp_file.sync_all())
        .map_err(|e| Error::io(&temp_path, e));
    drop(temp_file);

    let result =
        written.and_then(|()| fs::rename(&temp_path, path).map_err(|e| Error::io(path, e)));
    if result.is_err() {
        fs::remove_file(&temp_path)
            .unwrap_or_else(|cleanup| debug!("Could not remove {}: {cleanup}", temp_path.display()));
    }
    result
}

/// Appends `content` and a newline to an existing file.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the file does not exist.
pub fn append(path: &Path, content: &str) -> Result<()> {
    if !path.is_file() {
        return Err(Error::not_found(path));
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|e| Error::io(path, e))
}

/// Reads the full UTF-8 content of a file.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the file does not exist.
pub fn read(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::not_found(path));
    }
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Parses the chapter number out of a `chapter-N.md` file name.
#[must_use]
pub fn chapter_number(file_name: &str) -> Option<u64> {
    CHAPTER_FILE
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Lists the fragments of a project in document order.
///
/// Cover, back cover, chapters by ascending number, then the epilogue.
/// Filesystem iteration order never leaks into the result.
///
/// # Errors
///
/// Returns an error if the chapters directory cannot be read.
pub fn list_fragments(project: &Path) -> Result<Vec<PathBuf>> {
    let dir = project.join(CHAPTERS_DIR);
    if !dir.is_dir() {
        debug!("No chapters directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut fragments = Vec::new();
    for fixed in [COVER_FILE, BACK_COVER_FILE] {
        let path = dir.join(fixed);
        if path.is_file() {
            fragments.push(path);
        }
    }

    fragments.extend(
        numbered_chapters(project)?
            .into_iter()
            .map(|(_, path)| path),
    );

    let epilogue = dir.join(EPILOGUE_FILE);
    if epilogue.is_file() {
        fragments.push(epilogue);
    }

    debug!("Found {} fragments in {}", fragments.len(), dir.display());
    Ok(fragments)
}

/// Lists `chapter-N.md` files sorted by `N`.
///
/// # Errors
///
/// Returns an error if the chapters directory cannot be read.
pub fn numbered_chapters(project: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let dir = project.join(CHAPTERS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut chapters = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let message = e.to_string();
            Error::Io {
                path: dir.clone(),
                message,
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        match chapter_number(&name) {
            Some(number) => chapters.push((number, entry.into_path())),
            None if CHAPTER_FILE.is_match(&name) => {
                warn!("Skipping chapter with out-of-range number: {name}");
            }
            None => {}
        }
    }

    chapters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(chapters)
}

/// Moves a chapter file to a new number, carrying its backup along.
///
/// # Errors
///
/// Returns an error if the target or its backup already exists, or a
/// rename fails.
pub fn renumber_chapter(project: &Path, from: u64, to: u64) -> Result<()> {
    let dir = project.join(CHAPTERS_DIR);
    let source = dir.join(format!("chapter-{from}.md"));
    let target = dir.join(format!("chapter-{to}.md"));
    let source_backup = backup_path(&source);
    let target_backup = backup_path(&target);

    for taken in [&target, &target_backup] {
        if taken.exists() {
            return Err(Error::validation(format!(
                "Refusing to overwrite {} while renumbering",
                taken.display()
            )));
        }
    }
    fs::rename(&source, &target).map_err(|e| Error::io(&source, e))?;

    if source_backup.exists() {
        fs::rename(&source_backup, &target_backup).map_err(|e| Error::io(&source_backup, e))?;
    }

    debug!("Renumbered chapter {from} -> {to}");
    Ok(())
}
