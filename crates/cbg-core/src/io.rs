use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively collect files under `dir` whose extension (case-insensitive)
/// is one of `extensions`. A missing directory yields an empty list.
pub fn collect_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            // Symlinked directories can form cycles.
            if entry.file_type()?.is_symlink() && path.is_dir() {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
                .unwrap_or(false);
            if matches {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// The file with the newest modification time. Ties keep the path that
/// sorts last so the choice is stable across runs.
pub fn most_recent(files: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, &PathBuf)> = None;
    for path in files {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            continue;
        };
        match best {
            Some((t, _)) if modified < t => {}
            _ => best = Some((modified, path)),
        }
    }
    best.map(|(_, p)| p.clone())
}
