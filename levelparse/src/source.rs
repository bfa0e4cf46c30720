use std::{
    fs, io,
    path::{Path, PathBuf},
};

use shared::LiteralError;

use crate::ExtractError;

/// Reads a whole source file, the handle is closed before any parsing happens.
pub fn read_source(path: &Path) -> Result<String, ExtractError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(ExtractError::NotFound(path.to_owned()))
        }
        Err(source) => Err(ExtractError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Recursively collects every file called `file_name` under `dir`, sorted by path.
pub fn find_files_named(dir: &Path, file_name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_files_named(dir, file_name, &mut found);
    found.sort();
    found
}

fn collect_files_named(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
        if path.is_dir() {
            collect_files_named(&path, file_name, found);
        } else if path.file_name().is_some_and(|name| name == file_name) {
            found.push(path);
        }
    }
}

/// Sub directories of `dir`, numeric names first in numeric order then the rest by name.
pub fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut dirs = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|path| {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        (name.parse::<u32>().map_err(|_| ()), name)
    });
    dirs
}

/// Parses one numeric field of a macro call.
///
/// A literal that is not numeric means the call does not have the expected shape and yields
/// `Ok(None)` so the entry is skipped. A numeric literal that does not fit is a malformed entry.
pub(crate) fn field<T>(
    kind: &'static str,
    literal: Option<&str>,
    parse: fn(&str) -> Result<T, LiteralError>,
) -> Result<Option<T>, ExtractError> {
    let Some(literal) = literal else {
        return Ok(None);
    };
    match parse(literal) {
        Ok(value) => Ok(Some(value)),
        Err(LiteralError::NotNumeric(_)) => Ok(None),
        Err(err) => Err(ExtractError::malformed(kind, err)),
    }
}
