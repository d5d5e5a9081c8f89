// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding case files on disk.

use crate::errors::DiscoveryError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Returns the sorted identifiers of all case files at `path`.
///
/// If `path` is a file, it is the only case. If it is a directory, it is walked recursively and
/// every file with the given extension whose name doesn't start with `_` is a case.
pub fn discover_cases(path: &Utf8Path, extension: &str) -> Result<Vec<String>, DiscoveryError> {
    if path.is_file() {
        return Ok(vec![normalize_case_id(path)]);
    }
    if !path.is_dir() {
        return Err(DiscoveryError::NotFound {
            path: path.to_owned(),
        });
    }

    let mut cases = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|err| DiscoveryError::Walk {
            path: path.to_owned(),
            err,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let entry_path = Utf8PathBuf::from_path_buf(entry.into_path())
            .map_err(|path| DiscoveryError::NonUtf8Path { path })?;
        if is_case_file(&entry_path, extension) {
            cases.push(normalize_case_id(&entry_path));
        }
    }

    cases.sort();
    tracing::debug!(root = %path, count = cases.len(), "discovered cases");
    Ok(cases)
}

fn is_case_file(path: &Utf8Path, extension: &str) -> bool {
    let private = path.file_name().map_or(true, |name| name.starts_with('_'));
    !private && path.extension() == Some(extension)
}

/// Turns a case path into its identifier: `/`-separated, with `.` components removed.
///
/// Absolute paths under the current directory are made relative to it, so that a case has the
/// same identifier however it was named on the command line.
pub fn normalize_case_id(path: &Utf8Path) -> String {
    let cwd = std::env::current_dir()
        .ok()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok());
    normalize_case_id_in(path, cwd.as_deref())
}

fn normalize_case_id_in(path: &Utf8Path, cwd: Option<&Utf8Path>) -> String {
    let path = match cwd {
        Some(cwd) if path.is_absolute() => path.strip_prefix(cwd).unwrap_or(path),
        _ => path,
    };

    let mut id = String::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::RootDir => id.push('/'),
            other => {
                if !id.is_empty() && !id.ends_with('/') {
                    id.push('/');
                }
                id.push_str(other.as_str());
            }
        }
    }
    id
}
