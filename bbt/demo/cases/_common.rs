// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the demo cases. The leading underscore keeps discovery from treating this
//! file as a case.

use camino::Utf8Path;
use std::{fs, io};

/// Writes `count` numbered keys to `path`, one per line.
pub fn write_keys(path: &Utf8Path, count: usize) -> io::Result<()> {
    let contents: String = (0..count).map(|i| format!("key{i}\n")).collect();
    fs::write(path, contents)
}

/// Counts the lines in `path`.
pub fn count_lines(path: &Utf8Path) -> io::Result<usize> {
    Ok(fs::read_to_string(path)?.lines().count())
}
