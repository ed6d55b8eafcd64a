// This file is part of afupr, an application to orchestrate partial reconfiguration of FPGA accelerator function units.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afupr is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afupr is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around `std::fs` that trace every access and convert failures into
//! [`PrdError`] values carrying the path involved. Used for config files, bitstream files
//! handed over by clients, and the sysfs attributes of the `fpga_manager` class.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use afuprd::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//! # fn example() -> Result<(), afuprd::error::PrdError> {
//! let state = fs_read(Path::new("/sys/class/fpga_manager/fpga0/state"))?;
//! fs_write(Path::new("/sys/class/fpga_manager/fpga0/firmware"), false, "afu.bin")?;
//! # Ok(())
//! # }
//! ```

use crate::error::PrdError;
use log::trace;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, PrdError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(PrdError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, PrdError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf))
        .map_err(|e| PrdError::IORead {
            file: file_path.into(),
            e,
        })?;
    trace!("Reading done");
    Ok(buf)
}

/// Read a whole file as raw bytes, e.g. a partial bitstream.
pub fn fs_read_bytes(file_path: &Path) -> Result<Vec<u8>, PrdError> {
    trace!("Attempting to read bytes from {file_path:?}");
    let mut buf = Vec::new();
    OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|e| PrdError::IORead {
            file: file_path.into(),
            e,
        })?;
    trace!("Read {} bytes", buf.len());
    Ok(buf)
}

/// Write a string value to a file.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist; sysfs attributes must already exist
/// * `value` - The string value to write
///
/// # Returns: `Result<(), PrdError>`
/// * `Err(PrdError::IOWrite)` - If the write fails
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), PrdError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    OpenOptions::new()
        .create(create)
        .write(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()))
        .map_err(|e| PrdError::IOWrite {
            data: value.as_ref().to_string(),
            file: file_path.into(),
            e,
        })?;
    trace!("Write done.");
    Ok(())
}

/// Write binary data to a file, truncating what was there.
pub fn fs_write_bytes(file_path: &Path, create: bool, data: &[u8]) -> Result<(), PrdError> {
    trace!("Attempting to write {} bytes to {:?}", data.len(), file_path);
    OpenOptions::new()
        .create(create)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| f.write_all(data))
        .map_err(|e| PrdError::IOWrite {
            data: format!("<{} bytes>", data.len()),
            file: file_path.into(),
            e,
        })?;
    trace!("Write done.");
    Ok(())
}

/// List the entries of a directory, sorted by name.
pub fn fs_read_dir(dir: &Path) -> Result<Vec<PathBuf>, PrdError> {
    trace!("Attempting to list {dir:?}");
    let entries = std::fs::read_dir(dir).map_err(|e| PrdError::IOReadDir {
        dir: dir.into(),
        e,
    })?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PrdError::IOReadDir {
            dir: dir.into(),
            e,
        })?;
    paths.sort();
    Ok(paths)
}
