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

use crate::reconf::error::ErrorKind;
use log::error;
use std::path::PathBuf;
use zbus::fdo;

#[derive(Debug, thiserror::Error)]
pub enum PrdError {
    #[error("PrdError::Argument: {0}")]
    Argument(String),
    #[error("PrdError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("PrdError::IOWrite: An IO error occurred when writing {data:?} to {file:?}: {e}")]
    IOWrite {
        data: String,
        file: PathBuf,
        e: std::io::Error,
    },
    #[error("PrdError::IOReadDir: An IO error occurred when reading directory {dir:?}: {e}")]
    IOReadDir { dir: PathBuf, e: std::io::Error },
    #[error("PrdError::TomlDe: Failed to parse config {toml_string:?}: {e}")]
    TomlDe {
        toml_string: String,
        e: toml::de::Error,
    },
    #[error("PrdError::Platform: {0}")]
    Platform(String),
    #[error("PrdError::Reconf: {0}")]
    Reconf(#[from] ErrorKind),
    #[error("PrdError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl From<PrdError> for fdo::Error {
    fn from(err: PrdError) -> Self {
        error!("{err}");
        match err {
            PrdError::Argument(..) => fdo::Error::InvalidArgs(err.to_string()),
            PrdError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            PrdError::IOWrite { .. } => fdo::Error::IOError(err.to_string()),
            PrdError::IOReadDir { .. } => fdo::Error::IOError(err.to_string()),
            PrdError::Reconf(ErrorKind::NoSuchPort(_)) => fdo::Error::InvalidArgs(err.to_string()),
            PrdError::Reconf(ErrorKind::Malformed(_)) => fdo::Error::InvalidArgs(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
