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

//! Failure classification for reconfiguration workflows.
//!
//! Every way a workflow can end badly maps to exactly one [`ErrorKind`], and every
//! [`ErrorKind`] maps to a stable numeric code via [`ErrorKind::error_code`]. The numeric code
//! is what requesters receive in their terminal event, so the values must never be renumbered.
//! Code `0` is reserved for success.

/// Which wait ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutKind {
    #[error("no response from the power manager before the deadline")]
    PowerResponse,
    #[error("port did not quiesce before the deactivation timeout")]
    Deactivate,
    #[error("port did not come back before the reactivation timeout")]
    Reactivate,
    #[error("programming did not finish within the outstanding request budget")]
    OutstandingRequest,
}

/// Faults reported by the configuration engine while streaming a bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolFault {
    #[error("configuration IP protocol error")]
    Ip,
    #[error("configuration FIFO overflow")]
    Fifo,
    #[error("bitstream CRC error")]
    Crc,
    #[error("configuration operation error")]
    Operation,
}

/// The bitstream does not belong on the requested port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MismatchKind {
    #[error("bitstream is incompatible with the static region")]
    IncompatibleBitstream,
    #[error("bitstream targets port {found} but port {expected} was requested")]
    Port { expected: u32, found: u32 },
    #[error("bitstream slot type does not match the port")]
    SlotType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActivationFault {
    #[error("the accelerator failed to activate")]
    Failed,
    #[error("the accelerator is already active")]
    AlreadyActive,
    #[error("there is no active accelerator on the port")]
    NoAfu,
}

/// Structural problems in the supplied bitstream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedKind {
    #[error("no bitstream was supplied")]
    EmptyBuffer,
    #[error("buffer holds {found} bytes but a header needs {needed}")]
    TooShort { needed: usize, found: usize },
    #[error("header declares a {declared} byte payload but only {available} bytes follow")]
    PayloadTruncated { declared: u32, available: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("ErrorKind::Timeout: {0}")]
    Timeout(TimeoutKind),
    #[error("ErrorKind::Protocol: {0}")]
    Protocol(ProtocolFault),
    #[error("ErrorKind::ResourceMismatch: {0}")]
    ResourceMismatch(MismatchKind),
    #[error("ErrorKind::Activation: {0}")]
    Activation(ActivationFault),
    #[error("ErrorKind::Malformed: {0}")]
    Malformed(MalformedKind),
    #[error("ErrorKind::PowerDenied: the power manager refused the request")]
    PowerDenied,
    #[error("ErrorKind::PowerUnavailable: the power manager could not be reached")]
    PowerUnavailable,
    #[error("ErrorKind::DeviceBusy: an owner kept the resource")]
    DeviceBusy,
    #[error("ErrorKind::NoSuchPort: port {0} does not exist")]
    NoSuchPort(u32),
    #[error("ErrorKind::Cancelled: the request was superseded or the port was torn down")]
    Cancelled,
    #[error("ErrorKind::Internal: {0}")]
    Internal(String),
}

/// Numeric code for a successful request.
pub const CODE_OK: u32 = 0;
/// Numeric code reported when the port was programmed but deliberately left deactivated.
pub const CODE_LEFT_DEACTIVATED: u32 = 44;

impl ErrorKind {
    /// Stable numeric code transported to requesters.
    ///
    /// # Returns: `u32`
    /// * Never `0`, which is reserved for success.
    pub fn error_code(&self) -> u32 {
        match self {
            ErrorKind::Internal(_) => 8,
            ErrorKind::Malformed(_) => 12,
            ErrorKind::NoSuchPort(_) => 24,
            ErrorKind::DeviceBusy => 26,
            ErrorKind::Activation(ActivationFault::NoAfu) => 27,
            ErrorKind::Activation(ActivationFault::AlreadyActive) => 28,
            ErrorKind::Activation(ActivationFault::Failed) => 29,
            ErrorKind::Timeout(TimeoutKind::Deactivate) => 30,
            ErrorKind::Timeout(TimeoutKind::OutstandingRequest) => 31,
            ErrorKind::Protocol(ProtocolFault::Operation) => 32,
            ErrorKind::Protocol(ProtocolFault::Crc) => 33,
            ErrorKind::ResourceMismatch(MismatchKind::IncompatibleBitstream) => 34,
            ErrorKind::Protocol(ProtocolFault::Ip) => 35,
            ErrorKind::Protocol(ProtocolFault::Fifo) => 36,
            ErrorKind::Timeout(TimeoutKind::PowerResponse) => 37,
            ErrorKind::PowerDenied => 38,
            ErrorKind::PowerUnavailable => 39,
            ErrorKind::Timeout(TimeoutKind::Reactivate) => 40,
            ErrorKind::Cancelled => 41,
            ErrorKind::ResourceMismatch(MismatchKind::Port { .. }) => 42,
            ErrorKind::ResourceMismatch(MismatchKind::SlotType) => 43,
        }
    }
}
