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

//! Identifiers and the request record that starts a workflow.
//!
//! A [`ReconfigurationRequest`] is built by the request surface (DBus, tests) and handed to
//! [`crate::reconf::engine::ReconfigurationEngine::submit`]. The builder methods keep the
//! defaults in one place so callers only state what differs.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! # use afuprd::reconf::request::*;
//! let request = ReconfigurationRequest::reconfigure(PortId(0), vec![0u8; 700], SessionHandle::new(":1.42"))
//!     .with_timeout(Duration::from_millis(50))
//!     .with_transaction_id(TransactionId(7));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Index of a partial-reconfiguration port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Opaque handle of the client session that owns resources or submitted a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        SessionHandle(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Afu,
    SignalTap,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Afu => f.write_str("afu"),
            ResourceKind::SignalTap => f.write_str("signaltap"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "afu" => Ok(ResourceKind::Afu),
            "signaltap" | "stp" => Ok(ResourceKind::SignalTap),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

/// A device object that sessions may own: the accelerator on a port or its debug tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle {
    pub port: PortId,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    pub fn afu(port: PortId) -> Self {
        ResourceHandle {
            port,
            kind: ResourceKind::Afu,
        }
    }

    pub fn signal_tap(port: PortId) -> Self {
        ResourceHandle {
            port,
            kind: ResourceKind::SignalTap,
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.kind)
    }
}

/// Requester-chosen correlation id, echoed back in every event for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reconfigure,
    Activate,
    Deactivate,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reconfigure => f.write_str("reconfigure"),
            Command::Activate => f.write_str("activate"),
            Command::Deactivate => f.write_str("deactivate"),
        }
    }
}

/// How a workflow treats owners that do not release within the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconfAction {
    /// Escalate to a forced revoke once the retry ladder runs out.
    #[default]
    HonorRequest,
    /// Give up with [`crate::reconf::error::ErrorKind::DeviceBusy`] instead of revoking.
    HonorOwner,
}

impl fmt::Display for ReconfAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconfAction::HonorRequest => f.write_str("honor-request"),
            ReconfAction::HonorOwner => f.write_str("honor-owner"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconfigurationRequest {
    pub command: Command,
    pub port: PortId,
    /// Header plus payload. Only meaningful for [`Command::Reconfigure`].
    pub bitstream: Arc<[u8]>,
    pub region: u32,
    pub leave_deactivated: bool,
    /// Grace period granted to owners between the release request and the first revoke tick.
    pub timeout: Duration,
    pub transaction_id: TransactionId,
    pub session: SessionHandle,
    pub app_context: u64,
    pub action: ReconfAction,
    pub proceed_without_power_grant: bool,
}

impl ReconfigurationRequest {
    fn new(command: Command, port: PortId, session: SessionHandle) -> Self {
        ReconfigurationRequest {
            command,
            port,
            bitstream: Arc::from(Vec::new()),
            region: 0,
            leave_deactivated: false,
            timeout: Duration::ZERO,
            transaction_id: TransactionId::default(),
            session,
            app_context: 0,
            action: ReconfAction::default(),
            proceed_without_power_grant: false,
        }
    }

    pub fn reconfigure(port: PortId, bitstream: impl Into<Arc<[u8]>>, session: SessionHandle) -> Self {
        let mut request = Self::new(Command::Reconfigure, port, session);
        request.bitstream = bitstream.into();
        request
    }

    pub fn activate(port: PortId, session: SessionHandle) -> Self {
        Self::new(Command::Activate, port, session)
    }

    pub fn deactivate(port: PortId, session: SessionHandle) -> Self {
        Self::new(Command::Deactivate, port, session)
    }

    pub fn with_region(mut self, region: u32) -> Self {
        self.region = region;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_app_context(mut self, app_context: u64) -> Self {
        self.app_context = app_context;
        self
    }

    pub fn with_action(mut self, action: ReconfAction) -> Self {
        self.action = action;
        self
    }

    pub fn leave_deactivated(mut self, leave_deactivated: bool) -> Self {
        self.leave_deactivated = leave_deactivated;
        self
    }

    pub fn proceed_without_power_grant(mut self, proceed: bool) -> Self {
        self.proceed_without_power_grant = proceed;
        self
    }
}

/// Sent to current owners of a resource that a workflow needs back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub requester: SessionHandle,
    pub transaction_id: TransactionId,
    pub action: ReconfAction,
    pub grace: Duration,
}
