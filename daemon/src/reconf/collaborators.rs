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

//! The seams between the reconfiguration engine and everything it drives.
//!
//! The engine never touches hardware, sessions or the power manager directly. Each of those is
//! reached through one of the traits below, so the daemon can plug in sysfs backed ports and
//! DBus backed messaging while tests plug in the simulated platform and recording channels.
//!
//! | trait              | implemented by                                         |
//! |--------------------|--------------------------------------------------------|
//! | [`PowerAuthority`] | `DbusPowerAuthority` in the daemon, scripted in tests  |
//! | [`ResourceBus`]    | [`crate::registry::OwnerRegistry`]                     |
//! | [`PortControl`]    | simulated and sysfs platform ports                     |
//! | [`ConfigPort`]     | simulated and sysfs platform ports                     |
//! | [`EventChannel`]   | `DbusEventChannel` in the daemon, recorders in tests   |
//! | [`PortDirectory`]  | any boxed [`crate::platforms::platform::Platform`]     |

use crate::reconf::error::ErrorKind;
use crate::reconf::notifier::Event;
use crate::reconf::power::PowerRequest;
use crate::reconf::request::{PortId, ReleaseRequest, ResourceHandle, SessionHandle};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("CollaboratorError::Unavailable: {0}")]
    Unavailable(String),
    #[error("CollaboratorError::ChannelClosed: the outbound channel has been closed")]
    ChannelClosed,
    #[error("CollaboratorError::Rejected: {0}")]
    Rejected(String),
}

/// Outbound half of the power negotiation.
pub trait PowerAuthority: Send + Sync {
    fn send_request(&self, request: PowerRequest) -> Result<(), CollaboratorError>;
}

/// Ownership of device resources by client sessions.
pub trait ResourceBus: Send + Sync {
    /// Whether the resource exists at all. A port without a debug tap reports `false` for it.
    fn has_resource(&self, resource: ResourceHandle) -> bool;
    fn owner_count(&self, resource: ResourceHandle) -> usize;
    fn owners(&self, resource: ResourceHandle) -> Vec<SessionHandle>;
    /// Ask every current owner to give the resource back.
    fn request_release(
        &self,
        resource: ResourceHandle,
        release: &ReleaseRequest,
    ) -> Result<(), CollaboratorError>;
    /// Strip every owner of the resource.
    ///
    /// # Returns: `Vec<SessionHandle>`
    /// * the owners that were revoked
    fn force_revoke(&self, resource: ResourceHandle) -> Vec<SessionHandle>;
}

/// Activation state of the accelerator behind a port.
///
/// Deactivation and activation are asynchronous on real hardware: the `begin_*` calls kick the
/// transition off and the engine polls [`PortControl::is_active`] until it settles.
pub trait PortControl: Send + Sync {
    fn is_active(&self) -> bool;
    fn begin_deactivate(&self) -> Result<(), ErrorKind>;
    fn begin_activate(&self) -> Result<(), ErrorKind>;
    /// Slot type the port accepts, if the platform can tell.
    fn slot_type_id(&self) -> Option<[u8; 16]>;
}

/// The configuration engine of a port.
#[async_trait]
pub trait ConfigPort: Send + Sync {
    async fn program(&self, region: u32, payload: &[u8]) -> Result<(), ErrorKind>;
}

/// Delivery of events to sessions.
pub trait EventChannel: Send + Sync {
    fn enqueue(&self, session: &SessionHandle, event: Event) -> Result<(), CollaboratorError>;
}

#[derive(Clone)]
pub struct PortHandles {
    pub control: Arc<dyn PortControl>,
    pub config: Arc<dyn ConfigPort>,
}

/// Lookup of the hardware handles behind a port id.
pub trait PortDirectory: Send + Sync {
    fn lookup(&self, port: PortId) -> Option<PortHandles>;
    fn port_ids(&self) -> Vec<PortId>;
}
