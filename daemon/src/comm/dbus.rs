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

//! DBus shell of the daemon.
//!
//! Two objects are served on the system bus under `org.afupr.daemon`:
//! - `/org/afupr/daemon/control` ([`control_interface`]) takes requests and emits the
//!   `reconfiguration_event`, `power_request` and `release_requested` signals
//! - `/org/afupr/daemon/status` ([`status_interface`]) answers read-only queries
//!
//! The engine never talks to the bus itself. Its collaborators ([`DbusEventChannel`],
//! [`DbusPowerAuthority`] and [`DbusReleaseListener`]) push [`Outbound`] messages onto one
//! unbounded channel, and [`forward_signals`] drains that channel into signal emissions.
//! A session is the unique bus name of the caller.

pub mod control_interface;
pub mod status_interface;

use crate::comm::dbus::control_interface::ControlInterface;
use afuprd::error::PrdError;
use afuprd::platforms::platform::Platform;
use afuprd::reconf::ReconfigurationEngine;
use afuprd::reconf::collaborators::{CollaboratorError, EventChannel, PowerAuthority};
use afuprd::reconf::notifier::Event;
use afuprd::reconf::power::PowerRequest;
use afuprd::reconf::request::{ReleaseRequest, ResourceHandle, ResourceKind, SessionHandle};
use afuprd::registry::{OwnerRegistry, ReleaseListener};
use afuprd::system_io::fs_read_bytes;
use log::{error, trace};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use zbus::Connection;
use zbus::message::Header;

pub const SERVICE_NAME: &str = "org.afupr.daemon";
pub const CONTROL_PATH: &str = "/org/afupr/daemon/control";
pub const STATUS_PATH: &str = "/org/afupr/daemon/status";

/// Everything the DBus objects share.
pub struct DaemonState {
    pub engine: ReconfigurationEngine,
    pub registry: Arc<OwnerRegistry>,
    pub platform: Arc<dyn Platform>,
}

/// A message on its way to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event {
        session: SessionHandle,
        event: Event,
    },
    PowerRequest(PowerRequest),
    ReleaseRequested {
        owner: SessionHandle,
        resource: ResourceHandle,
        release: ReleaseRequest,
    },
}

fn push(tx: &mpsc::UnboundedSender<Outbound>, message: Outbound) -> Result<(), CollaboratorError> {
    tx.send(message).map_err(|_| CollaboratorError::ChannelClosed)
}

pub struct DbusEventChannel {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl DbusEventChannel {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        DbusEventChannel { tx }
    }
}

impl EventChannel for DbusEventChannel {
    fn enqueue(&self, session: &SessionHandle, event: Event) -> Result<(), CollaboratorError> {
        push(
            &self.tx,
            Outbound::Event {
                session: session.clone(),
                event,
            },
        )
    }
}

/// Broadcasts power requests; answers come back through `power_response`.
pub struct DbusPowerAuthority {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl DbusPowerAuthority {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        DbusPowerAuthority { tx }
    }
}

impl PowerAuthority for DbusPowerAuthority {
    fn send_request(&self, request: PowerRequest) -> Result<(), CollaboratorError> {
        push(&self.tx, Outbound::PowerRequest(request))
    }
}

pub struct DbusReleaseListener {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl DbusReleaseListener {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        DbusReleaseListener { tx }
    }
}

impl ReleaseListener for DbusReleaseListener {
    fn release_requested(
        &self,
        owner: &SessionHandle,
        resource: ResourceHandle,
        release: &ReleaseRequest,
    ) -> Result<(), CollaboratorError> {
        push(
            &self.tx,
            Outbound::ReleaseRequested {
                owner: owner.clone(),
                resource,
                release: release.clone(),
            },
        )
    }
}

/// Emit every queued message as a signal of the control object until the channel closes.
pub async fn forward_signals(conn: Connection, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let iface = match conn
        .object_server()
        .interface::<_, ControlInterface>(CONTROL_PATH)
        .await
    {
        Ok(iface) => iface,
        Err(e) => {
            error!("Cannot emit signals, {CONTROL_PATH} is not served: {e}");
            return;
        }
    };
    let emitter = iface.signal_emitter();
    while let Some(message) = rx.recv().await {
        trace!("Emitting {message:?}");
        let emitted = match message {
            Outbound::Event { session, event } => {
                ControlInterface::reconfiguration_event(
                    emitter,
                    session.as_str(),
                    &event.response_kind.to_string(),
                    &event.device.to_string(),
                    event.transaction_id.0,
                    event.app_context,
                    event.error_code(),
                )
                .await
            }
            Outbound::PowerRequest(request) => {
                ControlInterface::power_request(
                    emitter,
                    request.transaction_id.0,
                    request.power_watts,
                )
                .await
            }
            Outbound::ReleaseRequested {
                owner,
                resource,
                release,
            } => {
                ControlInterface::release_requested(
                    emitter,
                    owner.as_str(),
                    &resource.to_string(),
                    release.requester.as_str(),
                    release.transaction_id.0,
                    release.grace.as_millis() as u64,
                )
                .await
            }
        };
        if let Err(e) = emitted {
            error!("Failed to emit signal: {e}");
        }
    }
    trace!("Signal channel closed");
}

/// The caller of a method call.
pub(crate) fn session_of(header: &Header<'_>) -> Result<SessionHandle, PrdError> {
    header
        .sender()
        .map(|sender| SessionHandle::new(sender.as_str()))
        .ok_or_else(|| PrdError::Argument(String::from("method call has no sender")))
}

pub(crate) fn parse_resource_kind(kind: &str) -> Result<ResourceKind, PrdError> {
    kind.parse().map_err(PrdError::Argument)
}

/// Read a bitstream file named by a client.
pub(crate) fn read_bitstream(bitstream_path_str: &str) -> Result<Vec<u8>, PrdError> {
    let path = Path::new(bitstream_path_str);
    if !path.is_absolute() || !path.is_file() {
        return Err(PrdError::Argument(format!(
            "{bitstream_path_str} is not a valid path to a bitstream file."
        )));
    }
    fs_read_bytes(path)
}
