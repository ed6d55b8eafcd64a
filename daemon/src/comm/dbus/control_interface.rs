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

//! `org.afupr.control`: requests that change the device or its ownership.
//!
//! Reconfigure, activate and deactivate calls return as soon as the engine has accepted the
//! request. Their outcome arrives later as a `reconfiguration_event` signal carrying the
//! caller's unique name, the transaction id and application context it passed in, and the
//! numeric error code (0 on success, 44 when the port was left deactivated).

use crate::comm::dbus::{DaemonState, parse_resource_kind, read_bitstream, session_of};
use afuprd::error::PrdError;
use afuprd::reconf::power::{PowerResponse, PowerTransactionId};
use afuprd::reconf::request::{
    PortId, ReconfAction, ReconfigurationRequest, ResourceHandle, TransactionId,
};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use zbus::message::Header;
use zbus::object_server::SignalEmitter;
use zbus::{fdo, interface};

pub struct ControlInterface {
    state: Arc<DaemonState>,
}

impl ControlInterface {
    pub fn new(state: Arc<DaemonState>) -> Self {
        ControlInterface { state }
    }

    async fn submit(&self, request: ReconfigurationRequest) -> Result<String, fdo::Error> {
        let command = request.command;
        let handle = self
            .state
            .engine
            .submit(request)
            .await
            .map_err(PrdError::from)?;
        Ok(format!(
            "{command} of {} accepted as {}",
            handle.port(),
            handle.transaction_id()
        ))
    }
}

fn action(honor_owner: bool) -> ReconfAction {
    if honor_owner {
        ReconfAction::HonorOwner
    } else {
        ReconfAction::HonorRequest
    }
}

#[interface(name = "org.afupr.control")]
impl ControlInterface {
    #[allow(clippy::too_many_arguments)]
    async fn reconfigure(
        &self,
        #[zbus(header)] header: Header<'_>,
        port: u32,
        bitstream_path_str: &str,
        region: u32,
        leave_deactivated: bool,
        timeout_ms: u64,
        honor_owner: bool,
        proceed_without_power_grant: bool,
        transaction_id: u64,
        app_context: u64,
    ) -> Result<String, fdo::Error> {
        info!(
            "reconfigure called with port: {port}, bitstream_path_str: {bitstream_path_str} \
            and region: {region}"
        );
        let session = session_of(&header)?;
        let bitstream = read_bitstream(bitstream_path_str)?;
        let request = ReconfigurationRequest::reconfigure(PortId(port), bitstream, session)
            .with_region(region)
            .leave_deactivated(leave_deactivated)
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_action(action(honor_owner))
            .proceed_without_power_grant(proceed_without_power_grant)
            .with_transaction_id(TransactionId(transaction_id))
            .with_app_context(app_context);
        self.submit(request).await
    }

    async fn activate(
        &self,
        #[zbus(header)] header: Header<'_>,
        port: u32,
        transaction_id: u64,
        app_context: u64,
    ) -> Result<String, fdo::Error> {
        info!("activate called with port: {port}");
        let session = session_of(&header)?;
        let request = ReconfigurationRequest::activate(PortId(port), session)
            .with_transaction_id(TransactionId(transaction_id))
            .with_app_context(app_context);
        self.submit(request).await
    }

    async fn deactivate(
        &self,
        #[zbus(header)] header: Header<'_>,
        port: u32,
        timeout_ms: u64,
        honor_owner: bool,
        transaction_id: u64,
        app_context: u64,
    ) -> Result<String, fdo::Error> {
        info!("deactivate called with port: {port}");
        let session = session_of(&header)?;
        let request = ReconfigurationRequest::deactivate(PortId(port), session)
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_action(action(honor_owner))
            .with_transaction_id(TransactionId(transaction_id))
            .with_app_context(app_context);
        self.submit(request).await
    }

    /// Become an owner of the accelerator (`afu`) or debug tap (`signaltap`) of a port.
    async fn bind_resource(
        &self,
        #[zbus(header)] header: Header<'_>,
        port: u32,
        kind: &str,
    ) -> Result<String, fdo::Error> {
        info!("bind_resource called with port: {port} and kind: {kind}");
        let session = session_of(&header)?;
        let resource = ResourceHandle {
            port: PortId(port),
            kind: parse_resource_kind(kind)?,
        };
        self.state.registry.bind(resource, session.clone())?;
        Ok(format!("{resource} bound to {session}"))
    }

    async fn release_resource(
        &self,
        #[zbus(header)] header: Header<'_>,
        port: u32,
        kind: &str,
    ) -> Result<String, fdo::Error> {
        info!("release_resource called with port: {port} and kind: {kind}");
        let session = session_of(&header)?;
        let resource = ResourceHandle {
            port: PortId(port),
            kind: parse_resource_kind(kind)?,
        };
        if !self.state.registry.release(resource, &session) {
            return Err(PrdError::Argument(format!("{session} does not own {resource}")).into());
        }
        Ok(format!("{resource} released by {session}"))
    }

    /// Answer of the power manager to a `power_request` signal.
    async fn power_response(&self, transaction_id: u64, granted: bool) -> Result<String, fdo::Error> {
        info!("power_response called with transaction_id: {transaction_id} and granted: {granted}");
        let transaction_id = PowerTransactionId(transaction_id);
        let delivered = self.state.engine.deliver_power_response(PowerResponse {
            transaction_id,
            granted,
        });
        Ok(match delivered {
            true => format!("{transaction_id} delivered"),
            false => format!("{transaction_id} is not pending; answer discarded"),
        })
    }

    /// Cancel whatever runs on a port that is being removed.
    async fn teardown_port(&self, port: u32) -> Result<String, fdo::Error> {
        info!("teardown_port called with port: {port}");
        let port = PortId(port);
        Ok(match self.state.engine.teardown_port(port).await {
            true => format!("{port}: workflow cancelled"),
            false => format!("{port}: nothing to cancel"),
        })
    }

    #[zbus(signal)]
    pub async fn reconfiguration_event(
        emitter: &SignalEmitter<'_>,
        session: &str,
        response_kind: &str,
        device: &str,
        transaction_id: u64,
        app_context: u64,
        error_code: u32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn power_request(
        emitter: &SignalEmitter<'_>,
        transaction_id: u64,
        power_watts: u32,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn release_requested(
        emitter: &SignalEmitter<'_>,
        owner: &str,
        device: &str,
        requester: &str,
        transaction_id: u64,
        grace_ms: u64,
    ) -> zbus::Result<()>;
}
