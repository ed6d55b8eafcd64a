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

//! `org.afupr.status`: read-only queries. Every answer is plain text.

use crate::comm::dbus::DaemonState;
use afuprd::error::PrdError;
use afuprd::reconf::collaborators::{PortControl, PortDirectory};
use afuprd::reconf::request::PortId;
use log::info;
use std::fmt::Write;
use std::sync::Arc;
use zbus::{fdo, interface};

pub struct StatusInterface {
    state: Arc<DaemonState>,
}

impl StatusInterface {
    pub fn new(state: Arc<DaemonState>) -> Self {
        StatusInterface { state }
    }
}

#[interface(name = "org.afupr.status")]
impl StatusInterface {
    /// Current workflow step of a port, or `idle`.
    async fn get_port_state(&self, port: u32) -> Result<String, fdo::Error> {
        info!("get_port_state called with port: {port}");
        let port = PortId(port);
        if self.state.platform.lookup(port).is_none() {
            return Err(PrdError::Argument(format!("{port} does not exist")).into());
        }
        Ok(match self.state.engine.port_state(port) {
            Some(state) => state.to_string(),
            None => String::from("idle"),
        })
    }

    async fn get_active_ports(&self) -> Result<String, fdo::Error> {
        info!("get_active_ports called");
        let mut ret_string = String::new();
        for (port, state) in self.state.engine.active_ports() {
            let _ = writeln!(ret_string, "{port}:{state}");
        }
        Ok(ret_string)
    }

    /// Every port with its device handle and whether its accelerator is active.
    async fn get_ports(&self) -> Result<String, fdo::Error> {
        info!("get_ports called");
        let mut ret_string = String::new();
        for port in self.state.platform.port_ids() {
            let name = self.state.platform.port_name(port).unwrap_or_default();
            let active = self
                .state
                .platform
                .lookup(port)
                .is_some_and(|handles| handles.control.is_active());
            let activation = if active { "active" } else { "inactive" };
            let _ = writeln!(ret_string, "{port}:{name}:{activation}");
        }
        Ok(ret_string)
    }

    async fn get_resource_owners(&self) -> Result<String, fdo::Error> {
        info!("get_resource_owners called");
        let mut ret_string = String::new();
        for (resource, owners) in self.state.registry.resources() {
            let owners: Vec<&str> = owners.iter().map(|owner| owner.as_str()).collect();
            let _ = writeln!(ret_string, "{resource}:{}", owners.join(","));
        }
        Ok(ret_string)
    }

    async fn get_platform(&self) -> Result<String, fdo::Error> {
        info!("get_platform called");
        Ok(self.state.platform.platform_name().to_string())
    }
}
