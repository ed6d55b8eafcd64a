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

use zbus::{Result, proxy};

#[proxy(
    default_service = "org.afupr.daemon",
    interface = "org.afupr.status",
    default_path = "/org/afupr/daemon/status"
)]
pub trait Status {
    async fn get_port_state(&self, port: u32) -> Result<String>;
    async fn get_active_ports(&self) -> Result<String>;
    async fn get_ports(&self) -> Result<String>;
    async fn get_resource_owners(&self) -> Result<String>;
    async fn get_platform(&self) -> Result<String>;
}
