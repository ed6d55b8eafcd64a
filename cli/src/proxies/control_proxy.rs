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
    interface = "org.afupr.control",
    default_path = "/org/afupr/daemon/control"
)]
pub trait Control {
    async fn reconfigure(
        &self,
        port: u32,
        bitstream_path_str: &str,
        region: u32,
        leave_deactivated: bool,
        timeout_ms: u64,
        honor_owner: bool,
        proceed_without_power_grant: bool,
        transaction_id: u64,
        app_context: u64,
    ) -> Result<String>;

    async fn activate(&self, port: u32, transaction_id: u64, app_context: u64) -> Result<String>;

    async fn deactivate(
        &self,
        port: u32,
        timeout_ms: u64,
        honor_owner: bool,
        transaction_id: u64,
        app_context: u64,
    ) -> Result<String>;

    async fn bind_resource(&self, port: u32, kind: &str) -> Result<String>;
    async fn release_resource(&self, port: u32, kind: &str) -> Result<String>;
    async fn power_response(&self, transaction_id: u64, granted: bool) -> Result<String>;
    async fn teardown_port(&self, port: u32) -> Result<String>;

    #[zbus(signal)]
    fn reconfiguration_event(
        &self,
        session: &str,
        response_kind: &str,
        device: &str,
        transaction_id: u64,
        app_context: u64,
        error_code: u32,
    ) -> Result<()>;

    #[zbus(signal)]
    fn power_request(&self, transaction_id: u64, power_watts: u32) -> Result<()>;

    #[zbus(signal)]
    fn release_requested(
        &self,
        owner: &str,
        device: &str,
        requester: &str,
        transaction_id: u64,
        grace_ms: u64,
    ) -> Result<()>;
}
