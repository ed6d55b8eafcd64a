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

use crate::proxies::status_proxy::StatusProxy;
use zbus::Connection;

/// One port's workflow step as an ascii table row.
async fn get_port_state_message(proxy: &StatusProxy<'_>, port: u32) -> Result<String, zbus::Error> {
    let state = proxy.get_port_state(port).await?;
    Ok(format!(
        "---- PORT ----\n\
        | port | workflow |\n\
        | {port} | {state} |\n"
    ))
}

/// Every port, every running workflow and every resource owner.
async fn get_full_status_message(proxy: &StatusProxy<'_>) -> Result<String, zbus::Error> {
    let platform = proxy.get_platform().await?;
    let mut ret_string = format!(
        "platform: {platform}\n\n\
        ---- PORTS ----\n\
        | port | device | accelerator |\n"
    );
    for line in proxy.get_ports().await?.lines() {
        ret_string += &table_row(line);
    }
    ret_string += "\n---- WORKFLOWS ----\n\
                   | port | state |\n";
    for line in proxy.get_active_ports().await?.lines() {
        ret_string += &table_row(line);
    }
    ret_string += "\n---- OWNERS ----\n\
                   | resource | sessions |\n";
    for line in proxy.get_resource_owners().await?.lines() {
        ret_string += &table_row(line);
    }
    Ok(ret_string)
}

/// `a:b:c` as `| a | b | c |`.
fn table_row(line: &str) -> String {
    let cells: Vec<&str> = line.split(':').collect();
    format!("| {} |\n", cells.join(" | "))
}

/// Argument parser for the status command
pub async fn status_handler(port: Option<u32>) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = StatusProxy::new(&connection).await?;
    match port {
        None => get_full_status_message(&proxy).await,
        Some(port) => get_port_state_message(&proxy, port).await,
    }
}
