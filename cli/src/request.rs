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

//! Commands that start a workflow and wait for its outcome.
//!
//! The daemon answers a request as soon as it is accepted; the outcome is a
//! `reconfiguration_event` signal addressed to our unique bus name. The signal stream is opened
//! before the request is sent so the event cannot be missed.

use crate::proxies::control_proxy::{ControlProxy, ReconfigurationEventStream};
use futures_util::StreamExt;
use log::{debug, trace};
use std::path::Path;
use std::time::Duration;
use zbus::Connection;

/// Codes carried by `reconfiguration_event`, as the daemon assigns them.
pub fn describe_code(code: u32) -> &'static str {
    match code {
        0 => "ok",
        8 => "internal error",
        12 => "malformed bitstream",
        24 => "no such port",
        26 => "device busy",
        27 => "no accelerator present",
        28 => "accelerator already active",
        29 => "activation failed",
        30 => "deactivation timed out",
        31 => "programming timed out",
        32 => "operation error",
        33 => "CRC error",
        34 => "incompatible bitstream",
        35 => "IP protocol error",
        36 => "FIFO error",
        37 => "power manager did not answer",
        38 => "power denied",
        39 => "power manager unavailable",
        40 => "reactivation timed out",
        41 => "cancelled",
        42 => "bitstream targets another port",
        43 => "slot type mismatch",
        44 => "left deactivated",
        _ => "unknown",
    }
}

/// Options shared by every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub port: u32,
    pub transaction_id: u64,
    pub app_context: u64,
    /// How long to wait for the outcome; `None` returns once the request is accepted.
    pub wait: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconfigureOptions {
    pub region: u32,
    pub leave_deactivated: bool,
    pub timeout_ms: u64,
    pub honor_owner: bool,
    pub proceed_without_power_grant: bool,
}

/// The daemon needs an absolute path it can open itself.
fn absolute_bitstream_path(file: &Path) -> Result<String, zbus::Error> {
    let path = std::fs::canonicalize(file).map_err(|e| {
        zbus::Error::Failure(format!("Cannot use bitstream {file:?}: {e}"))
    })?;
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| zbus::Error::Failure(format!("{path:?} is not valid UTF-8")))
}

pub fn format_outcome(response_kind: &str, device: &str, error_code: u32) -> String {
    format!(
        "{response_kind} on {device}: {} (code {error_code})",
        describe_code(error_code)
    )
}

async fn await_outcome(
    mut events: ReconfigurationEventStream,
    session: &str,
    transaction_id: u64,
    wait: Duration,
) -> Result<String, zbus::Error> {
    let outcome = tokio::time::timeout(wait, async {
        while let Some(signal) = events.next().await {
            let args = signal.args()?;
            trace!("event for {} ({})", args.session(), args.transaction_id());
            if *args.session() == session && *args.transaction_id() == transaction_id {
                return Ok(format_outcome(
                    args.response_kind(),
                    args.device(),
                    *args.error_code(),
                ));
            }
        }
        Err(zbus::Error::Failure(String::from(
            "daemon went away before reporting an outcome",
        )))
    })
    .await;
    outcome.unwrap_or_else(|_| {
        Err(zbus::Error::Failure(format!(
            "no outcome within {}s; the request may still be running",
            wait.as_secs()
        )))
    })
}

async fn run_request<F>(options: RequestOptions, send: F) -> Result<String, zbus::Error>
where
    F: AsyncFnOnce(&ControlProxy<'static>) -> Result<String, zbus::Error>,
{
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    let session = connection
        .unique_name()
        .map(|name| name.to_string())
        .ok_or_else(|| zbus::Error::Failure(String::from("no unique name on the bus")))?;
    let events = proxy.receive_reconfiguration_event().await?;
    let accepted = send(&proxy).await?;
    debug!("{accepted}");
    match options.wait {
        Some(wait) => await_outcome(events, &session, options.transaction_id, wait).await,
        None => Ok(accepted),
    }
}

pub async fn reconfigure_handler(
    file: &Path,
    options: RequestOptions,
    reconf: ReconfigureOptions,
) -> Result<String, zbus::Error> {
    let bitstream = absolute_bitstream_path(file)?;
    run_request(options, async |proxy| {
        proxy
            .reconfigure(
                options.port,
                &bitstream,
                reconf.region,
                reconf.leave_deactivated,
                reconf.timeout_ms,
                reconf.honor_owner,
                reconf.proceed_without_power_grant,
                options.transaction_id,
                options.app_context,
            )
            .await
    })
    .await
}

pub async fn activate_handler(options: RequestOptions) -> Result<String, zbus::Error> {
    run_request(options, async |proxy| {
        proxy
            .activate(options.port, options.transaction_id, options.app_context)
            .await
    })
    .await
}

pub async fn deactivate_handler(
    options: RequestOptions,
    timeout_ms: u64,
    honor_owner: bool,
) -> Result<String, zbus::Error> {
    run_request(options, async |proxy| {
        proxy
            .deactivate(
                options.port,
                timeout_ms,
                honor_owner,
                options.transaction_id,
                options.app_context,
            )
            .await
    })
    .await
}
