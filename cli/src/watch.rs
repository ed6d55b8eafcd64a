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

use crate::proxies::control_proxy::ControlProxy;
use crate::request::format_outcome;
use futures_util::StreamExt;
use zbus::Connection;

/// Print every signal of the control object until interrupted.
pub async fn watch_handler() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    let mut events = proxy.receive_reconfiguration_event().await?;
    let mut power_requests = proxy.receive_power_request().await?;
    let mut release_requests = proxy.receive_release_requested().await?;
    loop {
        tokio::select! {
            Some(signal) = events.next() => {
                let args = signal.args()?;
                println!(
                    "[{} txn {} ctx {}] {}",
                    args.session(),
                    args.transaction_id(),
                    args.app_context(),
                    format_outcome(args.response_kind(), args.device(), *args.error_code())
                );
            }
            Some(signal) = power_requests.next() => {
                let args = signal.args()?;
                println!(
                    "[power] request {} for {} W",
                    args.transaction_id(),
                    args.power_watts()
                );
            }
            Some(signal) = release_requests.next() => {
                let args = signal.args()?;
                println!(
                    "[{}] asked to release {} for {} (txn {}, grace {} ms)",
                    args.owner(),
                    args.device(),
                    args.requester(),
                    args.transaction_id(),
                    args.grace_ms()
                );
            }
            _ = tokio::signal::ctrl_c() => break,
            else => break,
        }
    }
    Ok(String::new())
}
