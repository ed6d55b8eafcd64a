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

//! afupr daemon (afuprd) - system service orchestrating partial reconfiguration.
//!
//! The daemon exposes the reconfiguration engine of [`afuprd`] on the system bus:
//! - **Service Name**: `org.afupr.daemon`
//! - **Control Interface**: `/org/afupr/daemon/control` - requests, ownership, power answers
//! - **Status Interface**: `/org/afupr/daemon/status` - read-only operations
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! # Startup
//!
//! 1. Register the available platform backends
//! 2. Load the layered config and construct the configured platform
//! 3. Register every port's accelerator (and configured SignalTaps) as an ownable resource
//! 4. Build the engine on top of the DBus backed collaborators
//! 5. Serve both objects and forward engine messages as signals until SIGINT or SIGTERM

mod comm;

use crate::comm::dbus::{
    CONTROL_PATH, DaemonState, DbusEventChannel, DbusPowerAuthority, DbusReleaseListener,
    SERVICE_NAME, STATUS_PATH, control_interface::ControlInterface, forward_signals,
    status_interface::StatusInterface,
};
use afuprd::config::system_config;
use afuprd::platforms::platform::{Platform, platform_for_known_platform};
use afuprd::platforms::simulated::SimulatedPlatform;
#[cfg(feature = "sysfs")]
use afuprd::platforms::sysfs::SysfsPlatform;
use afuprd::reconf::ReconfigurationEngine;
use afuprd::reconf::collaborators::PortDirectory;
use afuprd::reconf::request::{PortId, ResourceHandle};
use afuprd::registry::OwnerRegistry;
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use zbus::connection;

const SIGNAL_DRAIN: Duration = Duration::from_millis(100);

/// Register all available platform implementations.
fn register_platforms() {
    #[cfg(feature = "sysfs")]
    SysfsPlatform::register_platform();
    SimulatedPlatform::register_platform();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    register_platforms();

    let config = system_config();
    let platform: Arc<dyn Platform> = Arc::from(platform_for_known_platform(
        &config.device.platform,
        &config.device,
    )?);
    info!(
        "Using platform {} with {} port(s)",
        platform.platform_name(),
        platform.port_ids().len()
    );

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(OwnerRegistry::with_release_listener(Arc::new(
        DbusReleaseListener::new(outbound_tx.clone()),
    )));
    for port in platform.port_ids() {
        registry.add_resource(ResourceHandle::afu(port));
    }
    for port in &config.device.signal_tap_ports {
        registry.add_resource(ResourceHandle::signal_tap(PortId(*port)));
    }

    let ports: Arc<dyn PortDirectory> = platform.clone();
    let engine = ReconfigurationEngine::new(
        ports,
        registry.clone(),
        Arc::new(DbusPowerAuthority::new(outbound_tx.clone())),
        Arc::new(DbusEventChannel::new(outbound_tx)),
        config.engine,
    );
    let state = Arc::new(DaemonState {
        engine,
        registry,
        platform,
    });

    let conn = connection::Builder::system()?
        .name(SERVICE_NAME)?
        .serve_at(STATUS_PATH, StatusInterface::new(state.clone()))?
        .serve_at(CONTROL_PATH, ControlInterface::new(state.clone()))?
        .build()
        .await?;
    let forwarder = tokio::spawn(forward_signals(conn.clone(), outbound_rx));
    info!("Started {SERVICE_NAME} dbus service");

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = terminate.recv() => info!("Terminated"),
    }

    // Cancelled workflows still emit their terminal events; give the forwarder time to send them.
    state.engine.shutdown().await;
    tokio::time::sleep(SIGNAL_DRAIN).await;
    forwarder.abort();
    Ok(())
}
