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

//! Ports backed by the Linux `fpga_manager` class.
//!
//! Each port is one manager under `/sys/class/fpga_manager/`. Of its attributes only these are
//! used:
//! - `state` - the manager state; the accelerator can only be active while it is `operating`
//! - `firmware` - writing a file name makes the kernel load that file from the firmware search
//!   path and program it
//!
//! The kernel interface has no notion of accelerator activation, so the port keeps an
//! activation gate of its own. Programming stages the payload as
//! `afupr-<device>-r<region>.bin` in the firmware directory before triggering the load.

use crate::config::DeviceConfig;
use crate::error::PrdError;
use crate::platforms::platform::Platform;
use crate::reconf::collaborators::{ConfigPort, PortControl, PortDirectory, PortHandles};
use crate::reconf::error::{ActivationFault, ErrorKind, ProtocolFault};
use crate::reconf::request::PortId;
use crate::system_io::{fs_read, fs_read_dir, fs_write, fs_write_bytes};
use afupr_macros::platform;
use async_trait::async_trait;
use log::{error, info, trace, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct SysfsPort {
    device_handle: String,
    manager_dir: PathBuf,
    firmware_dir: PathBuf,
    gate: AtomicBool,
}

impl SysfsPort {
    pub fn new(device_handle: &str, config: &DeviceConfig) -> Self {
        SysfsPort {
            device_handle: device_handle.to_owned(),
            manager_dir: config.fpga_managers_dir.join(device_handle),
            firmware_dir: config.firmware_dir.clone(),
            gate: AtomicBool::new(true),
        }
    }

    pub fn device_handle(&self) -> &str {
        &self.device_handle
    }

    /// Read the manager state with trailing newlines removed.
    pub fn state(&self) -> Result<String, PrdError> {
        fs_read(&self.manager_dir.join("state")).map(|s| s.trim_end_matches('\n').to_string())
    }

    fn is_operating(&self) -> bool {
        match self.state() {
            Ok(state) => state == "operating",
            Err(e) => {
                warn!("{}: cannot read state: {e}", self.device_handle);
                false
            }
        }
    }

    fn image_name(&self, region: u32) -> String {
        format!("afupr-{}-r{region}.bin", self.device_handle)
    }

    /// Stage the payload and have the kernel program it.
    fn load_image(&self, region: u32, payload: &[u8]) -> Result<(), PrdError> {
        let image_name = self.image_name(region);
        fs_write_bytes(&self.firmware_dir.join(&image_name), true, payload)?;
        fs_write(&self.manager_dir.join("firmware"), false, &image_name)?;
        let state = self.state()?;
        if state != "operating" {
            return Err(PrdError::Platform(format!(
                "After loading {image_name}, {}'s state should be 'operating' but it is '{state}'",
                self.device_handle
            )));
        }
        info!("{}'s state is 'operating'", self.device_handle);
        Ok(())
    }
}

impl PortControl for SysfsPort {
    fn is_active(&self) -> bool {
        self.gate.load(Ordering::SeqCst) && self.is_operating()
    }

    fn begin_deactivate(&self) -> Result<(), ErrorKind> {
        trace!("{}: closing activation gate", self.device_handle);
        self.gate.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn begin_activate(&self) -> Result<(), ErrorKind> {
        if !self.is_operating() {
            return Err(ErrorKind::Activation(ActivationFault::Failed));
        }
        trace!("{}: opening activation gate", self.device_handle);
        self.gate.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn slot_type_id(&self) -> Option<[u8; 16]> {
        None
    }
}

#[async_trait]
impl ConfigPort for Arc<SysfsPort> {
    async fn program(&self, region: u32, payload: &[u8]) -> Result<(), ErrorKind> {
        let port = Arc::clone(self);
        let payload = payload.to_vec();
        let loaded = tokio::task::spawn_blocking(move || port.load_image(region, &payload))
            .await
            .map_err(|e| ErrorKind::Internal(format!("programming task failed: {e}")))?;
        loaded.map_err(|e| {
            error!("{}: {e}", self.device_handle);
            ErrorKind::Protocol(ProtocolFault::Operation)
        })
    }
}

/// Ports listed in `[device] ports`, or every manager found when the list is empty.
#[platform(compat_string = "sysfs")]
#[derive(Debug)]
pub struct SysfsPlatform {
    ports: Vec<Arc<SysfsPort>>,
}

fn list_fpga_managers(dir: &Path) -> Result<Vec<String>, PrdError> {
    Ok(fs_read_dir(dir)?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

impl SysfsPlatform {
    pub fn new(config: &DeviceConfig) -> Result<Self, PrdError> {
        let handles = if config.ports.is_empty() {
            list_fpga_managers(&config.fpga_managers_dir)?
        } else {
            config.ports.clone()
        };
        for handle in &handles {
            if handle.is_empty() || !handle.is_ascii() || handle.contains('/') {
                return Err(PrdError::Argument(format!(
                    "{handle:?} is invalid name for fpga device. \
                    fpga name must be compliant with sysfs rules."
                )));
            }
        }
        trace!("creating sysfs platform for {handles:?}");
        Ok(SysfsPlatform {
            ports: handles
                .iter()
                .map(|handle| Arc::new(SysfsPort::new(handle, config)))
                .collect(),
        })
    }
}

impl PortDirectory for SysfsPlatform {
    fn lookup(&self, port: PortId) -> Option<PortHandles> {
        let sysfs = self.ports.get(port.0 as usize)?;
        Some(PortHandles {
            control: sysfs.clone(),
            config: Arc::new(sysfs.clone()),
        })
    }

    fn port_ids(&self) -> Vec<PortId> {
        (0..self.ports.len() as u32).map(PortId).collect()
    }
}

impl Platform for SysfsPlatform {
    fn platform_name(&self) -> &'static str {
        Self::COMPAT_STRING
    }

    fn port_name(&self, port: PortId) -> Option<String> {
        self.ports
            .get(port.0 as usize)
            .map(|sysfs| sysfs.device_handle().to_string())
    }
}
