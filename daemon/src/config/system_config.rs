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

use crate::config::config_files::{TomlConfig, config_from_file};
use crate::reconf::revoke::RevokePolicy;
use log::{trace, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/afupr/config.toml";
pub static USER_CONFIG_PATH: &str = "/etc/afupr/config.toml";

// These are hardcoded backups used when neither config file provides a value.
pub static DEFAULT_PLATFORM: &str = "sysfs";
/// The driver-decided location of fpga_manager objects.
pub static FPGA_MANAGERS_DIR: &str = "/sys/class/fpga_manager/";
/// Where images are staged so the firmware loader can find them.
pub static FIRMWARE_DIR: &str = "/lib/firmware/";

pub const AFU_REVOKE_MAX_TRIES: u32 = 400;
pub const AFU_REVOKE_INTERVAL: Duration = Duration::from_millis(10);
pub const SIGNAL_TAP_REVOKE_MAX_TRIES: u32 = 400;
pub const SIGNAL_TAP_REVOKE_INTERVAL: Duration = Duration::from_millis(5);
pub const DEACTIVATE_WAIT: Duration = Duration::ZERO;
pub const OUTSTANDING_REQUEST_BUDGET: Duration = Duration::from_secs(15);
pub const DEACTIVATE_TIMEOUT: Duration = Duration::from_secs(1);
pub const REACTIVATE_TIMEOUT: Duration = Duration::from_secs(1);
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Power manager deadline, counted in [`DeadlineUnit`]s.
pub const POWER_DEADLINE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub afu_revoke: RevokePolicy,
    pub signal_tap_revoke: RevokePolicy,
    /// Pause between a completed revoke and the deactivation request.
    pub deactivate_wait: Duration,
    pub outstanding_request_budget: Duration,
    pub deactivate_timeout: Duration,
    pub reactivate_timeout: Duration,
    pub status_poll_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            afu_revoke: RevokePolicy {
                max_tries: AFU_REVOKE_MAX_TRIES,
                retry_interval: AFU_REVOKE_INTERVAL,
            },
            signal_tap_revoke: RevokePolicy {
                max_tries: SIGNAL_TAP_REVOKE_MAX_TRIES,
                retry_interval: SIGNAL_TAP_REVOKE_INTERVAL,
            },
            deactivate_wait: DEACTIVATE_WAIT,
            outstanding_request_budget: OUTSTANDING_REQUEST_BUDGET,
            deactivate_timeout: DEACTIVATE_TIMEOUT,
            reactivate_timeout: REACTIVATE_TIMEOUT,
            status_poll_interval: STATUS_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineUnit {
    #[default]
    Seconds,
    Milliseconds,
    Microseconds,
}

impl DeadlineUnit {
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            DeadlineUnit::Seconds => Duration::from_secs(amount),
            DeadlineUnit::Milliseconds => Duration::from_millis(amount),
            DeadlineUnit::Microseconds => Duration::from_micros(amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    pub deadline: Duration,
    /// Whether requests may ask to go ahead after a denied or unanswered power request.
    pub allow_override: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        PowerConfig {
            deadline: DeadlineUnit::default().duration(POWER_DEADLINE),
            allow_override: false,
        }
    }
}

/// Everything the reconfiguration engine needs to know about timing and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub timing: TimingConfig,
    pub power: PowerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Compatibility string of the platform backend.
    pub platform: String,
    pub fpga_managers_dir: PathBuf,
    pub firmware_dir: PathBuf,
    /// Device handles of the ports, in port order. Empty means every manager found.
    pub ports: Vec<String>,
    /// Ports that carry a SignalTap debug resource.
    pub signal_tap_ports: Vec<u32>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            platform: DEFAULT_PLATFORM.to_string(),
            fpga_managers_dir: PathBuf::from(FPGA_MANAGERS_DIR),
            firmware_dir: PathBuf::from(FIRMWARE_DIR),
            ports: Vec::new(),
            signal_tap_ports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemConfig {
    pub engine: EngineConfig,
    pub device: DeviceConfig,
}

static CONFIG: OnceLock<SystemConfig> = OnceLock::new();

fn load_layer(path: &Path, layer: &str) -> TomlConfig {
    config_from_file(path).unwrap_or_else(|e| {
        warn!("Using hardcoded values for {layer} config because loading config failed: {e}");
        TomlConfig::default()
    })
}

/// User config overrides vendor config and vendor config overrides hardcoded defaults
fn init_system_config() -> SystemConfig {
    let vendor_config = load_layer(Path::new(VENDOR_CONFIG_PATH), "vendor");
    let user_config = load_layer(Path::new(USER_CONFIG_PATH), "user");
    trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
    let merged: SystemConfig = user_config.merge(vendor_config).into();
    trace!("Resulting config: {merged:?}");
    merged
}

/// The process-wide configuration, loaded on first use.
pub fn system_config() -> &'static SystemConfig {
    CONFIG.get_or_init(init_system_config)
}
