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

use crate::config::system_config::{
    DeadlineUnit, DeviceConfig, EngineConfig, POWER_DEADLINE, PowerConfig, SystemConfig,
    TimingConfig,
};
use crate::error::PrdError;
use crate::reconf::revoke::RevokePolicy;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    timing: Option<TimingToml>,
    power: Option<PowerToml>,
    device: Option<DeviceToml>,
}

/// This is the "timing" section struct
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TimingToml {
    afu_revoke_max_tries: Option<u32>,
    afu_revoke_interval_ms: Option<u64>,
    signal_tap_revoke_max_tries: Option<u32>,
    signal_tap_revoke_interval_ms: Option<u64>,
    deactivate_wait_ms: Option<u64>,
    outstanding_request_timeout_ms: Option<u64>,
    deactivate_timeout_ms: Option<u64>,
    reactivate_timeout_ms: Option<u64>,
    status_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PowerToml {
    deadline: Option<u64>,
    deadline_unit: Option<DeadlineUnit>,
    allow_override: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DeviceToml {
    platform: Option<String>,
    fpga_managers_dir: Option<String>,
    firmware_dir: Option<String>,
    ports: Option<Vec<String>>,
    signal_tap_ports: Option<Vec<u32>>,
}

fn merge_section<T>(primary: Option<T>, fallback: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (primary, fallback) {
        (Some(p), Some(f)) => Some(merge(p, f)),
        (p, f) => p.or(f),
    }
}

impl TomlConfig {
    /// Combine two layers; values in `self` win.
    pub fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            timing: merge_section(self.timing, fallback.timing, TimingToml::merge),
            power: merge_section(self.power, fallback.power, PowerToml::merge),
            device: merge_section(self.device, fallback.device, DeviceToml::merge),
        }
    }
}

impl TimingToml {
    pub(crate) fn merge(self, fallback: TimingToml) -> TimingToml {
        TimingToml {
            afu_revoke_max_tries: self.afu_revoke_max_tries.or(fallback.afu_revoke_max_tries),
            afu_revoke_interval_ms: self
                .afu_revoke_interval_ms
                .or(fallback.afu_revoke_interval_ms),
            signal_tap_revoke_max_tries: self
                .signal_tap_revoke_max_tries
                .or(fallback.signal_tap_revoke_max_tries),
            signal_tap_revoke_interval_ms: self
                .signal_tap_revoke_interval_ms
                .or(fallback.signal_tap_revoke_interval_ms),
            deactivate_wait_ms: self.deactivate_wait_ms.or(fallback.deactivate_wait_ms),
            outstanding_request_timeout_ms: self
                .outstanding_request_timeout_ms
                .or(fallback.outstanding_request_timeout_ms),
            deactivate_timeout_ms: self.deactivate_timeout_ms.or(fallback.deactivate_timeout_ms),
            reactivate_timeout_ms: self.reactivate_timeout_ms.or(fallback.reactivate_timeout_ms),
            status_poll_interval_ms: self
                .status_poll_interval_ms
                .or(fallback.status_poll_interval_ms),
        }
    }
}

impl PowerToml {
    pub(crate) fn merge(self, fallback: PowerToml) -> PowerToml {
        PowerToml {
            deadline: self.deadline.or(fallback.deadline),
            deadline_unit: self.deadline_unit.or(fallback.deadline_unit),
            allow_override: self.allow_override.or(fallback.allow_override),
        }
    }
}

impl DeviceToml {
    pub(crate) fn merge(self, fallback: DeviceToml) -> DeviceToml {
        DeviceToml {
            platform: self.platform.or(fallback.platform),
            fpga_managers_dir: self.fpga_managers_dir.or(fallback.fpga_managers_dir),
            firmware_dir: self.firmware_dir.or(fallback.firmware_dir),
            ports: self.ports.or(fallback.ports),
            signal_tap_ports: self.signal_tap_ports.or(fallback.signal_tap_ports),
        }
    }
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl From<TimingToml> for TimingConfig {
    fn from(value: TimingToml) -> Self {
        let defaults = TimingConfig::default();
        TimingConfig {
            afu_revoke: RevokePolicy {
                max_tries: value
                    .afu_revoke_max_tries
                    .unwrap_or(defaults.afu_revoke.max_tries),
                retry_interval: millis_or(
                    value.afu_revoke_interval_ms,
                    defaults.afu_revoke.retry_interval,
                ),
            },
            signal_tap_revoke: RevokePolicy {
                max_tries: value
                    .signal_tap_revoke_max_tries
                    .unwrap_or(defaults.signal_tap_revoke.max_tries),
                retry_interval: millis_or(
                    value.signal_tap_revoke_interval_ms,
                    defaults.signal_tap_revoke.retry_interval,
                ),
            },
            deactivate_wait: millis_or(value.deactivate_wait_ms, defaults.deactivate_wait),
            outstanding_request_budget: millis_or(
                value.outstanding_request_timeout_ms,
                defaults.outstanding_request_budget,
            ),
            deactivate_timeout: millis_or(value.deactivate_timeout_ms, defaults.deactivate_timeout),
            reactivate_timeout: millis_or(value.reactivate_timeout_ms, defaults.reactivate_timeout),
            status_poll_interval: millis_or(
                value.status_poll_interval_ms,
                defaults.status_poll_interval,
            ),
        }
    }
}

impl From<PowerToml> for PowerConfig {
    fn from(value: PowerToml) -> Self {
        let defaults = PowerConfig::default();
        let amount = value.deadline.unwrap_or_else(|| {
            trace!("No power deadline provided. Using hardcoded amount.");
            POWER_DEADLINE
        });
        PowerConfig {
            deadline: value.deadline_unit.unwrap_or_default().duration(amount),
            allow_override: value.allow_override.unwrap_or(defaults.allow_override),
        }
    }
}

impl From<DeviceToml> for DeviceConfig {
    fn from(value: DeviceToml) -> Self {
        let defaults = DeviceConfig::default();
        DeviceConfig {
            platform: value.platform.unwrap_or_else(|| {
                trace!("No platform provided. Using hardcoded value.");
                defaults.platform
            }),
            fpga_managers_dir: value
                .fpga_managers_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.fpga_managers_dir),
            firmware_dir: value
                .firmware_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.firmware_dir),
            ports: value.ports.unwrap_or(defaults.ports),
            signal_tap_ports: value.signal_tap_ports.unwrap_or(defaults.signal_tap_ports),
        }
    }
}

impl From<TomlConfig> for SystemConfig {
    fn from(value: TomlConfig) -> Self {
        trace!("Creating SystemConfig from {value:?}");
        SystemConfig {
            engine: EngineConfig {
                timing: value.timing.unwrap_or_default().into(),
                power: value.power.unwrap_or_default().into(),
            },
            device: value.device.unwrap_or_default().into(),
        }
    }
}

pub fn toml_str_to_config(toml_string: &str) -> Result<TomlConfig, PrdError> {
    toml::from_str(toml_string).map_err(|e| PrdError::TomlDe {
        toml_string: toml_string.into(),
        e,
    })
}

pub fn config_from_file(file_path: &Path) -> Result<TomlConfig, PrdError> {
    if !file_path.is_file() {
        return Err(PrdError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    toml_str_to_config(&fs_read(file_path)?)
}
