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

//! Daemon configuration.
//!
//! Values come from three layers: the user file `/etc/afupr/config.toml` overrides the vendor
//! file `/usr/lib/afupr/config.toml`, which overrides the hardcoded defaults in
//! [`system_config`]. A missing or broken file is logged and skipped, never fatal.
//!
//! ```toml
//! [timing]
//! afu_revoke_max_tries = 400
//! afu_revoke_interval_ms = 10
//!
//! [power]
//! deadline = 10
//! deadline_unit = "seconds"
//! allow_override = false
//!
//! [device]
//! platform = "sysfs"
//! ports = ["fpga0"]
//! ```

pub mod config_files;
pub mod system_config;

pub use system_config::{
    DeadlineUnit, DeviceConfig, EngineConfig, PowerConfig, SystemConfig, TimingConfig,
    system_config,
};
