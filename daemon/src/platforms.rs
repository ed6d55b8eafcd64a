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

//! Hardware backends.
//!
//! A platform maps port ids to the [`PortControl`](crate::reconf::collaborators::PortControl)
//! and [`ConfigPort`](crate::reconf::collaborators::ConfigPort) handles the engine drives.
//! Backends register themselves by compatibility string (see [`platform`]) and are selected by
//! the `[device] platform` config key.
//!
//! - [`simulated`] - in-memory ports with scriptable faults, used by tests and dry runs
//! - `sysfs` (feature `sysfs`) - ports backed by the Linux `fpga_manager` class

pub mod platform;
pub mod simulated;
#[cfg(feature = "sysfs")]
pub mod sysfs;
