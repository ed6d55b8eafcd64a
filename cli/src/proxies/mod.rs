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

//! DBus proxy interfaces for the afupr daemon.
//!
//! - [`control_proxy`] - requests, ownership and the signals the daemon emits
//! - [`status_proxy`] - read-only queries
//!
//! # DBus Service Information
//!
//! - **Service Name**: `org.afupr.daemon`
//! - **Control Interface**: `org.afupr.control` at `/org/afupr/daemon/control`
//! - **Status Interface**: `org.afupr.status` at `/org/afupr/daemon/status`

pub mod control_proxy;
pub mod status_proxy;
