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

//! The partial reconfiguration engine.
//!
//! A [`ReconfigurationRequest`] submitted to the [`ReconfigurationEngine`] becomes a
//! [`workflow::ReconfigurationWorkflow`] running on its own task. The workflow parses the
//! bitstream header, negotiates power, revokes the port's resources from their owners, drives the
//! port through deactivation, programming and reactivation, and ends by emitting exactly one
//! event through the [`notifier::EventNotifier`].
//!
//! Everything outside the engine is reached through the traits in [`collaborators`].

pub mod bitstream;
pub mod cancel;
pub mod collaborators;
pub mod context;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod power;
pub mod request;
pub mod revoke;
pub mod workflow;

pub use context::{TerminalReport, WorkflowState};
pub use engine::{ReconfigurationEngine, WorkflowHandle};
pub use error::ErrorKind;
pub use request::{Command, PortId, ReconfigurationRequest, SessionHandle, TransactionId};
