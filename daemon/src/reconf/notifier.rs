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

//! Events delivered to sessions.
//!
//! The [`EventNotifier`] turns terminal reports and forced revokes into [`Event`]s and hands
//! them to an [`EventChannel`]. Delivery failures are logged and otherwise ignored: a workflow
//! has already finished by the time its event is sent and nothing can be rolled back.

use crate::reconf::collaborators::EventChannel;
use crate::reconf::context::{EventStatus, ResponseKind, TerminalReport};
use crate::reconf::request::{ResourceHandle, SessionHandle, TransactionId};
use log::{error, info};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub response_kind: ResponseKind,
    pub device: ResourceHandle,
    pub transaction_id: TransactionId,
    pub app_context: u64,
    pub status: EventStatus,
}

impl Event {
    pub fn error_code(&self) -> u32 {
        self.status.error_code()
    }
}

pub struct EventNotifier {
    channel: Arc<dyn EventChannel>,
}

impl EventNotifier {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        EventNotifier { channel }
    }

    /// Send the one terminal event of a finished workflow to its requester.
    pub fn dispatch_terminal(&self, report: &TerminalReport) {
        let event = Event {
            response_kind: report.response_kind,
            device: ResourceHandle::afu(report.port),
            transaction_id: report.transaction_id,
            app_context: report.app_context,
            status: report.status.clone(),
        };
        info!(
            "{} {} for {} finished as {} (code {})",
            report.command,
            report.transaction_id,
            report.session,
            report.final_state,
            event.error_code()
        );
        self.send(&report.session, event);
    }

    /// Tell an owner its resource has been taken away.
    pub fn dispatch_release(
        &self,
        owner: &SessionHandle,
        device: ResourceHandle,
        transaction_id: TransactionId,
        app_context: u64,
    ) {
        let event = Event {
            response_kind: ResponseKind::AsyncReleaseRequested,
            device,
            transaction_id,
            app_context,
            status: EventStatus::Ok,
        };
        self.send(owner, event);
    }

    fn send(&self, session: &SessionHandle, event: Event) {
        let kind = event.response_kind;
        if let Err(e) = self.channel.enqueue(session, event) {
            error!("Failed to deliver {kind} event to {session}: {e}");
        }
    }
}
