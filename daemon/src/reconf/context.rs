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

//! Per-request state of a running workflow.
//!
//! A [`ReconfigurationContext`] is created when a request is accepted and lives until its
//! terminal event has been handed to the notifier. [`ReconfigurationContext::into_report`]
//! consumes it, so nothing can touch a context after its report exists.

use crate::reconf::bitstream::BitstreamHeader;
use crate::reconf::error::{CODE_LEFT_DEACTIVATED, CODE_OK, ErrorKind};
use crate::reconf::power::{PowerState, PowerTransactionId};
use crate::reconf::request::{
    Command, PortId, ReconfigurationRequest, ResourceKind, SessionHandle, TransactionId,
};
use crate::reconf::revoke::{RevokeOutcome, RevokeState};
use log::{debug, error, trace};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Start,
    ParsingHeader,
    NegotiatingPower,
    RevokingAfu,
    RevokingSignalTap,
    Deactivating,
    Programming,
    Reactivating,
    Completed,
    DeactivatedOnly,
    Aborted(ErrorKind),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::DeactivatedOnly | WorkflowState::Aborted(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Start => "start",
            WorkflowState::ParsingHeader => "parsing-header",
            WorkflowState::NegotiatingPower => "negotiating-power",
            WorkflowState::RevokingAfu => "revoking-afu",
            WorkflowState::RevokingSignalTap => "revoking-signaltap",
            WorkflowState::Deactivating => "deactivating",
            WorkflowState::Programming => "programming",
            WorkflowState::Reactivating => "reactivating",
            WorkflowState::Completed => "completed",
            WorkflowState::DeactivatedOnly => "deactivated-only",
            WorkflowState::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Aborted(e) => write!(f, "aborted ({e})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Sent to an owner whose resource was taken by force.
    AsyncReleaseRequested,
    ReconfigurationResult,
    ActivationChanged,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::AsyncReleaseRequested => f.write_str("async-release-requested"),
            ResponseKind::ReconfigurationResult => f.write_str("reconfiguration-result"),
            ResponseKind::ActivationChanged => f.write_str("activation-changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    /// The port was programmed but left deactivated, carrying why reactivation did not happen.
    Deactivated(ErrorKind),
    Failed(ErrorKind),
}

impl EventStatus {
    pub fn error_code(&self) -> u32 {
        match self {
            EventStatus::Ok => CODE_OK,
            EventStatus::Deactivated(_) => CODE_LEFT_DEACTIVATED,
            EventStatus::Failed(e) => e.error_code(),
        }
    }
}

pub struct ReconfigurationContext {
    request: ReconfigurationRequest,
    header: OnceLock<BitstreamHeader>,
    state: WorkflowState,
    state_tx: watch::Sender<WorkflowState>,
    failed_in: Option<WorkflowState>,
    afu_revoke: RevokeState,
    afu_revoke_attempts: u32,
    signal_tap_revoke: RevokeState,
    signal_tap_revoke_attempts: u32,
    power_transaction: Option<PowerTransactionId>,
    power_state: PowerState,
    left_deactivated_by: Option<ErrorKind>,
    started: Instant,
}

impl ReconfigurationContext {
    pub fn new(request: ReconfigurationRequest, state_tx: watch::Sender<WorkflowState>) -> Self {
        state_tx.send_replace(WorkflowState::Start);
        ReconfigurationContext {
            request,
            header: OnceLock::new(),
            state: WorkflowState::Start,
            state_tx,
            failed_in: None,
            afu_revoke: RevokeState::NotRequested,
            afu_revoke_attempts: 0,
            signal_tap_revoke: RevokeState::NotRequested,
            signal_tap_revoke_attempts: 0,
            power_transaction: None,
            power_state: PowerState::Idle,
            left_deactivated_by: None,
            started: Instant::now(),
        }
    }

    pub fn request(&self) -> &ReconfigurationRequest {
        &self.request
    }

    pub fn port(&self) -> PortId {
        self.request.port
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Move to `next`, publishing it to anyone watching the port.
    ///
    /// Leaving a terminal state is refused and logged.
    pub fn transition(&mut self, next: WorkflowState) {
        if self.state.is_terminal() {
            error!(
                "{}: refusing transition {} -> {} after termination",
                self.port(),
                self.state,
                next
            );
            return;
        }
        trace!("{}: {} -> {}", self.port(), self.state, next);
        if let WorkflowState::Aborted(e) = &next {
            debug!("{}: aborted in {}: {e}", self.port(), self.state);
            self.failed_in = Some(self.state.clone());
        }
        self.state = next;
        self.state_tx.send_replace(self.state.clone());
    }

    /// Store the decoded header. A context holds at most one header for its whole life.
    pub fn set_header(&self, header: BitstreamHeader) -> Result<&BitstreamHeader, ErrorKind> {
        self.header
            .set(header)
            .map_err(|_| ErrorKind::Internal(format!("{}: header decoded twice", self.port())))?;
        self.header
            .get()
            .ok_or_else(|| ErrorKind::Internal("header vanished after being stored".into()))
    }

    pub fn header(&self) -> Option<&BitstreamHeader> {
        self.header.get()
    }

    pub fn record_power(&mut self, transaction: PowerTransactionId, state: PowerState) {
        self.power_transaction = Some(transaction);
        self.power_state = state;
    }

    pub fn record_revoke_attempts(&mut self, kind: ResourceKind, attempts: u32) {
        match kind {
            ResourceKind::Afu => self.afu_revoke_attempts = attempts,
            ResourceKind::SignalTap => self.signal_tap_revoke_attempts = attempts,
        }
    }

    pub fn record_revoke(&mut self, kind: ResourceKind, outcome: &RevokeOutcome) {
        self.record_revoke_attempts(kind, outcome.attempts());
        match kind {
            ResourceKind::Afu => self.afu_revoke = outcome.state(),
            ResourceKind::SignalTap => self.signal_tap_revoke = outcome.state(),
        }
    }

    pub fn record_left_deactivated(&mut self, cause: ErrorKind) {
        self.left_deactivated_by = Some(cause);
    }

    /// Consume the context into its terminal report.
    ///
    /// A context that never reached a terminal state is reported as an internal failure.
    pub fn into_report(mut self) -> TerminalReport {
        if !self.state.is_terminal() {
            error!("{} reported while still {}", self.port(), self.state);
            let reason = format!("reported while still {}", self.state);
            self.transition(WorkflowState::Aborted(ErrorKind::Internal(reason)));
        }
        let status = match (&self.state, self.left_deactivated_by) {
            (WorkflowState::Aborted(e), _) => EventStatus::Failed(e.clone()),
            (WorkflowState::DeactivatedOnly, Some(cause)) => EventStatus::Deactivated(cause),
            (WorkflowState::DeactivatedOnly, None) => {
                EventStatus::Deactivated(ErrorKind::Internal("no cause recorded".into()))
            }
            _ => EventStatus::Ok,
        };
        let response_kind = match (self.request.command, &self.state) {
            (Command::Reconfigure, WorkflowState::DeactivatedOnly) => {
                ResponseKind::ActivationChanged
            }
            (Command::Reconfigure, _) => ResponseKind::ReconfigurationResult,
            (Command::Activate | Command::Deactivate, _) => ResponseKind::ActivationChanged,
        };
        TerminalReport {
            command: self.request.command,
            port: self.request.port,
            session: self.request.session,
            transaction_id: self.request.transaction_id,
            app_context: self.request.app_context,
            response_kind,
            status,
            final_state: self.state,
            failed_in: self.failed_in,
            afu_revoke: self.afu_revoke,
            afu_revoke_attempts: self.afu_revoke_attempts,
            signal_tap_revoke: self.signal_tap_revoke,
            signal_tap_revoke_attempts: self.signal_tap_revoke_attempts,
            power_transaction: self.power_transaction,
            power_state: self.power_state,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Snapshot of a finished context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalReport {
    pub command: Command,
    pub port: PortId,
    pub session: SessionHandle,
    pub transaction_id: TransactionId,
    pub app_context: u64,
    pub response_kind: ResponseKind,
    pub status: EventStatus,
    pub final_state: WorkflowState,
    /// The state the workflow was in when it aborted.
    pub failed_in: Option<WorkflowState>,
    pub afu_revoke: RevokeState,
    pub afu_revoke_attempts: u32,
    pub signal_tap_revoke: RevokeState,
    pub signal_tap_revoke_attempts: u32,
    pub power_transaction: Option<PowerTransactionId>,
    pub power_state: PowerState,
    pub elapsed: Duration,
}

impl TerminalReport {
    pub fn error_code(&self) -> u32 {
        self.status.error_code()
    }
}
