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

//! The reconfiguration state machine.
//!
//! One [`ReconfigurationWorkflow`] drives one [`ReconfigurationContext`] from `Start` to a
//! terminal state. A reconfigure walks
//!
//! ```text
//! Start -> ParsingHeader -> NegotiatingPower -> RevokingAfu -> [RevokingSignalTap]
//!       -> Deactivating -> Programming -> Reactivating -> Completed
//! ```
//!
//! and may leave from any state to `Aborted`, or from `Reactivating` to `DeactivatedOnly` when
//! the requester asked for the port to be left deactivated if it does not come back. A port
//! whose accelerator is already inactive skips the accelerator revoke and the deactivation.
//!
//! Activate and deactivate requests reuse the same steps with shorter paths.
//!
//! Whatever happens, [`ReconfigurationWorkflow::run`] ends by handing exactly one terminal
//! report to the [`EventNotifier`]. Every wait is raced against the workflow's
//! [`CancelToken`], and every step checks the token before it starts.

use crate::config::EngineConfig;
use crate::reconf::bitstream::BitstreamHeader;
use crate::reconf::cancel::CancelToken;
use crate::reconf::collaborators::{PortHandles, ResourceBus};
use crate::reconf::context::{ReconfigurationContext, TerminalReport, WorkflowState};
use crate::reconf::error::{ActivationFault, ErrorKind, MismatchKind, TimeoutKind};
use crate::reconf::notifier::EventNotifier;
use crate::reconf::power::{PowerNegotiator, PowerOutcome, PowerState};
use crate::reconf::request::{Command, ReleaseRequest, ResourceHandle};
use crate::reconf::revoke::{
    Afu, RevocableResource, RevokeCoordinator, RevokeOutcome, RevokePolicy, SignalTap,
};
use log::{error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Collaborators shared by every workflow of an engine.
pub struct WorkflowDeps {
    pub bus: Arc<dyn ResourceBus>,
    pub power: Arc<PowerNegotiator>,
    pub notifier: Arc<EventNotifier>,
    pub config: EngineConfig,
}

pub struct ReconfigurationWorkflow {
    ctx: ReconfigurationContext,
    port: PortHandles,
    deps: Arc<WorkflowDeps>,
    cancel: CancelToken,
}

impl ReconfigurationWorkflow {
    pub fn new(
        ctx: ReconfigurationContext,
        port: PortHandles,
        deps: Arc<WorkflowDeps>,
        cancel: CancelToken,
    ) -> Self {
        ReconfigurationWorkflow {
            ctx,
            port,
            deps,
            cancel,
        }
    }

    /// Drive the context to a terminal state and notify the requester.
    ///
    /// # Returns: `TerminalReport`
    /// * the report that was handed to the notifier
    pub async fn run(mut self) -> TerminalReport {
        let request = self.ctx.request();
        let command = request.command;
        info!(
            "Starting {command} of {} for {} ({})",
            request.port, request.session, request.transaction_id
        );
        let outcome = if self.cancel.is_cancelled() {
            // Superseded or torn down before it got to start.
            Err(ErrorKind::Cancelled)
        } else {
            match command {
                Command::Reconfigure => self.reconfigure().await,
                Command::Activate => self.activate().await,
                Command::Deactivate => self.deactivate().await,
            }
        };
        let terminal = outcome.unwrap_or_else(WorkflowState::Aborted);
        self.ctx.transition(terminal);
        self.notify()
    }

    fn notify(self) -> TerminalReport {
        let report = self.ctx.into_report();
        self.deps.notifier.dispatch_terminal(&report);
        report
    }

    /// Move to the next step unless the workflow has been cancelled.
    fn enter(&mut self, next: WorkflowState) -> Result<(), ErrorKind> {
        if self.cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }
        self.ctx.transition(next);
        Ok(())
    }

    async fn reconfigure(&mut self) -> Result<WorkflowState, ErrorKind> {
        self.enter(WorkflowState::ParsingHeader)?;
        let power_watts = self.parse_header()?;

        self.enter(WorkflowState::NegotiatingPower)?;
        self.negotiate_power(power_watts).await?;

        let was_active = self.port.control.is_active();
        if was_active {
            self.enter(WorkflowState::RevokingAfu)?;
            self.revoke::<Afu>(self.deps.config.timing.afu_revoke).await?;
        } else {
            trace!("{}: accelerator already inactive", self.ctx.port());
        }
        self.revoke_signal_tap().await?;
        if was_active {
            self.enter(WorkflowState::Deactivating)?;
            self.deactivate_port().await?;
            let settle = self.deps.config.timing.deactivate_wait;
            if !settle.is_zero() {
                self.cancel.sleep(settle).await?;
            }
        }

        self.enter(WorkflowState::Programming)?;
        self.program().await?;

        self.enter(WorkflowState::Reactivating)?;
        match self.reactivate_port().await {
            Ok(()) => Ok(WorkflowState::Completed),
            Err(
                e @ (ErrorKind::Timeout(TimeoutKind::Reactivate)
                | ErrorKind::Activation(ActivationFault::Failed)),
            ) if self.ctx.request().leave_deactivated => {
                warn!("{}: left deactivated: {e}", self.ctx.port());
                self.ctx.record_left_deactivated(e);
                Ok(WorkflowState::DeactivatedOnly)
            }
            Err(e) => Err(e),
        }
    }

    async fn activate(&mut self) -> Result<WorkflowState, ErrorKind> {
        if self.port.control.is_active() {
            return Err(ErrorKind::Activation(ActivationFault::AlreadyActive));
        }
        self.enter(WorkflowState::Reactivating)?;
        self.reactivate_port().await?;
        Ok(WorkflowState::Completed)
    }

    async fn deactivate(&mut self) -> Result<WorkflowState, ErrorKind> {
        if !self.port.control.is_active() {
            return Err(ErrorKind::Activation(ActivationFault::NoAfu));
        }
        self.enter(WorkflowState::RevokingAfu)?;
        self.revoke::<Afu>(self.deps.config.timing.afu_revoke).await?;
        self.revoke_signal_tap().await?;
        self.enter(WorkflowState::Deactivating)?;
        self.deactivate_port().await?;
        Ok(WorkflowState::Completed)
    }

    /// Decode the header, check it belongs on this port and store it in the context.
    ///
    /// # Returns: `Result<u32, ErrorKind>`
    /// * `Ok(u32)` - the power the bitstream needs, in watts
    fn parse_header(&mut self) -> Result<u32, ErrorKind> {
        let bitstream = self.ctx.request().bitstream.clone();
        let header = BitstreamHeader::parse(&bitstream)?;
        header.payload(&bitstream)?;

        let port = self.ctx.port();
        let target = u32::from(header.target_port);
        if target != port.0 {
            return Err(ErrorKind::ResourceMismatch(MismatchKind::Port {
                expected: port.0,
                found: target,
            }));
        }
        if let Some(slot_type) = self.port.control.slot_type_id()
            && slot_type != header.slot_type_id
        {
            return Err(ErrorKind::ResourceMismatch(MismatchKind::SlotType));
        }
        let header = self.ctx.set_header(header)?;
        trace!(
            "{port}: bitstream needs {} W, {} payload bytes",
            header.power_watts, header.payload_length
        );
        Ok(header.power_watts)
    }

    async fn negotiate_power(&mut self, power_watts: u32) -> Result<(), ErrorKind> {
        let negotiator = self.deps.power.clone();
        let deadline = self.deps.config.power.deadline;
        let pending = match negotiator.begin(power_watts) {
            Ok(pending) => pending,
            Err(e) => {
                error!("{}: could not reach the power manager: {e}", self.ctx.port());
                return Err(ErrorKind::PowerUnavailable);
            }
        };
        let transaction = pending.transaction_id();
        self.ctx.record_power(transaction, PowerState::Requested);
        let outcome = self.cancel.guard(pending.wait(deadline)).await?;
        self.ctx.record_power(transaction, outcome.into());
        match outcome {
            PowerOutcome::Granted => Ok(()),
            PowerOutcome::Denied => self.proceed_without_grant(ErrorKind::PowerDenied),
            PowerOutcome::TimedOut => {
                self.proceed_without_grant(ErrorKind::Timeout(TimeoutKind::PowerResponse))
            }
        }
    }

    fn proceed_without_grant(&self, refusal: ErrorKind) -> Result<(), ErrorKind> {
        if self.ctx.request().proceed_without_power_grant && self.deps.config.power.allow_override
        {
            warn!(
                "{}: proceeding without a power grant: {refusal}",
                self.ctx.port()
            );
            return Ok(());
        }
        Err(refusal)
    }

    async fn revoke_signal_tap(&mut self) -> Result<(), ErrorKind> {
        if !self
            .deps
            .bus
            .has_resource(ResourceHandle::signal_tap(self.ctx.port()))
        {
            return Ok(());
        }
        self.enter(WorkflowState::RevokingSignalTap)?;
        self.revoke::<SignalTap>(self.deps.config.timing.signal_tap_revoke)
            .await
    }

    async fn revoke<R: RevocableResource>(&mut self, policy: RevokePolicy) -> Result<(), ErrorKind> {
        let request = self.ctx.request();
        let release = ReleaseRequest {
            requester: request.session.clone(),
            transaction_id: request.transaction_id,
            action: request.action,
            grace: request.timeout,
        };
        let app_context = request.app_context;
        let mut coordinator = RevokeCoordinator::<R>::new(self.ctx.port(), policy);
        let result = coordinator
            .run(self.deps.bus.as_ref(), &release, &mut self.cancel)
            .await;
        self.ctx.record_revoke_attempts(R::KIND, coordinator.attempts());
        let outcome = result?;
        self.ctx.record_revoke(R::KIND, &outcome);
        match outcome {
            RevokeOutcome::Released { .. } => Ok(()),
            RevokeOutcome::ForceRevoked { owners, .. } => {
                for owner in &owners {
                    self.deps.notifier.dispatch_release(
                        owner,
                        coordinator.resource(),
                        release.transaction_id,
                        app_context,
                    );
                }
                Ok(())
            }
            RevokeOutcome::OwnerRetained { .. } => Err(ErrorKind::DeviceBusy),
        }
    }

    async fn deactivate_port(&mut self) -> Result<(), ErrorKind> {
        self.port.control.begin_deactivate()?;
        let timeout = self.deps.config.timing.deactivate_timeout;
        self.wait_for_port(false, timeout, TimeoutKind::Deactivate)
            .await
    }

    async fn reactivate_port(&mut self) -> Result<(), ErrorKind> {
        self.port.control.begin_activate()?;
        let timeout = self.deps.config.timing.reactivate_timeout;
        self.wait_for_port(true, timeout, TimeoutKind::Reactivate)
            .await
    }

    /// Poll the port until its activation state is `active` or `timeout` passes.
    async fn wait_for_port(
        &mut self,
        active: bool,
        timeout: Duration,
        on_timeout: TimeoutKind,
    ) -> Result<(), ErrorKind> {
        let poll = self.deps.config.timing.status_poll_interval;
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.control.is_active() == active {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ErrorKind::Timeout(on_timeout));
            }
            self.cancel.sleep(poll).await?;
        }
    }

    /// Stream the payload into the configuration engine.
    ///
    /// Programming is not raced against cancellation: once the engine has started taking the
    /// payload it is allowed to finish within the outstanding request budget.
    async fn program(&mut self) -> Result<(), ErrorKind> {
        let request = self.ctx.request();
        let bitstream = request.bitstream.clone();
        let region = request.region;
        let header = self
            .ctx
            .header()
            .ok_or_else(|| ErrorKind::Internal("programming without a decoded header".into()))?;
        let payload = header.payload(&bitstream)?;
        let budget = self.deps.config.timing.outstanding_request_budget;
        trace!(
            "{}: programming {} bytes into region {region}",
            self.ctx.port(),
            payload.len()
        );
        match tokio::time::timeout(budget, self.port.config.program(region, payload)).await {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::Timeout(TimeoutKind::OutstandingRequest)),
        }
    }
}
