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

//! Entry point of the reconfiguration engine.
//!
//! The engine owns the table of active workflows, one per port. Submitting a request for a
//! port that already has a workflow in flight cancels the older one and waits for it to emit
//! its terminal event before the new one starts, so two workflows never drive the same port.
//! Workflows on different ports run concurrently.

use crate::config::EngineConfig;
use crate::reconf::cancel::{CancelHandle, cancel_pair};
use crate::reconf::collaborators::{EventChannel, PortDirectory, PowerAuthority, ResourceBus};
use crate::reconf::context::{ReconfigurationContext, TerminalReport, WorkflowState};
use crate::reconf::error::ErrorKind;
use crate::reconf::notifier::EventNotifier;
use crate::reconf::power::{PowerNegotiator, PowerResponse};
use crate::reconf::request::{Command, PortId, ReconfigurationRequest, TransactionId};
use crate::reconf::workflow::{ReconfigurationWorkflow, WorkflowDeps};
use log::{info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct ActiveWorkflow {
    generation: u64,
    command: Command,
    transaction_id: TransactionId,
    cancel: CancelHandle,
    state: watch::Receiver<WorkflowState>,
    done: watch::Receiver<bool>,
}

type ActiveTable = Arc<Mutex<HashMap<PortId, ActiveWorkflow>>>;

pub struct ReconfigurationEngine {
    ports: Arc<dyn PortDirectory>,
    deps: Arc<WorkflowDeps>,
    active: ActiveTable,
    next_generation: AtomicU64,
}

/// A submitted workflow.
pub struct WorkflowHandle {
    port: PortId,
    transaction_id: TransactionId,
    join: JoinHandle<TerminalReport>,
}

impl WorkflowHandle {
    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Wait for the workflow's terminal report.
    pub async fn outcome(self) -> Result<TerminalReport, ErrorKind> {
        self.join
            .await
            .map_err(|e| ErrorKind::Internal(format!("workflow task failed: {e}")))
    }
}

fn lock(active: &ActiveTable) -> MutexGuard<'_, HashMap<PortId, ActiveWorkflow>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // A closed channel means the task is gone, which is as done as it gets.
    let _ = done.wait_for(|finished| *finished).await;
}

impl ReconfigurationEngine {
    pub fn new(
        ports: Arc<dyn PortDirectory>,
        bus: Arc<dyn ResourceBus>,
        power_authority: Arc<dyn PowerAuthority>,
        events: Arc<dyn EventChannel>,
        config: EngineConfig,
    ) -> Self {
        let deps = WorkflowDeps {
            bus,
            power: Arc::new(PowerNegotiator::new(power_authority)),
            notifier: Arc::new(EventNotifier::new(events)),
            config,
        };
        ReconfigurationEngine {
            ports,
            deps: Arc::new(deps),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.deps.config
    }

    pub fn ports(&self) -> Vec<PortId> {
        self.ports.port_ids()
    }

    /// Start a workflow for `request`, superseding any workflow already running on its port.
    ///
    /// # Returns: `Result<WorkflowHandle, ErrorKind>`
    /// * `Ok(WorkflowHandle)` - the workflow is running; its outcome arrives as an event and
    ///   through [`WorkflowHandle::outcome`]
    /// * `Err(ErrorKind::NoSuchPort)` - the port is unknown to the platform
    pub async fn submit(
        &self,
        request: ReconfigurationRequest,
    ) -> Result<WorkflowHandle, ErrorKind> {
        let port = request.port;
        let handles = self
            .ports
            .lookup(port)
            .ok_or(ErrorKind::NoSuchPort(port.0))?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let command = request.command;
        let transaction_id = request.transaction_id;

        let (cancel, token) = cancel_pair();
        let (state_tx, state_rx) = watch::channel(WorkflowState::Start);
        let (done_tx, done_rx) = watch::channel(false);
        let ctx = ReconfigurationContext::new(request, state_tx);
        let entry = ActiveWorkflow {
            generation,
            command,
            transaction_id,
            cancel,
            state: state_rx,
            done: done_rx,
        };

        // The new entry is visible while the previous workflow winds down, so a teardown or a
        // newer request arriving meanwhile cancels this one too.
        let previous = lock(&self.active).insert(port, entry);
        if let Some(previous) = previous {
            info!(
                "{port}: {command} {transaction_id} supersedes {} {}",
                previous.command, previous.transaction_id
            );
            previous.cancel.cancel();
            wait_done(previous.done).await;
        }

        let workflow = ReconfigurationWorkflow::new(ctx, handles, self.deps.clone(), token);
        let active = self.active.clone();
        let join = tokio::spawn(async move {
            let report = workflow.run().await;
            {
                let mut table = lock(&active);
                if table
                    .get(&port)
                    .is_some_and(|entry| entry.generation == generation)
                {
                    table.remove(&port);
                }
            }
            done_tx.send_replace(true);
            report
        });
        trace!("{port}: {command} {transaction_id} accepted");
        Ok(WorkflowHandle {
            port,
            transaction_id,
            join,
        })
    }

    /// Route a power manager answer to the workflow waiting for it.
    pub fn deliver_power_response(&self, response: PowerResponse) -> bool {
        self.deps.power.deliver(response)
    }

    /// Current step of the workflow running on `port`, if any.
    pub fn port_state(&self, port: PortId) -> Option<WorkflowState> {
        lock(&self.active)
            .get(&port)
            .map(|entry| entry.state.borrow().clone())
    }

    pub fn active_ports(&self) -> Vec<(PortId, WorkflowState)> {
        let mut ports: Vec<_> = lock(&self.active)
            .iter()
            .map(|(port, entry)| (*port, entry.state.borrow().clone()))
            .collect();
        ports.sort_by_key(|(port, _)| *port);
        ports
    }

    /// Cancel the workflow on a port that is going away and wait for it to finish.
    ///
    /// # Returns: `bool`
    /// * whether a workflow was running
    pub async fn teardown_port(&self, port: PortId) -> bool {
        let entry = lock(&self.active).remove(&port);
        match entry {
            Some(entry) => {
                info!("{port}: torn down during {}", entry.state.borrow().name());
                entry.cancel.cancel();
                wait_done(entry.done).await;
                true
            }
            None => false,
        }
    }

    /// Cancel every workflow and wait for all of them to report.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = lock(&self.active).drain().collect();
        if !entries.is_empty() {
            warn!("Shutting down with {} workflow(s) in flight", entries.len());
        }
        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (_, entry) in entries {
            wait_done(entry.done).await;
        }
    }
}
