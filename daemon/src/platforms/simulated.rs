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

//! In-memory platform.
//!
//! Every port is a [`SimulatedPort`] that starts with an active accelerator. Tests script its
//! behaviour (activation that never settles, failing programming, slow programming, a slot type
//! to check against) and then inspect what the engine did to it.

use crate::config::DeviceConfig;
use crate::error::PrdError;
use crate::platforms::platform::Platform;
use crate::reconf::collaborators::{ConfigPort, PortControl, PortDirectory, PortHandles};
use crate::reconf::error::{ActivationFault, ErrorKind, ProtocolFault};
use crate::reconf::request::PortId;
use afupr_macros::platform;
use async_trait::async_trait;
use log::trace;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// How a simulated port answers a request to change its activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Immediate,
    /// Settles once the given time has passed.
    After(Duration),
    /// Accepts the request but never settles.
    Never,
    /// Rejects the request.
    Fail,
}

#[derive(Debug)]
struct SimState {
    active: bool,
    pending: Option<(bool, Option<Instant>)>,
    deactivation: Transition,
    activation: Transition,
    slot_type: Option<[u8; 16]>,
    program_result: Result<(), ErrorKind>,
    program_delay: Duration,
    programmed: Vec<(u32, usize)>,
    activate_calls: usize,
    deactivate_calls: usize,
}

impl SimState {
    /// Apply a pending transition whose time has come.
    fn settle(&mut self) {
        if let Some((target, Some(ready_at))) = self.pending
            && Instant::now() >= ready_at
        {
            self.active = target;
            self.pending = None;
        }
    }
}

#[derive(Debug)]
pub struct SimulatedPort {
    name: String,
    state: Mutex<SimState>,
}

impl SimulatedPort {
    pub fn new(name: impl Into<String>) -> Self {
        SimulatedPort {
            name: name.into(),
            state: Mutex::new(SimState {
                active: true,
                pending: None,
                deactivation: Transition::Immediate,
                activation: Transition::Immediate,
                slot_type: None,
                program_result: Ok(()),
                program_delay: Duration::ZERO,
                programmed: Vec::new(),
                activate_calls: 0,
                deactivate_calls: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_active(&self, active: bool) {
        let mut state = self.lock();
        state.active = active;
        state.pending = None;
    }

    pub fn set_activation(&self, transition: Transition) {
        self.lock().activation = transition;
    }

    pub fn set_deactivation(&self, transition: Transition) {
        self.lock().deactivation = transition;
    }

    pub fn set_slot_type(&self, slot_type: Option<[u8; 16]>) {
        self.lock().slot_type = slot_type;
    }

    /// Make every following programming attempt fail with `error`.
    pub fn fail_programming(&self, error: ErrorKind) {
        self.lock().program_result = Err(error);
    }

    pub fn set_program_delay(&self, delay: Duration) {
        self.lock().program_delay = delay;
    }

    /// Region and payload size of every successful programming, in order.
    pub fn programmed(&self) -> Vec<(u32, usize)> {
        self.lock().programmed.clone()
    }

    pub fn activate_calls(&self) -> usize {
        self.lock().activate_calls
    }

    pub fn deactivate_calls(&self) -> usize {
        self.lock().deactivate_calls
    }

    fn begin(&self, target: bool) -> Result<(), ErrorKind> {
        let mut state = self.lock();
        let transition = if target {
            state.activate_calls += 1;
            state.activation
        } else {
            state.deactivate_calls += 1;
            state.deactivation
        };
        trace!("{}: {transition:?} transition to active={target}", self.name);
        match transition {
            Transition::Immediate => {
                state.active = target;
                state.pending = None;
            }
            Transition::After(delay) => state.pending = Some((target, Some(Instant::now() + delay))),
            Transition::Never => state.pending = Some((target, None)),
            Transition::Fail => return Err(ErrorKind::Activation(ActivationFault::Failed)),
        }
        Ok(())
    }
}

impl PortControl for SimulatedPort {
    fn is_active(&self) -> bool {
        let mut state = self.lock();
        state.settle();
        state.active
    }

    fn begin_deactivate(&self) -> Result<(), ErrorKind> {
        self.begin(false)
    }

    fn begin_activate(&self) -> Result<(), ErrorKind> {
        self.begin(true)
    }

    fn slot_type_id(&self) -> Option<[u8; 16]> {
        self.lock().slot_type
    }
}

#[async_trait]
impl ConfigPort for SimulatedPort {
    async fn program(&self, region: u32, payload: &[u8]) -> Result<(), ErrorKind> {
        let delay = {
            let mut state = self.lock();
            state.settle();
            if state.active {
                // The configuration engine refuses to reprogram a live accelerator.
                return Err(ErrorKind::Protocol(ProtocolFault::Operation));
            }
            state.program_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.program_result.clone()?;
        state.programmed.push((region, payload.len()));
        trace!("{}: programmed {} bytes into region {region}", self.name, payload.len());
        Ok(())
    }
}

/// A platform whose ports live in memory.
///
/// Port names come from `[device] ports`; without any, a single port `sim0` is created.
#[platform(compat_string = "simulated")]
#[derive(Debug)]
pub struct SimulatedPlatform {
    ports: Vec<Arc<SimulatedPort>>,
}

impl SimulatedPlatform {
    pub fn new(config: &DeviceConfig) -> Result<Self, PrdError> {
        trace!("creating new simulated platform");
        let names = if config.ports.is_empty() {
            vec![String::from("sim0")]
        } else {
            config.ports.clone()
        };
        Ok(SimulatedPlatform {
            ports: names
                .into_iter()
                .map(|name| Arc::new(SimulatedPort::new(name)))
                .collect(),
        })
    }

    /// The simulated port behind `port`, for scripting and inspection.
    pub fn sim_port(&self, port: PortId) -> Option<Arc<SimulatedPort>> {
        self.ports.get(port.0 as usize).cloned()
    }
}

impl PortDirectory for SimulatedPlatform {
    fn lookup(&self, port: PortId) -> Option<PortHandles> {
        self.sim_port(port).map(|sim| PortHandles {
            control: sim.clone(),
            config: sim,
        })
    }

    fn port_ids(&self) -> Vec<PortId> {
        (0..self.ports.len() as u32).map(PortId).collect()
    }
}

impl Platform for SimulatedPlatform {
    fn platform_name(&self) -> &'static str {
        Self::COMPAT_STRING
    }

    fn port_name(&self, port: PortId) -> Option<String> {
        self.sim_port(port).map(|sim| sim.name().to_string())
    }
}
