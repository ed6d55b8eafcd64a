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

//! Harness shared by the workflow tests.
//!
//! Every test runs on a paused tokio clock against the simulated platform, the real
//! [`OwnerRegistry`] and scripted stand-ins for the power manager and the owners' sessions.

use afuprd::config::{DeviceConfig, EngineConfig};
use afuprd::platforms::simulated::{SimulatedPlatform, SimulatedPort};
use afuprd::reconf::bitstream::BitstreamHeader;
use afuprd::reconf::collaborators::{CollaboratorError, EventChannel, PowerAuthority};
use afuprd::reconf::notifier::Event;
use afuprd::reconf::power::{PowerRequest, PowerResponse};
use afuprd::reconf::request::{ReleaseRequest, ResourceHandle, SessionHandle};
use afuprd::reconf::{PortId, ReconfigurationEngine};
use afuprd::registry::{OwnerRegistry, ReleaseListener};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

pub const REQUESTER: &str = ":1.10";
pub const OWNER: &str = ":1.20";

pub fn requester() -> SessionHandle {
    SessionHandle::new(REQUESTER)
}

pub fn owner() -> SessionHandle {
    SessionHandle::new(OWNER)
}

/// A partial bitstream for `port` that asks for `power_watts` and carries `payload_len` bytes.
pub fn green_bitstream(port: u8, power_watts: u32, payload_len: u32) -> Vec<u8> {
    let header = BitstreamHeader {
        power_watts,
        target_port: port,
        payload_length: payload_len,
        slot_type_id: SLOT_TYPE,
        ..BitstreamHeader::default()
    };
    let mut bytes = header.to_bytes();
    bytes.extend((0..payload_len).map(|i| i as u8));
    bytes
}

pub const SLOT_TYPE: [u8; 16] = *b"afupr-slot-00001";

#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<(SessionHandle, Event)>>,
}

impl RecordingChannel {
    pub fn all(&self) -> Vec<(SessionHandle, Event)> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn for_session(&self, session: &SessionHandle) -> Vec<Event> {
        self.all()
            .into_iter()
            .filter(|(to, _)| to == session)
            .map(|(_, event)| event)
            .collect()
    }
}

impl EventChannel for RecordingChannel {
    fn enqueue(&self, session: &SessionHandle, event: Event) -> Result<(), CollaboratorError> {
        self.events
            .lock()
            .expect("events lock")
            .push((session.clone(), event));
        Ok(())
    }
}

/// How the scripted power manager answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerReply {
    Grant,
    Deny,
    /// Never answers.
    Silent,
    /// Grants once the given time has passed.
    GrantAfter(Duration),
    /// Cannot be reached at all.
    Unreachable,
}

pub struct ScriptedPowerManager {
    tx: mpsc::UnboundedSender<PowerRequest>,
    reply: Mutex<PowerReply>,
    sent: Mutex<Vec<PowerRequest>>,
}

impl ScriptedPowerManager {
    pub fn set_reply(&self, reply: PowerReply) {
        *self.reply.lock().expect("reply lock") = reply;
    }

    pub fn requests(&self) -> Vec<PowerRequest> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn reply(&self) -> PowerReply {
        *self.reply.lock().expect("reply lock")
    }
}

impl PowerAuthority for ScriptedPowerManager {
    fn send_request(&self, request: PowerRequest) -> Result<(), CollaboratorError> {
        if self.reply() == PowerReply::Unreachable {
            return Err(CollaboratorError::Unavailable(String::from("no power manager")));
        }
        self.sent.lock().expect("sent lock").push(request);
        self.tx
            .send(request)
            .map_err(|_| CollaboratorError::ChannelClosed)
    }
}

/// Owners' sessions: records release requests and, if told to, lets go after a delay.
#[derive(Default)]
pub struct ScriptedOwners {
    registry: OnceLock<Weak<OwnerRegistry>>,
    release_after: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(SessionHandle, ResourceHandle, ReleaseRequest)>>,
}

impl ScriptedOwners {
    /// Owners release `after` a release request reaches them. `None` makes them hold on.
    pub fn release_after(&self, after: Option<Duration>) {
        *self.release_after.lock().expect("owners lock") = after;
    }

    pub fn requests(&self) -> Vec<(SessionHandle, ResourceHandle, ReleaseRequest)> {
        self.requests.lock().expect("owners lock").clone()
    }
}

impl ReleaseListener for ScriptedOwners {
    fn release_requested(
        &self,
        owner: &SessionHandle,
        resource: ResourceHandle,
        release: &ReleaseRequest,
    ) -> Result<(), CollaboratorError> {
        self.requests
            .lock()
            .expect("owners lock")
            .push((owner.clone(), resource, release.clone()));
        let after = *self.release_after.lock().expect("owners lock");
        if let (Some(after), Some(registry)) = (after, self.registry.get().cloned()) {
            let owner = owner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if let Some(registry) = registry.upgrade() {
                    registry.release(resource, &owner);
                }
            });
        }
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<ReconfigurationEngine>,
    pub platform: Arc<SimulatedPlatform>,
    pub registry: Arc<OwnerRegistry>,
    pub events: Arc<RecordingChannel>,
    pub power: Arc<ScriptedPowerManager>,
    pub owners: Arc<ScriptedOwners>,
}

impl Harness {
    /// One port, default timing, a power manager that grants everything.
    pub fn new() -> Self {
        Self::with(EngineConfig::default(), &["fpga0"])
    }

    pub fn with(config: EngineConfig, ports: &[&str]) -> Self {
        let device = DeviceConfig {
            platform: String::from("simulated"),
            ports: ports.iter().map(|name| name.to_string()).collect(),
            ..DeviceConfig::default()
        };
        let platform =
            Arc::new(SimulatedPlatform::new(&device).expect("simulated platform should build"));

        let owners = Arc::new(ScriptedOwners::default());
        let registry = Arc::new(OwnerRegistry::with_release_listener(owners.clone()));
        owners
            .registry
            .set(Arc::downgrade(&registry))
            .unwrap_or_else(|_| panic!("registry set twice"));
        for index in 0..ports.len() as u32 {
            registry.add_resource(ResourceHandle::afu(PortId(index)));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let power = Arc::new(ScriptedPowerManager {
            tx,
            reply: Mutex::new(PowerReply::Grant),
            sent: Mutex::default(),
        });
        let events = Arc::new(RecordingChannel::default());
        let engine = Arc::new(ReconfigurationEngine::new(
            platform.clone(),
            registry.clone(),
            power.clone(),
            events.clone(),
            config,
        ));

        let responder_engine = engine.clone();
        let responder_power = power.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let respond = |granted| {
                    responder_engine.deliver_power_response(PowerResponse {
                        transaction_id: request.transaction_id,
                        granted,
                    });
                };
                match responder_power.reply() {
                    PowerReply::Grant => respond(true),
                    PowerReply::Deny => respond(false),
                    PowerReply::Silent | PowerReply::Unreachable => {}
                    PowerReply::GrantAfter(delay) => {
                        let engine = responder_engine.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            engine.deliver_power_response(PowerResponse {
                                transaction_id: request.transaction_id,
                                granted: true,
                            });
                        });
                    }
                }
            }
        });

        Harness {
            engine,
            platform,
            registry,
            events,
            power,
            owners,
        }
    }

    pub fn port(&self, index: u32) -> Arc<SimulatedPort> {
        self.platform
            .sim_port(PortId(index))
            .expect("port should exist")
    }

    /// Make the standard owner hold `resource`.
    pub fn bind_owner(&self, resource: ResourceHandle) {
        self.registry
            .bind(resource, owner())
            .expect("resource should be known");
    }
}
