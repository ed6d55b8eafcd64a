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

//! Taking resources back from the sessions that own them.
//!
//! A [`RevokeCoordinator`] asks the owners of one resource to release it, waits out the grace
//! period, then polls on a fixed interval. Each poll counts as one attempt. When an owner lets
//! go the resource is `Released`; when the attempts run out it is either force revoked or, if
//! the request honours owners, reported as `OwnerRetained`.
//!
//! The accelerator and the SignalTap debug resource go through the same ladder. They differ
//! only in their [`RevocableResource`] marker and in the [`RevokePolicy`] they are given.
//!
//! ```text
//! NotRequested -> ReleaseRequested -> Escalating -> Released
//!                      |                  |-------> ForceRevoked
//!                      |                  '-------> OwnerRetained
//!                      '-> Released (no owners)
//! ```

use crate::reconf::cancel::CancelToken;
use crate::reconf::collaborators::{CollaboratorError, ResourceBus};
use crate::reconf::error::ErrorKind;
use crate::reconf::request::{
    PortId, ReconfAction, ReleaseRequest, ResourceHandle, ResourceKind, SessionHandle,
};
use log::{debug, info, warn};
use std::marker::PhantomData;
use std::time::Duration;

/// Marker for a kind of resource that can be revoked.
pub trait RevocableResource {
    const KIND: ResourceKind;
}

#[derive(Debug)]
pub struct Afu;

#[derive(Debug)]
pub struct SignalTap;

impl RevocableResource for Afu {
    const KIND: ResourceKind = ResourceKind::Afu;
}

impl RevocableResource for SignalTap {
    const KIND: ResourceKind = ResourceKind::SignalTap;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevokePolicy {
    pub max_tries: u32,
    pub retry_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevokeState {
    #[default]
    NotRequested,
    ReleaseRequested,
    Escalating,
    Released,
    ForceRevoked,
    OwnerRetained,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    Released { attempts: u32 },
    ForceRevoked {
        attempts: u32,
        owners: Vec<SessionHandle>,
    },
    OwnerRetained { attempts: u32 },
}

impl RevokeOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RevokeOutcome::Released { attempts }
            | RevokeOutcome::ForceRevoked { attempts, .. }
            | RevokeOutcome::OwnerRetained { attempts } => *attempts,
        }
    }

    pub fn state(&self) -> RevokeState {
        match self {
            RevokeOutcome::Released { .. } => RevokeState::Released,
            RevokeOutcome::ForceRevoked { .. } => RevokeState::ForceRevoked,
            RevokeOutcome::OwnerRetained { .. } => RevokeState::OwnerRetained,
        }
    }
}

#[derive(Debug)]
pub struct RevokeCoordinator<R: RevocableResource> {
    resource: ResourceHandle,
    policy: RevokePolicy,
    attempts: u32,
    state: RevokeState,
    _kind: PhantomData<R>,
}

impl<R: RevocableResource> RevokeCoordinator<R> {
    pub fn new(port: PortId, policy: RevokePolicy) -> Self {
        RevokeCoordinator {
            resource: ResourceHandle {
                port,
                kind: R::KIND,
            },
            policy,
            attempts: 0,
            state: RevokeState::NotRequested,
            _kind: PhantomData,
        }
    }

    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> RevokeState {
        self.state
    }

    /// Ask current owners to release the resource.
    ///
    /// # Returns: `Result<Option<RevokeOutcome>, CollaboratorError>`
    /// * `Ok(Some(Released))` - nobody owned the resource; nothing was sent
    /// * `Ok(None)` - the request went out and the ladder should start
    pub fn request_release(
        &mut self,
        bus: &dyn ResourceBus,
        release: &ReleaseRequest,
    ) -> Result<Option<RevokeOutcome>, CollaboratorError> {
        if bus.owner_count(self.resource) == 0 {
            debug!("{} has no owners, nothing to revoke", self.resource);
            return Ok(Some(self.settle(RevokeOutcome::Released { attempts: 0 })));
        }
        bus.request_release(self.resource, release)?;
        self.state = RevokeState::ReleaseRequested;
        Ok(None)
    }

    /// One retry tick of the ladder.
    ///
    /// # Returns: `Option<RevokeOutcome>`
    /// * `Some(..)` - the ladder is finished
    /// * `None` - schedule another tick after the retry interval
    pub fn tick(&mut self, bus: &dyn ResourceBus, action: ReconfAction) -> Option<RevokeOutcome> {
        if self.attempts < self.policy.max_tries {
            self.attempts += 1;
        }
        self.state = RevokeState::Escalating;
        if bus.owner_count(self.resource) == 0 {
            return Some(self.settle(RevokeOutcome::Released {
                attempts: self.attempts,
            }));
        }
        if self.attempts < self.policy.max_tries {
            return None;
        }
        Some(self.exhausted(bus, action))
    }

    fn exhausted(&mut self, bus: &dyn ResourceBus, action: ReconfAction) -> RevokeOutcome {
        match action {
            ReconfAction::HonorOwner => {
                info!(
                    "{} still owned after {} attempts, leaving it with its owner",
                    self.resource, self.attempts
                );
                self.settle(RevokeOutcome::OwnerRetained {
                    attempts: self.attempts,
                })
            }
            ReconfAction::HonorRequest => {
                let owners = bus.force_revoke(self.resource);
                warn!(
                    "{} force revoked from {} owner(s) after {} attempts",
                    self.resource,
                    owners.len(),
                    self.attempts
                );
                self.settle(RevokeOutcome::ForceRevoked {
                    attempts: self.attempts,
                    owners,
                })
            }
        }
    }

    fn settle(&mut self, outcome: RevokeOutcome) -> RevokeOutcome {
        self.state = outcome.state();
        outcome
    }

    /// Drive the whole ladder to a terminal outcome.
    ///
    /// Every wait is raced against `cancel`. A cancelled ladder stops where it is and never
    /// force revokes.
    ///
    /// # Arguments
    ///
    /// * `bus`: ownership registry for the resource
    /// * `release`: the release request sent to owners, including the grace period
    /// * `cancel`: token of the owning workflow
    ///
    /// # Returns: `Result<RevokeOutcome, ErrorKind>`
    /// * `Err(ErrorKind::Cancelled)` - the workflow was cancelled mid ladder
    /// * `Err(ErrorKind::Internal)` - the release request could not be delivered
    pub async fn run(
        &mut self,
        bus: &dyn ResourceBus,
        release: &ReleaseRequest,
        cancel: &mut CancelToken,
    ) -> Result<RevokeOutcome, ErrorKind> {
        if cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }
        let sent = self
            .request_release(bus, release)
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;
        if let Some(outcome) = sent {
            return Ok(outcome);
        }
        if release.grace.is_zero() && release.action == ReconfAction::HonorOwner {
            // Owners get no time at all, so an honoured owner keeps the resource.
            return Ok(self.settle(RevokeOutcome::OwnerRetained { attempts: 0 }));
        }
        if !release.grace.is_zero() {
            cancel.sleep(release.grace).await?;
        }
        loop {
            cancel.sleep(self.policy.retry_interval).await?;
            if let Some(outcome) = self.tick(bus, release.action) {
                return Ok(outcome);
            }
        }
    }
}
