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

//! Ownership of port resources by client sessions.
//!
//! The [`OwnerRegistry`] is the daemon's [`ResourceBus`]: clients bind the accelerator or the
//! SignalTap of a port before using it, and the reconfiguration engine asks them to give it
//! back, or strips them of it, through the registry. Release requests are forwarded to a
//! [`ReleaseListener`], which in the daemon turns them into DBus signals.

use crate::error::PrdError;
use crate::reconf::collaborators::{CollaboratorError, ResourceBus};
use crate::reconf::request::{ReleaseRequest, ResourceHandle, SessionHandle};
use log::{trace, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receiver of "please release" requests addressed to one owner.
pub trait ReleaseListener: Send + Sync {
    fn release_requested(
        &self,
        owner: &SessionHandle,
        resource: ResourceHandle,
        release: &ReleaseRequest,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Default)]
pub struct OwnerRegistry {
    owners: Mutex<BTreeMap<ResourceHandle, Vec<SessionHandle>>>,
    listener: Option<Arc<dyn ReleaseListener>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release_listener(listener: Arc<dyn ReleaseListener>) -> Self {
        OwnerRegistry {
            owners: Mutex::default(),
            listener: Some(listener),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ResourceHandle, Vec<SessionHandle>>> {
        self.owners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make a resource known. Adding it again keeps its owners.
    pub fn add_resource(&self, resource: ResourceHandle) {
        self.lock().entry(resource).or_default();
    }

    /// Record `session` as an owner of `resource`.
    ///
    /// # Returns: `Result<(), PrdError>`
    /// * `Err(PrdError::Argument)` - the resource does not exist
    pub fn bind(&self, resource: ResourceHandle, session: SessionHandle) -> Result<(), PrdError> {
        let mut owners = self.lock();
        let holders = owners.get_mut(&resource).ok_or_else(|| {
            PrdError::Argument(format!("{resource} is not a known resource"))
        })?;
        if !holders.contains(&session) {
            trace!("{session} binds {resource}");
            holders.push(session);
        }
        Ok(())
    }

    /// Drop `session`'s binding of `resource`.
    ///
    /// # Returns: `bool`
    /// * whether the session was an owner
    pub fn release(&self, resource: ResourceHandle, session: &SessionHandle) -> bool {
        let mut owners = self.lock();
        let Some(holders) = owners.get_mut(&resource) else {
            return false;
        };
        let before = holders.len();
        holders.retain(|holder| holder != session);
        let released = holders.len() != before;
        if released {
            trace!("{session} released {resource}");
        }
        released
    }

    /// Every known resource with its owners.
    pub fn resources(&self) -> Vec<(ResourceHandle, Vec<SessionHandle>)> {
        self.lock()
            .iter()
            .map(|(resource, holders)| (*resource, holders.clone()))
            .collect()
    }
}

impl ResourceBus for OwnerRegistry {
    fn has_resource(&self, resource: ResourceHandle) -> bool {
        self.lock().contains_key(&resource)
    }

    fn owner_count(&self, resource: ResourceHandle) -> usize {
        self.lock().get(&resource).map_or(0, Vec::len)
    }

    fn owners(&self, resource: ResourceHandle) -> Vec<SessionHandle> {
        self.lock().get(&resource).cloned().unwrap_or_default()
    }

    fn request_release(
        &self,
        resource: ResourceHandle,
        release: &ReleaseRequest,
    ) -> Result<(), CollaboratorError> {
        let owners = self.owners(resource);
        let Some(listener) = &self.listener else {
            warn!("Nobody relays release requests; {resource} owners are not asked");
            return Ok(());
        };
        for owner in &owners {
            // One unreachable owner must not stop the others from being asked.
            if let Err(e) = listener.release_requested(owner, resource, release) {
                warn!("Could not ask {owner} to release {resource}: {e}");
            }
        }
        Ok(())
    }

    fn force_revoke(&self, resource: ResourceHandle) -> Vec<SessionHandle> {
        self.lock()
            .get_mut(&resource)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}
