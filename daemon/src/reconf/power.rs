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

//! Power budget negotiation with the external power manager.
//!
//! Every reconfiguration asks the power manager for the wattage declared in the bitstream
//! header before anything on the port is disturbed. A request is identified by a
//! [`PowerTransactionId`] that is unique for the lifetime of the [`PowerNegotiator`], and the
//! manager's answer is routed back with [`PowerNegotiator::deliver`].
//!
//! A waiting request is represented by a [`PendingGrant`]. Dropping it, which is what happens
//! when the owning workflow is cancelled, withdraws the request so that a late answer is
//! recognised as stale and discarded.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use afuprd::reconf::power::*;
//! # async fn f(negotiator: Arc<PowerNegotiator>) {
//! let pending = negotiator.begin(25).expect("power manager unreachable");
//! match pending.wait(Duration::from_secs(10)).await {
//!     PowerOutcome::Granted => println!("go"),
//!     other => println!("stop: {other:?}"),
//! }
//! # }
//! ```

use crate::reconf::collaborators::{CollaboratorError, PowerAuthority};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PowerTransactionId(pub u64);

impl fmt::Display for PowerTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pwr#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerRequest {
    pub transaction_id: PowerTransactionId,
    pub power_watts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerResponse {
    pub transaction_id: PowerTransactionId,
    pub granted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Idle,
    Requested,
    Granted,
    Denied,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOutcome {
    Granted,
    Denied,
    TimedOut,
}

impl From<PowerOutcome> for PowerState {
    fn from(outcome: PowerOutcome) -> Self {
        match outcome {
            PowerOutcome::Granted => PowerState::Granted,
            PowerOutcome::Denied => PowerState::Denied,
            PowerOutcome::TimedOut => PowerState::TimedOut,
        }
    }
}

pub struct PowerNegotiator {
    authority: Arc<dyn PowerAuthority>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<PowerTransactionId, oneshot::Sender<bool>>>,
}

impl PowerNegotiator {
    pub fn new(authority: Arc<dyn PowerAuthority>) -> Self {
        PowerNegotiator {
            authority,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send a power request for `power_watts` and register it as pending.
    ///
    /// # Returns: `Result<PendingGrant, CollaboratorError>`
    /// * `Ok(PendingGrant)` - the request went out; await [`PendingGrant::wait`] for the answer
    /// * `Err(CollaboratorError)` - the power authority could not be reached; nothing stays
    ///   pending
    pub fn begin(&self, power_watts: u32) -> Result<PendingGrant<'_>, CollaboratorError> {
        let transaction_id = PowerTransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(transaction_id, tx);
        let request = PowerRequest {
            transaction_id,
            power_watts,
        };
        trace!("Sending power request {transaction_id} for {power_watts} W");
        if let Err(e) = self.authority.send_request(request) {
            self.lock_pending().remove(&transaction_id);
            return Err(e);
        }
        Ok(PendingGrant {
            negotiator: self,
            transaction_id,
            rx: Some(rx),
        })
    }

    /// Route a power manager answer to the request waiting for it.
    ///
    /// # Returns: `bool`
    /// * `true` - a pending request consumed the answer
    /// * `false` - no request is waiting under that id; the answer was discarded
    pub fn deliver(&self, response: PowerResponse) -> bool {
        let Some(tx) = self.lock_pending().remove(&response.transaction_id) else {
            warn!(
                "Discarding power response for {} which is not pending",
                response.transaction_id
            );
            return false;
        };
        if tx.send(response.granted).is_err() {
            debug!(
                "Power response for {} arrived after its requester went away",
                response.transaction_id
            );
            return false;
        }
        true
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<PowerTransactionId, oneshot::Sender<bool>>> {
        // A poisoned map only means a panicking holder; the entries themselves stay valid.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An outstanding power request.
pub struct PendingGrant<'a> {
    negotiator: &'a PowerNegotiator,
    transaction_id: PowerTransactionId,
    rx: Option<oneshot::Receiver<bool>>,
}

impl PendingGrant<'_> {
    pub fn transaction_id(&self) -> PowerTransactionId {
        self.transaction_id
    }

    /// Wait up to `deadline` for the power manager to answer.
    pub async fn wait(mut self, deadline: Duration) -> PowerOutcome {
        let Some(rx) = self.rx.take() else {
            return PowerOutcome::TimedOut;
        };
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(true)) => PowerOutcome::Granted,
            Ok(Ok(false)) => PowerOutcome::Denied,
            Ok(Err(_)) | Err(_) => {
                warn!(
                    "Power manager did not answer {} within {:?}",
                    self.transaction_id, deadline
                );
                PowerOutcome::TimedOut
            }
        }
    }
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        if self
            .negotiator
            .lock_pending()
            .remove(&self.transaction_id)
            .is_some()
        {
            trace!("Withdrew power request {}", self.transaction_id);
        }
    }
}
