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

//! Cancellation of in-flight workflows.
//!
//! A workflow holds a [`CancelToken`] and races every wait against it. The engine keeps the
//! matching [`CancelHandle`] and trips it when a newer request arrives for the same port or the
//! port is torn down. Once tripped, the next suspension point of the workflow resolves to
//! [`ErrorKind::Cancelled`] and nothing further is done to the hardware.

use crate::reconf::error::ErrorKind;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the matching handle has been tripped.
    ///
    /// A dropped handle is not a cancellation, so in that case this never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the token is tripped first.
    ///
    /// # Returns: `Result<F::Output, ErrorKind>`
    /// * `Err(ErrorKind::Cancelled)` - the token was tripped before `fut` completed; `fut` is
    ///   dropped without being polled again
    pub async fn guard<F: Future>(&mut self, fut: F) -> Result<F::Output, ErrorKind> {
        if self.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ErrorKind::Cancelled),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&mut self, duration: Duration) -> Result<(), ErrorKind> {
        self.guard(tokio::time::sleep(duration)).await?;
        if self.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }
        Ok(())
    }
}
