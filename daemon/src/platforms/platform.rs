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

//! Platform abstraction layer.
//!
//! Platforms register a constructor under a compatibility string. Compatibility strings may
//! hold several comma separated components; a query matches a registered platform when every
//! component of the query is one of the platform's components.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use afuprd::config::DeviceConfig;
//! # use afuprd::platforms::platform::platform_for_known_platform;
//! # use afuprd::platforms::simulated::SimulatedPlatform;
//! # fn example() -> Result<(), afuprd::error::PrdError> {
//! SimulatedPlatform::register_platform();
//! let platform = platform_for_known_platform("simulated", &DeviceConfig::default())?;
//! println!("{} ports", platform.port_ids().len());
//! # Ok(())
//! # }
//! ```

use crate::config::DeviceConfig;
use crate::error::PrdError;
use crate::reconf::collaborators::PortDirectory;
use crate::reconf::request::PortId;
use log::trace;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

type PlatformConstructor = fn(&DeviceConfig) -> Result<Box<dyn Platform>, PrdError>;

/// Compatibility string to constructor.
pub static PLATFORM_REGISTRY: OnceLock<Mutex<HashMap<&'static str, PlatformConstructor>>> =
    OnceLock::new();

/// A hardware backend.
///
/// Every platform is a [`PortDirectory`], so the engine can look its ports up directly.
pub trait Platform: PortDirectory + Any {
    /// The compatibility string the platform was registered under.
    fn platform_name(&self) -> &'static str;

    /// Device handle behind a port, e.g. `fpga0`.
    fn port_name(&self, port: PortId) -> Option<String>;
}

fn match_platform_string(
    platform_string: &str,
    config: &DeviceConfig,
) -> Result<Box<dyn Platform>, PrdError> {
    let registry = PLATFORM_REGISTRY
        .get()
        .ok_or(PrdError::Internal(String::from(
            "couldn't get PLATFORM_REGISTRY",
        )))?
        .lock()
        .map_err(|_| PrdError::Internal(String::from("couldn't lock PLATFORM_REGISTRY")))?;

    for (compat_string, platform_constructor) in registry.iter() {
        let compat_set: HashSet<&str> = compat_string.split(',').collect();
        let compat_found = platform_string.split(',').all(|x| compat_set.contains(x));
        if compat_found {
            trace!("{platform_string:?} matched platform {compat_string:?}");
            return platform_constructor(config);
        }
    }

    Err(PrdError::Argument(format!(
        "afuprd could not match {platform_string} to a known platform."
    )))
}

/// Construct the platform registered under `platform_string`.
///
/// # Returns: `Result<Box<dyn Platform>, PrdError>`
/// * `Ok(Box<dyn Platform>)` - Matched platform instance
/// * `Err(PrdError::Argument)` - No matching platform found
/// * `Err(PrdError::Internal)` - Registry not initialized
/// * `Err(PrdError)` - The platform's constructor failed
pub fn platform_for_known_platform(
    platform_string: &str,
    config: &DeviceConfig,
) -> Result<Box<dyn Platform>, PrdError> {
    match_platform_string(platform_string, config)
}

pub fn init_platform_registry() -> Mutex<HashMap<&'static str, PlatformConstructor>> {
    Mutex::new(HashMap::new())
}

/// Register a platform implementation in the global registry.
///
/// Normally called through the `register_platform()` that `#[platform]` generates.
pub fn register_platform(compatible: &'static str, constructor: PlatformConstructor) {
    let mut registry = PLATFORM_REGISTRY
        .get_or_init(init_platform_registry)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    registry.insert(compatible, constructor);
}

/// Compatibility strings of every registered platform, sorted.
pub fn registered_platforms() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = match PLATFORM_REGISTRY.get() {
        Some(registry) => registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect(),
        None => Vec::new(),
    };
    names.sort_unstable();
    names
}
