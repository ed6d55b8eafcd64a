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

//! `afupr`: command-line client of the afupr daemon.
//!
//! ```text
//! afupr reconfigure green.gbs --port 0
//! afupr deactivate --port 0 --honor-owner --timeout-ms 500
//! afupr status
//! afupr watch
//! ```
//!
//! Request commands wait for the daemon's outcome event unless `--no-wait` is given.

mod proxies;
mod request;
mod status;
mod watch;

use crate::request::{
    ReconfigureOptions, RequestOptions, activate_handler, deactivate_handler, reconfigure_handler,
};
use crate::status::status_handler;
use crate::watch::watch_handler;
use clap::{Args, Parser, Subcommand};
use log::{debug, error};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "afupr")]
#[command(bin_name = "afupr")]
#[command(about = "Partial reconfiguration of FPGA accelerator function units")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct RequestArgs {
    /// Port the request is for.
    #[arg(long, default_value_t = 0)]
    port: u32,
    /// Correlation id echoed back in the outcome; defaults to this process id.
    #[arg(long)]
    transaction_id: Option<u64>,
    /// Opaque value echoed back in the outcome.
    #[arg(long, default_value_t = 0)]
    app_context: u64,
    /// Return once the daemon has accepted the request.
    #[arg(long)]
    no_wait: bool,
    /// Seconds to wait for the outcome.
    #[arg(long, default_value_t = 60)]
    wait_secs: u64,
}

impl From<RequestArgs> for RequestOptions {
    fn from(args: RequestArgs) -> Self {
        RequestOptions {
            port: args.port,
            transaction_id: args
                .transaction_id
                .unwrap_or_else(|| u64::from(std::process::id())),
            app_context: args.app_context,
            wait: (!args.no_wait).then(|| Duration::from_secs(args.wait_secs)),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Program a partial bitstream into a port.
    Reconfigure {
        /// Green bitstream: header followed by payload.
        file: PathBuf,
        #[command(flatten)]
        request: RequestArgs,
        /// Region of the port to program.
        #[arg(long, default_value_t = 0)]
        region: u32,
        /// Accept a port left deactivated if it does not come back up.
        #[arg(long)]
        leave_deactivated: bool,
        /// Grace period granted to current owners to release the port.
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
        /// Give up instead of revoking owners that do not release in time.
        #[arg(long)]
        honor_owner: bool,
        /// Go ahead when the power manager denies or does not answer, if the daemon allows it.
        #[arg(long)]
        without_power_grant: bool,
    },
    /// Activate the accelerator of a port.
    Activate {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Deactivate the accelerator of a port.
    Deactivate {
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
        #[arg(long)]
        honor_owner: bool,
    },
    /// Show ports, running workflows and resource owners.
    Status {
        #[arg(long)]
        port: Option<u32>,
    },
    /// Print the daemon's signals as they arrive.
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let result = match cli.command {
        Commands::Reconfigure {
            file,
            request,
            region,
            leave_deactivated,
            timeout_ms,
            honor_owner,
            without_power_grant,
        } => {
            let reconf = ReconfigureOptions {
                region,
                leave_deactivated,
                timeout_ms,
                honor_owner,
                proceed_without_power_grant: without_power_grant,
            };
            reconfigure_handler(&file, request.into(), reconf).await
        }
        Commands::Activate { request } => activate_handler(request.into()).await,
        Commands::Deactivate {
            request,
            timeout_ms,
            honor_owner,
        } => deactivate_handler(request.into(), timeout_ms, honor_owner).await,
        Commands::Status { port } => status_handler(port).await,
        Commands::Watch => watch_handler().await,
    };
    match result {
        Ok(msg) => {
            if !msg.is_empty() {
                println!("{msg}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
