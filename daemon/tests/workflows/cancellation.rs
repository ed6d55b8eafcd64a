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

use crate::common::{Harness, PowerReply, green_bitstream, owner, requester};
use afuprd::config::EngineConfig;
use afuprd::reconf::collaborators::{PortControl, ResourceBus};
use afuprd::reconf::request::ResourceHandle;
use afuprd::reconf::{ErrorKind, PortId, ReconfigurationRequest, TransactionId, WorkflowState};
use googletest::prelude::*;
use std::time::Duration;

fn reconfigure(port: u32, txn: u64) -> ReconfigurationRequest {
    ReconfigurationRequest::reconfigure(
        PortId(port),
        green_bitstream(port as u8, 25, 16),
        requester(),
    )
    .with_transaction_id(TransactionId(txn))
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn superseded_revoke_never_forces_the_owner_out() {
    let harness = Harness::new();
    let afu = ResourceHandle::afu(PortId(0));
    harness.bind_owner(afu);

    let first = harness
        .engine
        .submit(reconfigure(0, 1))
        .await
        .expect("first submit");
    tokio::time::sleep(Duration::from_millis(100)).await;
    expect_that!(
        harness.engine.port_state(PortId(0)),
        some(eq(&WorkflowState::RevokingAfu))
    );

    let second = harness
        .engine
        .submit(
            ReconfigurationRequest::activate(PortId(0), requester())
                .with_transaction_id(TransactionId(2)),
        )
        .await
        .expect("second submit");

    let first = first.outcome().await.expect("first report");
    expect_that!(
        first.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::Cancelled))
    );
    expect_that!(first.error_code(), eq(41));
    expect_that!(first.failed_in, some(eq(&WorkflowState::RevokingAfu)));
    expect_that!(first.afu_revoke_attempts, lt(400));
    expect_that!(harness.registry.owners(afu), eq(&vec![owner()]));

    let second = second.outcome().await.expect("second report");
    expect_that!(second.error_code(), eq(28));

    let events = harness.events.for_session(&requester());
    assert_that!(events.len(), eq(2));
    expect_that!(events[0].transaction_id, eq(TransactionId(1)));
    expect_that!(events[1].transaction_id, eq(TransactionId(2)));
    expect_that!(harness.events.for_session(&owner()), is_empty());
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn teardown_lets_programming_finish_then_stops() {
    let harness = Harness::new();
    harness.port(0).set_program_delay(Duration::from_secs(1));

    let handle = harness
        .engine
        .submit(reconfigure(0, 7))
        .await
        .expect("submit");
    tokio::time::sleep(Duration::from_millis(500)).await;
    expect_that!(
        harness.engine.port_state(PortId(0)),
        some(eq(&WorkflowState::Programming))
    );

    expect_that!(harness.engine.teardown_port(PortId(0)).await, eq(true));
    let report = handle.outcome().await.expect("report");

    expect_that!(report.error_code(), eq(41));
    expect_that!(report.failed_in, some(eq(&WorkflowState::Programming)));
    let port = harness.port(0);
    expect_that!(port.programmed(), eq(&vec![(0, 16)]));
    expect_that!(port.activate_calls(), eq(0));
    expect_that!(port.is_active(), eq(false));
    expect_that!(harness.events.all().len(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn teardown_of_an_idle_port_does_nothing() {
    let harness = Harness::new();
    expect_that!(harness.engine.teardown_port(PortId(0)).await, eq(false));
    expect_that!(harness.events.all(), is_empty());
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn shutdown_reports_every_running_workflow() {
    let harness = Harness::with(EngineConfig::default(), &["fpga0", "fpga1"]);
    harness.power.set_reply(PowerReply::Silent);

    let first = harness
        .engine
        .submit(reconfigure(0, 1))
        .await
        .expect("port 0");
    let second = harness
        .engine
        .submit(reconfigure(1, 2))
        .await
        .expect("port 1");
    tokio::time::sleep(Duration::from_millis(5)).await;
    expect_that!(
        harness.engine.active_ports(),
        eq(&vec![
            (PortId(0), WorkflowState::NegotiatingPower),
            (PortId(1), WorkflowState::NegotiatingPower),
        ])
    );

    harness.engine.shutdown().await;

    expect_that!(harness.engine.active_ports(), is_empty());
    for handle in [first, second] {
        let report = handle.outcome().await.expect("report");
        expect_that!(report.error_code(), eq(41));
    }
    expect_that!(harness.events.all().len(), eq(2));
}
