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

use crate::common::{Harness, green_bitstream, owner, requester};
use afuprd::config::EngineConfig;
use afuprd::reconf::collaborators::ResourceBus;
use afuprd::reconf::context::ResponseKind;
use afuprd::reconf::request::{ReconfAction, ResourceHandle};
use afuprd::reconf::revoke::{RevokePolicy, RevokeState};
use afuprd::reconf::{
    ErrorKind, PortId, ReconfigurationRequest, TerminalReport, TransactionId, WorkflowState,
};
use googletest::prelude::*;
use std::time::Duration;

async fn run(harness: &Harness, request: ReconfigurationRequest) -> TerminalReport {
    harness
        .engine
        .submit(request.with_transaction_id(TransactionId(21)))
        .await
        .expect("port 0 should exist")
        .outcome()
        .await
        .expect("workflow should report")
}

fn reconfigure() -> ReconfigurationRequest {
    ReconfigurationRequest::reconfigure(PortId(0), green_bitstream(0, 25, 32), requester())
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn owner_that_holds_on_is_force_revoked() {
    let harness = Harness::new();
    let afu = ResourceHandle::afu(PortId(0));
    harness.bind_owner(afu);

    let report = run(&harness, reconfigure().with_app_context(5)).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.afu_revoke, eq(RevokeState::ForceRevoked));
    expect_that!(report.afu_revoke_attempts, eq(400));
    expect_that!(harness.registry.owner_count(afu), eq(0));

    let told = harness.events.for_session(&owner());
    assert_that!(told.len(), eq(1));
    expect_that!(told[0].response_kind, eq(ResponseKind::AsyncReleaseRequested));
    expect_that!(told[0].device, eq(afu));
    expect_that!(told[0].transaction_id, eq(TransactionId(21)));
    expect_that!(told[0].app_context, eq(5));
    expect_that!(harness.events.for_session(&requester()).len(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn honoured_owner_keeps_the_port() {
    let harness = Harness::new();
    let afu = ResourceHandle::afu(PortId(0));
    harness.bind_owner(afu);

    let report = run(
        &harness,
        reconfigure()
            .with_action(ReconfAction::HonorOwner)
            .with_timeout(Duration::from_millis(50)),
    )
    .await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::DeviceBusy))
    );
    expect_that!(report.error_code(), eq(26));
    expect_that!(report.failed_in, some(eq(&WorkflowState::RevokingAfu)));
    expect_that!(report.afu_revoke, eq(RevokeState::OwnerRetained));
    expect_that!(harness.registry.owners(afu), eq(&vec![owner()]));
    expect_that!(harness.port(0).deactivate_calls(), eq(0));
    expect_that!(harness.port(0).programmed(), is_empty());
    expect_that!(harness.events.for_session(&owner()), is_empty());
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn honoured_owner_without_grace_is_not_polled() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));

    let report = run(
        &harness,
        ReconfigurationRequest::deactivate(PortId(0), requester())
            .with_action(ReconfAction::HonorOwner),
    )
    .await;

    expect_that!(report.error_code(), eq(26));
    expect_that!(report.afu_revoke_attempts, eq(0));
    expect_that!(harness.owners.requests().len(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn grace_period_is_waited_out_before_polling() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    harness.owners.release_after(Some(Duration::from_millis(150)));

    let report = run(
        &harness,
        reconfigure().with_timeout(Duration::from_millis(200)),
    )
    .await;

    expect_that!(report.afu_revoke, eq(RevokeState::Released));
    expect_that!(report.afu_revoke_attempts, eq(1));
    let asked = harness.owners.requests();
    assert_that!(asked.len(), eq(1));
    expect_that!(asked[0].2.grace, eq(Duration::from_millis(200)));
    expect_that!(asked[0].2.transaction_id, eq(TransactionId(21)));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn signal_tap_follows_its_own_policy() {
    let mut config = EngineConfig::default();
    config.timing.signal_tap_revoke = RevokePolicy {
        max_tries: 3,
        retry_interval: Duration::from_millis(5),
    };
    let harness = Harness::with(config, &["fpga0"]);
    let tap = ResourceHandle::signal_tap(PortId(0));
    harness.registry.add_resource(tap);
    harness.bind_owner(tap);

    let report = run(&harness, reconfigure()).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.afu_revoke, eq(RevokeState::Released));
    expect_that!(report.afu_revoke_attempts, eq(0));
    expect_that!(report.signal_tap_revoke, eq(RevokeState::ForceRevoked));
    expect_that!(report.signal_tap_revoke_attempts, eq(3));
    let told = harness.events.for_session(&owner());
    assert_that!(told.len(), eq(1));
    expect_that!(told[0].device, eq(tap));
}
