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

use crate::common::{Harness, green_bitstream, requester};
use afuprd::platforms::simulated::Transition;
use afuprd::reconf::collaborators::PortControl;
use afuprd::reconf::context::ResponseKind;
use afuprd::reconf::error::{ActivationFault, TimeoutKind};
use afuprd::reconf::request::ResourceHandle;
use afuprd::reconf::{
    ErrorKind, PortId, ReconfigurationRequest, TerminalReport, TransactionId, WorkflowState,
};
use googletest::prelude::*;
use rstest::*;
use std::time::Duration;

async fn run(harness: &Harness, request: ReconfigurationRequest) -> TerminalReport {
    harness
        .engine
        .submit(request)
        .await
        .expect("port 0 should exist")
        .outcome()
        .await
        .expect("workflow should report")
}

fn activate() -> ReconfigurationRequest {
    ReconfigurationRequest::activate(PortId(0), requester())
}

fn deactivate() -> ReconfigurationRequest {
    ReconfigurationRequest::deactivate(PortId(0), requester())
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn deactivate_then_activate() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    harness.owners.release_after(Some(Duration::from_millis(1)));

    let down = run(&harness, deactivate().with_transaction_id(TransactionId(1))).await;
    expect_that!(down.final_state, eq(&WorkflowState::Completed));
    expect_that!(harness.port(0).is_active(), eq(false));

    let up = run(&harness, activate().with_transaction_id(TransactionId(2))).await;
    expect_that!(up.final_state, eq(&WorkflowState::Completed));
    expect_that!(harness.port(0).is_active(), eq(true));

    expect_that!(harness.power.requests(), is_empty());
    expect_that!(harness.port(0).programmed(), is_empty());
    let events = harness.events.for_session(&requester());
    assert_that!(events.len(), eq(2));
    for (event, txn) in events.iter().zip([1, 2]) {
        expect_that!(event.response_kind, eq(ResponseKind::ActivationChanged));
        expect_that!(event.transaction_id, eq(TransactionId(txn)));
        expect_that!(event.error_code(), eq(0));
    }
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::activate_active(true, activate(), ActivationFault::AlreadyActive, 28)]
#[case::deactivate_inactive(false, deactivate(), ActivationFault::NoAfu, 27)]
async fn request_matching_the_current_state_is_refused(
    #[case] active: bool,
    #[case] request: ReconfigurationRequest,
    #[case] fault: ActivationFault,
    #[case] code: u32,
) {
    let harness = Harness::new();
    harness.port(0).set_active(active);

    let report = run(&harness, request).await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::Activation(fault)))
    );
    expect_that!(report.error_code(), eq(code));
    expect_that!(harness.port(0).activate_calls(), eq(0));
    expect_that!(harness.port(0).deactivate_calls(), eq(0));
    expect_that!(harness.events.for_session(&requester()).len(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn deactivation_that_never_settles_times_out() {
    let harness = Harness::new();
    harness.port(0).set_deactivation(Transition::Never);

    let report = run(&harness, deactivate()).await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::Timeout(
            TimeoutKind::Deactivate
        )))
    );
    expect_that!(report.error_code(), eq(30));
    expect_that!(report.elapsed, ge(Duration::from_secs(1)));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn slow_activation_within_the_timeout_completes() {
    let harness = Harness::new();
    harness.port(0).set_active(false);
    harness
        .port(0)
        .set_activation(Transition::After(Duration::from_millis(300)));

    let report = run(&harness, activate()).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.elapsed, ge(Duration::from_millis(300)));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn rejected_activation_is_reported() {
    let harness = Harness::new();
    harness.port(0).set_active(false);
    harness.port(0).set_activation(Transition::Fail);

    let report = run(&harness, activate()).await;

    expect_that!(report.error_code(), eq(29));
    expect_that!(report.failed_in, some(eq(&WorkflowState::Reactivating)));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn reconfigured_port_can_be_deactivated_again() {
    let harness = Harness::new();
    let image = green_bitstream(0, 10, 8);
    let reconf = run(
        &harness,
        ReconfigurationRequest::reconfigure(PortId(0), image, requester()),
    )
    .await;
    expect_that!(reconf.final_state, eq(&WorkflowState::Completed));

    let down = run(&harness, deactivate()).await;
    expect_that!(down.final_state, eq(&WorkflowState::Completed));
    expect_that!(harness.port(0).deactivate_calls(), eq(2));
}
