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

use crate::common::{Harness, OWNER, SLOT_TYPE, green_bitstream, owner, requester};
use afuprd::config::EngineConfig;
use afuprd::platforms::simulated::Transition;
use afuprd::reconf::bitstream::HEADER_LEN;
use afuprd::reconf::collaborators::{PortControl, ResourceBus};
use afuprd::reconf::context::{EventStatus, ResponseKind};
use afuprd::reconf::error::{ActivationFault, MismatchKind, ProtocolFault, TimeoutKind};
use afuprd::reconf::power::PowerState;
use afuprd::reconf::request::{ResourceHandle, ResourceKind};
use afuprd::reconf::revoke::RevokeState;
use afuprd::reconf::{
    ErrorKind, PortId, ReconfigurationRequest, TerminalReport, TransactionId, WorkflowState,
};
use googletest::prelude::*;
use rstest::*;
use std::time::Duration;

async fn reconfigure(harness: &Harness, request: ReconfigurationRequest) -> TerminalReport {
    harness
        .engine
        .submit(request)
        .await
        .expect("port 0 should exist")
        .outcome()
        .await
        .expect("workflow should report")
}

fn request(bitstream: Vec<u8>) -> ReconfigurationRequest {
    ReconfigurationRequest::reconfigure(PortId(0), bitstream, requester())
        .with_transaction_id(TransactionId(11))
        .with_app_context(0xfeed)
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn owned_port_is_reprogrammed() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    harness.owners.release_after(Some(Duration::from_millis(3)));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.error_code(), eq(0));
    expect_that!(report.afu_revoke, eq(RevokeState::Released));
    expect_that!(report.power_state, eq(PowerState::Granted));
    let port = harness.port(0);
    expect_that!(port.programmed(), eq(&vec![(0, 64)]));
    expect_that!(port.deactivate_calls(), eq(1));
    expect_that!(port.activate_calls(), eq(1));
    expect_that!(
        harness.registry.owner_count(ResourceHandle::afu(PortId(0))),
        eq(0)
    );

    let events = harness.events.for_session(&requester());
    assert_that!(events.len(), eq(1));
    expect_that!(events[0].response_kind, eq(ResponseKind::ReconfigurationResult));
    expect_that!(events[0].transaction_id, eq(TransactionId(11)));
    expect_that!(events[0].app_context, eq(0xfeed));
    expect_that!(events[0].status, eq(&EventStatus::Ok));
    expect_that!(harness.events.for_session(&owner()), is_empty());
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn owner_releasing_on_the_fifth_attempt_is_not_force_revoked() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    // Ticks land every 10 ms; the owner lets go between the fourth and the fifth.
    harness.owners.release_after(Some(Duration::from_millis(45)));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.afu_revoke, eq(RevokeState::Released));
    expect_that!(report.afu_revoke_attempts, eq(5));
    expect_that!(harness.events.for_session(&owner()), is_empty());
    let asked = harness.owners.requests();
    assert_that!(asked.len(), eq(1));
    expect_that!(asked[0].0.as_str(), eq(OWNER));
    expect_that!(asked[0].2.requester, eq(&requester()));
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::empty(Vec::new())]
#[case::short_header(vec![0u8; HEADER_LEN - 1])]
#[case::short_payload(green_bitstream(0, 25, 64)[..HEADER_LEN + 10].to_vec())]
async fn malformed_bitstream_aborts_before_touching_anything(#[case] bitstream: Vec<u8>) {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));

    let report = reconfigure(&harness, request(bitstream)).await;

    expect_that!(report.error_code(), eq(12));
    expect_that!(report.failed_in, some(eq(&WorkflowState::ParsingHeader)));
    expect_that!(harness.power.requests(), is_empty());
    expect_that!(harness.owners.requests(), is_empty());
    let port = harness.port(0);
    expect_that!(port.deactivate_calls(), eq(0));
    expect_that!(port.programmed(), is_empty());
    expect_that!(harness.events.for_session(&requester()).len(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn bitstream_for_another_port_is_refused() {
    let harness = Harness::new();

    let report = reconfigure(&harness, request(green_bitstream(1, 25, 64))).await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::ResourceMismatch(
            MismatchKind::Port {
                expected: 0,
                found: 1
            }
        )))
    );
    expect_that!(report.error_code(), eq(42));
    expect_that!(harness.power.requests(), is_empty());
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::matching(SLOT_TYPE, 0)]
#[case::foreign(*b"some-other-slot!", 43)]
async fn slot_type_is_checked_when_the_port_knows_it(
    #[case] port_slot: [u8; 16],
    #[case] code: u32,
) {
    let harness = Harness::new();
    harness.port(0).set_slot_type(Some(port_slot));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.error_code(), eq(code));
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::left_deactivated(true, WorkflowState::DeactivatedOnly, ResponseKind::ActivationChanged, 44)]
#[case::reported(
    false,
    WorkflowState::Aborted(ErrorKind::Timeout(TimeoutKind::Reactivate)),
    ResponseKind::ReconfigurationResult,
    40
)]
async fn reactivation_timeout(
    #[case] leave_deactivated: bool,
    #[case] final_state: WorkflowState,
    #[case] response_kind: ResponseKind,
    #[case] code: u32,
) {
    let harness = Harness::new();
    harness.port(0).set_activation(Transition::Never);

    let report = reconfigure(
        &harness,
        request(green_bitstream(0, 25, 64)).leave_deactivated(leave_deactivated),
    )
    .await;

    expect_that!(report.final_state, eq(&final_state));
    expect_that!(report.response_kind, eq(response_kind));
    expect_that!(report.error_code(), eq(code));
    let port = harness.port(0);
    expect_that!(port.programmed(), eq(&vec![(0, 64)]));
    expect_that!(port.is_active(), eq(false));
    let events = harness.events.for_session(&requester());
    assert_that!(events.len(), eq(1));
    expect_that!(events[0].response_kind, eq(response_kind));
    expect_that!(events[0].error_code(), eq(code));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn failed_activation_can_leave_the_port_deactivated() {
    let harness = Harness::new();
    harness.port(0).set_activation(Transition::Fail);

    let report = reconfigure(
        &harness,
        request(green_bitstream(0, 25, 64)).leave_deactivated(true),
    )
    .await;

    expect_that!(report.final_state, eq(&WorkflowState::DeactivatedOnly));
    expect_that!(
        report.status,
        eq(&EventStatus::Deactivated(ErrorKind::Activation(
            ActivationFault::Failed
        )))
    );
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn programming_failure_is_reported_from_programming() {
    let harness = Harness::new();
    harness
        .port(0)
        .fail_programming(ErrorKind::Protocol(ProtocolFault::Crc));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.error_code(), eq(33));
    expect_that!(report.failed_in, some(eq(&WorkflowState::Programming)));
    expect_that!(harness.port(0).activate_calls(), eq(0));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn programming_that_overruns_the_budget_times_out() {
    let harness = Harness::new();
    harness.port(0).set_program_delay(Duration::from_secs(60));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::Timeout(
            TimeoutKind::OutstandingRequest
        )))
    );
    expect_that!(report.error_code(), eq(31));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn inactive_port_skips_revoke_and_deactivation() {
    let harness = Harness::new();
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    harness.port(0).set_active(false);

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.afu_revoke, eq(RevokeState::NotRequested));
    expect_that!(harness.owners.requests(), is_empty());
    expect_that!(harness.port(0).deactivate_calls(), eq(0));
    expect_that!(harness.port(0).activate_calls(), eq(1));
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::after_deactivation(true, true)]
#[case::already_inactive(false, false)]
async fn settle_wait_only_follows_a_deactivation(#[case] active: bool, #[case] waited: bool) {
    let mut config = EngineConfig::default();
    config.timing.deactivate_wait = Duration::from_secs(5);
    let harness = Harness::with(config, &["fpga0"]);
    harness.port(0).set_active(active);

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.elapsed >= Duration::from_secs(5), eq(waited));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn signal_tap_is_revoked_after_the_accelerator() {
    let harness = Harness::new();
    let tap = ResourceHandle::signal_tap(PortId(0));
    harness.registry.add_resource(tap);
    harness.bind_owner(ResourceHandle::afu(PortId(0)));
    harness.bind_owner(tap);
    harness.owners.release_after(Some(Duration::from_millis(1)));

    let report = reconfigure(&harness, request(green_bitstream(0, 25, 64))).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.afu_revoke, eq(RevokeState::Released));
    expect_that!(report.signal_tap_revoke, eq(RevokeState::Released));
    let kinds: Vec<ResourceKind> = harness
        .owners
        .requests()
        .iter()
        .map(|(_, resource, _)| resource.kind)
        .collect();
    expect_that!(kinds, eq(&vec![ResourceKind::Afu, ResourceKind::SignalTap]));
}
