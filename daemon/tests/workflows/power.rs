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

use crate::common::{Harness, PowerReply, green_bitstream, requester};
use afuprd::config::EngineConfig;
use afuprd::reconf::context::ResponseKind;
use afuprd::reconf::error::TimeoutKind;
use afuprd::reconf::power::PowerState;
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

fn reconfigure(power_watts: u32) -> ReconfigurationRequest {
    ReconfigurationRequest::reconfigure(
        PortId(0),
        green_bitstream(0, power_watts, 16),
        requester(),
    )
    .with_transaction_id(TransactionId(31))
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn silent_power_manager_times_the_workflow_out() {
    let harness = Harness::new();
    harness.power.set_reply(PowerReply::Silent);
    harness.bind_owner(ResourceHandle::afu(PortId(0)));

    let report = run(&harness, reconfigure(25)).await;

    expect_that!(
        report.final_state,
        eq(&WorkflowState::Aborted(ErrorKind::Timeout(
            TimeoutKind::PowerResponse
        )))
    );
    expect_that!(report.failed_in, some(eq(&WorkflowState::NegotiatingPower)));
    expect_that!(report.power_state, eq(PowerState::TimedOut));
    expect_that!(report.elapsed, ge(Duration::from_secs(10)));
    expect_that!(harness.owners.requests(), is_empty());
    expect_that!(harness.engine.port_state(PortId(0)), none());
    expect_that!(harness.engine.active_ports(), is_empty());

    let events = harness.events.all();
    assert_that!(events.len(), eq(1));
    expect_that!(events[0].0, eq(&requester()));
    expect_that!(
        events[0].1.response_kind,
        eq(ResponseKind::ReconfigurationResult)
    );
    expect_that!(events[0].1.error_code(), eq(37));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn power_request_carries_the_bitstream_power() {
    let harness = Harness::new();

    let report = run(&harness, reconfigure(75)).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    let sent = harness.power.requests();
    assert_that!(sent.len(), eq(1));
    expect_that!(sent[0].power_watts, eq(75));
    expect_that!(report.power_transaction, some(eq(sent[0].transaction_id)));
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn grant_arriving_before_the_deadline_is_honoured() {
    let harness = Harness::new();
    harness
        .power
        .set_reply(PowerReply::GrantAfter(Duration::from_secs(2)));

    let report = run(&harness, reconfigure(25)).await;

    expect_that!(report.final_state, eq(&WorkflowState::Completed));
    expect_that!(report.power_state, eq(PowerState::Granted));
    expect_that!(report.elapsed, ge(Duration::from_secs(2)));
}

#[gtest]
#[tokio::test(start_paused = true)]
#[rstest]
#[case::denied(PowerReply::Deny, false, false, 38)]
#[case::override_not_allowed(PowerReply::Deny, true, false, 38)]
#[case::override_not_asked(PowerReply::Deny, false, true, 38)]
#[case::denied_override(PowerReply::Deny, true, true, 0)]
#[case::timed_out_override(PowerReply::Silent, true, true, 0)]
#[case::unreachable(PowerReply::Unreachable, true, true, 39)]
async fn refused_power_and_overrides(
    #[case] reply: PowerReply,
    #[case] proceed: bool,
    #[case] allow_override: bool,
    #[case] code: u32,
) {
    let mut config = EngineConfig::default();
    config.power.allow_override = allow_override;
    let harness = Harness::with(config, &["fpga0"]);
    harness.power.set_reply(reply);

    let report = run(
        &harness,
        reconfigure(25).proceed_without_power_grant(proceed),
    )
    .await;

    expect_that!(report.error_code(), eq(code));
    expect_that!(harness.events.for_session(&requester()).len(), eq(1));
    if code == 0 {
        expect_that!(harness.port(0).programmed().len(), eq(1));
    } else {
        expect_that!(harness.port(0).programmed(), is_empty());
    }
}

#[gtest]
#[tokio::test(start_paused = true)]
async fn late_answer_is_discarded() {
    let mut config = EngineConfig::default();
    config.power.deadline = Duration::from_millis(100);
    let harness = Harness::with(config, &["fpga0"]);
    harness
        .power
        .set_reply(PowerReply::GrantAfter(Duration::from_millis(500)));

    let report = run(&harness, reconfigure(25)).await;
    expect_that!(report.error_code(), eq(37));

    tokio::time::sleep(Duration::from_secs(1)).await;
    expect_that!(harness.port(0).programmed(), is_empty());
    expect_that!(harness.events.all().len(), eq(1));
}
