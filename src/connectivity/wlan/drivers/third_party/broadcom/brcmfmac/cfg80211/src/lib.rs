// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The cfg80211 layer of the Broadcom FullMAC driver. It turns SME requests into firmware
//! commands and firmware events into SME notifications for scan, connect, roam, disconnect
//! and SoftAP operation. Firmware itself is reached through the [`Firmware`] trait and all
//! timeouts go through a [`Scheduler`], so the state machine runs unchanged against real
//! hardware, a simulated bus or the fakes in the unit tests.
//!
//! [`Firmware`]: crate::fwil::Firmware
//! [`Scheduler`]: crate::timer::Scheduler

pub mod ap;
pub mod bss;
pub mod cfg80211;
pub mod chanspec;
pub mod config;
pub mod connect;
pub mod disconnect;
pub mod error;
mod event_dispatch;
pub mod fweh;
pub mod fwil;
pub mod ie;
pub mod ieee80211;
pub mod mac;
pub mod roam;
pub mod scan;
pub mod sme;
pub mod status;
pub mod timer;
pub mod vif;

#[cfg(test)]
mod test_utils;

pub use {
    crate::cfg80211::Cfg80211,
    config::Config,
    error::{Error, Status},
    fwil::Firmware,
    sme::{SmeEvent, SmeStream},
    timer::{ManualScheduler, Scheduler, WorkQueueScheduler},
};
