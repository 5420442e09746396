// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::error::Error, serde::Deserialize, std::time::Duration};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub escan_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    /// How long a connect request waits for a disconnect in flight before it proceeds anyway.
    pub disconnect_wait_ms: u64,
    pub roam_timeout_ms: u64,
    pub ap_start_timeout_ms: u64,
    pub signal_report_interval_ms: u64,
    pub active_dwell_ms: u32,
    pub passive_dwell_ms: u32,
    pub home_time_ms: u32,
    /// Firmware roam engine. With either this or `wnm_btm_enabled`, firmware roams on its own
    /// and the SME is told through RoamStartInd/RoamResultInd.
    pub roam_engine_enabled: bool,
    pub wnm_btm_enabled: bool,
    pub mfg_firmware: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            escan_timeout_ms: 10_000,
            connect_timeout_ms: 1500,
            disconnect_timeout_ms: 1000,
            disconnect_wait_ms: 500,
            roam_timeout_ms: 2000,
            ap_start_timeout_ms: 1000,
            signal_report_interval_ms: 1000,
            active_dwell_ms: 40,
            passive_dwell_ms: 120,
            home_time_ms: 45,
            roam_engine_enabled: false,
            wnm_btm_enabled: false,
            mfg_firmware: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn roam_offload(&self) -> bool {
        self.roam_engine_enabled || self.wnm_btm_enabled
    }

    pub fn escan_timeout(&self) -> Duration {
        Duration::from_millis(self.escan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn disconnect_wait(&self) -> Duration {
        Duration::from_millis(self.disconnect_wait_ms)
    }

    pub fn roam_timeout(&self) -> Duration {
        Duration::from_millis(self.roam_timeout_ms)
    }

    pub fn ap_start_timeout(&self) -> Duration {
        Duration::from_millis(self.ap_start_timeout_ms)
    }

    pub fn signal_report_interval(&self) -> Duration {
        Duration::from_millis(self.signal_report_interval_ms)
    }
}
