// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Requests from and notifications to the SME.

use {
    crate::{
        chanspec::Channel,
        error::Status,
        fwil::{KeyConfig, ScanType, WmmParams},
        ieee80211::{AuthType, BssType, ReasonCode, StatusCode},
        mac::MacAddr,
    },
    futures::channel::mpsc,
    log::error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BssDescription {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub bss_type: BssType,
    pub beacon_period: u16,
    pub capability_info: u16,
    /// Every IE the BSS advertised, SSID included.
    pub ies: Vec<u8>,
    pub channel: Channel,
    pub rssi_dbm: i8,
    pub snr_db: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub txn_id: u64,
    pub scan_type: ScanType,
    /// Channel numbers to visit. Empty means every supported channel.
    pub channels: Vec<u8>,
    pub ssids: Vec<Vec<u8>>,
    pub min_channel_time_ms: Option<u32>,
    pub max_channel_time_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub selected_bss: Option<BssDescription>,
    pub auth_type: AuthType,
    /// A WPA1 vendor IE or an RSNE, header included. Empty for open and WEP networks.
    pub security_ie: Vec<u8>,
    pub wep_key: Option<KeyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub peer_sta_address: MacAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoamRequest {
    pub selected_bss: BssDescription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeauthRequest {
    pub peer_sta_address: MacAddr,
    pub reason_code: ReasonCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassocRequest {
    pub peer_sta_address: MacAddr,
    pub reason_code: ReasonCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    Refused,
    AntiCloggingTokenRequired,
    FiniteCyclicGroupNotSupported,
    Rejected,
    FailureTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub peer_sta_address: MacAddr,
    pub result_code: AuthResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocResult {
    Success,
    RefusedReasonUnspecified,
    RefusedNotAuthenticated,
    RefusedCapabilitiesMismatch,
    RefusedExternalReason,
    RefusedApOutOfMemory,
    RefusedBasicRatesMismatch,
    RejectedEmergencyServicesNotSupported,
    RefusedTemporarily,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocResponse {
    pub peer_sta_address: MacAddr,
    pub result_code: AssocResult,
    pub association_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaeHandshakeResponse {
    pub peer_sta_address: MacAddr,
    pub status_code: StatusCode,
}

/// An SAE authentication frame exchanged with the supplicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaeFrame {
    pub peer_sta_address: MacAddr,
    pub status_code: StatusCode,
    pub seq_num: u16,
    pub sae_fields: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetKeysRequest {
    pub keys: Vec<KeyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub ssid: Vec<u8>,
    pub bss_type: BssType,
    pub beacon_period: u16,
    pub dtim_period: u8,
    pub channel: u8,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequest {
    pub ssid: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolRequest {
    pub src_addr: MacAddr,
    pub dst_addr: MacAddr,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResultCode {
    Success,
    NotSupported,
    InvalidArgs,
    InternalError,
    ShouldWait,
    CanceledByDriverOrFirmware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Success,
    BssAlreadyStartedOrJoined,
    ResetRequiredBeforeStart,
    NotSupported,
    TimedOut,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    Success,
    BssAlreadyStopped,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EapolResultCode {
    Success,
    TransmissionFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmeEvent {
    OnScanResult {
        txn_id: u64,
        bss: BssDescription,
    },
    OnScanEnd {
        txn_id: u64,
        code: ScanResultCode,
    },
    ConnectConf {
        peer_sta_address: MacAddr,
        result_code: StatusCode,
        association_id: u16,
        association_ies: Vec<u8>,
    },
    RoamConf {
        selected_bssid: MacAddr,
        status_code: StatusCode,
        original_association_maintained: bool,
        target_bss_authenticated: bool,
        association_id: u16,
        association_ies: Vec<u8>,
    },
    RoamStartInd {
        selected_bssid: MacAddr,
        selected_bss: Option<BssDescription>,
        original_association_maintained: bool,
    },
    RoamResultInd {
        selected_bssid: MacAddr,
        status_code: StatusCode,
        original_association_maintained: bool,
        target_bss_authenticated: bool,
        association_id: u16,
        association_ies: Vec<u8>,
    },
    DeauthConf {
        peer_sta_address: MacAddr,
    },
    DeauthInd {
        peer_sta_address: MacAddr,
        reason_code: ReasonCode,
        locally_initiated: bool,
    },
    DisassocConf {
        status: Status,
    },
    DisassocInd {
        peer_sta_address: MacAddr,
        reason_code: ReasonCode,
        locally_initiated: bool,
    },
    AuthInd {
        peer_sta_address: MacAddr,
        auth_type: AuthType,
    },
    AssocInd {
        peer_sta_address: MacAddr,
        listen_interval: u16,
        ssid: Option<Vec<u8>>,
        rsne: Option<Vec<u8>>,
    },
    SaeHandshakeInd {
        peer_sta_address: MacAddr,
    },
    SaeFrameRx(SaeFrame),
    EapolConf {
        result_code: EapolResultCode,
        dst_addr: MacAddr,
    },
    EapolInd {
        src_addr: MacAddr,
        dst_addr: MacAddr,
        data: Vec<u8>,
    },
    StartConf {
        result_code: StartResult,
    },
    StopConf {
        result_code: StopResult,
    },
    OnChannelSwitch {
        new_channel: u8,
    },
    SignalReport {
        rssi_dbm: i8,
        snr_db: i8,
    },
    OnWmmStatusResp {
        status: Status,
        params: WmmParams,
    },
}

pub type SmeStream = mpsc::UnboundedReceiver<SmeEvent>;

#[derive(Debug, Clone)]
pub struct SmeSink {
    sink: mpsc::UnboundedSender<SmeEvent>,
}

impl SmeSink {
    pub fn new(sink: mpsc::UnboundedSender<SmeEvent>) -> Self {
        SmeSink { sink }
    }

    pub fn send(&self, event: SmeEvent) {
        if let Err(e) = self.sink.unbounded_send(event) {
            // A disconnected SME can not be told anything. Keep running.
            if !e.is_disconnected() {
                error!("failed to send SME event: {:?}", e);
            }
        }
    }
}
