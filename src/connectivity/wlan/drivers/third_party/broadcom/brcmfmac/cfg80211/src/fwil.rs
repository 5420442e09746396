// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Firmware interface layer: the commands the state machine issues to the dongle.

use {
    crate::{
        error::FwError,
        ie::{SecurityIe, SecurityIeKind, RSN_CAP_MFP_CAPABLE, RSN_CAP_MFP_REQUIRED},
        ieee80211::{akm, cipher, AuthType, ReasonCode},
        mac::MacAddr,
        sme::SaeFrame,
    },
    serde::Serialize,
};

pub type FwResult<T> = Result<T, FwError>;

pub const WSEC_NONE: u32 = 0;
pub const WEP_ENABLED: u32 = 0x0001;
pub const TKIP_ENABLED: u32 = 0x0002;
pub const AES_ENABLED: u32 = 0x0004;

pub const WPA_AUTH_DISABLED: u32 = 0x0000;
pub const WPA_AUTH_UNSPECIFIED: u32 = 0x0002;
pub const WPA_AUTH_PSK: u32 = 0x0004;
pub const WPA2_AUTH_UNSPECIFIED: u32 = 0x0040;
pub const WPA2_AUTH_PSK: u32 = 0x0080;
pub const WPA2_AUTH_1X_SHA256: u32 = 0x1000;
pub const WPA2_AUTH_FT: u32 = 0x4000;
pub const WPA2_AUTH_PSK_SHA256: u32 = 0x8000;
pub const WPA3_AUTH_SAE_PSK: u32 = 0x40000;

pub const ESCAN_REQ_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscanAction {
    Start,
    Continue,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Active,
    Passive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscanParams {
    pub version: u32,
    pub action: EscanAction,
    pub sync_id: u16,
    pub scan_type: ScanType,
    pub ssids: Vec<Vec<u8>>,
    pub chanspecs: Vec<u16>,
    pub active_time_ms: u32,
    pub passive_time_ms: u32,
    pub home_time_ms: u32,
}

impl EscanParams {
    /// Parameters that stop the scan in progress.
    pub fn abort(sync_id: u16) -> Self {
        Self {
            version: ESCAN_REQ_VERSION,
            action: EscanAction::Abort,
            sync_id,
            scan_type: ScanType::Passive,
            ssids: vec![],
            chanspecs: vec![],
            active_time_ms: 0,
            passive_time_ms: 0,
            home_time_ms: 0,
        }
    }
}

/// Firmware's internal association state machine can be held after it sends an
/// authentication response so that the host can run SAE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocMgrCmd {
    PauseOnAuthResp,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwAuthType {
    Open,
    SharedKey,
    Auto,
    Sae,
}

impl From<AuthType> for FwAuthType {
    fn from(auth_type: AuthType) -> Self {
        match auth_type {
            AuthType::OpenSystem | AuthType::FastBssTransition => FwAuthType::Open,
            AuthType::SharedKey => FwAuthType::SharedKey,
            AuthType::Sae => FwAuthType::Sae,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mfp {
    None,
    Capable,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsecConfig {
    pub wsec: u32,
    pub wpa_auth: u32,
    pub mfp: Mfp,
}

impl WsecConfig {
    pub fn open() -> Self {
        Self { wsec: WSEC_NONE, wpa_auth: WPA_AUTH_DISABLED, mfp: Mfp::None }
    }

    pub fn wep() -> Self {
        Self { wsec: WEP_ENABLED, wpa_auth: WPA_AUTH_DISABLED, mfp: Mfp::None }
    }

    pub fn from_security_ie(ie: &SecurityIe) -> Self {
        let wsec = std::iter::once(ie.group_cipher)
            .chain(ie.pairwise_ciphers.iter().copied())
            .fold(WSEC_NONE, |wsec, suite| wsec | cipher_to_wsec(suite));
        let wpa_auth = ie.akms.iter().fold(WPA_AUTH_DISABLED, |wpa_auth, suite| {
            wpa_auth | akm_to_wpa_auth(ie.kind, *suite)
        });
        let mfp = if ie.rsn_capabilities & RSN_CAP_MFP_REQUIRED != 0 {
            Mfp::Required
        } else if ie.rsn_capabilities & RSN_CAP_MFP_CAPABLE != 0 {
            Mfp::Capable
        } else {
            Mfp::None
        };
        Self { wsec, wpa_auth, mfp }
    }
}

fn cipher_to_wsec(suite: u8) -> u32 {
    match suite {
        cipher::WEP_40 | cipher::WEP_104 => WEP_ENABLED,
        cipher::TKIP => TKIP_ENABLED,
        cipher::CCMP_128 | cipher::CCMP_256 | cipher::GCMP_128 | cipher::GCMP_256 => AES_ENABLED,
        _ => WSEC_NONE,
    }
}

fn akm_to_wpa_auth(kind: SecurityIeKind, suite: u8) -> u32 {
    match (kind, suite) {
        (SecurityIeKind::Wpa1, akm::EAP) => WPA_AUTH_UNSPECIFIED,
        (SecurityIeKind::Wpa1, akm::PSK) => WPA_AUTH_PSK,
        (SecurityIeKind::Wpa1, _) => WPA_AUTH_DISABLED,
        (SecurityIeKind::Rsn, akm::EAP) => WPA2_AUTH_UNSPECIFIED,
        (SecurityIeKind::Rsn, akm::PSK) => WPA2_AUTH_PSK,
        (SecurityIeKind::Rsn, akm::FT_EAP) => WPA2_AUTH_UNSPECIFIED | WPA2_AUTH_FT,
        (SecurityIeKind::Rsn, akm::FT_PSK) => WPA2_AUTH_PSK | WPA2_AUTH_FT,
        (SecurityIeKind::Rsn, akm::EAP_SHA256) => WPA2_AUTH_1X_SHA256,
        (SecurityIeKind::Rsn, akm::PSK_SHA256) => WPA2_AUTH_PSK_SHA256,
        (SecurityIeKind::Rsn, akm::SAE) | (SecurityIeKind::Rsn, akm::FT_SAE) => WPA3_AUTH_SAE_PSK,
        (SecurityIeKind::Rsn, _) => WPA_AUTH_DISABLED,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Pairwise,
    Group,
    Igtk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub key_id: u16,
    pub key_type: KeyType,
    pub cipher_suite: u8,
    pub peer_addr: MacAddr,
    pub rsc: u64,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub ssid: Vec<u8>,
    pub bssid: MacAddr,
    pub chanspec: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssocInfo {
    pub req_ies: Vec<u8>,
    pub resp_ies: Vec<u8>,
    pub aid: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalInfo {
    pub rssi_dbm: i8,
    pub snr_db: i8,
}

/// Firmware packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub rx_good: u32,
    pub rx_bad: u32,
    pub rx_ocast: u32,
    pub tx_good: u32,
    pub tx_bad: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApConfig {
    pub ssid: Vec<u8>,
    pub chanspec: u16,
    pub beacon_period: u16,
    pub dtim_period: u8,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WmmAcParams {
    pub aifsn: u8,
    pub ecw_min: u8,
    pub ecw_max: u8,
    pub txop_limit: u16,
    pub acm: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WmmParams {
    pub apsd: bool,
    pub ac_be: WmmAcParams,
    pub ac_bk: WmmAcParams,
    pub ac_vi: WmmAcParams,
    pub ac_vo: WmmAcParams,
}

/// The IOVAR/ioctl transport to the dongle. Every call is synchronous from the caller's point
/// of view; the firmware reports the outcome of long-running operations through events.
pub trait Firmware: Send + Sync {
    /// Minimum power consumption mode. Disabled while a scan runs.
    fn set_mpc(&self, ifidx: u8, enable: bool) -> FwResult<()>;
    fn escan(&self, ifidx: u8, params: &EscanParams) -> FwResult<()>;
    fn set_key(&self, ifidx: u8, key: &KeyConfig) -> FwResult<()>;
    fn set_wsec(&self, ifidx: u8, config: &WsecConfig) -> FwResult<()>;
    fn set_auth_type(&self, ifidx: u8, auth_type: FwAuthType) -> FwResult<()>;
    fn assoc_mgr_cmd(&self, ifidx: u8, cmd: AssocMgrCmd) -> FwResult<()>;
    fn join(&self, ifidx: u8, params: &JoinParams) -> FwResult<()>;
    fn reassoc(&self, ifidx: u8, params: &JoinParams) -> FwResult<()>;
    fn disassoc(&self, ifidx: u8, bssid: &MacAddr, reason: ReasonCode) -> FwResult<()>;
    fn send_sae_frame(&self, ifidx: u8, frame: &SaeFrame) -> FwResult<()>;
    fn assoc_info(&self, ifidx: u8) -> FwResult<AssocInfo>;
    fn chanspec(&self, ifidx: u8) -> FwResult<u16>;
    /// Raw BSS info buffer for the BSS the interface is joined to or joining.
    fn bss_info(&self, ifidx: u8) -> FwResult<Vec<u8>>;
    fn signal(&self, ifidx: u8) -> FwResult<SignalInfo>;
    fn counters(&self, ifidx: u8) -> FwResult<Counters>;
    fn reset_counters(&self, ifidx: u8) -> FwResult<()>;
    fn start_ap(&self, ifidx: u8, config: &ApConfig) -> FwResult<()>;
    fn stop_ap(&self, ifidx: u8) -> FwResult<()>;
    fn eapol_tx(&self, ifidx: u8, src: &MacAddr, dst: &MacAddr, data: &[u8]) -> FwResult<()>;
    fn wmm_params(&self, ifidx: u8) -> FwResult<WmmParams>;
}
