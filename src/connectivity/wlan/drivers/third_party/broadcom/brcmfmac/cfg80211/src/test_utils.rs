// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        bss::{fake_bss_info, parse_bss_info},
        cfg80211::Cfg80211,
        config::Config,
        error::{FwError, Status},
        fweh::{EventCode, EventMsg, EventStatus, FirmwareEvent, EVENT_MSG_LINK},
        fwil::{
            ApConfig, AssocInfo, AssocMgrCmd, Counters, EscanParams, Firmware, FwAuthType,
            FwResult, JoinParams, KeyConfig, SignalInfo, WmmParams, WsecConfig,
        },
        ie::fake_ies,
        ieee80211::{
            AuthAlgorithmNumber, AuthHdr, AuthType, MgmtHdr, ReasonCode, StatusCode,
            FRAME_CTRL_AUTH,
        },
        mac::MacAddr,
        scan::EscanResultLe,
        sme::{BssDescription, ConnectRequest, SaeFrame, SmeEvent, SmeStream},
        status::SmeState,
        timer::ManualScheduler,
        vif::{MacRole, Vif},
    },
    parking_lot::Mutex,
    std::{collections::HashSet, sync::Arc, time::Duration},
    zerocopy::{
        byteorder::{LittleEndian, U16, U32},
        AsBytes,
    },
};

pub const CLIENT_IFIDX: u8 = 0;
pub const CLIENT_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const SOFTAP_IFIDX: u8 = 1;
pub const SOFTAP_MAC: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
pub const BSSID: MacAddr = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
pub const TARGET_BSSID: MacAddr = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
pub const SSID: &[u8] = b"fuchsia";
/// Channel 6, 20 MHz.
pub const BSS_CHANSPEC: u16 = 0x1006;

/// A command the driver issued to firmware. Queries are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum FwCommand {
    SetMpc { ifidx: u8, enable: bool },
    Escan { ifidx: u8, params: EscanParams },
    SetKey { ifidx: u8, key: KeyConfig },
    SetWsec { ifidx: u8, config: WsecConfig },
    SetAuthType { ifidx: u8, auth_type: FwAuthType },
    AssocMgrCmd { ifidx: u8, cmd: AssocMgrCmd },
    Join { ifidx: u8, params: JoinParams },
    Reassoc { ifidx: u8, params: JoinParams },
    Disassoc { ifidx: u8, bssid: MacAddr, reason: ReasonCode },
    SaeFrame { ifidx: u8, frame: SaeFrame },
    ResetCounters { ifidx: u8 },
    StartAp { ifidx: u8, config: ApConfig },
    StopAp { ifidx: u8 },
    EapolTx { ifidx: u8, src: MacAddr, dst: MacAddr, data: Vec<u8> },
}

struct FakeFirmwareState {
    commands: Vec<FwCommand>,
    failing: HashSet<&'static str>,
    assoc_info: AssocInfo,
    chanspec: u16,
    bss_info: Vec<u8>,
    signal: SignalInfo,
    counters: Counters,
    wmm_params: WmmParams,
}

/// Records commands and answers queries with canned values. A command can be made to fail by
/// the name it is reported under in `Error::Firmware`.
pub struct FakeFirmware {
    state: Mutex<FakeFirmwareState>,
}

impl FakeFirmware {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeFirmwareState {
                commands: vec![],
                failing: HashSet::new(),
                assoc_info: AssocInfo::default(),
                chanspec: BSS_CHANSPEC,
                bss_info: vec![],
                signal: SignalInfo::default(),
                counters: Counters::default(),
                wmm_params: WmmParams::default(),
            }),
        }
    }

    pub fn fail(&self, cmd: &'static str) {
        self.state.lock().failing.insert(cmd);
    }

    pub fn clear_failure(&self, cmd: &'static str) {
        self.state.lock().failing.remove(cmd);
    }

    pub fn commands(&self) -> Vec<FwCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    pub fn set_assoc_info(&self, assoc_info: AssocInfo) {
        self.state.lock().assoc_info = assoc_info;
    }

    pub fn set_chanspec(&self, chanspec: u16) {
        self.state.lock().chanspec = chanspec;
    }

    pub fn set_bss_info(&self, bss_info: Vec<u8>) {
        self.state.lock().bss_info = bss_info;
    }

    pub fn set_signal(&self, rssi_dbm: i8, snr_db: i8) {
        self.state.lock().signal = SignalInfo { rssi_dbm, snr_db };
    }

    pub fn set_wmm_params(&self, wmm_params: WmmParams) {
        self.state.lock().wmm_params = wmm_params;
    }

    fn check(&self, cmd: &'static str) -> FwResult<()> {
        if self.state.lock().failing.contains(cmd) {
            Err(FwError::new(Status::IO))
        } else {
            Ok(())
        }
    }

    fn record(&self, cmd: &'static str, command: FwCommand) -> FwResult<()> {
        self.state.lock().commands.push(command);
        self.check(cmd)
    }

    fn query<T>(&self, cmd: &'static str, get: impl FnOnce(&FakeFirmwareState) -> T) -> FwResult<T> {
        self.check(cmd)?;
        Ok(get(&*self.state.lock()))
    }
}

impl Firmware for FakeFirmware {
    fn set_mpc(&self, ifidx: u8, enable: bool) -> FwResult<()> {
        self.record("mpc", FwCommand::SetMpc { ifidx, enable })
    }

    fn escan(&self, ifidx: u8, params: &EscanParams) -> FwResult<()> {
        self.record("escan", FwCommand::Escan { ifidx, params: params.clone() })
    }

    fn set_key(&self, ifidx: u8, key: &KeyConfig) -> FwResult<()> {
        self.record("wsec_key", FwCommand::SetKey { ifidx, key: key.clone() })
    }

    fn set_wsec(&self, ifidx: u8, config: &WsecConfig) -> FwResult<()> {
        self.record("wsec", FwCommand::SetWsec { ifidx, config: *config })
    }

    fn set_auth_type(&self, ifidx: u8, auth_type: FwAuthType) -> FwResult<()> {
        self.record("auth", FwCommand::SetAuthType { ifidx, auth_type })
    }

    fn assoc_mgr_cmd(&self, ifidx: u8, cmd: AssocMgrCmd) -> FwResult<()> {
        self.record("assoc_mgr_cmd", FwCommand::AssocMgrCmd { ifidx, cmd })
    }

    fn join(&self, ifidx: u8, params: &JoinParams) -> FwResult<()> {
        self.record("join", FwCommand::Join { ifidx, params: params.clone() })
    }

    fn reassoc(&self, ifidx: u8, params: &JoinParams) -> FwResult<()> {
        self.record("reassoc", FwCommand::Reassoc { ifidx, params: params.clone() })
    }

    fn disassoc(&self, ifidx: u8, bssid: &MacAddr, reason: ReasonCode) -> FwResult<()> {
        self.record("disassoc", FwCommand::Disassoc { ifidx, bssid: *bssid, reason })
    }

    fn send_sae_frame(&self, ifidx: u8, frame: &SaeFrame) -> FwResult<()> {
        self.record("sae_frame", FwCommand::SaeFrame { ifidx, frame: frame.clone() })
    }

    fn assoc_info(&self, _ifidx: u8) -> FwResult<AssocInfo> {
        self.query("assoc_info", |state| state.assoc_info.clone())
    }

    fn chanspec(&self, _ifidx: u8) -> FwResult<u16> {
        self.query("chanspec", |state| state.chanspec)
    }

    fn bss_info(&self, _ifidx: u8) -> FwResult<Vec<u8>> {
        self.query("bss_info", |state| state.bss_info.clone())
    }

    fn signal(&self, _ifidx: u8) -> FwResult<SignalInfo> {
        self.query("signal", |state| state.signal)
    }

    fn counters(&self, _ifidx: u8) -> FwResult<Counters> {
        self.query("counters", |state| state.counters)
    }

    fn reset_counters(&self, ifidx: u8) -> FwResult<()> {
        self.record("reset_counters", FwCommand::ResetCounters { ifidx })
    }

    fn start_ap(&self, ifidx: u8, config: &ApConfig) -> FwResult<()> {
        self.record("start_ap", FwCommand::StartAp { ifidx, config: config.clone() })
    }

    fn stop_ap(&self, ifidx: u8) -> FwResult<()> {
        self.record("stop_ap", FwCommand::StopAp { ifidx })
    }

    fn eapol_tx(&self, ifidx: u8, src: &MacAddr, dst: &MacAddr, data: &[u8]) -> FwResult<()> {
        self.record(
            "eapol",
            FwCommand::EapolTx { ifidx, src: *src, dst: *dst, data: data.to_vec() },
        )
    }

    fn wmm_params(&self, _ifidx: u8) -> FwResult<WmmParams> {
        self.query("wmm", |state| state.wmm_params)
    }
}

/// A `Cfg80211` with a client interface, wired to a `FakeFirmware`, a `ManualScheduler` and an
/// SME receiver.
pub struct TestHelper {
    pub cfg: Arc<Cfg80211>,
    pub fw: Arc<FakeFirmware>,
    pub scheduler: Arc<ManualScheduler>,
    sme_stream: SmeStream,
}

impl TestHelper {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let fw = Arc::new(FakeFirmware::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let (cfg, sme_stream) = Cfg80211::new(config, fw.clone(), scheduler.clone());
        cfg.vifs().add(Vif::new(CLIENT_IFIDX, 0, MacRole::Client, CLIENT_MAC));
        Self { cfg, fw, scheduler, sme_stream }
    }

    pub fn client(&self) -> Arc<Vif> {
        self.cfg.vifs().get(CLIENT_IFIDX).expect("client interface exists")
    }

    pub fn add_softap(&self) -> Arc<Vif> {
        self.cfg.vifs().add(Vif::new(SOFTAP_IFIDX, 1, MacRole::Ap, SOFTAP_MAC))
    }

    /// Moves the clock and runs every timeout that came due.
    pub fn advance(&self, delta: Duration) {
        for event in self.scheduler.advance(delta) {
            self.cfg.handle_timeout(event);
        }
    }

    pub fn next_sme_event(&mut self) -> Option<SmeEvent> {
        self.sme_stream.try_next().ok().flatten()
    }

    pub fn drain_sme_events(&mut self) -> Vec<SmeEvent> {
        std::iter::from_fn(|| self.next_sme_event()).collect()
    }

    /// Connects the client interface to `BSSID` and drops the resulting notifications.
    pub fn connect_client(&mut self) {
        self.cfg.connect_req(CLIENT_IFIDX, connect_request(BSSID)).expect("connect started");
        self.cfg.dispatch_event(&link_event(CLIENT_IFIDX, BSSID, true)).expect("link up handled");
        let events = self.drain_sme_events();
        match &events[..] {
            [SmeEvent::ConnectConf { result_code: StatusCode::SUCCESS, .. }] => (),
            other => panic!("unexpected events while connecting: {:?}", other),
        }
        assert!(self.client().sme_state.contains(SmeState::CONNECTED));
    }
}

pub fn fake_event(
    event_code: EventCode,
    status: EventStatus,
    ifidx: u8,
    addr: MacAddr,
) -> FirmwareEvent {
    FirmwareEvent::new(
        EventMsg { ifidx, bsscfgidx: ifidx, addr, ..EventMsg::new(event_code, status) },
        vec![],
    )
}

pub fn link_event(ifidx: u8, addr: MacAddr, up: bool) -> FirmwareEvent {
    let mut event = fake_event(EventCode::LINK, EventStatus::SUCCESS, ifidx, addr);
    if up {
        event.msg.flags |= EVENT_MSG_LINK;
    }
    event
}

pub fn escan_result_event(
    sync_id: u16,
    status: EventStatus,
    bss_count: u16,
    bss_info: &[u8],
) -> FirmwareEvent {
    let header = EscanResultLe {
        buflen: U32::<LittleEndian>::new(
            (std::mem::size_of::<EscanResultLe>() + bss_info.len()) as u32,
        ),
        version: U32::new(1),
        sync_id: U16::new(sync_id),
        bss_count: U16::new(bss_count),
    };
    let mut data = header.as_bytes().to_vec();
    data.extend_from_slice(bss_info);
    let mut event = fake_event(EventCode::ESCAN_RESULT, status, CLIENT_IFIDX, [0; 6]);
    event.msg.datalen = data.len() as u32;
    event.data = data;
    event
}

/// The description a scan reports for a BSS advertising `SSID` on `BSS_CHANSPEC`.
pub fn fake_bss_description(bssid: MacAddr) -> BssDescription {
    let buf = fake_bss_info(bssid, SSID, BSS_CHANSPEC, &fake_ies::ssid_ie(SSID)[..]);
    parse_bss_info(&buf[..]).expect("valid BSS info")
}

pub fn connect_request(bssid: MacAddr) -> ConnectRequest {
    ConnectRequest {
        selected_bss: Some(fake_bss_description(bssid)),
        auth_type: AuthType::OpenSystem,
        security_ie: vec![],
        wep_key: None,
    }
}

/// An SAE authentication frame from `peer`, as firmware passes it up with an AUTH event.
pub fn auth_frame(peer: MacAddr, seq_num: u16, status: StatusCode, sae_fields: &[u8]) -> Vec<u8> {
    let mgmt_hdr = MgmtHdr {
        frame_ctrl: U16::new(FRAME_CTRL_AUTH),
        duration: U16::new(0),
        addr1: CLIENT_MAC,
        addr2: peer,
        addr3: peer,
        seq_ctrl: U16::new(0),
    };
    let auth_hdr = AuthHdr {
        auth_alg_num: U16::new(AuthAlgorithmNumber::SAE.0),
        auth_txn_seq_num: U16::new(seq_num),
        status_code: U16::new(status.0),
    };
    let mut frame = mgmt_hdr.as_bytes().to_vec();
    frame.extend_from_slice(auth_hdr.as_bytes());
    frame.extend_from_slice(sae_fields);
    frame
}
