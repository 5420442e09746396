// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Joining a BSS: join, authentication (with SAE pass-through), association and the single
//! connect confirmation sent to the SME.

use {
    crate::{
        cfg80211::Cfg80211,
        chanspec,
        error::{Error, Status},
        event_dispatch::EventHandler,
        fweh::{EventCode, EventStatus, FirmwareEvent},
        fwil::{AssocInfo, AssocMgrCmd, JoinParams, WsecConfig},
        ie,
        ieee80211::{
            AuthAlgorithmNumber, AuthHdr, AuthType, MgmtHdr, ReasonCode, StatusCode,
        },
        mac::{MacAddr, MacFmt, ZERO_MAC_ADDR},
        roam::RoamOutcome,
        sme::{
            BssDescription, ConnectRequest, ReconnectRequest, SaeFrame, SaeHandshakeResponse,
            SetKeysRequest, SmeEvent,
        },
        status::SmeState,
        vif::{MacRole, Vif, MAX_KEYS},
    },
    log::{debug, error, info, warn},
    std::sync::Arc,
    zerocopy::LayoutVerified,
};

/// The connect request being served and what firmware reported about the association.
#[derive(Debug, Default)]
pub struct ConnAttempt {
    pub ifidx: Option<u8>,
    /// Kept after the attempt ends so that a reconnect can replay it.
    pub connect_req: Option<ConnectRequest>,
    pub conn_info: AssocInfo,
}

/// A connect request parked until the disconnect in flight finishes.
#[derive(Debug)]
pub struct PendingConnect {
    pub ifidx: u8,
    pub req: ConnectRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDisposition {
    Started,
    /// Parked behind a disconnect. The outcome arrives as a `ConnectConf` later.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AuthenticationFailed(StatusCode),
    AssocReqFailed(StatusCode),
    JoinFailed,
    LinkFailed,
    Timeout,
}

impl ConnectOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConnectOutcome::Connected => StatusCode::SUCCESS,
            ConnectOutcome::AuthenticationFailed(code) | ConnectOutcome::AssocReqFailed(code) => {
                *code
            }
            ConnectOutcome::JoinFailed => StatusCode::JOIN_FAILURE,
            ConnectOutcome::LinkFailed => StatusCode::SPURIOUS_DEAUTH_OR_DISASSOC,
            ConnectOutcome::Timeout => StatusCode::REJECTED_SEQUENCE_TIMEOUT,
        }
    }
}

fn event_status_code(reason: u32) -> StatusCode {
    if reason == 0 {
        StatusCode::REFUSED_REASON_UNSPECIFIED
    } else {
        StatusCode(reason as u16)
    }
}

fn selected_bssid(req: &ConnectRequest) -> MacAddr {
    req.selected_bss.as_ref().map(|bss| bss.bssid).unwrap_or(ZERO_MAC_ADDR)
}

/// Splits an authentication frame delivered with an AUTH event into an SAE frame.
fn parse_sae_frame(frame: &[u8]) -> Result<SaeFrame, Error> {
    let (mgmt_hdr, body) = LayoutVerified::<_, MgmtHdr>::new_unaligned_from_prefix(frame)
        .ok_or_else(|| Error::MalformedEvent(format!("auth frame of {} bytes", frame.len())))?;
    let (auth_hdr, sae_fields) = LayoutVerified::<_, AuthHdr>::new_unaligned_from_prefix(body)
        .ok_or_else(|| Error::MalformedEvent("auth frame without auth header".to_string()))?;
    let auth_alg = AuthAlgorithmNumber(auth_hdr.auth_alg_num.get());
    if auth_alg != AuthAlgorithmNumber::SAE {
        return Err(Error::MalformedEvent(format!("{:?} frame while authenticating SAE", auth_alg)));
    }
    Ok(SaeFrame {
        peer_sta_address: mgmt_hdr.addr2,
        status_code: StatusCode(auth_hdr.status_code.get()),
        seq_num: auth_hdr.auth_txn_seq_num.get(),
        sae_fields: sae_fields.to_vec(),
    })
}

impl Cfg80211 {
    pub(crate) fn send_connect_conf(&self, peer_sta_address: MacAddr, result_code: StatusCode) {
        self.sme.send(SmeEvent::ConnectConf {
            peer_sta_address,
            result_code,
            association_id: 0,
            association_ies: vec![],
        });
    }

    pub fn connect_req(&self, ifidx: u8, req: ConnectRequest) -> Result<ConnectDisposition, Error> {
        let ifp = self.vif(ifidx)?;
        if req.selected_bss.is_none() {
            self.send_connect_conf(ZERO_MAC_ADDR, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::InvalidArgs("connect request without a BSS".to_string()));
        }
        if ifp.sme_state.contains(SmeState::DISCONNECTING) {
            info!("connect to {} waits for disconnect", selected_bssid(&req).to_mac_str());
            let superseded = self.pending_connect.lock().replace(PendingConnect { ifidx, req });
            if let Some(superseded) = superseded {
                warn!("deferred connect to {} superseded", selected_bssid(&superseded.req).to_mac_str());
                self.send_connect_conf(
                    selected_bssid(&superseded.req),
                    StatusCode::REFUSED_REASON_UNSPECIFIED,
                );
            }
            self.timers.connect.start(self.config.disconnect_wait());
            return Ok(ConnectDisposition::Deferred);
        }
        self.start_connect(&ifp, req)?;
        Ok(ConnectDisposition::Started)
    }

    pub fn reconnect_req(&self, ifidx: u8, req: ReconnectRequest) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        let stored = self.conn.lock().connect_req.clone();
        let stored = match stored {
            Some(stored) => stored,
            None => {
                self.send_connect_conf(req.peer_sta_address, StatusCode::REFUSED_REASON_UNSPECIFIED);
                return Err(Error::BadState("reconnect without a previous connect".to_string()));
            }
        };
        if selected_bssid(&stored) != req.peer_sta_address {
            self.send_connect_conf(req.peer_sta_address, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::InvalidArgs(format!(
                "reconnect to {}, last connect was to {}",
                req.peer_sta_address.to_mac_str(),
                selected_bssid(&stored).to_mac_str()
            )));
        }
        self.start_connect(&ifp, stored)
    }

    fn start_connect(&self, ifp: &Arc<Vif>, req: ConnectRequest) -> Result<(), Error> {
        let bss = match req.selected_bss.clone() {
            Some(bss) => bss,
            None => {
                self.send_connect_conf(ZERO_MAC_ADDR, StatusCode::REFUSED_REASON_UNSPECIFIED);
                return Err(Error::InvalidArgs("connect request without a BSS".to_string()));
            }
        };
        if !ifp.try_begin_connecting() {
            warn!("connect to {} refused, another attempt in progress", bss.bssid.to_mac_str());
            self.send_connect_conf(bss.bssid, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::BadState("connect already in progress".to_string()));
        }
        if ifp.finish_roaming() {
            info!("connect to {} supersedes the roam in progress", bss.bssid.to_mac_str());
            self.timers.roam.stop();
            ifp.sme_state.clear(SmeState::SAE_AUTHENTICATING);
        }
        self.reset_roam_attempt();

        let ssid = match ie::find_ssid(&bss.ies[..]) {
            Some(ssid) if !ssid.is_empty() => ssid.to_vec(),
            _ => {
                error!("no SSID in the IEs of {}", bss.bssid.to_mac_str());
                ifp.finish_connecting(false);
                self.send_connect_conf(bss.bssid, StatusCode::JOIN_FAILURE);
                return Err(Error::InvalidArgs("BSS without SSID".to_string()));
            }
        };
        let wsec = if !req.security_ie.is_empty() {
            match ie::parse_security_ie(&req.security_ie[..]) {
                Ok(security_ie) => WsecConfig::from_security_ie(&security_ie),
                Err(e) => {
                    error!("rejecting security IE: {}", e);
                    ifp.finish_connecting(false);
                    self.send_connect_conf(bss.bssid, StatusCode::INVALID_RSNE);
                    return Err(Error::InvalidArgs(format!("security IE: {}", e)));
                }
            }
        } else if req.wep_key.is_some() {
            WsecConfig::wep()
        } else {
            WsecConfig::open()
        };

        {
            let mut conn = self.conn.lock();
            conn.ifidx = Some(ifp.ifidx);
            conn.connect_req = Some(req.clone());
            conn.conn_info = AssocInfo::default();
        }
        {
            let mut profile = ifp.profile.lock();
            profile.bssid = bss.bssid;
            profile.ssid = ssid.clone();
            profile.beacon_period = bss.beacon_period;
            profile.channel = Some(bss.channel);
            if let Some(key) = &req.wep_key {
                if let Some(slot) = profile.keys.get_mut(key.key_id as usize) {
                    *slot = Some(key.clone());
                }
            }
        }

        // Armed before the join so that a fast event can not complete an attempt whose timer
        // is not running yet.
        self.timers.connect.start(self.config.connect_timeout());

        if let Err(e) = self.issue_join(ifp.ifidx, &bss, ssid, &req, &wsec) {
            error!("join {} failed: {}", bss.bssid.to_mac_str(), e);
            ifp.finish_connecting(false);
            self.timers.connect.stop();
            ifp.profile.lock().bssid = ZERO_MAC_ADDR;
            self.send_connect_conf(bss.bssid, StatusCode::JOIN_FAILURE);
            return Err(e);
        }
        info!("connecting to {} ({:?})", bss.bssid.to_mac_str(), req.auth_type);
        Ok(())
    }

    fn issue_join(
        &self,
        ifidx: u8,
        bss: &BssDescription,
        ssid: Vec<u8>,
        req: &ConnectRequest,
        wsec: &WsecConfig,
    ) -> Result<(), Error> {
        if let Some(key) = &req.wep_key {
            self.fw.set_key(ifidx, key).map_err(|e| Error::firmware("wsec_key", e))?;
        }
        self.fw.set_wsec(ifidx, wsec).map_err(|e| Error::firmware("wsec", e))?;
        self.fw.set_auth_type(ifidx, req.auth_type.into()).map_err(|e| Error::firmware("auth", e))?;
        if req.auth_type == AuthType::Sae {
            self.fw
                .assoc_mgr_cmd(ifidx, AssocMgrCmd::PauseOnAuthResp)
                .map_err(|e| Error::firmware("assoc_mgr_cmd", e))?;
        }
        let chanspec = chanspec::encode(&bss.channel)
            .ok_or_else(|| Error::InvalidArgs(format!("can not encode {:?}", bss.channel)))?;
        self.fw
            .join(ifidx, &JoinParams { ssid, bssid: bss.bssid, chanspec })
            .map_err(|e| Error::firmware("join", e))
    }

    /// Ends the connect attempt on `ifp` and reports `outcome`. Only the first call after the
    /// attempt started reports anything.
    pub(crate) fn bss_connect_done(&self, ifp: &Vif, outcome: ConnectOutcome) {
        if !ifp.finish_connecting(false) {
            debug!("connect attempt already finished, dropping {:?}", outcome);
            return;
        }
        self.timers.connect.stop();
        ifp.sme_state.clear(SmeState::SAE_AUTHENTICATING);
        let bssid = ifp.current_bssid();

        if outcome != ConnectOutcome::Connected {
            warn!("connect to {} failed: {:?}", bssid.to_mac_str(), outcome);
            if let Err(e) = self.fw.disassoc(ifp.ifidx, &bssid, ReasonCode::UNSPECIFIED_REASON) {
                warn!("failed to reset firmware connection state: {}", e);
            }
            ifp.profile.lock().bssid = ZERO_MAC_ADDR;
            self.send_connect_conf(bssid, outcome.status_code());
            return;
        }

        let conn_info = self.fw.assoc_info(ifp.ifidx).unwrap_or_else(|e| {
            warn!("failed to read association IEs: {}", e);
            AssocInfo::default()
        });
        ifp.sme_state.set(SmeState::CONNECTED);
        self.conn.lock().conn_info = conn_info.clone();
        self.timers.signal_report.start(self.config.signal_report_interval());
        info!("connected to {}, aid {}", bssid.to_mac_str(), conn_info.aid);
        self.sme.send(SmeEvent::ConnectConf {
            peer_sta_address: bssid,
            result_code: StatusCode::SUCCESS,
            association_id: conn_info.aid,
            association_ies: conn_info.resp_ies,
        });
    }

    pub(crate) fn connect_timeout(&self) {
        let pending_ifidx = self.pending_connect.lock().as_ref().map(|pending| pending.ifidx);
        if let Some(ifidx) = pending_ifidx {
            warn!("disconnect still in flight after {:?}", self.config.disconnect_wait());
            match self.vifs.get(ifidx) {
                Some(ifp) if ifp.sme_state.contains(SmeState::DISCONNECTING) => {
                    // Completes the disconnect, which resumes the parked connect.
                    self.disconnect_done(&ifp);
                }
                _ => self.resume_pending_connect(),
            }
            return;
        }
        for ifp in self.vifs_in_state(SmeState::CONNECTING) {
            warn!("connect to {} timed out", ifp.current_bssid().to_mac_str());
            self.bss_connect_done(&ifp, ConnectOutcome::Timeout);
        }
    }

    pub(crate) fn resume_pending_connect(&self) {
        let pending = match self.pending_connect.lock().take() {
            Some(pending) => pending,
            None => return,
        };
        self.timers.connect.stop();
        let bssid = selected_bssid(&pending.req);
        match self.vifs.get(pending.ifidx) {
            Some(ifp) => {
                info!("resuming connect to {}", bssid.to_mac_str());
                if let Err(e) = self.start_connect(&ifp, pending.req) {
                    warn!("deferred connect failed: {}", e);
                }
            }
            None => {
                warn!("interface {} went away before deferred connect", pending.ifidx);
                self.send_connect_conf(bssid, StatusCode::REFUSED_REASON_UNSPECIFIED);
            }
        }
    }

    fn handle_set_ssid(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if event.msg.status == EventStatus::SUCCESS {
            debug!("joined {}, waiting for link", event.msg.addr.to_mac_str());
        } else if ifp.sme_state.contains(SmeState::CONNECTING) {
            self.bss_connect_done(ifp, ConnectOutcome::JoinFailed);
        }
        Ok(())
    }

    fn handle_assoc(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if event.msg.status != EventStatus::SUCCESS
            && ifp.sme_state.contains(SmeState::CONNECTING)
        {
            let code = event_status_code(event.msg.reason);
            self.bss_connect_done(ifp, ConnectOutcome::AssocReqFailed(code));
        }
        Ok(())
    }

    fn handle_auth(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if ifp.sme_state.contains(SmeState::SAE_AUTHENTICATING) && !event.data.is_empty() {
            let frame = parse_sae_frame(&event.data[..])?;
            debug!("SAE frame {} from {}", frame.seq_num, frame.peer_sta_address.to_mac_str());
            self.sme.send(SmeEvent::SaeFrameRx(frame));
            return Ok(());
        }
        if ifp.sme_state.contains(SmeState::ROAMING) {
            return self.handle_roam_auth(ifp, event);
        }
        if event.msg.status != EventStatus::SUCCESS
            && ifp.sme_state.contains(SmeState::CONNECTING)
        {
            let code = event_status_code(event.msg.reason);
            self.bss_connect_done(ifp, ConnectOutcome::AuthenticationFailed(code));
        }
        Ok(())
    }

    fn handle_link(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if !event.msg.is_link_up() {
            return self.link_down(ifp, event);
        }
        if ifp.sme_state.contains(SmeState::ROAMING) {
            self.bss_roam_done(ifp, RoamOutcome::Success)
        } else if ifp.sme_state.contains(SmeState::CONNECTING) {
            self.bss_connect_done(ifp, ConnectOutcome::Connected);
            Ok(())
        } else {
            debug!("link up from {} with no attempt in progress", event.msg.addr.to_mac_str());
            Ok(())
        }
    }

    fn handle_join_start(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let auth_type = self.conn.lock().connect_req.as_ref().map(|req| req.auth_type);
        if auth_type != Some(AuthType::Sae)
            || !ifp.sme_state.intersects(SmeState::CONNECTING | SmeState::ROAMING)
        {
            return Ok(());
        }
        let peer_sta_address =
            if event.msg.addr != ZERO_MAC_ADDR { event.msg.addr } else { ifp.current_bssid() };
        ifp.sme_state.set(SmeState::SAE_AUTHENTICATING);
        info!("SAE handshake with {}", peer_sta_address.to_mac_str());
        self.sme.send(SmeEvent::SaeHandshakeInd { peer_sta_address });
        Ok(())
    }

    fn handle_csa_complete(&self, ifp: &Vif) -> Result<(), Error> {
        let chanspec = self.fw.chanspec(ifp.ifidx).map_err(|e| Error::firmware("chanspec", e))?;
        let channel = chanspec::decode(chanspec)
            .ok_or_else(|| Error::MalformedEvent(format!("bad chanspec {:#06x}", chanspec)))?;
        ifp.profile.lock().channel = Some(channel);
        info!("switched to channel {}", channel.primary);
        self.sme.send(SmeEvent::OnChannelSwitch { new_channel: channel.primary });
        Ok(())
    }

    pub fn sae_handshake_resp(&self, ifidx: u8, resp: SaeHandshakeResponse) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        if !ifp.sme_state.test_and_clear(SmeState::SAE_AUTHENTICATING) {
            return Err(Error::BadState("no SAE handshake in progress".to_string()));
        }
        if resp.status_code != StatusCode::SUCCESS {
            warn!("SAE with {} failed: {:?}", resp.peer_sta_address.to_mac_str(), resp.status_code);
            self.sae_failed(&ifp, resp.status_code);
            return Ok(());
        }
        if let Err(e) = self.fw.assoc_mgr_cmd(ifidx, AssocMgrCmd::Resume) {
            self.sae_failed(&ifp, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::firmware("assoc_mgr_cmd", e));
        }
        if ifp.sme_state.contains(SmeState::ROAMING) {
            self.roam.lock().target_bss_authenticated = true;
        }
        Ok(())
    }

    fn sae_failed(&self, ifp: &Vif, code: StatusCode) {
        if ifp.sme_state.contains(SmeState::ROAMING) {
            if let Err(e) = self.bss_roam_done(ifp, RoamOutcome::AuthFailed) {
                warn!("{}", e);
            }
        } else {
            self.bss_connect_done(ifp, ConnectOutcome::AuthenticationFailed(code));
        }
    }

    pub fn sae_frame_tx(&self, ifidx: u8, frame: SaeFrame) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        if !ifp.sme_state.contains(SmeState::SAE_AUTHENTICATING) {
            return Err(Error::BadState("no SAE handshake in progress".to_string()));
        }
        self.fw.send_sae_frame(ifidx, &frame).map_err(|e| Error::firmware("sae_frame", e))
    }

    /// Installs the keys, returning the outcome of each.
    pub fn set_keys_req(&self, ifidx: u8, req: SetKeysRequest) -> Result<Vec<Status>, Error> {
        let ifp = self.vif(ifidx)?;
        let results = req
            .keys
            .into_iter()
            .map(|key| match self.fw.set_key(ifidx, &key) {
                Ok(()) => {
                    if (key.key_id as usize) < MAX_KEYS {
                        let key_id = key.key_id as usize;
                        ifp.profile.lock().keys[key_id] = Some(key);
                    }
                    Status::OK
                }
                Err(e) => {
                    warn!("failed to install key {}: {}", key.key_id, e);
                    e.status
                }
            })
            .collect();
        Ok(results)
    }

    pub(crate) fn signal_report_timeout(&self) {
        let connected: Vec<_> = self
            .vifs
            .all()
            .into_iter()
            .filter(|vif| vif.role() == MacRole::Client && vif.is_connected())
            .collect();
        if connected.is_empty() {
            return;
        }
        for ifp in connected {
            match self.fw.signal(ifp.ifidx) {
                Ok(signal) => self.sme.send(SmeEvent::SignalReport {
                    rssi_dbm: signal.rssi_dbm,
                    snr_db: signal.snr_db,
                }),
                Err(e) => warn!("failed to read signal on interface {}: {}", ifp.ifidx, e),
            }
        }
        self.timers.signal_report.start(self.config.signal_report_interval());
    }
}

/// SET_SSID, JOIN_START, AUTH, ASSOC, LINK and CSA_COMPLETE_IND.
pub struct ConnectEventHandler;

impl EventHandler for ConnectEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let ifp = cfg.event_vif(&event.msg)?;
        let code = event.msg.event_code;
        if ifp.role() == MacRole::Ap {
            if code == EventCode::SET_SSID || code == EventCode::LINK {
                return cfg.handle_ap_link_event(&ifp, event);
            }
            debug!("ignoring {:?} on AP interface {}", code, ifp.ifidx);
            return Ok(());
        }
        match code {
            EventCode::SET_SSID => cfg.handle_set_ssid(&ifp, event),
            EventCode::JOIN_START => cfg.handle_join_start(&ifp, event),
            EventCode::AUTH => cfg.handle_auth(&ifp, event),
            EventCode::ASSOC => cfg.handle_assoc(&ifp, event),
            EventCode::LINK => cfg.handle_link(&ifp, event),
            EventCode::CSA_COMPLETE_IND => cfg.handle_csa_complete(&ifp),
            _ => {
                warn!("connect handler got {:?}", code);
                Ok(())
            }
        }
    }
}
