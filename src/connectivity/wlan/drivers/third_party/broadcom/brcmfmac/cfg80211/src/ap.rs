// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! SoftAP start and stop, and the station events of a running AP.

use {
    crate::{
        cfg80211::Cfg80211,
        chanspec::{self, Cbw, Channel},
        error::{Error, Status},
        event_dispatch::EventHandler,
        fweh::{EventCode, EventStatus, FirmwareEvent},
        fwil::ApConfig,
        ie::{self, MAX_SSID_LEN, RSNE_ID},
        ieee80211::{AuthType, BssType, ReasonCode},
        mac::{MacAddr, MacFmt},
        sme::{
            AssocResponse, AssocResult, AuthResponse, AuthResult, SmeEvent, StartRequest,
            StartResult, StopRequest, StopResult,
        },
        status::SmeState,
        vif::{MacRole, Profile, Vif},
    },
    log::{debug, error, info, warn},
};

const FW_AUTH_SHARED_KEY: u32 = 1;
const FW_AUTH_SAE: u32 = 3;

fn auth_type_from_fw(auth_type: u32) -> AuthType {
    match auth_type {
        FW_AUTH_SHARED_KEY => AuthType::SharedKey,
        FW_AUTH_SAE => AuthType::Sae,
        _ => AuthType::OpenSystem,
    }
}

impl Cfg80211 {
    fn ap_vif(&self, ifidx: u8) -> Result<std::sync::Arc<Vif>, Error> {
        let ifp = self.vif(ifidx)?;
        if ifp.role() != MacRole::Ap {
            return Err(Error::NoInterface(MacRole::Ap));
        }
        Ok(ifp)
    }

    fn send_start_conf(&self, result_code: StartResult) {
        self.sme.send(SmeEvent::StartConf { result_code });
    }

    pub fn start_req(&self, ifidx: u8, req: StartRequest) -> Result<(), Error> {
        let ifp = match self.ap_vif(ifidx) {
            Ok(ifp) => ifp,
            Err(e) => {
                self.send_start_conf(StartResult::NotSupported);
                return Err(e);
            }
        };
        if req.bss_type != BssType::Infrastructure {
            self.send_start_conf(StartResult::NotSupported);
            return Err(Error::InvalidArgs(format!("can not start a {:?} BSS", req.bss_type)));
        }
        if ifp.sme_state.intersects(SmeState::AP_CREATED | SmeState::AP_START_PENDING) {
            self.send_start_conf(StartResult::BssAlreadyStartedOrJoined);
            return Err(Error::BadState("AP already started".to_string()));
        }
        if req.ssid.is_empty() || req.ssid.len() > MAX_SSID_LEN {
            self.send_start_conf(StartResult::InternalError);
            return Err(Error::InvalidArgs(format!("SSID of {} bytes", req.ssid.len())));
        }
        let channel = Channel::new(req.channel, Cbw::Cbw20);
        let chanspec = match chanspec::encode(&channel).filter(|_| req.channel != 0) {
            Some(chanspec) => chanspec,
            None => {
                self.send_start_conf(StartResult::NotSupported);
                return Err(Error::InvalidArgs(format!("channel {}", req.channel)));
            }
        };

        self.abort_scanning();
        if ifp.sme_state.test_and_set(SmeState::AP_START_PENDING) {
            self.send_start_conf(StartResult::BssAlreadyStartedOrJoined);
            return Err(Error::BadState("AP start already pending".to_string()));
        }
        self.timers.ap_start.start(self.config.ap_start_timeout());
        let config = ApConfig {
            ssid: req.ssid.clone(),
            chanspec,
            beacon_period: req.beacon_period,
            dtim_period: req.dtim_period,
            rsne: req.rsne.clone(),
        };
        if let Err(e) = self.fw.start_ap(ifidx, &config) {
            error!("failed to start AP: {}", e);
            ifp.sme_state.clear(SmeState::AP_START_PENDING);
            self.timers.ap_start.stop();
            self.send_start_conf(StartResult::InternalError);
            return Err(Error::firmware("start_ap", e));
        }
        {
            let mut profile = ifp.profile.lock();
            profile.bssid = ifp.mac;
            profile.ssid = req.ssid;
            profile.beacon_period = req.beacon_period;
            profile.channel = Some(channel);
        }
        info!("starting AP on channel {}", req.channel);
        Ok(())
    }

    /// SET_SSID and LINK on an AP interface.
    pub(crate) fn handle_ap_link_event(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let code = event.msg.event_code;
        if code == EventCode::LINK && !event.msg.is_link_up() {
            debug!("AP link down on interface {}", ifp.ifidx);
            return Ok(());
        }
        if event.msg.status == EventStatus::SUCCESS {
            self.ap_started(ifp);
            return Ok(());
        }
        if ifp.sme_state.test_and_clear(SmeState::AP_START_PENDING) {
            warn!("AP start failed with {:?}", event.msg.status);
            self.timers.ap_start.stop();
            self.send_start_conf(StartResult::InternalError);
        }
        Ok(())
    }

    fn ap_started(&self, ifp: &Vif) {
        if !ifp.sme_state.test_and_clear(SmeState::AP_START_PENDING) {
            debug!("AP on interface {} already reported", ifp.ifidx);
            return;
        }
        self.timers.ap_start.stop();
        ifp.sme_state.set(SmeState::AP_CREATED);
        info!("AP started on interface {}", ifp.ifidx);
        self.send_start_conf(StartResult::Success);
    }

    pub(crate) fn ap_start_timeout(&self) {
        for ifp in self.vifs_in_state(SmeState::AP_START_PENDING) {
            if !ifp.sme_state.test_and_clear(SmeState::AP_START_PENDING) {
                continue;
            }
            warn!("AP start on interface {} timed out", ifp.ifidx);
            if let Err(e) = self.fw.stop_ap(ifp.ifidx) {
                warn!("failed to stop AP: {}", e);
            }
            *ifp.profile.lock() = Profile::default();
            self.send_start_conf(StartResult::TimedOut);
        }
    }

    pub fn stop_req(&self, ifidx: u8, req: StopRequest) -> Result<(), Error> {
        let ifp = self.ap_vif(ifidx)?;
        if !ifp.sme_state.intersects(SmeState::AP_CREATED | SmeState::AP_START_PENDING) {
            self.sme.send(SmeEvent::StopConf { result_code: StopResult::BssAlreadyStopped });
            return Ok(());
        }
        if let Err(e) = self.fw.stop_ap(ifidx) {
            error!("failed to stop AP {:?}: {}", String::from_utf8_lossy(&req.ssid[..]), e);
            self.sme.send(SmeEvent::StopConf { result_code: StopResult::InternalError });
            return Err(Error::firmware("stop_ap", e));
        }
        if ifp.sme_state.test_and_clear(SmeState::AP_START_PENDING) {
            self.timers.ap_start.stop();
        }
        ifp.sme_state.clear(SmeState::AP_CREATED);
        *ifp.profile.lock() = Profile::default();
        info!("AP stopped on interface {}", ifidx);
        self.sme.send(SmeEvent::StopConf { result_code: StopResult::Success });
        Ok(())
    }

    fn handle_auth_ind(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let auth_type = auth_type_from_fw(event.msg.auth_type);
        debug!("{:?} authentication from {} on {}", auth_type, event.msg.addr.to_mac_str(), ifp.ifidx);
        self.sme.send(SmeEvent::AuthInd { peer_sta_address: event.msg.addr, auth_type });
        Ok(())
    }

    fn handle_assoc_ind(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let ies = &event.data[..];
        if !ie::is_valid_ie_buffer(ies) {
            return Err(Error::MalformedEvent(format!(
                "{:?} from {} with malformed IEs",
                event.msg.event_code,
                event.msg.addr.to_mac_str()
            )));
        }
        let ssid = ie::find_ssid(ies).map(|ssid| ssid.to_vec());
        let rsne = ie::find_rsne(ies).map(|body| {
            let mut rsne = vec![RSNE_ID, body.len() as u8];
            rsne.extend_from_slice(body);
            rsne
        });
        info!("{:?} from {} on {}", event.msg.event_code, event.msg.addr.to_mac_str(), ifp.ifidx);
        self.sme.send(SmeEvent::AssocInd {
            peer_sta_address: event.msg.addr,
            listen_interval: 0,
            ssid,
            rsne,
        });
        Ok(())
    }

    /// A station left the AP.
    pub(crate) fn handle_sta_disconnect(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let peer_sta_address = event.msg.addr;
        let reason_code = if event.msg.reason == 0 {
            ReasonCode::UNSPECIFIED_REASON
        } else {
            ReasonCode(event.msg.reason as u16)
        };
        match event.msg.event_code {
            EventCode::DEAUTH_IND => self.sme.send(SmeEvent::DeauthInd {
                peer_sta_address,
                reason_code,
                locally_initiated: false,
            }),
            EventCode::DISASSOC_IND => self.sme.send(SmeEvent::DisassocInd {
                peer_sta_address,
                reason_code,
                locally_initiated: false,
            }),
            code => {
                debug!("{:?} for {} on AP {}", code, peer_sta_address.to_mac_str(), ifp.ifidx);
                return Ok(());
            }
        }
        info!("station {} left, reason {:?}", peer_sta_address.to_mac_str(), reason_code);
        Ok(())
    }

    /// Removes the station `peer` from the AP.
    pub(crate) fn ap_disconnect_sta(
        &self,
        ifp: &Vif,
        peer: MacAddr,
        reason: ReasonCode,
        deauthenticate: bool,
    ) -> Result<(), Error> {
        if !ifp.sme_state.contains(SmeState::AP_CREATED) {
            return Err(Error::BadState("AP not started".to_string()));
        }
        self.fw.disassoc(ifp.ifidx, &peer, reason).map_err(|e| Error::firmware("disassoc", e))?;
        if deauthenticate {
            self.sme.send(SmeEvent::DeauthConf { peer_sta_address: peer });
        } else {
            self.sme.send(SmeEvent::DisassocConf { status: Status::OK });
        }
        Ok(())
    }

    /// Firmware answers authentication itself. A refusal removes the station again.
    pub fn auth_resp(&self, ifidx: u8, resp: AuthResponse) -> Result<(), Error> {
        let ifp = self.ap_vif(ifidx)?;
        if resp.result_code == AuthResult::Success {
            debug!("{} authenticated", resp.peer_sta_address.to_mac_str());
            return Ok(());
        }
        warn!("refusing {}: {:?}", resp.peer_sta_address.to_mac_str(), resp.result_code);
        self.fw
            .disassoc(ifp.ifidx, &resp.peer_sta_address, ReasonCode::NOT_AUTHENTICATED)
            .map_err(|e| Error::firmware("disassoc", e))
    }

    /// Firmware answers association itself. A refusal removes the station again.
    pub fn assoc_resp(&self, ifidx: u8, resp: AssocResponse) -> Result<(), Error> {
        let ifp = self.ap_vif(ifidx)?;
        if resp.result_code == AssocResult::Success {
            debug!("{} associated, aid {}", resp.peer_sta_address.to_mac_str(), resp.association_id);
            return Ok(());
        }
        warn!("refusing association of {}: {:?}", resp.peer_sta_address.to_mac_str(), resp.result_code);
        self.fw
            .disassoc(ifp.ifidx, &resp.peer_sta_address, ReasonCode::UNSPECIFIED_REASON)
            .map_err(|e| Error::firmware("disassoc", e))
    }
}

/// AUTH_IND, ASSOC_IND, REASSOC_IND and AP_STARTED.
pub struct ApEventHandler;

impl EventHandler for ApEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let ifp = cfg.event_vif(&event.msg)?;
        if ifp.role() != MacRole::Ap {
            debug!("ignoring {:?} on client interface {}", event.msg.event_code, ifp.ifidx);
            return Ok(());
        }
        match event.msg.event_code {
            EventCode::AUTH_IND => cfg.handle_auth_ind(&ifp, event),
            EventCode::ASSOC_IND | EventCode::REASSOC_IND => cfg.handle_assoc_ind(&ifp, event),
            EventCode::AP_STARTED => {
                cfg.ap_started(&ifp);
                Ok(())
            }
            code => {
                warn!("AP handler got {:?}", code);
                Ok(())
            }
        }
    }
}
