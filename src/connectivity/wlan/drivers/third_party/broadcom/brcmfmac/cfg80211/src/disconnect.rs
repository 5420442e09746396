// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Leaving a BSS, whether the SME asked for it or not.
//!
//! Disconnects the SME requested are recorded in `disconnect_request_state` and answered with
//! one confirmation per recorded request. Anything else that drops the link is reported as an
//! indication.

use {
    crate::{
        cfg80211::Cfg80211,
        connect::ConnectOutcome,
        error::{Error, Status},
        event_dispatch::EventHandler,
        fweh::{EventCode, FirmwareEvent},
        ieee80211::{ReasonCode, StatusCode},
        mac::{MacAddr, MacFmt, ZERO_MAC_ADDR},
        roam::RoamOutcome,
        sme::{DeauthRequest, DisassocRequest, SmeEvent},
        status::{DisconnectRequest, SmeState},
        vif::{MacRole, Vif},
    },
    log::{debug, error, info, warn},
};

fn event_reason_code(reason: u32) -> ReasonCode {
    if reason == 0 {
        ReasonCode::UNSPECIFIED_REASON
    } else {
        ReasonCode(reason as u16)
    }
}

impl Cfg80211 {
    pub fn deauth_req(&self, ifidx: u8, req: DeauthRequest) -> Result<(), Error> {
        self.disconnect(ifidx, req.peer_sta_address, req.reason_code, true)
    }

    pub fn disassoc_req(&self, ifidx: u8, req: DisassocRequest) -> Result<(), Error> {
        self.disconnect(ifidx, req.peer_sta_address, req.reason_code, false)
    }

    /// Starts leaving the BSS `peer`, which must be the current BSS or the roam target. The
    /// outcome is reported once firmware confirms or the disconnect timer fires.
    fn disconnect(
        &self,
        ifidx: u8,
        peer: MacAddr,
        reason: ReasonCode,
        deauthenticate: bool,
    ) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        if ifp.role() == MacRole::Ap {
            return self.ap_disconnect_sta(&ifp, peer, reason, deauthenticate);
        }
        if !ifp.is_up() {
            return Err(Error::BadState(format!("interface {} is down", ifidx)));
        }
        let state = ifp.sme_state.load();
        if !state.intersects(SmeState::CONNECTED | SmeState::CONNECTING | SmeState::ROAMING) {
            return Err(Error::BadState(format!("disconnect requested in state {:?}", state)));
        }
        let current = ifp.current_bssid();
        let target = self.roam.lock().target_bssid;
        let request = if !deauthenticate {
            DisconnectRequest::DISASSOC
        } else if peer == current {
            DisconnectRequest::DEAUTH_CURRENT_BSS
        } else if Some(peer) == target {
            DisconnectRequest::DEAUTH_TARGET_BSS
        } else {
            DisconnectRequest::empty()
        };
        if peer == ZERO_MAC_ADDR || (peer != current && Some(peer) != target) {
            warn!(
                "disconnect from {} refused, current {} target {:?}",
                peer.to_mac_str(),
                current.to_mac_str(),
                target.map(|bssid| bssid.to_mac_str())
            );
            return Err(Error::InvalidArgs(format!("{} is not our BSS", peer.to_mac_str())));
        }

        let replaced = ifp.begin_disconnecting();
        let already_requested = self.disconnect_request_state.test_and_set(request);
        if !replaced.contains(SmeState::DISCONNECTING) {
            self.timers.disconnect.start(self.config.disconnect_timeout());
        }
        if let Err(e) = self.fw.disassoc(ifidx, &peer, reason) {
            error!("disassoc from {} failed: {}", peer.to_mac_str(), e);
            ifp.rollback_disconnecting(replaced);
            if !already_requested {
                self.disconnect_request_state.clear(request);
            }
            if !replaced.contains(SmeState::DISCONNECTING) {
                self.timers.disconnect.stop();
            }
            return Err(Error::firmware("disassoc", e));
        }
        info!("disconnecting from {} ({:?}, reason {:?})", peer.to_mac_str(), request, reason);

        self.timers.signal_report.stop();
        if replaced.contains(SmeState::CONNECTING) && self.pending_connect.lock().is_none() {
            self.timers.connect.stop();
        }
        if ifp.sme_state.contains(SmeState::ROAMING) {
            if let Err(e) = self.bss_roam_done(&ifp, RoamOutcome::InterruptedByDisconnect) {
                warn!("{}", e);
            }
        }
        Ok(())
    }

    /// Completes the disconnect in flight on `ifp`, answering every recorded request.
    pub(crate) fn disconnect_done(&self, ifp: &Vif) {
        if !ifp.finish_disconnecting() {
            debug!("no disconnect in flight on interface {}", ifp.ifidx);
            return;
        }
        self.timers.disconnect.stop();
        self.timers.signal_report.stop();

        let requests = self.disconnect_request_state.take();
        let current = ifp.current_bssid();
        let target = self.roam.lock().target_bssid;
        if requests.contains(DisconnectRequest::DEAUTH_CURRENT_BSS) {
            self.sme.send(SmeEvent::DeauthConf { peer_sta_address: current });
        }
        if requests.contains(DisconnectRequest::DEAUTH_TARGET_BSS) {
            self.sme.send(SmeEvent::DeauthConf { peer_sta_address: target.unwrap_or(current) });
        }
        if requests.contains(DisconnectRequest::DISASSOC) {
            self.sme.send(SmeEvent::DisassocConf { status: Status::OK });
        }

        ifp.sme_state.clear(SmeState::CONNECTED | SmeState::ROAMING | SmeState::SAE_AUTHENTICATING);
        ifp.profile.lock().bssid = ZERO_MAC_ADDR;
        self.timers.roam.stop();
        self.reset_roam_attempt();
        info!("disconnected from {} ({:?})", current.to_mac_str(), requests);
        self.log_client_stats(ifp);
        self.resume_pending_connect();
    }

    fn log_client_stats(&self, ifp: &Vif) {
        if self.config.mfg_firmware {
            return;
        }
        match self.fw.counters(ifp.ifidx) {
            Ok(counters) => match serde_json::to_string(&counters) {
                Ok(json) => info!("client stats for interface {}: {}", ifp.ifidx, json),
                Err(e) => warn!("failed to format client stats: {}", e),
            },
            Err(e) => warn!("failed to read client stats: {}", e),
        }
        if let Err(e) = self.fw.reset_counters(ifp.ifidx) {
            warn!("failed to reset counters: {}", e);
        }
    }

    pub(crate) fn disconnect_timeout(&self) {
        for ifp in self.vifs_in_state(SmeState::DISCONNECTING) {
            warn!("disconnect on interface {} timed out", ifp.ifidx);
            self.disconnect_done(&ifp);
        }
    }

    /// The link to the BSS went away: LINK down, DEAUTH or DISASSOC on a client interface.
    pub(crate) fn link_down(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let state = ifp.sme_state.load();
        if state.contains(SmeState::DISCONNECTING) {
            self.disconnect_done(ifp);
            return Ok(());
        }
        if state.contains(SmeState::CONNECTING) {
            self.bss_connect_done(ifp, ConnectOutcome::LinkFailed);
            return Ok(());
        }
        if state.contains(SmeState::ROAMING) {
            return self.bss_roam_done(
                ifp,
                RoamOutcome::ReassocFailed(StatusCode::SPURIOUS_DEAUTH_OR_DISASSOC),
            );
        }
        if !state.contains(SmeState::CONNECTED) {
            debug!("{:?} while not connected", event.msg.event_code);
            return Ok(());
        }

        let peer_sta_address = ifp.current_bssid();
        let reason_code = event_reason_code(event.msg.reason);
        ifp.sme_state.clear(SmeState::CONNECTED | SmeState::SAE_AUTHENTICATING);
        ifp.profile.lock().bssid = ZERO_MAC_ADDR;
        self.timers.signal_report.stop();
        warn!(
            "{:?} from {}, reason {:?}",
            event.msg.event_code,
            peer_sta_address.to_mac_str(),
            reason_code
        );
        let code = event.msg.event_code;
        let locally_initiated = code != EventCode::DEAUTH_IND && code != EventCode::DISASSOC_IND;
        let ind = if code == EventCode::DISASSOC || code == EventCode::DISASSOC_IND {
            SmeEvent::DisassocInd { peer_sta_address, reason_code, locally_initiated }
        } else {
            SmeEvent::DeauthInd { peer_sta_address, reason_code, locally_initiated }
        };
        self.sme.send(ind);
        self.log_client_stats(ifp);
        Ok(())
    }
}

/// DEAUTH, DEAUTH_IND, DISASSOC and DISASSOC_IND.
pub struct DisconnectEventHandler;

impl EventHandler for DisconnectEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let ifp = cfg.event_vif(&event.msg)?;
        match ifp.role() {
            MacRole::Ap => cfg.handle_sta_disconnect(&ifp, event),
            MacRole::Client => cfg.link_down(&ifp, event),
        }
    }
}
