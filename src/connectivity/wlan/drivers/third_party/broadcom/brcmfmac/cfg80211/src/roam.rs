// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Roaming to another BSS of the same ESS.
//!
//! A roam is either requested by the SME through `roam_req` or started by firmware on its own.
//! How the outcome is reported depends on the firmware roam offload mode: with offload the SME
//! gets a `RoamStartInd` followed by a `RoamResultInd`, without it a single `RoamConf` answers
//! the `roam_req`. ROAMING overlaps CONNECTED for the whole attempt.

use {
    crate::{
        bss,
        cfg80211::Cfg80211,
        chanspec,
        error::Error,
        event_dispatch::EventHandler,
        fweh::{EventCode, EventStatus, FirmwareEvent},
        fwil::{AssocInfo, AssocMgrCmd, JoinParams},
        ie,
        ieee80211::{AuthType, ReasonCode, StatusCode},
        mac::{MacAddr, MacFmt, ZERO_MAC_ADDR},
        sme::{BssDescription, RoamRequest, SmeEvent},
        status::{DisconnectRequest, SmeState},
        vif::{MacRole, Vif},
    },
    anyhow::format_err,
    log::{debug, error, info, warn},
};

#[derive(Debug, Default)]
pub struct RoamAttempt {
    pub ifidx: Option<u8>,
    /// Present only for roams the SME asked for.
    pub roam_req: Option<RoamRequest>,
    pub target_bssid: Option<MacAddr>,
    pub target_bss_info: Option<BssDescription>,
    pub target_bss_authenticated: bool,
    pub roam_start_sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamOutcome {
    Success,
    AuthFailed,
    ReassocFailed(StatusCode),
    InternalError,
    Timeout,
    /// The SME disconnected while the roam was in flight.
    InterruptedByDisconnect,
}

impl RoamOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoamOutcome::Success => StatusCode::SUCCESS,
            RoamOutcome::AuthFailed | RoamOutcome::InternalError => {
                StatusCode::REFUSED_REASON_UNSPECIFIED
            }
            RoamOutcome::ReassocFailed(code) => *code,
            RoamOutcome::Timeout => StatusCode::REJECTED_SEQUENCE_TIMEOUT,
            RoamOutcome::InterruptedByDisconnect => StatusCode::CANCELED,
        }
    }
}

fn roam_failure_code(reason: u32) -> StatusCode {
    if reason == 0 {
        StatusCode::REFUSED_REASON_UNSPECIFIED
    } else {
        StatusCode(reason as u16)
    }
}

impl Cfg80211 {
    /// Forgets the whole roam attempt, target included.
    pub(crate) fn reset_roam_attempt(&self) {
        *self.roam.lock() = RoamAttempt::default();
    }

    /// Forgets the roam attempt once its outcome was reported. The target BSSID survives while
    /// a deauthentication of the target BSS is still outstanding.
    pub(crate) fn clear_roam_attempt(&self) {
        let keep_target =
            self.disconnect_request_state.contains(DisconnectRequest::DEAUTH_TARGET_BSS);
        let mut roam = self.roam.lock();
        let target_bssid = if keep_target { roam.target_bssid } else { None };
        *roam = RoamAttempt { target_bssid, ..RoamAttempt::default() };
    }

    fn send_roam_conf(&self, selected_bssid: MacAddr, status_code: StatusCode) {
        self.sme.send(SmeEvent::RoamConf {
            selected_bssid,
            status_code,
            original_association_maintained: false,
            target_bss_authenticated: false,
            association_id: 0,
            association_ies: vec![],
        });
    }

    pub fn roam_req(&self, ifidx: u8, req: RoamRequest) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        let target = req.selected_bss.bssid;
        let state = ifp.sme_state.load();
        if !state.contains(SmeState::CONNECTED)
            || state.intersects(SmeState::CONNECTING | SmeState::DISCONNECTING)
        {
            warn!("roam to {} refused in state {:?}", target.to_mac_str(), state);
            self.send_roam_conf(target, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::BadState(format!("roam requested in state {:?}", state)));
        }
        if !ifp.begin_roaming() {
            self.send_roam_conf(target, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(Error::BadState("roam already in progress".to_string()));
        }
        self.abort_scanning();

        let ssid = ie::find_ssid(&req.selected_bss.ies[..])
            .map(|ssid| ssid.to_vec())
            .unwrap_or_else(|| req.selected_bss.ssid.clone());
        let channel = req.selected_bss.channel;
        *self.roam.lock() = RoamAttempt {
            ifidx: Some(ifidx),
            roam_req: Some(req),
            target_bssid: Some(target),
            ..RoamAttempt::default()
        };
        self.timers.roam.start(self.config.roam_timeout());

        if let Err(e) = self.issue_reassoc(ifidx, ssid, target, &channel) {
            error!("reassoc to {} failed: {}", target.to_mac_str(), e);
            ifp.finish_roaming();
            self.timers.roam.stop();
            self.reset_roam_attempt();
            self.send_roam_conf(target, StatusCode::REFUSED_REASON_UNSPECIFIED);
            return Err(e);
        }
        info!("roaming to {}", target.to_mac_str());
        Ok(())
    }

    fn issue_reassoc(
        &self,
        ifidx: u8,
        ssid: Vec<u8>,
        bssid: MacAddr,
        channel: &chanspec::Channel,
    ) -> Result<(), Error> {
        let chanspec = chanspec::encode(channel)
            .ok_or_else(|| Error::InvalidArgs(format!("can not encode {:?}", channel)))?;
        let auth_type = self.conn.lock().connect_req.as_ref().map(|req| req.auth_type);
        if auth_type == Some(AuthType::Sae) {
            self.fw
                .assoc_mgr_cmd(ifidx, AssocMgrCmd::PauseOnAuthResp)
                .map_err(|e| Error::firmware("assoc_mgr_cmd", e))?;
        }
        self.fw
            .reassoc(ifidx, &JoinParams { ssid, bssid, chanspec })
            .map_err(|e| Error::firmware("reassoc", e))
    }

    /// Firmware moved on its own. Starts tracking the roam if nothing asked for it.
    fn note_firmware_roam(&self, ifp: &Vif, addr: MacAddr) {
        let target = if addr == ZERO_MAC_ADDR { None } else { Some(addr) };
        if ifp.begin_roaming() {
            info!("firmware started roaming to {}", addr.to_mac_str());
            self.abort_scanning();
            *self.roam.lock() =
                RoamAttempt { ifidx: Some(ifp.ifidx), target_bssid: target, ..RoamAttempt::default() };
            self.timers.roam.start(self.config.roam_timeout());
            return;
        }
        let mut roam = self.roam.lock();
        if roam.target_bssid.is_none() {
            roam.target_bssid = target;
        }
    }

    fn handle_roam_prep(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        let status = event.msg.status;
        if status != EventStatus::ATTEMPT && status != EventStatus::SUCCESS {
            warn!("roam preparation failed with {:?}", status);
            if ifp.sme_state.contains(SmeState::ROAMING) {
                let code = roam_failure_code(event.msg.reason);
                return self.bss_roam_done(ifp, RoamOutcome::ReassocFailed(code));
            }
            return Ok(());
        }
        self.note_firmware_roam(ifp, event.msg.addr);
        if status != EventStatus::SUCCESS {
            return Ok(());
        }

        self.roam.lock().target_bss_authenticated = false;
        if !self.config.roam_offload() {
            return Ok(());
        }
        let target_bss_info = match self.fetch_target_bss_info(ifp) {
            Ok(bss) => bss,
            Err(e) => {
                error!("target BSS info unusable: {}", e);
                return self.bss_roam_done(ifp, RoamOutcome::InternalError);
            }
        };
        let start_ind = {
            let mut roam = self.roam.lock();
            roam.target_bss_info = Some(target_bss_info.clone());
            if !roam.roam_start_sent {
                roam.roam_start_sent = true;
                true
            } else {
                false
            }
        };
        if start_ind {
            self.sme.send(SmeEvent::RoamStartInd {
                selected_bssid: target_bss_info.bssid,
                selected_bss: Some(target_bss_info),
                original_association_maintained: false,
            });
        }
        Ok(())
    }

    fn fetch_target_bss_info(&self, ifp: &Vif) -> Result<BssDescription, Error> {
        let target = self
            .roam
            .lock()
            .target_bssid
            .ok_or_else(|| format_err!("roam preparation without a target BSSID"))?;
        let buf = self.fw.bss_info(ifp.ifidx).map_err(|e| Error::firmware("bss_info", e))?;
        let bss = bss::parse_bss_info(&buf[..])?;
        if bss.bssid != target {
            return Err(Error::MalformedEvent(format!(
                "BSS info for {}, roaming to {}",
                bss.bssid.to_mac_str(),
                target.to_mac_str()
            )));
        }
        Ok(bss)
    }

    fn handle_reassoc(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        match event.msg.status {
            EventStatus::ATTEMPT | EventStatus::NEWASSOC => {
                self.note_firmware_roam(ifp, event.msg.addr);
                Ok(())
            }
            EventStatus::SUCCESS => {
                if ifp.sme_state.contains(SmeState::ROAMING) {
                    self.roam.lock().target_bss_authenticated = true;
                }
                Ok(())
            }
            status => {
                if !ifp.sme_state.contains(SmeState::ROAMING) {
                    debug!("reassoc {:?} with no roam in progress", status);
                    return Ok(());
                }
                warn!("reassoc failed with {:?} reason {}", status, event.msg.reason);
                self.bss_roam_done(
                    ifp,
                    RoamOutcome::ReassocFailed(roam_failure_code(event.msg.reason)),
                )
            }
        }
    }

    fn handle_roam(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if !ifp.sme_state.contains(SmeState::ROAMING) {
            debug!("ROAM {:?} with no roam in progress", event.msg.status);
            return Ok(());
        }
        if event.msg.status == EventStatus::SUCCESS {
            self.bss_roam_done(ifp, RoamOutcome::Success)
        } else {
            self.bss_roam_done(ifp, RoamOutcome::ReassocFailed(roam_failure_code(event.msg.reason)))
        }
    }

    /// AUTH while roaming. SAE roams are authenticated by the handshake response instead.
    pub(crate) fn handle_roam_auth(&self, ifp: &Vif, event: &FirmwareEvent) -> Result<(), Error> {
        if event.msg.status != EventStatus::SUCCESS {
            warn!("authentication with roam target failed, reason {}", event.msg.reason);
            return self.bss_roam_done(ifp, RoamOutcome::AuthFailed);
        }
        let is_sae = self.conn.lock().connect_req.as_ref().map(|req| req.auth_type)
            == Some(AuthType::Sae);
        if !is_sae {
            self.roam.lock().target_bss_authenticated = true;
        }
        Ok(())
    }

    /// Ends the roam attempt on `ifp` and reports `outcome`. Only the first call after the
    /// attempt started reports anything.
    pub(crate) fn bss_roam_done(&self, ifp: &Vif, outcome: RoamOutcome) -> Result<(), Error> {
        if !ifp.finish_roaming() {
            debug!("roam attempt already finished, dropping {:?}", outcome);
            return Ok(());
        }
        self.timers.roam.stop();
        ifp.sme_state.clear(SmeState::SAE_AUTHENTICATING);

        let (target, has_roam_req, roam_start_sent, target_bss_info) = {
            let roam = self.roam.lock();
            (
                roam.target_bssid,
                roam.roam_req.is_some(),
                roam.roam_start_sent,
                roam.target_bss_info
                    .clone()
                    .or_else(|| roam.roam_req.as_ref().map(|req| req.selected_bss.clone())),
            )
        };

        let mut status_code = outcome.status_code();
        let mut conn_info = AssocInfo::default();
        if outcome == RoamOutcome::Success {
            match self.finalize_roam(ifp, target) {
                Ok(info) => conn_info = info,
                Err(e) => {
                    error!("roam to {:?} could not be finalized: {}", target, e);
                    self.reset_fw_connection(ifp, target.unwrap_or_else(|| ifp.current_bssid()));
                    status_code = StatusCode::REFUSED_REASON_UNSPECIFIED;
                }
            }
        } else {
            warn!("roam to {:?} failed: {:?}", target, outcome);
            if outcome != RoamOutcome::InterruptedByDisconnect
                && !ifp.sme_state.contains(SmeState::DISCONNECTING)
            {
                self.reset_fw_connection(ifp, ifp.current_bssid());
            }
        }

        let selected_bssid = target.unwrap_or(ZERO_MAC_ADDR);
        if target.is_none() {
            status_code = StatusCode::REFUSED_REASON_UNSPECIFIED;
        }
        let offload = self.config.roam_offload();
        let unconfirmable = !offload && !has_roam_req;
        if unconfirmable {
            error!("roam to {} has no roam request to confirm", selected_bssid.to_mac_str());
            if status_code == StatusCode::SUCCESS {
                self.reset_fw_connection(ifp, selected_bssid);
            }
            status_code = StatusCode::REFUSED_REASON_UNSPECIFIED;
        }
        let authenticated =
            status_code == StatusCode::SUCCESS || self.roam.lock().target_bss_authenticated;
        if offload {
            if !roam_start_sent {
                self.sme.send(SmeEvent::RoamStartInd {
                    selected_bssid,
                    selected_bss: target_bss_info,
                    original_association_maintained: false,
                });
            }
            self.sme.send(SmeEvent::RoamResultInd {
                selected_bssid,
                status_code,
                original_association_maintained: false,
                target_bss_authenticated: authenticated,
                association_id: conn_info.aid,
                association_ies: conn_info.resp_ies,
            });
        } else {
            self.sme.send(SmeEvent::RoamConf {
                selected_bssid,
                status_code,
                original_association_maintained: false,
                target_bss_authenticated: authenticated,
                association_id: conn_info.aid,
                association_ies: conn_info.resp_ies,
            });
        }
        self.clear_roam_attempt();

        if target.is_none() {
            return Err(format_err!("roam ended without a target BSSID").into());
        }
        if unconfirmable {
            return Err(format_err!("roam ended without a roam request to confirm").into());
        }
        Ok(())
    }

    /// Moves the interface over to the roam target.
    fn finalize_roam(&self, ifp: &Vif, target: Option<MacAddr>) -> Result<AssocInfo, Error> {
        let target = target.ok_or_else(|| format_err!("no target BSSID"))?;
        let conn_info =
            self.fw.assoc_info(ifp.ifidx).map_err(|e| Error::firmware("assoc_info", e))?;
        let chanspec = self.fw.chanspec(ifp.ifidx).map_err(|e| Error::firmware("chanspec", e))?;
        let channel = chanspec::decode(chanspec)
            .ok_or_else(|| format_err!("firmware reported chanspec {:#06x}", chanspec))?;
        let roam_bss = self.roam.lock().roam_req.as_ref().map(|req| req.selected_bss.clone());
        let bss = match roam_bss {
            Some(bss) => bss,
            None => {
                let buf =
                    self.fw.bss_info(ifp.ifidx).map_err(|e| Error::firmware("bss_info", e))?;
                bss::parse_bss_info(&buf[..])?
            }
        };
        if bss.bssid != target {
            return Err(format_err!(
                "associated with {}, expected {}",
                bss.bssid.to_mac_str(),
                target.to_mac_str()
            )
            .into());
        }

        {
            let mut profile = ifp.profile.lock();
            profile.bssid = target;
            profile.ssid = ie::find_ssid(&bss.ies[..]).map(|ssid| ssid.to_vec()).unwrap_or(bss.ssid);
            profile.beacon_period = bss.beacon_period;
            profile.channel = Some(channel);
        }
        ifp.sme_state.set(SmeState::CONNECTED);
        self.conn.lock().conn_info = conn_info.clone();
        self.timers.signal_report.start(self.config.signal_report_interval());
        info!("roamed to {} on channel {}", target.to_mac_str(), channel.primary);
        Ok(conn_info)
    }

    fn reset_fw_connection(&self, ifp: &Vif, bssid: MacAddr) {
        if let Err(e) = self.fw.disassoc(ifp.ifidx, &bssid, ReasonCode::UNSPECIFIED_REASON) {
            warn!("failed to reset firmware connection state: {}", e);
        }
        ifp.sme_state.clear(SmeState::CONNECTED);
        ifp.profile.lock().bssid = ZERO_MAC_ADDR;
        self.timers.signal_report.stop();
    }

    pub(crate) fn roam_timeout(&self) {
        for ifp in self.vifs_in_state(SmeState::ROAMING) {
            warn!("roam on interface {} timed out", ifp.ifidx);
            if let Err(e) = self.bss_roam_done(&ifp, RoamOutcome::Timeout) {
                error!("{}", e);
            }
        }
    }
}

/// ROAM_PREP, REASSOC and ROAM.
pub struct RoamEventHandler;

impl EventHandler for RoamEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let ifp = cfg.event_vif(&event.msg)?;
        if ifp.role() != MacRole::Client {
            debug!("ignoring {:?} on interface {}", event.msg.event_code, ifp.ifidx);
            return Ok(());
        }
        match event.msg.event_code {
            EventCode::ROAM_PREP => cfg.handle_roam_prep(&ifp, event),
            EventCode::REASSOC => cfg.handle_reassoc(&ifp, event),
            EventCode::ROAM => cfg.handle_roam(&ifp, event),
            code => {
                warn!("roam handler got {:?}", code);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            bss::fake_bss_info,
            chanspec::{Cbw, Channel},
            config::Config,
            fwil::ScanType,
            ie::fake_ies,
            sme::{ScanRequest, ScanResultCode},
            test_utils::{
                fake_bss_description, fake_event, link_event, FwCommand, TestHelper, BSSID,
                BSS_CHANSPEC, CLIENT_IFIDX, SSID, TARGET_BSSID,
            },
            timer::TimerKind,
        },
        matches::assert_matches,
        std::time::Duration,
    };

    fn roam_request() -> RoamRequest {
        RoamRequest { selected_bss: fake_bss_description(TARGET_BSSID) }
    }

    fn target_bss_info() -> Vec<u8> {
        fake_bss_info(TARGET_BSSID, SSID, BSS_CHANSPEC, &fake_ies::ssid_ie(SSID)[..])
    }

    fn roam_event(code: EventCode, status: EventStatus, addr: MacAddr) -> FirmwareEvent {
        fake_event(code, status, CLIENT_IFIDX, addr)
    }

    #[test]
    fn requested_roam_succeeds() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.fw.clear_commands();
        h.fw.set_assoc_info(AssocInfo { req_ies: vec![], resp_ies: vec![7, 7], aid: 9 });
        h.fw.set_chanspec(0x100b);

        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        assert_eq!(
            h.fw.commands(),
            vec![FwCommand::Reassoc {
                ifidx: CLIENT_IFIDX,
                params: JoinParams { ssid: SSID.to_vec(), bssid: TARGET_BSSID, chanspec: BSS_CHANSPEC },
            }]
        );
        assert!(h.client().sme_state.contains(SmeState::CONNECTED | SmeState::ROAMING));
        assert_eq!(h.scheduler.scheduled(TimerKind::Roam), Some(Duration::from_secs(2)));

        h.cfg
            .dispatch_event(&roam_event(EventCode::AUTH, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("auth handled");
        assert!(h.cfg.roam.lock().target_bss_authenticated);

        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        assert_eq!(
            h.drain_sme_events(),
            vec![SmeEvent::RoamConf {
                selected_bssid: TARGET_BSSID,
                status_code: StatusCode::SUCCESS,
                original_association_maintained: false,
                target_bss_authenticated: true,
                association_id: 9,
                association_ies: vec![7, 7],
            }]
        );
        let state = h.client().sme_state.load();
        assert!(state.contains(SmeState::CONNECTED));
        assert!(!state.contains(SmeState::ROAMING));
        assert_eq!(h.client().current_bssid(), TARGET_BSSID);
        assert_eq!(h.client().profile.lock().channel, Some(Channel::new(11, Cbw::Cbw20)));
        assert!(!h.scheduler.is_scheduled(TimerKind::Roam));
        assert_eq!(h.cfg.roam.lock().target_bssid, None);

        // A second terminal event finds no roam to complete.
        h.cfg
            .dispatch_event(&roam_event(EventCode::ROAM, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("roam handled");
        assert!(h.drain_sme_events().is_empty());
    }

    #[test]
    fn requested_roam_with_offload_reports_start_and_result() {
        let mut h = offload_helper();
        h.connect_client();
        h.fw.set_assoc_info(AssocInfo { req_ies: vec![], resp_ies: vec![7, 7], aid: 9 });

        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        assert_eq!(
            h.drain_sme_events(),
            vec![
                SmeEvent::RoamStartInd {
                    selected_bssid: TARGET_BSSID,
                    selected_bss: Some(fake_bss_description(TARGET_BSSID)),
                    original_association_maintained: false,
                },
                SmeEvent::RoamResultInd {
                    selected_bssid: TARGET_BSSID,
                    status_code: StatusCode::SUCCESS,
                    original_association_maintained: false,
                    target_bss_authenticated: true,
                    association_id: 9,
                    association_ies: vec![7, 7],
                },
            ]
        );
        assert_eq!(h.client().current_bssid(), TARGET_BSSID);
        assert!(!h.client().sme_state.contains(SmeState::ROAMING));
    }

    #[test]
    fn requested_roam_with_offload_announces_start_once() {
        let mut h = offload_helper();
        h.connect_client();
        h.fw.set_bss_info(target_bss_info());
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.cfg
            .dispatch_event(&roam_event(EventCode::ROAM_PREP, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("roam prep handled");
        assert_matches!(
            &h.drain_sme_events()[..],
            [SmeEvent::RoamStartInd { selected_bssid: TARGET_BSSID, .. }]
        );

        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        assert_matches!(
            &h.drain_sme_events()[..],
            [SmeEvent::RoamResultInd { status_code: StatusCode::SUCCESS, .. }]
        );
    }

    #[test]
    fn firmware_roam_without_offload_is_refused() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.fw.set_bss_info(target_bss_info());
        h.cfg
            .dispatch_event(&roam_event(EventCode::REASSOC, EventStatus::ATTEMPT, TARGET_BSSID))
            .expect("reassoc handled");
        h.fw.clear_commands();
        assert_matches!(
            h.cfg.dispatch_event(&roam_event(EventCode::ROAM, EventStatus::SUCCESS, TARGET_BSSID)),
            Err(Error::Internal(_))
        );
        assert_eq!(
            h.drain_sme_events(),
            vec![SmeEvent::RoamConf {
                selected_bssid: TARGET_BSSID,
                status_code: StatusCode::REFUSED_REASON_UNSPECIFIED,
                original_association_maintained: false,
                target_bss_authenticated: false,
                association_id: 0,
                association_ies: vec![],
            }]
        );
        assert!(h.fw.commands().contains(&FwCommand::Disassoc {
            ifidx: CLIENT_IFIDX,
            bssid: TARGET_BSSID,
            reason: ReasonCode::UNSPECIFIED_REASON,
        }));
        assert!(!h.client().sme_state.intersects(SmeState::ROAMING | SmeState::CONNECTED));
    }

    #[test]
    fn roam_req_needs_connection() {
        let mut h = TestHelper::new();
        assert_matches!(h.cfg.roam_req(CLIENT_IFIDX, roam_request()), Err(Error::BadState(_)));
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::RoamConf { status_code: StatusCode::REFUSED_REASON_UNSPECIFIED, .. })
        );
        assert!(h.fw.commands().is_empty());
    }

    #[test]
    fn second_roam_req_is_refused() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        assert_matches!(h.cfg.roam_req(CLIENT_IFIDX, roam_request()), Err(Error::BadState(_)));
        assert_matches!(h.next_sme_event(), Some(SmeEvent::RoamConf { .. }));
        assert!(h.client().sme_state.contains(SmeState::ROAMING));
        assert_eq!(h.cfg.roam.lock().target_bssid, Some(TARGET_BSSID));
    }

    #[test]
    fn reassoc_failure_rolls_back() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.fw.fail("reassoc");
        assert_matches!(
            h.cfg.roam_req(CLIENT_IFIDX, roam_request()),
            Err(Error::Firmware { cmd: "reassoc", .. })
        );
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::RoamConf { status_code: StatusCode::REFUSED_REASON_UNSPECIFIED, .. })
        );
        let state = h.client().sme_state.load();
        assert!(state.contains(SmeState::CONNECTED));
        assert!(!state.contains(SmeState::ROAMING));
        assert!(!h.scheduler.is_scheduled(TimerKind::Roam));
        assert_eq!(h.cfg.roam.lock().target_bssid, None);
    }

    #[test]
    fn roam_req_aborts_scan() {
        let mut h = TestHelper::new();
        h.connect_client();
        let scan = ScanRequest {
            txn_id: 3,
            scan_type: ScanType::Passive,
            channels: vec![6],
            ssids: vec![],
            min_channel_time_ms: None,
            max_channel_time_ms: None,
        };
        h.cfg.start_scan(CLIENT_IFIDX, scan).expect("scan started");
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        assert_eq!(
            h.drain_sme_events(),
            vec![SmeEvent::OnScanEnd { txn_id: 3, code: ScanResultCode::CanceledByDriverOrFirmware }]
        );
    }

    fn offload_helper() -> TestHelper {
        TestHelper::with_config(Config { roam_engine_enabled: true, ..Config::default() })
    }

    #[test]
    fn firmware_reassoc_attempt_starts_roam() {
        let mut h = offload_helper();
        h.connect_client();
        h.cfg
            .dispatch_event(&roam_event(EventCode::REASSOC, EventStatus::ATTEMPT, TARGET_BSSID))
            .expect("reassoc handled");
        assert!(h.client().sme_state.contains(SmeState::ROAMING));
        assert_eq!(h.cfg.roam.lock().target_bssid, Some(TARGET_BSSID));
        assert!(h.scheduler.is_scheduled(TimerKind::Roam));
        assert!(h.drain_sme_events().is_empty());

        h.fw.set_bss_info(target_bss_info());
        h.cfg
            .dispatch_event(&roam_event(EventCode::ROAM, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("roam handled");
        let events = h.drain_sme_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SmeEvent::RoamStartInd {
                selected_bssid: TARGET_BSSID,
                selected_bss: None,
                original_association_maintained: false,
            }
        );
        assert_matches!(
            &events[1],
            SmeEvent::RoamResultInd {
                selected_bssid: TARGET_BSSID,
                status_code: StatusCode::SUCCESS,
                target_bss_authenticated: true,
                ..
            }
        );
        assert_eq!(h.client().current_bssid(), TARGET_BSSID);
    }

    #[test]
    fn offloaded_roam_announces_target_at_prep() {
        let mut h = offload_helper();
        h.connect_client();
        h.fw.set_bss_info(target_bss_info());
        h.cfg
            .dispatch_event(&roam_event(EventCode::ROAM_PREP, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("roam prep handled");
        assert_eq!(
            h.drain_sme_events(),
            vec![SmeEvent::RoamStartInd {
                selected_bssid: TARGET_BSSID,
                selected_bss: Some(fake_bss_description(TARGET_BSSID)),
                original_association_maintained: false,
            }]
        );
        assert!(!h.cfg.roam.lock().target_bss_authenticated);

        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        let events = h.drain_sme_events();
        assert_eq!(events.len(), 1);
        assert_matches!(
            &events[0],
            SmeEvent::RoamResultInd { status_code: StatusCode::SUCCESS, .. }
        );
    }

    #[test]
    fn offloaded_roam_rejects_wrong_bss_info() {
        let mut h = TestHelper::with_config(Config { wnm_btm_enabled: true, ..Config::default() });
        h.connect_client();
        h.fw.set_bss_info(fake_bss_info([5; 6], SSID, BSS_CHANSPEC, &fake_ies::ssid_ie(SSID)[..]));
        h.cfg
            .dispatch_event(&roam_event(EventCode::ROAM_PREP, EventStatus::SUCCESS, TARGET_BSSID))
            .expect("roam prep handled");
        let events = h.drain_sme_events();
        assert_eq!(events.len(), 2);
        assert_matches!(&events[0], SmeEvent::RoamStartInd { selected_bssid: TARGET_BSSID, .. });
        assert_matches!(
            &events[1],
            SmeEvent::RoamResultInd {
                status_code: StatusCode::REFUSED_REASON_UNSPECIFIED,
                ..
            }
        );
        assert!(!h.client().sme_state.intersects(SmeState::ROAMING | SmeState::CONNECTED));
    }

    #[test]
    fn roam_timeout_reports_once() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.fw.clear_commands();
        h.advance(Duration::from_secs(2));
        let events: Vec<_> = h
            .drain_sme_events()
            .into_iter()
            .filter(|event| !matches!(event, SmeEvent::SignalReport { .. }))
            .collect();
        assert_eq!(
            events,
            vec![SmeEvent::RoamConf {
                selected_bssid: TARGET_BSSID,
                status_code: StatusCode::REJECTED_SEQUENCE_TIMEOUT,
                original_association_maintained: false,
                target_bss_authenticated: false,
                association_id: 0,
                association_ies: vec![],
            }]
        );
        assert!(h.fw.commands().contains(&FwCommand::Disassoc {
            ifidx: CLIENT_IFIDX,
            bssid: BSSID,
            reason: ReasonCode::UNSPECIFIED_REASON,
        }));
        assert!(!h.client().sme_state.intersects(SmeState::ROAMING | SmeState::CONNECTED));

        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        assert!(h.drain_sme_events().is_empty());
    }

    #[test]
    fn roam_target_kept_while_target_deauth_pending() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.cfg.disconnect_request_state.set(DisconnectRequest::DEAUTH_TARGET_BSS);
        h.cfg.roam_timeout();
        assert_matches!(h.next_sme_event(), Some(SmeEvent::RoamConf { .. }));
        let roam = h.cfg.roam.lock();
        assert_eq!(roam.target_bssid, Some(TARGET_BSSID));
        assert!(roam.roam_req.is_none());
    }

    #[test]
    fn auth_failure_while_roaming() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.cfg
            .dispatch_event(&roam_event(EventCode::AUTH, EventStatus::FAIL, TARGET_BSSID))
            .expect("auth handled");
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::RoamConf {
                status_code: StatusCode::REFUSED_REASON_UNSPECIFIED,
                target_bss_authenticated: false,
                ..
            })
        );
    }

    #[test]
    fn reassoc_failure_event_carries_reason() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        let mut event = roam_event(EventCode::REASSOC, EventStatus::FAIL, TARGET_BSSID);
        event.msg.reason = 17;
        h.cfg.dispatch_event(&event).expect("reassoc handled");
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::RoamConf { status_code: StatusCode::DENIED_NO_MORE_STAS, .. })
        );
    }

    #[test]
    fn roam_finalize_failure_is_not_success() {
        let mut h = TestHelper::new();
        h.connect_client();
        h.cfg.roam_req(CLIENT_IFIDX, roam_request()).expect("roam started");
        h.fw.fail("assoc_info");
        h.cfg.dispatch_event(&link_event(CLIENT_IFIDX, TARGET_BSSID, true)).expect("link handled");
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::RoamConf { status_code: StatusCode::REFUSED_REASON_UNSPECIFIED, .. })
        );
        assert!(!h.client().is_connected());
        assert!(h.fw.commands().iter().any(|cmd| matches!(cmd, FwCommand::Disassoc { .. })));
    }

    #[test]
    fn roam_without_target_still_reports() {
        let mut h = offload_helper();
        h.connect_client();
        h.cfg
            .dispatch_event(&roam_event(EventCode::REASSOC, EventStatus::ATTEMPT, ZERO_MAC_ADDR))
            .expect("reassoc handled");
        assert_eq!(h.cfg.roam.lock().target_bssid, None);
        assert_matches!(
            h.cfg.dispatch_event(&roam_event(EventCode::ROAM, EventStatus::SUCCESS, ZERO_MAC_ADDR)),
            Err(Error::Internal(_))
        );
        let events = h.drain_sme_events();
        assert_eq!(events.len(), 2);
        assert_matches!(
            &events[1],
            SmeEvent::RoamResultInd {
                selected_bssid: ZERO_MAC_ADDR,
                status_code: StatusCode::REFUSED_REASON_UNSPECIFIED,
                ..
            }
        );
        assert!(!h.client().sme_state.contains(SmeState::ROAMING));
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(RoamOutcome::Success.status_code(), StatusCode::SUCCESS);
        assert_eq!(RoamOutcome::Timeout.status_code(), StatusCode::REJECTED_SEQUENCE_TIMEOUT);
        assert_eq!(RoamOutcome::InterruptedByDisconnect.status_code(), StatusCode::CANCELED);
        assert_eq!(
            RoamOutcome::ReassocFailed(StatusCode::REFUSED_TEMPORARILY).status_code(),
            StatusCode::REFUSED_TEMPORARILY
        );
    }
}
