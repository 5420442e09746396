// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        config::Config,
        connect::{ConnAttempt, PendingConnect},
        error::{Error, ResultExt, Status},
        event_dispatch::EventTable,
        fweh::{EventMsg, FirmwareEvent},
        fwil::{Firmware, WmmParams},
        mac::{MacAddr, MacFmt},
        roam::RoamAttempt,
        scan::ScanSession,
        sme::{EapolRequest, EapolResultCode, SmeEvent, SmeSink, SmeStream},
        status::{AtomicStatus, DisconnectRequest, ScanStatus, SmeState},
        timer::{Scheduler, TimeStream, TimeoutEvent, TimerKind, TimerSet},
        vif::{Vif, VifList},
    },
    futures::{channel::mpsc, StreamExt},
    log::{debug, info, warn},
    parking_lot::Mutex,
    std::sync::Arc,
};

/// Firmware events that only feed diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub mic_errors: u32,
    pub tdls_peer_events: u32,
}

/// Driver-wide state shared by the scan, connect, roam, disconnect and AP engines.
///
/// Requests from the SME, firmware events and timer expirations all land here and may arrive
/// on different threads. The status bit vectors are the primary synchronization; firmware
/// events and timer expirations are additionally serialized against each other.
pub struct Cfg80211 {
    pub(crate) config: Config,
    pub(crate) fw: Arc<dyn Firmware>,
    pub(crate) sme: SmeSink,
    pub(crate) timers: TimerSet,
    pub(crate) vifs: VifList,
    pub(crate) scan_status: AtomicStatus<ScanStatus>,
    pub(crate) disconnect_request_state: AtomicStatus<DisconnectRequest>,
    pub(crate) scan: Mutex<ScanSession>,
    pub(crate) conn: Mutex<ConnAttempt>,
    pub(crate) roam: Mutex<RoamAttempt>,
    pub(crate) pending_connect: Mutex<Option<PendingConnect>>,
    pub(crate) event_stats: Mutex<EventStats>,
    irq_callback_lock: Mutex<()>,
    event_table: EventTable,
}

impl Cfg80211 {
    pub fn new(
        config: Config,
        fw: Arc<dyn Firmware>,
        scheduler: Arc<dyn Scheduler>,
    ) -> (Arc<Self>, SmeStream) {
        let (sme_sink, sme_stream) = mpsc::unbounded();
        let cfg = Self {
            config,
            fw,
            sme: SmeSink::new(sme_sink),
            timers: TimerSet::new(scheduler),
            vifs: VifList::new(),
            scan_status: AtomicStatus::default(),
            disconnect_request_state: AtomicStatus::default(),
            scan: Mutex::new(ScanSession::new()),
            conn: Mutex::new(ConnAttempt::default()),
            roam: Mutex::new(RoamAttempt::default()),
            pending_connect: Mutex::new(None),
            event_stats: Mutex::new(EventStats::default()),
            irq_callback_lock: Mutex::new(()),
            event_table: EventTable::default_table(),
        };
        (Arc::new(cfg), sme_stream)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vifs(&self) -> &VifList {
        &self.vifs
    }

    pub fn scan_status(&self) -> ScanStatus {
        self.scan_status.load()
    }

    pub fn disconnect_request_state(&self) -> DisconnectRequest {
        self.disconnect_request_state.load()
    }

    pub fn event_stats(&self) -> EventStats {
        *self.event_stats.lock()
    }

    pub(crate) fn vif(&self, ifidx: u8) -> Result<Arc<Vif>, Error> {
        self.vifs
            .get(ifidx)
            .ok_or_else(|| Error::InvalidArgs(format!("no interface with index {}", ifidx)))
    }

    pub(crate) fn event_vif(&self, msg: &EventMsg) -> Result<Arc<Vif>, Error> {
        self.vifs.get(msg.ifidx).ok_or_else(|| {
            Error::MalformedEvent(format!(
                "{:?} for unknown interface {}",
                msg.event_code, msg.ifidx
            ))
        })
    }

    pub(crate) fn vifs_in_state(&self, state: SmeState) -> Vec<Arc<Vif>> {
        self.vifs.all().into_iter().filter(|vif| vif.sme_state.intersects(state)).collect()
    }

    /// Entry point for the firmware event handler.
    pub fn dispatch_event(&self, event: &FirmwareEvent) -> Result<(), Error> {
        let _irq_guard = self.irq_callback_lock.lock();
        match self.event_table.get(event.msg.event_code) {
            Some(handler) => {
                debug!(
                    "{:?} status {:?} reason {} from {} on interface {}",
                    event.msg.event_code,
                    event.msg.status,
                    event.msg.reason,
                    event.msg.addr.to_mac_str(),
                    event.msg.ifidx
                );
                handler.handle(self, event)
            }
            None => {
                debug!("no handler for {:?}", event.msg.event_code);
                Ok(())
            }
        }
    }

    /// Parses and dispatches a raw bus event.
    pub fn handle_firmware_event(&self, bytes: &[u8]) -> Status {
        FirmwareEvent::parse(bytes).and_then(|event| self.dispatch_event(&event)).into_status()
    }

    /// Runs the handler for a timer expiration. Expirations of a timer that was stopped or
    /// re-armed since are dropped.
    pub fn handle_timeout(&self, event: TimeoutEvent) {
        let _irq_guard = self.irq_callback_lock.lock();
        if !self.timers.get(event.kind).expire(event.id) {
            debug!("ignoring stale {:?} timeout", event.kind);
            return;
        }
        match event.kind {
            TimerKind::Escan => self.escan_timeout(),
            TimerKind::Connect => self.connect_timeout(),
            TimerKind::Disconnect => self.disconnect_timeout(),
            TimerKind::Roam => self.roam_timeout(),
            TimerKind::ApStart => self.ap_start_timeout(),
            TimerKind::SignalReport => self.signal_report_timeout(),
        }
    }

    /// Drains timer expirations posted by a `WorkQueueScheduler`.
    pub async fn serve_timeouts(&self, mut time_stream: TimeStream) {
        while let Some(event) = time_stream.next().await {
            self.handle_timeout(event);
        }
        info!("timeout stream closed");
    }

    pub fn eapol_req(&self, ifidx: u8, req: EapolRequest) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        match self.fw.eapol_tx(ifp.ifidx, &req.src_addr, &req.dst_addr, &req.data[..]) {
            Ok(()) => {
                self.sme.send(SmeEvent::EapolConf {
                    result_code: EapolResultCode::Success,
                    dst_addr: req.dst_addr,
                });
                Ok(())
            }
            Err(e) => {
                self.sme.send(SmeEvent::EapolConf {
                    result_code: EapolResultCode::TransmissionFailure,
                    dst_addr: req.dst_addr,
                });
                Err(Error::firmware("eapol", e))
            }
        }
    }

    /// Hands an EAPOL frame received from the peer to the SME.
    pub fn deliver_eapol_frame(
        &self,
        ifidx: u8,
        src_addr: MacAddr,
        dst_addr: MacAddr,
        data: &[u8],
    ) -> Result<(), Error> {
        let _ifp = self.vif(ifidx)?;
        self.sme.send(SmeEvent::EapolInd { src_addr, dst_addr, data: data.to_vec() });
        Ok(())
    }

    pub fn wmm_status_req(&self, ifidx: u8) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        match self.fw.wmm_params(ifp.ifidx) {
            Ok(params) => {
                self.sme.send(SmeEvent::OnWmmStatusResp { status: Status::OK, params });
                Ok(())
            }
            Err(e) => {
                warn!("failed to read WMM parameters: {}", e);
                self.sme.send(SmeEvent::OnWmmStatusResp {
                    status: e.status,
                    params: WmmParams::default(),
                });
                Err(Error::firmware("wmm", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            fweh::{EventCode, EventStatus, IfAction, IfEvent},
            fwil::WmmAcParams,
            test_utils::{fake_event, TestHelper, BSSID, CLIENT_IFIDX},
            timer::EventId,
            vif::MacRole,
        },
        matches::assert_matches,
        std::time::Duration,
    };

    #[test]
    fn unknown_event_code_is_ignored() {
        let h = TestHelper::new();
        let event = fake_event(EventCode(250), EventStatus::SUCCESS, CLIENT_IFIDX, [1; 6]);
        assert_matches!(h.cfg.dispatch_event(&event), Ok(()));
    }

    #[test]
    fn event_for_unknown_interface() {
        let h = TestHelper::new();
        let event = fake_event(EventCode::LINK, EventStatus::SUCCESS, 9, [1; 6]);
        assert_matches!(h.cfg.dispatch_event(&event), Err(Error::MalformedEvent(_)));
    }

    #[test]
    fn malformed_bus_event_maps_to_status() {
        let h = TestHelper::new();
        assert_eq!(h.cfg.handle_firmware_event(&[0, 2, 0]), Status::INVALID_ARGS);
    }

    #[test]
    fn if_event_adds_interface() {
        let h = TestHelper::new();
        let if_event = IfEvent { ifidx: 2, action: IfAction::Add, flags: 0, bsscfgidx: 2, role: 1 };
        let event = FirmwareEvent::new(
            EventMsg { ifidx: 0, addr: [4; 6], ..EventMsg::new(EventCode::IF, EventStatus::SUCCESS) },
            if_event.to_bytes(),
        );
        h.cfg.vifs().arm_vif_event(IfAction::Add);
        h.cfg.dispatch_event(&event).expect("IF event handled");
        assert_eq!(h.cfg.vifs().wait_for_vif_event(Duration::from_millis(1)), Some(if_event));
        let vif = h.cfg.vifs().get(2).expect("interface added");
        assert_eq!(vif.role(), MacRole::Ap);
        assert_eq!(vif.mac, [4; 6]);
    }

    #[test]
    fn if_change_keeps_connected_client() {
        let mut h = TestHelper::new();
        h.connect_client();
        let before = h.client();
        let if_event =
            IfEvent { ifidx: CLIENT_IFIDX, action: IfAction::Change, flags: 0, bsscfgidx: 0, role: 0 };
        let event = FirmwareEvent::new(
            EventMsg { ifidx: CLIENT_IFIDX, ..EventMsg::new(EventCode::IF, EventStatus::SUCCESS) },
            if_event.to_bytes(),
        );
        h.cfg.dispatch_event(&event).expect("IF event handled");

        let after = h.client();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.sme_state.contains(SmeState::CONNECTED));
        assert_eq!(after.current_bssid(), BSSID);
        assert_eq!(after.role(), MacRole::Client);
    }

    #[test]
    fn stale_timeout_is_ignored() {
        let mut h = TestHelper::new();
        h.cfg.handle_timeout(TimeoutEvent {
            kind: TimerKind::Connect,
            id: EventId::from_raw(999),
        });
        assert!(h.drain_sme_events().is_empty());
    }

    #[test]
    fn eapol_round_trip() {
        let mut h = TestHelper::new();
        h.cfg
            .eapol_req(
                CLIENT_IFIDX,
                EapolRequest { src_addr: [2; 6], dst_addr: [3; 6], data: vec![1, 2, 3] },
            )
            .expect("eapol sent");
        assert_eq!(
            h.next_sme_event(),
            Some(SmeEvent::EapolConf { result_code: EapolResultCode::Success, dst_addr: [3; 6] })
        );

        h.fw.fail("eapol");
        assert_matches!(
            h.cfg.eapol_req(
                CLIENT_IFIDX,
                EapolRequest { src_addr: [2; 6], dst_addr: [3; 6], data: vec![] }
            ),
            Err(Error::Firmware { cmd: "eapol", .. })
        );
        assert_eq!(
            h.next_sme_event(),
            Some(SmeEvent::EapolConf {
                result_code: EapolResultCode::TransmissionFailure,
                dst_addr: [3; 6]
            })
        );

        h.cfg.deliver_eapol_frame(CLIENT_IFIDX, [3; 6], [2; 6], &[9, 9]).expect("delivered");
        assert_eq!(
            h.next_sme_event(),
            Some(SmeEvent::EapolInd { src_addr: [3; 6], dst_addr: [2; 6], data: vec![9, 9] })
        );
    }

    #[test]
    fn wmm_status() {
        let mut h = TestHelper::new();
        let params = WmmParams {
            apsd: true,
            ac_be: WmmAcParams { aifsn: 3, ecw_min: 4, ecw_max: 10, txop_limit: 0, acm: false },
            ..WmmParams::default()
        };
        h.fw.set_wmm_params(params);
        h.cfg.wmm_status_req(CLIENT_IFIDX).expect("wmm status");
        assert_eq!(h.next_sme_event(), Some(SmeEvent::OnWmmStatusResp { status: Status::OK, params }));

        h.fw.fail("wmm");
        assert!(h.cfg.wmm_status_req(CLIENT_IFIDX).is_err());
        assert_matches!(
            h.next_sme_event(),
            Some(SmeEvent::OnWmmStatusResp { status: Status::IO, .. })
        );
    }

    #[test]
    fn serve_timeouts_drains_stream() {
        let mut h = TestHelper::new();
        let (sender, stream) = mpsc::unbounded();
        h.cfg.timers.signal_report.start(Duration::from_secs(1));
        h.client().sme_state.set(SmeState::CONNECTED);
        let armed = h.scheduler.advance(Duration::from_secs(1));
        for event in armed {
            sender.unbounded_send(event).expect("stream open");
        }
        drop(sender);
        futures::executor::block_on(h.cfg.serve_timeouts(stream));
        assert_matches!(h.next_sme_event(), Some(SmeEvent::SignalReport { .. }));
    }
}
