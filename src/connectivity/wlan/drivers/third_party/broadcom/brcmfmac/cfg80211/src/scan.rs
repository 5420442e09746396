// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Extended scan (escan) orchestration.
//!
//! One scan runs at a time, tracked by the BUSY bit in `scan_status`. Each scan gets a fresh
//! sync id; result events carrying any other sync id belong to a superseded scan and are
//! dropped. Results are collected per BSSID and handed to the SME right before the single
//! `OnScanEnd`.

use {
    crate::{
        bss,
        cfg80211::Cfg80211,
        chanspec::{self, Cbw, Channel},
        error::{Error, Status},
        event_dispatch::EventHandler,
        fweh::{EventStatus, FirmwareEvent},
        fwil::{EscanAction, EscanParams, ESCAN_REQ_VERSION},
        ie::MAX_SSID_LEN,
        mac::{MacAddr, MacFmt},
        sme::{BssDescription, ScanRequest, ScanResultCode, SmeEvent},
        status::{ScanStatus, SmeState},
        vif::MacRole,
    },
    log::{debug, error, info, warn},
    std::collections::BTreeMap,
    zerocopy::{
        byteorder::{LittleEndian, U16, U32},
        AsBytes, FromBytes, LayoutVerified, Unaligned,
    },
};

/// Header of an ESCAN_RESULT payload. BSS info records follow it.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
pub struct EscanResultLe {
    pub buflen: U32<LittleEndian>,
    pub version: U32<LittleEndian>,
    pub sync_id: U16<LittleEndian>,
    pub bss_count: U16<LittleEndian>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscanState {
    Idle,
    Scanning,
}

pub struct ScanSession {
    pub(crate) scan_in_progress: bool,
    pub(crate) state: EscanState,
    pub(crate) ifidx: Option<u8>,
    pub(crate) txn_id: u64,
    pub(crate) sync_id: u16,
    next_sync_id: u16,
    results: BTreeMap<MacAddr, BssDescription>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            scan_in_progress: false,
            state: EscanState::Idle,
            ifidx: None,
            txn_id: 0,
            sync_id: 0,
            next_sync_id: 0,
            results: BTreeMap::new(),
        }
    }

    fn begin(&mut self, ifidx: u8, txn_id: u64) -> u16 {
        self.scan_in_progress = true;
        self.state = EscanState::Scanning;
        self.ifidx = Some(ifidx);
        self.txn_id = txn_id;
        self.sync_id = self.next_sync_id;
        self.next_sync_id = self.next_sync_id.wrapping_add(1);
        self.results.clear();
        self.sync_id
    }

    /// Returns the session to idle and hands back what it collected.
    fn finish(&mut self) -> (Option<u8>, u64, Vec<BssDescription>) {
        self.scan_in_progress = false;
        self.state = EscanState::Idle;
        let results = std::mem::take(&mut self.results).into_iter().map(|(_, bss)| bss).collect();
        (self.ifidx.take(), self.txn_id, results)
    }

    fn is_current(&self, sync_id: u16) -> bool {
        self.state == EscanState::Scanning && self.sync_id == sync_id
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_result_code(e: &Error) -> ScanResultCode {
    match e {
        Error::ScanUnavailable(_) | Error::ShouldWait(_) => ScanResultCode::ShouldWait,
        Error::InvalidArgs(_) => ScanResultCode::InvalidArgs,
        Error::Firmware { source, .. } if source.status == Status::NOT_SUPPORTED => {
            ScanResultCode::NotSupported
        }
        _ => ScanResultCode::InternalError,
    }
}

impl Cfg80211 {
    /// Starts an escan. A rejected request still gets its `OnScanEnd`.
    pub fn start_scan(&self, ifidx: u8, req: ScanRequest) -> Result<(), Error> {
        let txn_id = req.txn_id;
        self.try_start_scan(ifidx, req).map_err(|e| {
            warn!("scan {} rejected: {}", txn_id, e);
            self.sme.send(SmeEvent::OnScanEnd { txn_id, code: scan_result_code(&e) });
            e
        })
    }

    fn try_start_scan(&self, ifidx: u8, req: ScanRequest) -> Result<(), Error> {
        let ifp = self.vif(ifidx)?;
        if !ifp.is_up() {
            return Err(Error::BadState(format!("interface {} is not ready", ifidx)));
        }
        let unavailable = self.scan_status.load();
        if !unavailable.is_empty() {
            return Err(Error::ScanUnavailable(format!("{:?}", unavailable)));
        }
        if ifp.sme_state.intersects(SmeState::CONNECTING | SmeState::ROAMING) {
            return Err(Error::ShouldWait("connect or roam in progress"));
        }
        if let Some(softap) = self.vifs.find_by_role(MacRole::Ap) {
            if softap.sme_state.contains(SmeState::AP_START_PENDING) {
                return Err(Error::ShouldWait("AP start pending"));
            }
        }

        if let Some(ssid) = req.ssids.iter().find(|ssid| ssid.len() > MAX_SSID_LEN) {
            return Err(Error::InvalidArgs(format!("SSID of {} bytes", ssid.len())));
        }
        if let (Some(min), Some(max)) = (req.min_channel_time_ms, req.max_channel_time_ms) {
            if min > max {
                return Err(Error::InvalidArgs(format!("channel time {} > {}", min, max)));
            }
        }
        let chanspecs = req
            .channels
            .iter()
            .map(|ch| {
                chanspec::encode(&Channel::new(*ch, Cbw::Cbw20))
                    .ok_or_else(|| Error::InvalidArgs(format!("invalid channel {}", ch)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sync_id = {
            let mut scan = self.scan.lock();
            if self.scan_status.test_and_set(ScanStatus::BUSY) {
                return Err(Error::ScanUnavailable("BUSY".to_string()));
            }
            scan.begin(ifidx, req.txn_id)
        };
        self.timers.escan.start(self.config.escan_timeout());
        self.set_mpc(ifidx, false);

        let params = EscanParams {
            version: ESCAN_REQ_VERSION,
            action: EscanAction::Start,
            sync_id,
            scan_type: req.scan_type,
            ssids: req.ssids,
            chanspecs,
            active_time_ms: req.max_channel_time_ms.unwrap_or(self.config.active_dwell_ms),
            passive_time_ms: req.max_channel_time_ms.unwrap_or(self.config.passive_dwell_ms),
            home_time_ms: self.config.home_time_ms,
        };
        if let Err(e) = self.fw.escan(ifidx, &params) {
            error!("escan {} failed: {}", sync_id, e);
            {
                let mut scan = self.scan.lock();
                self.timers.escan.stop();
                scan.finish();
                self.scan_status.clear(ScanStatus::BUSY);
            }
            self.set_mpc(ifidx, true);
            return Err(Error::firmware("escan", e));
        }
        info!("scan {} started with sync id {}", req.txn_id, sync_id);
        Ok(())
    }

    fn set_mpc(&self, ifidx: u8, enable: bool) {
        if let Err(e) = self.fw.set_mpc(ifidx, enable) {
            warn!("failed to set mpc to {}: {}", enable, e);
        }
    }

    fn handle_escan_result(&self, event: &FirmwareEvent) -> Result<(), Error> {
        if !self.scan_status.contains(ScanStatus::BUSY) {
            debug!("escan result {:?} with no scan in progress", event.msg.status);
            return Ok(());
        }
        let (header, body) =
            LayoutVerified::<_, EscanResultLe>::new_unaligned_from_prefix(&event.data[..])
                .ok_or_else(|| {
                    Error::MalformedEvent(format!("escan result of {} bytes", event.data.len()))
                })?;
        let sync_id = header.sync_id.get();

        if event.msg.status != EventStatus::PARTIAL {
            if !self.scan.lock().is_current(sync_id) {
                warn!("dropping escan completion for stale sync id {}", sync_id);
                return Ok(());
            }
            let code = match event.msg.status {
                EventStatus::SUCCESS => ScanResultCode::Success,
                EventStatus::ABORT => ScanResultCode::CanceledByDriverOrFirmware,
                status => {
                    warn!("escan {} ended with {:?}", sync_id, status);
                    ScanResultCode::InternalError
                }
            };
            self.escan_complete(code);
            return Ok(());
        }

        let bss_count = header.bss_count.get();
        if bss_count != 1 {
            warn!("escan result with {} BSS records, dropping", bss_count);
            return Ok(());
        }
        let bss = match bss::parse_bss_info(body) {
            Ok(bss) => bss,
            Err(e) => {
                warn!("dropping escan result: {}", e);
                return Ok(());
            }
        };
        let mut scan = self.scan.lock();
        if !scan.is_current(sync_id) {
            warn!("dropping escan result for stale sync id {} (current {})", sync_id, scan.sync_id);
            return Ok(());
        }
        debug!("scan result {} {:?} rssi {}", bss.bssid.to_mac_str(), bss.channel, bss.rssi_dbm);
        scan.results.insert(bss.bssid, bss);
        Ok(())
    }

    /// Ends the scan in progress and reports `code`. Only the first caller after a scan
    /// started has any effect.
    pub(crate) fn escan_complete(&self, code: ScanResultCode) {
        let (ifidx, txn_id, results) = {
            let mut scan = self.scan.lock();
            if !self.scan_status.contains(ScanStatus::BUSY) || scan.state != EscanState::Scanning
            {
                return;
            }
            self.timers.escan.stop();
            let finished = scan.finish();
            self.scan_status.clear(ScanStatus::BUSY);
            finished
        };
        if let Some(ifidx) = ifidx {
            self.set_mpc(ifidx, true);
        }
        info!("scan {} done: {:?}, {} BSS found", txn_id, code, results.len());
        for bss in results {
            self.sme.send(SmeEvent::OnScanResult { txn_id, bss });
        }
        self.sme.send(SmeEvent::OnScanEnd { txn_id, code });
    }

    /// Stops the scan in progress, if any. Safe to call speculatively.
    pub(crate) fn abort_scanning(&self) {
        if self.scan_status.test_and_set(ScanStatus::ABORT) {
            return;
        }
        if self.scan_status.contains(ScanStatus::BUSY) {
            let (ifidx, sync_id) = {
                let scan = self.scan.lock();
                (scan.ifidx, scan.sync_id)
            };
            if let Some(ifidx) = ifidx {
                info!("aborting escan {}", sync_id);
                if let Err(e) = self.fw.escan(ifidx, &EscanParams::abort(sync_id)) {
                    warn!("escan abort failed: {}", e);
                }
            }
            self.escan_complete(ScanResultCode::CanceledByDriverOrFirmware);
        }
        self.scan_status.clear(ScanStatus::ABORT);
    }

    pub(crate) fn escan_timeout(&self) {
        warn!("escan timed out");
        self.abort_scanning();
    }

    /// Blocks new scans while set, e.g. while BT coexistence needs the radio.
    pub fn suppress_scans(&self, suppress: bool) {
        if suppress {
            self.scan_status.set(ScanStatus::SUPPRESS);
        } else {
            self.scan_status.clear(ScanStatus::SUPPRESS);
        }
    }
}

pub struct ScanEventHandler;

impl EventHandler for ScanEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        cfg.handle_escan_result(event)
    }
}
