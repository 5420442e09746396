// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        ap::ApEventHandler,
        cfg80211::Cfg80211,
        connect::ConnectEventHandler,
        disconnect::DisconnectEventHandler,
        error::Error,
        fweh::{EventCode, FirmwareEvent, IfEvent},
        mac::MacFmt,
        roam::RoamEventHandler,
        scan::ScanEventHandler,
    },
    log::{info, warn},
    std::{collections::HashMap, sync::Arc},
};

pub trait EventHandler: Send + Sync {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error>;
}

/// Maps each firmware event code to the one handler responsible for it.
pub struct EventTable {
    handlers: HashMap<EventCode, Arc<dyn EventHandler>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn default_table() -> Self {
        let mut table = Self::new();
        let scan: Arc<dyn EventHandler> = Arc::new(ScanEventHandler);
        let connect: Arc<dyn EventHandler> = Arc::new(ConnectEventHandler);
        let roam: Arc<dyn EventHandler> = Arc::new(RoamEventHandler);
        let disconnect: Arc<dyn EventHandler> = Arc::new(DisconnectEventHandler);
        let ap: Arc<dyn EventHandler> = Arc::new(ApEventHandler);
        let interface: Arc<dyn EventHandler> = Arc::new(InterfaceEventHandler);
        let diagnostic: Arc<dyn EventHandler> = Arc::new(DiagnosticEventHandler);

        let registrations = [
            (EventCode::ESCAN_RESULT, &scan),
            (EventCode::SET_SSID, &connect),
            (EventCode::JOIN_START, &connect),
            (EventCode::AUTH, &connect),
            (EventCode::ASSOC, &connect),
            (EventCode::LINK, &connect),
            (EventCode::CSA_COMPLETE_IND, &connect),
            (EventCode::ROAM_PREP, &roam),
            (EventCode::REASSOC, &roam),
            (EventCode::ROAM, &roam),
            (EventCode::DEAUTH, &disconnect),
            (EventCode::DEAUTH_IND, &disconnect),
            (EventCode::DISASSOC, &disconnect),
            (EventCode::DISASSOC_IND, &disconnect),
            (EventCode::AUTH_IND, &ap),
            (EventCode::ASSOC_IND, &ap),
            (EventCode::REASSOC_IND, &ap),
            (EventCode::AP_STARTED, &ap),
            (EventCode::IF, &interface),
            (EventCode::MIC_ERROR, &diagnostic),
            (EventCode::TDLS_PEER_EVENT, &diagnostic),
        ];
        for (code, handler) in registrations.iter() {
            table.register(*code, Arc::clone(handler));
        }
        table
    }

    /// Installs `handler` for `code`, returning the handler it replaced.
    pub fn register(
        &mut self,
        code: EventCode,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(code, handler)
    }

    pub fn get(&self, code: EventCode) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&code)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::default_table()
    }
}

/// IF events: interface add, delete and change.
pub struct InterfaceEventHandler;

impl EventHandler for InterfaceEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let if_event = IfEvent::parse(&event.data[..])?;
        cfg.vifs.handle_if_event(&if_event, event.msg.addr);
        Ok(())
    }
}

/// Events that are only logged and counted.
pub struct DiagnosticEventHandler;

impl EventHandler for DiagnosticEventHandler {
    fn handle(&self, cfg: &Cfg80211, event: &FirmwareEvent) -> Result<(), Error> {
        let mut stats = cfg.event_stats.lock();
        match event.msg.event_code {
            EventCode::MIC_ERROR => {
                stats.mic_errors += 1;
                warn!(
                    "MIC error from {} (group key: {}), {} so far",
                    event.msg.addr.to_mac_str(),
                    event.msg.flags & crate::fweh::EVENT_MSG_GROUP != 0,
                    stats.mic_errors
                );
            }
            code => {
                stats.tdls_peer_events += 1;
                info!("{:?} from {} reason {}", code, event.msg.addr.to_mac_str(), event.msg.reason);
            }
        }
        Ok(())
    }
}
