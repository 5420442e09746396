// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        chanspec::Channel,
        fweh::{IfAction, IfEvent, IF_FLAG_NOIF, IF_ROLE_AP},
        fwil::KeyConfig,
        mac::{MacAddr, MacFmt, ZERO_MAC_ADDR},
        status::{AtomicStatus, SmeState},
    },
    log::{info, warn},
    parking_lot::{Condvar, Mutex},
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

pub const MAX_KEYS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacRole {
    Client,
    Ap,
}

/// What the interface is connected to, or serving as an AP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub beacon_period: u16,
    pub channel: Option<Channel>,
    pub keys: [Option<KeyConfig>; MAX_KEYS],
}

/// Vendor IEs the host added to frames the firmware builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedIes {
    pub probe_req: Vec<u8>,
    pub probe_resp: Vec<u8>,
    pub beacon: Vec<u8>,
    pub assoc_req: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    bsscfgidx: u8,
    role: MacRole,
}

/// The interface control block. Lives as long as firmware keeps the interface, across role
/// changes.
pub struct Vif {
    pub ifidx: u8,
    binding: Mutex<Binding>,
    pub mac: MacAddr,
    pub sme_state: AtomicStatus<SmeState>,
    pub profile: Mutex<Profile>,
    pub saved_ie: Mutex<SavedIes>,
}

impl Vif {
    pub fn new(ifidx: u8, bsscfgidx: u8, role: MacRole, mac: MacAddr) -> Self {
        Self {
            ifidx,
            binding: Mutex::new(Binding { bsscfgidx, role }),
            mac,
            sme_state: AtomicStatus::new(SmeState::READY),
            profile: Mutex::new(Profile::default()),
            saved_ie: Mutex::new(SavedIes::default()),
        }
    }

    pub fn role(&self) -> MacRole {
        self.binding.lock().role
    }

    pub fn bsscfgidx(&self) -> u8 {
        self.binding.lock().bsscfgidx
    }

    /// Moves the interface to another bsscfg or role. Connection state is left alone.
    pub fn rebind(&self, bsscfgidx: u8, role: MacRole) {
        *self.binding.lock() = Binding { bsscfgidx, role };
    }

    pub fn is_up(&self) -> bool {
        self.sme_state.contains(SmeState::READY)
    }

    pub fn is_connected(&self) -> bool {
        self.sme_state.contains(SmeState::CONNECTED)
    }

    pub fn current_bssid(&self) -> MacAddr {
        self.profile.lock().bssid
    }

    /// Returns false if a connect attempt is already in progress.
    pub fn try_begin_connecting(&self) -> bool {
        !self.sme_state.test_and_set(SmeState::CONNECTING)
    }

    /// Ends the connect attempt. Only the first caller after `try_begin_connecting` gets true
    /// and is responsible for reporting the outcome.
    pub fn finish_connecting(&self, connected: bool) -> bool {
        if !self.sme_state.test_and_clear(SmeState::CONNECTING) {
            return false;
        }
        if connected {
            self.sme_state.set(SmeState::CONNECTED);
        }
        true
    }

    /// Returns false if a roam attempt is already in progress.
    pub fn begin_roaming(&self) -> bool {
        !self.sme_state.test_and_set(SmeState::ROAMING)
    }

    pub fn finish_roaming(&self) -> bool {
        self.sme_state.test_and_clear(SmeState::ROAMING)
    }

    /// Enters DISCONNECTING and drops CONNECTED and CONNECTING. Returns the bits it replaced so
    /// that a failed disconnect can put them back.
    pub fn begin_disconnecting(&self) -> SmeState {
        let replaced = self.sme_state.load()
            & (SmeState::CONNECTED | SmeState::CONNECTING | SmeState::DISCONNECTING);
        self.sme_state.set(SmeState::DISCONNECTING);
        self.sme_state.clear(SmeState::CONNECTED | SmeState::CONNECTING);
        replaced
    }

    pub fn rollback_disconnecting(&self, replaced: SmeState) {
        if !replaced.contains(SmeState::DISCONNECTING) {
            self.sme_state.clear(SmeState::DISCONNECTING);
        }
        self.sme_state.set(replaced & (SmeState::CONNECTED | SmeState::CONNECTING));
    }

    pub fn finish_disconnecting(&self) -> bool {
        self.sme_state.test_and_clear(SmeState::DISCONNECTING)
    }
}

#[derive(Default)]
struct VifEventState {
    armed: Option<IfAction>,
    received: Option<IfEvent>,
}

/// The interfaces known to the driver.
pub struct VifList {
    vifs: Mutex<Vec<Arc<Vif>>>,
    vif_event_lock: Mutex<VifEventState>,
    vif_event_cond: Condvar,
}

impl VifList {
    pub fn new() -> Self {
        Self {
            vifs: Mutex::new(vec![]),
            vif_event_lock: Mutex::new(VifEventState::default()),
            vif_event_cond: Condvar::new(),
        }
    }

    pub fn add(&self, vif: Vif) -> Arc<Vif> {
        let vif = Arc::new(vif);
        let mut vifs = self.vifs.lock();
        vifs.retain(|existing| existing.ifidx != vif.ifidx);
        vifs.push(Arc::clone(&vif));
        vif
    }

    pub fn remove(&self, ifidx: u8) -> Option<Arc<Vif>> {
        let mut vifs = self.vifs.lock();
        let pos = vifs.iter().position(|vif| vif.ifidx == ifidx)?;
        Some(vifs.remove(pos))
    }

    pub fn get(&self, ifidx: u8) -> Option<Arc<Vif>> {
        self.vifs.lock().iter().find(|vif| vif.ifidx == ifidx).cloned()
    }

    pub fn find_by_role(&self, role: MacRole) -> Option<Arc<Vif>> {
        self.vifs.lock().iter().find(|vif| vif.role() == role).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Vif>> {
        self.vifs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.vifs.lock().len()
    }

    /// Prepares to wait for an IF event carrying `action`. Must be called before the firmware
    /// command that triggers the event, so the event can not be missed.
    pub fn arm_vif_event(&self, action: IfAction) {
        let mut state = self.vif_event_lock.lock();
        state.armed = Some(action);
        state.received = None;
    }

    pub fn disarm_vif_event(&self) {
        let mut state = self.vif_event_lock.lock();
        state.armed = None;
        state.received = None;
    }

    /// Blocks until the armed IF event arrives or `timeout` passes. Disarms in both cases.
    pub fn wait_for_vif_event(&self, timeout: Duration) -> Option<IfEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.vif_event_lock.lock();
        while state.received.is_none() && state.armed.is_some() {
            if self.vif_event_cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.armed = None;
        state.received.take()
    }

    fn signal_vif_event(&self, event: &IfEvent) {
        let mut state = self.vif_event_lock.lock();
        if state.armed == Some(event.action) {
            state.received = Some(*event);
            self.vif_event_cond.notify_all();
        }
    }

    /// Keeps the list in step with an IF event and wakes a matching waiter.
    pub fn handle_if_event(&self, event: &IfEvent, mac: MacAddr) {
        info!(
            "IF event: action {:?} ifidx {} bsscfgidx {} role {} flags {:#x}",
            event.action, event.ifidx, event.bsscfgidx, event.role, event.flags
        );
        if event.flags & IF_FLAG_NOIF != 0 {
            // Firmware-internal interface, nothing for the host to track.
            self.signal_vif_event(event);
            return;
        }
        let role = if event.role == IF_ROLE_AP { MacRole::Ap } else { MacRole::Client };
        match event.action {
            IfAction::Change => match self.get(event.ifidx) {
                Some(vif) => {
                    vif.rebind(event.bsscfgidx, role);
                    info!("interface {} is now {:?}", event.ifidx, role);
                }
                None => {
                    warn!("IF change for unknown interface {}, adding it", event.ifidx);
                    self.add(Vif::new(event.ifidx, event.bsscfgidx, role, mac));
                }
            },
            IfAction::Add => {
                let mac = if mac == ZERO_MAC_ADDR {
                    self.get(event.ifidx).map(|vif| vif.mac).unwrap_or(mac)
                } else {
                    mac
                };
                self.add(Vif::new(event.ifidx, event.bsscfgidx, role, mac));
                info!("interface {} is {:?} with address {}", event.ifidx, role, mac.to_mac_str());
            }
            IfAction::Del => {
                if self.remove(event.ifidx).is_none() {
                    warn!("IF delete for unknown interface {}", event.ifidx);
                }
            }
        }
        self.signal_vif_event(event);
    }
}

impl Default for VifList {
    fn default() -> Self {
        Self::new()
    }
}
