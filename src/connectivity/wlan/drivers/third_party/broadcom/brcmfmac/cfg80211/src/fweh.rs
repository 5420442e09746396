// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Firmware event messages as handed over by the firmware event handler.

use {
    crate::{error::Error, mac::MacAddr},
    std::fmt,
    zerocopy::{
        byteorder::{BigEndian, U16, U32},
        AsBytes, FromBytes, LayoutVerified, Unaligned,
    },
};

#[repr(C)]
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct EventCode(pub u32);

impl EventCode {
    pub const SET_SSID: Self = Self(0);
    pub const JOIN: Self = Self(1);
    pub const AUTH: Self = Self(3);
    pub const AUTH_IND: Self = Self(4);
    pub const DEAUTH: Self = Self(5);
    pub const DEAUTH_IND: Self = Self(6);
    pub const ASSOC: Self = Self(7);
    pub const ASSOC_IND: Self = Self(8);
    pub const REASSOC: Self = Self(9);
    pub const REASSOC_IND: Self = Self(10);
    pub const DISASSOC: Self = Self(11);
    pub const DISASSOC_IND: Self = Self(12);
    pub const LINK: Self = Self(16);
    pub const MIC_ERROR: Self = Self(17);
    pub const ROAM: Self = Self(19);
    pub const ROAM_PREP: Self = Self(32);
    pub const JOIN_START: Self = Self(36);
    pub const IF: Self = Self(54);
    pub const AP_STARTED: Self = Self(64);
    pub const ESCAN_RESULT: Self = Self(69);
    pub const CSA_COMPLETE_IND: Self = Self(80);
    pub const TDLS_PEER_EVENT: Self = Self(92);

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::SET_SSID => "SET_SSID",
            Self::JOIN => "JOIN",
            Self::AUTH => "AUTH",
            Self::AUTH_IND => "AUTH_IND",
            Self::DEAUTH => "DEAUTH",
            Self::DEAUTH_IND => "DEAUTH_IND",
            Self::ASSOC => "ASSOC",
            Self::ASSOC_IND => "ASSOC_IND",
            Self::REASSOC => "REASSOC",
            Self::REASSOC_IND => "REASSOC_IND",
            Self::DISASSOC => "DISASSOC",
            Self::DISASSOC_IND => "DISASSOC_IND",
            Self::LINK => "LINK",
            Self::MIC_ERROR => "MIC_ERROR",
            Self::ROAM => "ROAM",
            Self::ROAM_PREP => "ROAM_PREP",
            Self::JOIN_START => "JOIN_START",
            Self::IF => "IF",
            Self::AP_STARTED => "AP_STARTED",
            Self::ESCAN_RESULT => "ESCAN_RESULT",
            Self::CSA_COMPLETE_IND => "CSA_COMPLETE_IND",
            Self::TDLS_PEER_EVENT => "TDLS_PEER_EVENT",
            _ => return None,
        })
    }
}

impl fmt::Debug for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "EventCode({})", self.0),
        }
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub struct EventStatus(pub u32);

impl EventStatus {
    pub const SUCCESS: Self = Self(0);
    pub const FAIL: Self = Self(1);
    pub const TIMEOUT: Self = Self(2);
    pub const NO_NETWORKS: Self = Self(3);
    pub const ABORT: Self = Self(4);
    pub const NO_ACK: Self = Self(5);
    pub const UNSOLICITED: Self = Self(6);
    pub const ATTEMPT: Self = Self(7);
    pub const PARTIAL: Self = Self(8);
    pub const NEWSCAN: Self = Self(9);
    pub const NEWASSOC: Self = Self(10);
}

pub const EVENT_MSG_LINK: u16 = 0x01;
pub const EVENT_MSG_FLUSHTXQ: u16 = 0x02;
pub const EVENT_MSG_GROUP: u16 = 0x04;

const IFNAMSIZ: usize = 16;

/// Event message header as it travels on the bus. Every field is big-endian.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
pub struct EventMsgBe {
    pub version: U16<BigEndian>,
    pub flags: U16<BigEndian>,
    pub event_type: U32<BigEndian>,
    pub status: U32<BigEndian>,
    pub reason: U32<BigEndian>,
    pub auth_type: U32<BigEndian>,
    pub datalen: U32<BigEndian>,
    pub addr: MacAddr,
    pub ifname: [u8; IFNAMSIZ],
    pub ifidx: u8,
    pub bsscfgidx: u8,
}

/// Host-order view of an event message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMsg {
    pub version: u16,
    pub flags: u16,
    pub event_code: EventCode,
    pub status: EventStatus,
    pub reason: u32,
    pub auth_type: u32,
    pub datalen: u32,
    pub addr: MacAddr,
    pub ifidx: u8,
    pub bsscfgidx: u8,
}

impl EventMsg {
    pub fn new(event_code: EventCode, status: EventStatus) -> Self {
        Self {
            version: 2,
            flags: 0,
            event_code,
            status,
            reason: 0,
            auth_type: 0,
            datalen: 0,
            addr: [0; 6],
            ifidx: 0,
            bsscfgidx: 0,
        }
    }

    pub fn is_link_up(&self) -> bool {
        self.flags & EVENT_MSG_LINK != 0
    }
}

impl From<&EventMsgBe> for EventMsg {
    fn from(be: &EventMsgBe) -> Self {
        Self {
            version: be.version.get(),
            flags: be.flags.get(),
            event_code: EventCode(be.event_type.get()),
            status: EventStatus(be.status.get()),
            reason: be.reason.get(),
            auth_type: be.auth_type.get(),
            datalen: be.datalen.get(),
            addr: be.addr,
            ifidx: be.ifidx,
            bsscfgidx: be.bsscfgidx,
        }
    }
}

/// A firmware event with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareEvent {
    pub msg: EventMsg,
    pub data: Vec<u8>,
}

impl FirmwareEvent {
    pub fn new(msg: EventMsg, data: Vec<u8>) -> Self {
        Self { msg, data }
    }

    /// Parses a bus event: the big-endian header followed by `datalen` payload bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (header, body) = LayoutVerified::<_, EventMsgBe>::new_unaligned_from_prefix(bytes)
            .ok_or_else(|| {
                Error::MalformedEvent(format!("event too short: {} bytes", bytes.len()))
            })?;
        let msg = EventMsg::from(&*header);
        let datalen = msg.datalen as usize;
        if body.len() < datalen {
            return Err(Error::MalformedEvent(format!(
                "{:?} declares {} data bytes, {} present",
                msg.event_code,
                datalen,
                body.len()
            )));
        }
        Ok(Self { msg, data: body[..datalen].to_vec() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfAction {
    Add,
    Del,
    Change,
}

pub const IF_FLAG_NOIF: u8 = 0x01;

pub const IF_ROLE_STA: u8 = 0;
pub const IF_ROLE_AP: u8 = 1;

#[repr(C, packed)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy, Debug)]
struct IfEventRaw {
    ifidx: u8,
    action: u8,
    flags: u8,
    bsscfgidx: u8,
    role: u8,
}

/// Payload of an IF event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfEvent {
    pub ifidx: u8,
    pub action: IfAction,
    pub flags: u8,
    pub bsscfgidx: u8,
    pub role: u8,
}

impl IfEvent {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let (raw, _) = LayoutVerified::<_, IfEventRaw>::new_unaligned_from_prefix(data)
            .ok_or_else(|| Error::MalformedEvent("IF event too short".to_string()))?;
        let action = match raw.action {
            1 => IfAction::Add,
            2 => IfAction::Del,
            3 => IfAction::Change,
            other => {
                return Err(Error::MalformedEvent(format!("unknown IF action {}", other)));
            }
        };
        Ok(Self {
            ifidx: raw.ifidx,
            action,
            flags: raw.flags,
            bsscfgidx: raw.bsscfgidx,
            role: raw.role,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let action = match self.action {
            IfAction::Add => 1,
            IfAction::Del => 2,
            IfAction::Change => 3,
        };
        IfEventRaw {
            ifidx: self.ifidx,
            action,
            flags: self.flags,
            bsscfgidx: self.bsscfgidx,
            role: self.role,
        }
        .as_bytes()
        .to_vec()
    }
}
