// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! d11ac chanspec encoding.

const CH_MASK: u16 = 0x00ff;
const SB_MASK: u16 = 0x0700;
const SB_SHIFT: u16 = 8;
const BW_MASK: u16 = 0x3800;
const BW_20: u16 = 0x1000;
const BW_40: u16 = 0x1800;
const BW_80: u16 = 0x2000;
const BW_160: u16 = 0x2800;
const BND_MASK: u16 = 0xc000;
const BND_2G: u16 = 0x0000;
const BND_5G: u16 = 0xc000;

// Lower and upper 20MHz sideband of a 40MHz channel.
const SB_L: u16 = 0;
const SB_U: u16 = 1;

const CENTER_80: [u8; 6] = [42, 58, 106, 122, 138, 155];
const CENTER_160: [u8; 2] = [50, 114];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cbw {
    Cbw20,
    /// Secondary channel above the primary.
    Cbw40,
    Cbw40Below,
    Cbw80,
    Cbw160,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub primary: u8,
    pub cbw: Cbw,
}

impl Channel {
    pub fn new(primary: u8, cbw: Cbw) -> Self {
        Self { primary, cbw }
    }

    pub fn is_2ghz(&self) -> bool {
        self.primary <= 14
    }
}

pub fn decode(chanspec: u16) -> Option<Channel> {
    let center = (chanspec & CH_MASK) as u8;
    let sb = (chanspec & SB_MASK) >> SB_SHIFT;
    let band = chanspec & BND_MASK;
    if band != BND_2G && band != BND_5G {
        return None;
    }
    let channel = match chanspec & BW_MASK {
        BW_20 => Channel::new(center, Cbw::Cbw20),
        BW_40 => match sb {
            SB_L => Channel::new(center.checked_sub(2)?, Cbw::Cbw40),
            SB_U => Channel::new(center.checked_add(2)?, Cbw::Cbw40Below),
            _ => return None,
        },
        BW_80 if sb < 4 => Channel::new((center.checked_sub(6)?) + (sb as u8) * 4, Cbw::Cbw80),
        BW_160 if sb < 8 => Channel::new((center.checked_sub(14)?) + (sb as u8) * 4, Cbw::Cbw160),
        _ => return None,
    };
    Some(channel)
}

pub fn encode(channel: &Channel) -> Option<u16> {
    let band = if channel.is_2ghz() { BND_2G } else { BND_5G };
    let primary = channel.primary;
    let (center, sb, bw) = match channel.cbw {
        Cbw::Cbw20 => (primary, 0, BW_20),
        Cbw::Cbw40 => (primary.checked_add(2)?, SB_L, BW_40),
        Cbw::Cbw40Below => (primary.checked_sub(2)?, SB_U, BW_40),
        Cbw::Cbw80 => {
            let center = find_center(&CENTER_80[..], primary, 6)?;
            (center, ((primary - (center - 6)) / 4) as u16, BW_80)
        }
        Cbw::Cbw160 => {
            let center = find_center(&CENTER_160[..], primary, 14)?;
            (center, ((primary - (center - 14)) / 4) as u16, BW_160)
        }
    };
    Some(center as u16 | (sb << SB_SHIFT) | bw | band)
}

fn find_center(centers: &[u8], primary: u8, half_span: u8) -> Option<u8> {
    centers.iter().copied().find(|c| {
        primary >= c - half_span && primary <= c + half_span && (primary + half_span - c) % 4 == 0
    })
}
