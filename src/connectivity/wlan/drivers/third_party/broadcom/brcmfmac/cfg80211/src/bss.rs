// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        chanspec,
        error::Error,
        ie::{self, MAX_SSID_LEN},
        ieee80211::BssType,
        mac::{MacAddr, MacFmt},
        sme::BssDescription,
    },
    zerocopy::{
        byteorder::{LittleEndian, I16, U16, U32},
        AsBytes, FromBytes, LayoutVerified, Unaligned,
    },
};

const CAP_ESS: u16 = 1 << 0;
const CAP_IBSS: u16 = 1 << 1;

/// BSS info as reported by firmware, version 109. Little-endian.
#[repr(C, packed)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
pub struct BssInfoLe {
    pub version: U32<LittleEndian>,
    /// Length of this structure including trailing IEs.
    pub length: U32<LittleEndian>,
    pub bssid: MacAddr,
    pub beacon_period: U16<LittleEndian>,
    pub capability: U16<LittleEndian>,
    pub ssid_len: u8,
    pub ssid: [u8; MAX_SSID_LEN],
    pub rateset_count: U32<LittleEndian>,
    pub rates: [u8; 16],
    pub chanspec: U16<LittleEndian>,
    pub atim_window: U16<LittleEndian>,
    pub dtim_period: u8,
    pub rssi: I16<LittleEndian>,
    pub phy_noise: i8,
    pub n_cap: u8,
    pub nbss_cap: U32<LittleEndian>,
    pub ctl_ch: u8,
    pub reserved32: U32<LittleEndian>,
    pub flags: u8,
    pub reserved: [u8; 3],
    pub basic_mcs: [u8; 16],
    /// Offset of the IEs from the start of this structure.
    pub ie_offset: U16<LittleEndian>,
    pub ie_length: U32<LittleEndian>,
    pub snr: I16<LittleEndian>,
}

pub const BSS_INFO_VERSION: u32 = 109;

/// Splits a buffer holding one BSS info record off the front of `buf`, returning the record
/// and whatever follows it.
pub fn split_bss_info(buf: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let (header, _) = LayoutVerified::<_, BssInfoLe>::new_unaligned_from_prefix(buf)
        .ok_or_else(|| Error::MalformedEvent(format!("bss info too short: {}", buf.len())))?;
    let length = header.length.get() as usize;
    if length < std::mem::size_of::<BssInfoLe>() || length > buf.len() {
        return Err(Error::MalformedEvent(format!(
            "bss info length {} out of range (buffer {})",
            length,
            buf.len()
        )));
    }
    Ok(buf.split_at(length))
}

pub fn parse_bss_info(buf: &[u8]) -> Result<BssDescription, Error> {
    let (record, _) = split_bss_info(buf)?;
    let (header, _) = LayoutVerified::<_, BssInfoLe>::new_unaligned_from_prefix(record)
        .ok_or_else(|| Error::MalformedEvent("bss info too short".to_string()))?;

    let ie_offset = header.ie_offset.get() as usize;
    let ie_length = header.ie_length.get() as usize;
    let ies = ie_offset
        .checked_add(ie_length)
        .and_then(|end| record.get(ie_offset..end))
        .ok_or_else(|| {
            Error::MalformedEvent(format!(
                "IEs at {}+{} overrun bss info of {} bytes",
                ie_offset,
                ie_length,
                record.len()
            ))
        })?;
    if !ie::is_valid_ie_buffer(ies) {
        return Err(Error::MalformedEvent(format!(
            "invalid IE buffer for {}",
            header.bssid.to_mac_str()
        )));
    }

    let ssid_len = header.ssid_len as usize;
    if ssid_len > MAX_SSID_LEN {
        return Err(Error::MalformedEvent(format!("SSID length {}", ssid_len)));
    }
    let chanspec = header.chanspec.get();
    let channel = chanspec::decode(chanspec)
        .ok_or_else(|| Error::MalformedEvent(format!("bad chanspec {:#06x}", chanspec)))?;

    let capability = header.capability.get();
    let bss_type = if capability & CAP_ESS != 0 {
        BssType::Infrastructure
    } else if capability & CAP_IBSS != 0 {
        BssType::Independent
    } else {
        BssType::Personal
    };

    Ok(BssDescription {
        bssid: header.bssid,
        ssid: header.ssid[..ssid_len].to_vec(),
        bss_type,
        beacon_period: header.beacon_period.get(),
        capability_info: capability,
        ies: ies.to_vec(),
        channel,
        rssi_dbm: header.rssi.get().max(i8::MIN as i16).min(i8::MAX as i16) as i8,
        snr_db: header.snr.get().max(i8::MIN as i16).min(i8::MAX as i16) as i8,
    })
}

#[cfg(test)]
pub fn fake_bss_info(bssid: MacAddr, ssid: &[u8], chanspec: u16, ies: &[u8]) -> Vec<u8> {
    let mut header = BssInfoLe::new_zeroed();
    let header_len = std::mem::size_of::<BssInfoLe>();
    header.version = U32::new(BSS_INFO_VERSION);
    header.length = U32::new((header_len + ies.len()) as u32);
    header.bssid = bssid;
    header.beacon_period = U16::new(100);
    header.capability = U16::new(CAP_ESS);
    header.ssid_len = ssid.len() as u8;
    header.ssid[..ssid.len()].copy_from_slice(ssid);
    header.chanspec = U16::new(chanspec);
    header.rssi = I16::new(-40);
    header.snr = I16::new(30);
    header.ie_offset = U16::new(header_len as u16);
    header.ie_length = U32::new(ies.len() as u32);
    let mut buf = header.as_bytes().to_vec();
    buf.extend_from_slice(ies);
    buf
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            chanspec::{Cbw, Channel},
            ie::fake_ies,
        },
        matches::assert_matches,
    };

    const BSSID: MacAddr = [1, 2, 3, 4, 5, 6];

    #[test]
    fn parse_valid_bss_info() {
        let mut ies = fake_ies::ssid_ie(b"fuchsia");
        ies.extend(fake_ies::wpa2_psk_ccmp_rsne());
        let buf = fake_bss_info(BSSID, b"fuchsia", 0xd024, &ies[..]);
        let bss = parse_bss_info(&buf[..]).expect("valid bss info");
        assert_eq!(bss.bssid, BSSID);
        assert_eq!(bss.ssid, b"fuchsia".to_vec());
        assert_eq!(bss.bss_type, BssType::Infrastructure);
        assert_eq!(bss.channel, Channel::new(36, Cbw::Cbw20));
        assert_eq!(bss.ies, ies);
        assert_eq!(bss.rssi_dbm, -40);
        assert_eq!(bss.snr_db, 30);
    }

    #[test]
    fn reject_truncated_ies() {
        let mut buf = fake_bss_info(BSSID, b"foo", 0x1006, &[0, 5, b'f', b'o', b'o']);
        assert_matches!(parse_bss_info(&buf[..]), Err(Error::MalformedEvent(_)));

        // Declared length past the end of the buffer.
        buf.truncate(buf.len() - 1);
        assert_matches!(split_bss_info(&buf[..]), Err(Error::MalformedEvent(_)));
    }

    #[test]
    fn reject_bad_chanspec() {
        let buf = fake_bss_info(BSSID, b"foo", 0x4006, &[]);
        assert_matches!(parse_bss_info(&buf[..]), Err(Error::MalformedEvent(_)));
    }

    #[test]
    fn split_leaves_remainder() {
        let mut buf = fake_bss_info(BSSID, b"foo", 0x1006, &[]);
        let first_len = buf.len();
        buf.extend(fake_bss_info([6; 6], b"bar", 0x1001, &[]));
        let (first, rest) = split_bss_info(&buf[..]).expect("valid record");
        assert_eq!(first.len(), first_len);
        assert_eq!(parse_bss_info(rest).expect("valid record").bssid, [6; 6]);
    }
}
