// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::ieee80211::{akm, cipher, Oui, IEEE_OUI, MSFT_OUI},
    thiserror::Error,
};

pub const SSID_ID: u8 = 0;
pub const RSNE_ID: u8 = 48;
pub const VENDOR_SPECIFIC_ID: u8 = 221;

pub const MAX_SSID_LEN: usize = 32;
const IE_HEADER_LEN: usize = 2;
const WPA_VENDOR_TYPE: u8 = 1;
const SUITE_SELECTOR_LEN: usize = 4;

pub const RSN_CAP_MFP_REQUIRED: u16 = 1 << 6;
pub const RSN_CAP_MFP_CAPABLE: u16 = 1 << 7;

/// Iterates over the (id, body) pairs of an IE chain. Iteration stops at the first IE whose
/// declared length runs past the end of the buffer.
pub struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.len() < IE_HEADER_LEN {
            return None;
        }
        let id = self.bytes[0];
        let body_len = self.bytes[1] as usize;
        if self.bytes.len() < IE_HEADER_LEN + body_len {
            return None;
        }
        let body = &self.bytes[IE_HEADER_LEN..IE_HEADER_LEN + body_len];
        self.bytes = &self.bytes[IE_HEADER_LEN + body_len..];
        Some((id, body))
    }
}

/// Returns true if the buffer is an exact concatenation of well-formed IEs.
pub fn is_valid_ie_buffer(bytes: &[u8]) -> bool {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        if remaining.len() < IE_HEADER_LEN {
            return false;
        }
        let body_len = remaining[1] as usize;
        if remaining.len() < IE_HEADER_LEN + body_len {
            return false;
        }
        remaining = &remaining[IE_HEADER_LEN + body_len..];
    }
    true
}

/// Returns the SSID carried by the IEs. A missing SSID IE and an over-long one both read as
/// `None`.
pub fn find_ssid(ies: &[u8]) -> Option<&[u8]> {
    Reader::new(ies)
        .find(|(id, _)| *id == SSID_ID)
        .map(|(_, body)| body)
        .filter(|ssid| ssid.len() <= MAX_SSID_LEN)
}

pub fn find_rsne(ies: &[u8]) -> Option<&[u8]> {
    Reader::new(ies).find(|(id, _)| *id == RSNE_ID).map(|(_, body)| body)
}

pub fn find_wpa_ie(ies: &[u8]) -> Option<&[u8]> {
    Reader::new(ies).find(|(id, body)| is_wpa_vendor_ie(*id, body)).map(|(_, body)| body)
}

fn is_wpa_vendor_ie(id: u8, body: &[u8]) -> bool {
    id == VENDOR_SPECIFIC_ID && body.len() >= 4 && body[..3] == MSFT_OUI && body[3] == WPA_VENDOR_TYPE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityIeKind {
    Wpa1,
    Rsn,
}

/// The parts of a WPA or RSN element the firmware needs to be configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIe {
    pub kind: SecurityIeKind,
    pub group_cipher: u8,
    pub pairwise_ciphers: Vec<u8>,
    pub akms: Vec<u8>,
    pub rsn_capabilities: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityIeError {
    #[error("security IE is truncated")]
    Truncated,
    #[error("unexpected element id {0}")]
    UnexpectedId(u8),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    #[error("unexpected OUI {0:02x?}")]
    UnexpectedOui(Oui),
    #[error("unsupported cipher suite {0}")]
    UnsupportedCipher(u8),
    #[error("unsupported AKM suite {0}")]
    UnsupportedAkm(u8),
    #[error("no pairwise cipher or AKM suite")]
    EmptySuiteList,
}

struct ByteCursor<'a>(&'a [u8]);

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SecurityIeError> {
        if self.0.len() < n {
            return Err(SecurityIeError::Truncated);
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn le_u16(&mut self) -> Result<u16, SecurityIeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn suite(&mut self, expected_oui: Oui) -> Result<u8, SecurityIeError> {
        let b = self.take(SUITE_SELECTOR_LEN)?;
        let oui = [b[0], b[1], b[2]];
        if oui != expected_oui {
            return Err(SecurityIeError::UnexpectedOui(oui));
        }
        Ok(b[3])
    }

    fn suite_list(&mut self, expected_oui: Oui) -> Result<Vec<u8>, SecurityIeError> {
        let count = self.le_u16()? as usize;
        (0..count).map(|_| self.suite(expected_oui)).collect()
    }
}

fn check_cipher(suite: u8) -> Result<u8, SecurityIeError> {
    match suite {
        cipher::USE_GROUP
        | cipher::WEP_40
        | cipher::TKIP
        | cipher::CCMP_128
        | cipher::WEP_104
        | cipher::GCMP_128
        | cipher::GCMP_256
        | cipher::CCMP_256 => Ok(suite),
        other => Err(SecurityIeError::UnsupportedCipher(other)),
    }
}

fn check_akm(suite: u8) -> Result<u8, SecurityIeError> {
    match suite {
        akm::EAP
        | akm::PSK
        | akm::FT_EAP
        | akm::FT_PSK
        | akm::EAP_SHA256
        | akm::PSK_SHA256
        | akm::SAE
        | akm::FT_SAE => Ok(suite),
        other => Err(SecurityIeError::UnsupportedAkm(other)),
    }
}

/// Parses a complete security element (header included), either an RSNE or a WPA1 vendor
/// element.
pub fn parse_security_ie(bytes: &[u8]) -> Result<SecurityIe, SecurityIeError> {
    let (id, body) = Reader::new(bytes).next().ok_or(SecurityIeError::Truncated)?;
    match id {
        RSNE_ID => parse_rsne_body(body),
        VENDOR_SPECIFIC_ID if is_wpa_vendor_ie(id, body) => parse_wpa_body(&body[4..]),
        other => Err(SecurityIeError::UnexpectedId(other)),
    }
}

fn parse_rsne_body(body: &[u8]) -> Result<SecurityIe, SecurityIeError> {
    let mut cursor = ByteCursor(body);
    let version = cursor.le_u16()?;
    if version != 1 {
        return Err(SecurityIeError::UnsupportedVersion(version));
    }
    let group_cipher = check_cipher(cursor.suite(IEEE_OUI)?)?;
    let pairwise_ciphers =
        cursor.suite_list(IEEE_OUI)?.into_iter().map(check_cipher).collect::<Result<Vec<_>, _>>()?;
    let akms =
        cursor.suite_list(IEEE_OUI)?.into_iter().map(check_akm).collect::<Result<Vec<_>, _>>()?;
    let rsn_capabilities = if cursor.is_empty() { 0 } else { cursor.le_u16()? };
    if pairwise_ciphers.is_empty() || akms.is_empty() {
        return Err(SecurityIeError::EmptySuiteList);
    }
    Ok(SecurityIe {
        kind: SecurityIeKind::Rsn,
        group_cipher,
        pairwise_ciphers,
        akms,
        rsn_capabilities,
    })
}

fn parse_wpa_body(body: &[u8]) -> Result<SecurityIe, SecurityIeError> {
    let mut cursor = ByteCursor(body);
    let version = cursor.le_u16()?;
    if version != 1 {
        return Err(SecurityIeError::UnsupportedVersion(version));
    }
    let group_cipher = check_cipher(cursor.suite(MSFT_OUI)?)?;
    let pairwise_ciphers =
        cursor.suite_list(MSFT_OUI)?.into_iter().map(check_cipher).collect::<Result<Vec<_>, _>>()?;
    let akms =
        cursor.suite_list(MSFT_OUI)?.into_iter().map(check_akm).collect::<Result<Vec<_>, _>>()?;
    if pairwise_ciphers.is_empty() || akms.is_empty() {
        return Err(SecurityIeError::EmptySuiteList);
    }
    Ok(SecurityIe {
        kind: SecurityIeKind::Wpa1,
        group_cipher,
        pairwise_ciphers,
        akms,
        rsn_capabilities: 0,
    })
}

#[cfg(test)]
pub mod fake_ies {
    use super::*;

    pub fn ssid_ie(ssid: &[u8]) -> Vec<u8> {
        let mut ie = vec![SSID_ID, ssid.len() as u8];
        ie.extend_from_slice(ssid);
        ie
    }

    /// WPA2 PSK with CCMP-128 for both group and pairwise traffic.
    pub fn wpa2_psk_ccmp_rsne() -> Vec<u8> {
        vec![
            0x30, 0x14, // Element header
            0x01, 0x00, // Version
            0x00, 0x0f, 0xac, 0x04, // Group data cipher suite: CCMP-128
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, // Pairwise cipher suites: CCMP-128
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x02, // AKM suites: PSK
            0x00, 0x00, // RSN capabilities
        ]
    }

    /// WPA3 SAE with management frame protection required.
    pub fn wpa3_sae_rsne() -> Vec<u8> {
        vec![
            0x30, 0x14, // Element header
            0x01, 0x00, // Version
            0x00, 0x0f, 0xac, 0x04, // Group data cipher suite: CCMP-128
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, // Pairwise cipher suites: CCMP-128
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x08, // AKM suites: SAE
            0xc0, 0x00, // RSN capabilities: MFPR | MFPC
        ]
    }

    pub fn wpa1_psk_tkip_ie() -> Vec<u8> {
        vec![
            0xdd, 0x16, // Element header
            0x00, 0x50, 0xf2, 0x01, // MSFT OUI, WPA type
            0x01, 0x00, // Version
            0x00, 0x50, 0xf2, 0x02, // Multicast cipher: TKIP
            0x01, 0x00, 0x00, 0x50, 0xf2, 0x02, // Unicast cipher list: TKIP
            0x01, 0x00, 0x00, 0x50, 0xf2, 0x02, // AKM list: PSK
        ]
    }
}
