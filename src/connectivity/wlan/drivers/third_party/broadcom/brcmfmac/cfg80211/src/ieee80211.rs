// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::mac::MacAddr,
    zerocopy::{
        byteorder::{LittleEndian, U16},
        AsBytes, FromBytes, Unaligned,
    },
};

#[repr(C)]
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct StatusCode(pub u16);

/// IEEE Std 802.11-2016, 9.4.1.9. Values at 256 and above are not defined by IEEE and only
/// travel between this driver and the SME.
impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    pub const REFUSED_REASON_UNSPECIFIED: Self = Self(1);
    pub const REFUSED_CAPABILITIES_MISMATCH: Self = Self(10);
    pub const DENIED_OTHER_REASON: Self = Self(12);
    pub const UNSUPPORTED_AUTH_ALGORITHM: Self = Self(13);
    pub const CHALLENGE_FAILURE: Self = Self(15);
    pub const REJECTED_SEQUENCE_TIMEOUT: Self = Self(16);
    pub const DENIED_NO_MORE_STAS: Self = Self(17);
    pub const REFUSED_TEMPORARILY: Self = Self(30);
    pub const INVALID_PARAMETERS: Self = Self(38);
    pub const INVALID_RSNE: Self = Self(72);
    pub const ANTI_CLOGGING_TOKEN_REQUIRED: Self = Self(76);
    pub const REJECTED_EMERGENCY_SERVICES_NOT_SUPPORTED: Self = Self(94);
    // Driver/SME private range.
    pub const JOIN_FAILURE: Self = Self(256);
    pub const SPURIOUS_DEAUTH_OR_DISASSOC: Self = Self(257);
    pub const CANCELED: Self = Self(258);
    pub const ESTABLISH_RSNA_FAILURE: Self = Self(259);
}

#[repr(C)]
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct ReasonCode(pub u16);

/// IEEE Std 802.11-2016, 9.4.1.7
impl ReasonCode {
    pub const UNSPECIFIED_REASON: Self = Self(1);
    pub const INVALID_AUTHENTICATION: Self = Self(2);
    pub const LEAVING_NETWORK_DEAUTH: Self = Self(3);
    pub const REASON_INACTIVITY: Self = Self(4);
    pub const NO_MORE_STAS: Self = Self(5);
    pub const INVALID_CLASS2FRAME: Self = Self(6);
    pub const INVALID_CLASS3FRAME: Self = Self(7);
    pub const LEAVING_NETWORK_DISASSOC: Self = Self(8);
    pub const NOT_AUTHENTICATED: Self = Self(9);
    pub const MIC_FAILURE: Self = Self(14);
    pub const FOURWAY_HANDSHAKE_TIMEOUT: Self = Self(15);
    pub const IEEE802_1_X_AUTH_FAILED: Self = Self(23);
    pub const STA_LEAVING: Self = Self(36);
    pub const TIMEOUT: Self = Self(39);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    OpenSystem,
    SharedKey,
    FastBssTransition,
    Sae,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BssType {
    Infrastructure,
    Independent,
    Mesh,
    Personal,
}

pub type Oui = [u8; 3];

pub const IEEE_OUI: Oui = [0x00, 0x0f, 0xac];
pub const MSFT_OUI: Oui = [0x00, 0x50, 0xf2];

/// Cipher suite types, IEEE Std 802.11-2016, 9.4.2.25.2, Table 9-131.
pub mod cipher {
    pub const USE_GROUP: u8 = 0;
    pub const WEP_40: u8 = 1;
    pub const TKIP: u8 = 2;
    pub const CCMP_128: u8 = 4;
    pub const WEP_104: u8 = 5;
    pub const BIP_CMAC_128: u8 = 6;
    pub const GCMP_128: u8 = 8;
    pub const GCMP_256: u8 = 9;
    pub const CCMP_256: u8 = 10;
}

/// AKM suite types, IEEE Std 802.11-2016, 9.4.2.25.3, Table 9-133.
pub mod akm {
    pub const EAP: u8 = 1;
    pub const PSK: u8 = 2;
    pub const FT_EAP: u8 = 3;
    pub const FT_PSK: u8 = 4;
    pub const EAP_SHA256: u8 = 5;
    pub const PSK_SHA256: u8 = 6;
    pub const SAE: u8 = 8;
    pub const FT_SAE: u8 = 9;
}

// IEEE Std 802.11-2016, 9.4.1.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthAlgorithmNumber(pub u16);

impl AuthAlgorithmNumber {
    pub const OPEN: Self = Self(0);
    pub const SHARED_KEY: Self = Self(1);
    pub const FAST_BSS_TRANSITION: Self = Self(2);
    pub const SAE: Self = Self(3);
}

// IEEE Std 802.11-2016, 9.3.3.2
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
pub struct MgmtHdr {
    pub frame_ctrl: U16<LittleEndian>,
    pub duration: U16<LittleEndian>,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: U16<LittleEndian>,
}

/// Frame control of an authentication frame: management type, authentication subtype.
pub const FRAME_CTRL_AUTH: u16 = 0x00b0;

// IEEE Std 802.11-2016, 9.3.3.12
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
pub struct AuthHdr {
    pub auth_alg_num: U16<LittleEndian>,
    pub auth_txn_seq_num: U16<LittleEndian>,
    pub status_code: U16<LittleEndian>,
}
