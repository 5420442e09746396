// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub type MacAddr = [u8; 6];

pub const ZERO_MAC_ADDR: MacAddr = [0; 6];
pub const BCAST_MAC_ADDR: MacAddr = [0xff; 6];

pub trait MacFmt {
    fn to_mac_str(&self) -> String;
}

impl MacFmt for MacAddr {
    fn to_mac_str(&self) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5]
        )
    }
}
