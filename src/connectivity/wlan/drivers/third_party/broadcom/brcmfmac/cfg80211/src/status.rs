// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The three status bit vectors shared by the engines.
//!
//! Bits are flipped with atomic read-modify-write operations only. A `test_and_clear` that
//! observes the bit set is what entitles a caller to complete the operation the bit tracks.

use {
    bitflags::bitflags,
    std::{
        fmt,
        marker::PhantomData,
        sync::atomic::{AtomicU32, Ordering},
    },
};

bitflags! {
    /// Per-interface connection state. The connection bits are not mutually exclusive: ROAMING
    /// is set while CONNECTED still is, and DISCONNECTING may briefly overlap ROAMING.
    #[derive(Default)]
    pub struct SmeState: u32 {
        const READY              = 1 << 0;
        const CONNECTING         = 1 << 1;
        const CONNECTED          = 1 << 2;
        const ROAMING            = 1 << 3;
        const DISCONNECTING      = 1 << 4;
        const AP_CREATED         = 1 << 5;
        const AP_START_PENDING   = 1 << 6;
        const SAE_AUTHENTICATING = 1 << 7;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct ScanStatus: u32 {
        const BUSY     = 1 << 0;
        const ABORT    = 1 << 1;
        const SUPPRESS = 1 << 2;
    }
}

bitflags! {
    /// Disconnect requests from the SME that still await firmware confirmation.
    #[derive(Default)]
    pub struct DisconnectRequest: u32 {
        const DEAUTH_CURRENT_BSS = 1 << 0;
        const DEAUTH_TARGET_BSS  = 1 << 1;
        const DISASSOC           = 1 << 2;
    }
}

pub trait StatusBits: Copy + fmt::Debug {
    fn to_bits(self) -> u32;
    fn from_raw_bits(bits: u32) -> Self;
}

macro_rules! impl_status_bits {
    ($($flags:ty),*) => {
        $(
            impl StatusBits for $flags {
                fn to_bits(self) -> u32 {
                    self.bits()
                }

                fn from_raw_bits(bits: u32) -> Self {
                    Self::from_bits_truncate(bits)
                }
            }
        )*
    };
}

impl_status_bits!(SmeState, ScanStatus, DisconnectRequest);

pub struct AtomicStatus<F> {
    bits: AtomicU32,
    _flags: PhantomData<F>,
}

impl<F: StatusBits> AtomicStatus<F> {
    pub fn new(initial: F) -> Self {
        Self { bits: AtomicU32::new(initial.to_bits()), _flags: PhantomData }
    }

    pub fn load(&self) -> F {
        F::from_raw_bits(self.bits.load(Ordering::SeqCst))
    }

    /// True if every bit of `flags` is set.
    pub fn contains(&self, flags: F) -> bool {
        let bits = flags.to_bits();
        self.bits.load(Ordering::SeqCst) & bits == bits
    }

    /// True if any bit of `flags` is set.
    pub fn intersects(&self, flags: F) -> bool {
        self.bits.load(Ordering::SeqCst) & flags.to_bits() != 0
    }

    pub fn set(&self, flags: F) {
        self.bits.fetch_or(flags.to_bits(), Ordering::SeqCst);
    }

    pub fn clear(&self, flags: F) {
        self.bits.fetch_and(!flags.to_bits(), Ordering::SeqCst);
    }

    /// Sets `flags` and returns whether any of them was already set.
    pub fn test_and_set(&self, flags: F) -> bool {
        let bits = flags.to_bits();
        self.bits.fetch_or(bits, Ordering::SeqCst) & bits != 0
    }

    /// Clears `flags` and returns whether any of them was set.
    pub fn test_and_clear(&self, flags: F) -> bool {
        let bits = flags.to_bits();
        self.bits.fetch_and(!bits, Ordering::SeqCst) & bits != 0
    }

    /// Clears every bit, returning what was set.
    pub fn take(&self) -> F {
        F::from_raw_bits(self.bits.swap(0, Ordering::SeqCst))
    }
}

impl<F: StatusBits + Default> Default for AtomicStatus<F> {
    fn default() -> Self {
        Self::new(F::default())
    }
}

impl<F: StatusBits> fmt::Debug for AtomicStatus<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.load())
    }
}
