// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::vif::MacRole,
    log::error,
    std::fmt,
    thiserror::Error,
};

/// A zircon-style status code. Negative values are errors.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    pub const OK: Self = Self(0);
    pub const INTERNAL: Self = Self(-1);
    pub const NOT_SUPPORTED: Self = Self(-2);
    pub const NO_RESOURCES: Self = Self(-3);
    pub const INVALID_ARGS: Self = Self(-10);
    pub const BUFFER_TOO_SMALL: Self = Self(-15);
    pub const BAD_STATE: Self = Self(-20);
    pub const TIMED_OUT: Self = Self(-21);
    pub const SHOULD_WAIT: Self = Self(-22);
    pub const NOT_FOUND: Self = Self(-25);
    pub const UNAVAILABLE: Self = Self(-28);
    pub const IO: Self = Self(-40);

    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> i32 {
        self.0
    }

    pub fn ok(raw: i32) -> Result<(), Status> {
        if raw == Self::OK.0 {
            Ok(())
        } else {
            Err(Self(raw))
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::OK => "OK",
            Self::INTERNAL => "INTERNAL",
            Self::NOT_SUPPORTED => "NOT_SUPPORTED",
            Self::NO_RESOURCES => "NO_RESOURCES",
            Self::INVALID_ARGS => "INVALID_ARGS",
            Self::BUFFER_TOO_SMALL => "BUFFER_TOO_SMALL",
            Self::BAD_STATE => "BAD_STATE",
            Self::TIMED_OUT => "TIMED_OUT",
            Self::SHOULD_WAIT => "SHOULD_WAIT",
            Self::NOT_FOUND => "NOT_FOUND",
            Self::UNAVAILABLE => "UNAVAILABLE",
            Self::IO => "IO",
            _ => return None,
        })
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(_) if *self == Self::OK => write!(f, "ZX_OK"),
            Some(name) => write!(f, "ZX_ERR_{}", name),
            None => write!(f, "Status({})", self.0),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A firmware command that did not complete. `fw_err` is the firmware's own (bcme) error code,
/// zero when the failure happened in the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{status} (fw err {fw_err})")]
pub struct FwError {
    pub status: Status,
    pub fw_err: i32,
}

impl FwError {
    pub fn new(status: Status) -> Self {
        Self { status, fw_err: 0 }
    }

    pub fn with_fw_err(status: Status, fw_err: i32) -> Self {
        Self { status, fw_err }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("scanning unavailable: {0}")]
    ScanUnavailable(String),
    #[error("should wait: {0}")]
    ShouldWait(&'static str),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("bad state: {0}")]
    BadState(String),
    #[error("no {0:?} interface")]
    NoInterface(MacRole),
    #[error("firmware command '{cmd}' failed: {source}")]
    Firmware {
        cmd: &'static str,
        #[source]
        source: FwError,
    },
    #[error("malformed firmware event: {0}")]
    MalformedEvent(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn firmware(cmd: &'static str, source: FwError) -> Self {
        Error::Firmware { cmd, source }
    }

    pub fn status(&self) -> Status {
        match self {
            Error::ScanUnavailable(_) | Error::ShouldWait(_) => Status::SHOULD_WAIT,
            Error::InvalidArgs(_) | Error::Config(_) => Status::INVALID_ARGS,
            Error::BadState(_) => Status::BAD_STATE,
            Error::NoInterface(_) => Status::NOT_FOUND,
            Error::Firmware { source, .. } => source.status,
            Error::MalformedEvent(_) => Status::INVALID_ARGS,
            Error::Internal(_) => Status::INTERNAL,
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        e.status()
    }
}

pub trait ResultExt {
    /// Returns OK if Self is Ok, otherwise logs the error and turns it into the corresponding
    /// status.
    fn into_status(self) -> Status;
}

impl ResultExt for Result<(), Error> {
    fn into_status(self) -> Status {
        match self {
            Ok(()) => Status::OK,
            Err(e) => {
                error!("{}", e);
                e.status()
            }
        }
    }
}
