// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// The distinct failure modes the engine can surface. Kept separate from
/// `Error` so that callers can match on `err.kind()` without string-sniffing
/// a message, while `Error` itself carries the human-readable context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    InvalidPattern,
    UnmergedIndex,
    LockHeld,
    EmptyCheckout,
    WouldLoseChanges,
    ConfigWriteFailed,
    IoFailure,
    UnsupportedConePattern,
}

impl Kind {
    /// Whether this Kind can locally recover by falling back and continuing,
    /// rather than requiring the caller to abort and roll back.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Kind::UnsupportedConePattern)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: String,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Error {
        Error {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn invalid_pattern(message: impl Into<String>) -> Error {
        Error::new(Kind::InvalidPattern, message)
    }

    pub fn unmerged_index() -> Error {
        Error::new(
            Kind::UnmergedIndex,
            "cannot reconcile the working tree: the index has unmerged entries",
        )
    }

    pub fn lock_held(path: impl fmt::Display) -> Error {
        Error::new(Kind::LockHeld, format!("File exists: {path}"))
    }

    pub fn empty_checkout() -> Error {
        Error::new(
            Kind::EmptyCheckout,
            "Sparse checkout leaves no entry in the working tree",
        )
    }

    pub fn would_lose_changes(path: impl fmt::Display) -> Error {
        Error::new(
            Kind::WouldLoseChanges,
            format!("Cannot update sparse checkout: {path} has local modifications"),
        )
    }

    pub fn config_write_failed(message: impl Into<String>) -> Error {
        Error::new(Kind::ConfigWriteFailed, message)
    }

    pub fn io_failure(message: impl Into<String>) -> Error {
        Error::new(Kind::IoFailure, message)
    }

    pub fn unsupported_cone_pattern(pattern: impl fmt::Display) -> Error {
        Error::new(
            Kind::UnsupportedConePattern,
            format!("unrecognized negative pattern: {pattern}"),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.message, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::io_failure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
