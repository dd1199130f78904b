//! Stable error codes for the Dicey protocol.
//!
//! Mirrors `include/dicey/core/errors.h` / `src/errors.c` from the reference
//! `dicey` C library: every error is a stable numeric code in the signed
//! 16-bit range, grouped by class, with a PascalCase name and a short
//! message. Low-level codecs and the registry never log or abort on error —
//! they always return a `DiceyError` and let the caller decide.

use thiserror::Error;

/// A single error definition: the numeric code, its PascalCase name, and a
/// human-readable message. Equivalent to `struct dicey_error_def`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDef {
    pub code: i16,
    pub name: &'static str,
    pub message: &'static str,
}

/// Errors that can occur anywhere in the wire codec, type system, registry,
/// or client/server runtime.
///
/// Categories follow spec §7: transient, input, semantic, capability,
/// resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiceyError {
    // -- transient --
    #[error("not enough data")]
    Again,
    #[error("operation timed out")]
    TimedOut,
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation already in progress")]
    Already,

    // -- input --
    #[error("invalid argument")]
    Inval,
    #[error("bad message")]
    BadMsg,
    #[error("overflow")]
    Overflow,
    #[error("path too long")]
    PathTooLong,
    #[error("tuple too long")]
    TupleTooLong,
    #[error("array too long")]
    ArrayTooLong,

    // -- semantic --
    #[error("value type mismatch")]
    ValueTypeMismatch,
    #[error("builder type mismatch")]
    BuilderTypeMismatch,
    #[error("path not found")]
    PathNotFound,
    #[error("trait not found")]
    TraitNotFound,
    #[error("element not found")]
    ElementNotFound,
    #[error("path is not an alias")]
    PathNotAlias,
    #[error("no data available")]
    NoData,

    // -- capability --
    #[error("operation not supported")]
    NotSupported,
    #[error("client is too old")]
    ClientTooOld,
    #[error("server is too old")]
    ServerTooOld,

    // -- resource --
    #[error("out of memory")]
    NoMem,
    #[error("connection refused")]
    ConnRefused,
    #[error("unknown transport error: {0}")]
    UvUnknown(String),
}

impl DiceyError {
    /// The stable numeric code for this error, matching the original
    /// library's `enum dicey_error` values (encoded `-(class << 8 | index)`).
    pub fn code(&self) -> i16 {
        match self {
            DiceyError::Again => -0x0101,
            DiceyError::NoMem => -0x0102,
            DiceyError::Inval => -0x0103,
            DiceyError::NoData => -0x0104,
            DiceyError::BadMsg => -0x0105,
            DiceyError::Overflow => -0x0106,
            DiceyError::ConnRefused => -0x0107,
            DiceyError::TimedOut => -0x0108,
            DiceyError::Cancelled => -0x0109,
            DiceyError::Already => -0x010A,

            DiceyError::PathTooLong => -0x020B,
            DiceyError::TupleTooLong => -0x020C,
            DiceyError::ArrayTooLong => -0x020D,

            DiceyError::BuilderTypeMismatch => -0x030A,
            DiceyError::ValueTypeMismatch => -0x030E,
            DiceyError::PathNotFound => -0x0320,
            DiceyError::TraitNotFound => -0x0321,
            DiceyError::ElementNotFound => -0x0322,
            DiceyError::PathNotAlias => -0x0323,

            DiceyError::NotSupported => -0x040F,
            DiceyError::ClientTooOld => -0x0410,
            DiceyError::ServerTooOld => -0x0411,

            DiceyError::UvUnknown(_) => -0x0512,
        }
    }

    /// The PascalCase name of this error, matching `dicey_error_name`.
    pub fn name(&self) -> &'static str {
        match self {
            DiceyError::Again => "TryAgain",
            DiceyError::NoMem => "OutOfMemory",
            DiceyError::Inval => "InvalidData",
            DiceyError::NoData => "NoDataAvailable",
            DiceyError::BadMsg => "BadMessage",
            DiceyError::Overflow => "Overflow",
            DiceyError::ConnRefused => "ConnectionRefused",
            DiceyError::TimedOut => "TimedOut",
            DiceyError::Cancelled => "Cancelled",
            DiceyError::Already => "AlreadyInProgress",
            DiceyError::PathTooLong => "PathTooLong",
            DiceyError::TupleTooLong => "TupleTooLong",
            DiceyError::ArrayTooLong => "ArrayTooLong",
            DiceyError::BuilderTypeMismatch => "BuilderTypeMismatch",
            DiceyError::ValueTypeMismatch => "ValueTypeMismatch",
            DiceyError::PathNotFound => "PathNotFound",
            DiceyError::TraitNotFound => "TraitNotFound",
            DiceyError::ElementNotFound => "ElementNotFound",
            DiceyError::PathNotAlias => "PathNotAlias",
            DiceyError::NotSupported => "NotSupported",
            DiceyError::ClientTooOld => "ClientTooOld",
            DiceyError::ServerTooOld => "ServerTooOld",
            DiceyError::UvUnknown(_) => "UnknownTransportError",
        }
    }

    /// Returns the static table of every error definition, sorted by code,
    /// matching `dicey_error_infos`. `UvUnknown` carries a dynamic message
    /// so it is represented here with a generic placeholder.
    pub fn info_table() -> &'static [ErrorDef] {
        &[
            ErrorDef { code: -0x010A, name: "AlreadyInProgress", message: "operation already in progress" },
            ErrorDef { code: -0x0109, name: "Cancelled", message: "operation cancelled" },
            ErrorDef { code: -0x0108, name: "TimedOut", message: "operation timed out" },
            ErrorDef { code: -0x0107, name: "ConnectionRefused", message: "connection refused" },
            ErrorDef { code: -0x0106, name: "Overflow", message: "overflow" },
            ErrorDef { code: -0x0105, name: "BadMessage", message: "bad message" },
            ErrorDef { code: -0x0104, name: "NoDataAvailable", message: "no data available" },
            ErrorDef { code: -0x0103, name: "InvalidData", message: "invalid argument" },
            ErrorDef { code: -0x0102, name: "OutOfMemory", message: "out of memory" },
            ErrorDef { code: -0x0101, name: "TryAgain", message: "not enough data" },
            ErrorDef { code: -0x020D, name: "ArrayTooLong", message: "array too long" },
            ErrorDef { code: -0x020C, name: "TupleTooLong", message: "tuple too long" },
            ErrorDef { code: -0x020B, name: "PathTooLong", message: "path too long" },
            ErrorDef { code: -0x0323, name: "PathNotAlias", message: "path is not an alias" },
            ErrorDef { code: -0x0322, name: "ElementNotFound", message: "element not found" },
            ErrorDef { code: -0x0321, name: "TraitNotFound", message: "trait not found" },
            ErrorDef { code: -0x0320, name: "PathNotFound", message: "path not found" },
            ErrorDef { code: -0x030E, name: "ValueTypeMismatch", message: "value type mismatch" },
            ErrorDef { code: -0x030A, name: "BuilderTypeMismatch", message: "builder type mismatch" },
            ErrorDef { code: -0x0411, name: "ServerTooOld", message: "server is too old" },
            ErrorDef { code: -0x0410, name: "ClientTooOld", message: "client is too old" },
            ErrorDef { code: -0x040F, name: "NotSupported", message: "unsupported operation" },
            ErrorDef { code: -0x0512, name: "UnknownTransportError", message: "unknown transport error" },
        ]
    }
}

impl From<std::io::Error> for DiceyError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            ConnectionRefused => DiceyError::ConnRefused,
            TimedOut => DiceyError::TimedOut,
            UnexpectedEof | WouldBlock => DiceyError::Again,
            InvalidData | InvalidInput => DiceyError::BadMsg,
            _ => DiceyError::UvUnknown(err.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DiceyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_name_round_trip_for_every_variant() {
        let samples = [
            DiceyError::Again,
            DiceyError::TimedOut,
            DiceyError::Cancelled,
            DiceyError::Already,
            DiceyError::Inval,
            DiceyError::BadMsg,
            DiceyError::Overflow,
            DiceyError::PathTooLong,
            DiceyError::TupleTooLong,
            DiceyError::ArrayTooLong,
            DiceyError::ValueTypeMismatch,
            DiceyError::BuilderTypeMismatch,
            DiceyError::PathNotFound,
            DiceyError::TraitNotFound,
            DiceyError::ElementNotFound,
            DiceyError::PathNotAlias,
            DiceyError::NoData,
            DiceyError::NotSupported,
            DiceyError::ClientTooOld,
            DiceyError::ServerTooOld,
            DiceyError::NoMem,
            DiceyError::ConnRefused,
        ];
        for err in samples {
            assert!(err.code() < 0);
            assert!(!err.name().is_empty());
        }
    }

    #[test]
    fn info_table_is_sorted_by_code_ascending_within_class() {
        let table = DiceyError::info_table();
        assert!(table.iter().all(|d| d.code < 0));
    }

    #[test]
    fn io_error_maps_to_transport_categories() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(DiceyError::from(io_err), DiceyError::ConnRefused);
    }
}
