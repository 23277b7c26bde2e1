//! Response status codes

use std::fmt;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseStatus {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    IncrOrDecrOnNonNumericValue = 0x0006,
    VbucketWrong = 0x0007,
    AuthError = 0x0008,
    AuthContinue = 0x0009,
    Unknown = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TempFailure = 0x0086,
}

impl ResponseStatus {
    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            0x0000 => ResponseStatus::NoError,
            0x0001 => ResponseStatus::KeyNotFound,
            0x0002 => ResponseStatus::KeyExists,
            0x0003 => ResponseStatus::ValueTooLarge,
            0x0004 => ResponseStatus::InvalidArguments,
            0x0005 => ResponseStatus::ItemNotStored,
            0x0006 => ResponseStatus::IncrOrDecrOnNonNumericValue,
            0x0007 => ResponseStatus::VbucketWrong,
            0x0008 => ResponseStatus::AuthError,
            0x0009 => ResponseStatus::AuthContinue,
            0x0081 => ResponseStatus::Unknown,
            0x0082 => ResponseStatus::OutOfMemory,
            0x0083 => ResponseStatus::NotSupported,
            0x0084 => ResponseStatus::InternalError,
            0x0085 => ResponseStatus::Busy,
            0x0086 => ResponseStatus::TempFailure,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        self == ResponseStatus::NoError
    }

    /// Lower-case, space separated rendering of the variant name
    pub fn message(self) -> &'static str {
        match self {
            ResponseStatus::NoError => "no error",
            ResponseStatus::KeyNotFound => "key not found",
            ResponseStatus::KeyExists => "key exists",
            ResponseStatus::ValueTooLarge => "value too large",
            ResponseStatus::InvalidArguments => "invalid arguments",
            ResponseStatus::ItemNotStored => "item not stored",
            ResponseStatus::IncrOrDecrOnNonNumericValue => "incr or decr on non numeric value",
            ResponseStatus::VbucketWrong => "vbucket wrong",
            ResponseStatus::AuthError => "auth error",
            ResponseStatus::AuthContinue => "auth continue",
            ResponseStatus::Unknown => "unknown",
            ResponseStatus::OutOfMemory => "out of memory",
            ResponseStatus::NotSupported => "not supported",
            ResponseStatus::InternalError => "internal error",
            ResponseStatus::Busy => "busy",
            ResponseStatus::TempFailure => "temp failure",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
