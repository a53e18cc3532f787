// Licensed under the Apache-2.0 license

//! Hardware status word: the closed error subcode enumeration, its category
//! groups, and the mapping onto [`CofferError`].

use crate::token::ResponseToken;
use coffer_error::{CofferError, CofferResult};

/// Category group carried in bits 31:24 of a failing status word. The top
/// bit decides retry-ability: categories at or above [`StatusCategory::Auth`]
/// are fatal and must never be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCategory {
    /// Caller-input error; retrying the identical request cannot succeed.
    Argument = 0x10,

    /// Transient resource condition (store full, buffer too small); a
    /// retry after the caller frees or grows resources may succeed.
    Resource = 0x20,

    /// Cryptographic authentication failure. Never retried.
    Auth = 0x80,

    /// Module fault. Never retried.
    Fatal = 0x90,
}

impl StatusCategory {
    pub fn is_fatal(self) -> bool {
        (self as u8) >= (StatusCategory::Auth as u8)
    }
}

/// The closed set of error subcodes the module firmware can report in
/// bits 7:0 of the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HwStatus {
    Unsupported = 0x01,
    InvalidParameter = 0x02,
    InvalidKeySize = 0x03,
    InvalidLength = 0x04,
    InvalidAlgorithm = 0x05,
    InvalidMode = 0x06,
    InvalidCommand = 0x07,
    UnwrapError = 0x10,
    VerifyFailed = 0x11,
    BufferTooSmall = 0x20,
    NoMemory = 0x21,
    OperationFailed = 0x22,
    InternalError = 0x7F,
}

impl HwStatus {
    /// All subcodes, used by the description/uniqueness tests.
    pub const ALL: [HwStatus; 13] = [
        HwStatus::Unsupported,
        HwStatus::InvalidParameter,
        HwStatus::InvalidKeySize,
        HwStatus::InvalidLength,
        HwStatus::InvalidAlgorithm,
        HwStatus::InvalidMode,
        HwStatus::InvalidCommand,
        HwStatus::UnwrapError,
        HwStatus::VerifyFailed,
        HwStatus::BufferTooSmall,
        HwStatus::NoMemory,
        HwStatus::OperationFailed,
        HwStatus::InternalError,
    ];

    pub fn category(self) -> StatusCategory {
        match self {
            HwStatus::Unsupported
            | HwStatus::InvalidParameter
            | HwStatus::InvalidKeySize
            | HwStatus::InvalidLength
            | HwStatus::InvalidAlgorithm
            | HwStatus::InvalidMode
            | HwStatus::InvalidCommand => StatusCategory::Argument,
            HwStatus::BufferTooSmall | HwStatus::NoMemory => StatusCategory::Resource,
            HwStatus::UnwrapError | HwStatus::VerifyFailed => StatusCategory::Auth,
            HwStatus::OperationFailed | HwStatus::InternalError => StatusCategory::Fatal,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            HwStatus::Unsupported => "feature not available",
            HwStatus::InvalidParameter => "invalid parameter",
            HwStatus::InvalidKeySize => "invalid key size",
            HwStatus::InvalidLength => "invalid data length",
            HwStatus::InvalidAlgorithm => "invalid algorithm",
            HwStatus::InvalidMode => "invalid mode",
            HwStatus::InvalidCommand => "malformed command token",
            HwStatus::UnwrapError => "keyblob unwrap failed authentication",
            HwStatus::VerifyFailed => "verification failed",
            HwStatus::BufferTooSmall => "output buffer too small",
            HwStatus::NoMemory => "asset store exhausted",
            HwStatus::OperationFailed => "operation declined",
            HwStatus::InternalError => "module internal error",
        }
    }

    /// Encode the status word the module firmware writes.
    pub fn encode(self) -> u32 {
        ((self.category() as u32) << 24) | self as u32
    }

    fn from_subcode(subcode: u8) -> CofferResult<Self> {
        match subcode {
            0x01 => Ok(HwStatus::Unsupported),
            0x02 => Ok(HwStatus::InvalidParameter),
            0x03 => Ok(HwStatus::InvalidKeySize),
            0x04 => Ok(HwStatus::InvalidLength),
            0x05 => Ok(HwStatus::InvalidAlgorithm),
            0x06 => Ok(HwStatus::InvalidMode),
            0x07 => Ok(HwStatus::InvalidCommand),
            0x10 => Ok(HwStatus::UnwrapError),
            0x11 => Ok(HwStatus::VerifyFailed),
            0x20 => Ok(HwStatus::BufferTooSmall),
            0x21 => Ok(HwStatus::NoMemory),
            0x22 => Ok(HwStatus::OperationFailed),
            0x7F => Ok(HwStatus::InternalError),
            _ => Err(CofferError::API_TOKEN_UNKNOWN_SUBCODE),
        }
    }

    /// Map a hardware subcode onto the driver error constant. The mapping is
    /// closed: an authentication failure never downgrades to a generic error.
    pub fn to_error(self) -> CofferError {
        match self {
            HwStatus::Unsupported => CofferError::HW_UNSUPPORTED,
            HwStatus::InvalidParameter => CofferError::HW_INVALID_PARAMETER,
            HwStatus::InvalidKeySize => CofferError::HW_INVALID_KEY_SIZE,
            HwStatus::InvalidLength => CofferError::HW_INVALID_LENGTH,
            HwStatus::InvalidAlgorithm => CofferError::HW_INVALID_ALGORITHM,
            HwStatus::InvalidMode => CofferError::HW_INVALID_MODE,
            HwStatus::InvalidCommand => CofferError::HW_INVALID_COMMAND,
            HwStatus::UnwrapError => CofferError::HW_UNWRAP_ERROR,
            HwStatus::VerifyFailed => CofferError::HW_VERIFY_FAILED,
            HwStatus::BufferTooSmall => CofferError::HW_BUFFER_TOO_SMALL,
            HwStatus::NoMemory => CofferError::HW_NO_MEMORY,
            HwStatus::OperationFailed => CofferError::HW_OPERATION_FAILED,
            HwStatus::InternalError => CofferError::HW_INTERNAL_ERROR,
        }
    }
}

/// Parse the status word of a response: `Ok(())` on success, the mapped
/// driver error otherwise.
pub fn parse_status(resp: &ResponseToken) -> CofferResult<()> {
    let word = resp.status_word();
    if word == 0 {
        return Ok(());
    }
    let status = HwStatus::from_subcode(word as u8)?;
    Err(status.to_error())
}
