/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the error type shared by every Coffer driver crate.

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// Coffer Error Type
///
/// Error values are partitioned by component: the high 16 bits select the
/// component, the low 16 bits the error within it. Zero is reserved so that
/// the error can live in a `NonZeroU32`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CofferError(pub NonZeroU32);

/// Closed error taxonomy.
///
/// Every error constant belongs to exactly one kind. Callers that need to
/// branch on the class of failure (retry decisions, fail-closed handling of
/// authentication errors) use [`CofferError::kind`] instead of matching raw
/// values.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Operation family not offered by the attached module.
    FeatureNotAvailable,

    /// Caller-supplied argument rejected (policy shape, asset reference,
    /// AAD length, bad flag combination).
    InvalidParameter,

    /// Key length illegal for the selected algorithm.
    InvalidKeySize,

    /// Data length illegal (non-block-multiple on a continuation segment,
    /// oversized payload).
    InvalidLength,

    /// Unknown symmetric key type.
    InvalidAlgorithm,

    /// (key type, feedback mode) pair not supported, or a state-location
    /// request the mode cannot honor.
    InvalidMode,

    /// Malformed command token (bad opcode/subcode, checksum mismatch).
    InvalidCommand,

    /// Keyblob unwrap failed authentication. Never retried, fails closed.
    UnwrapError,

    /// MAC/signature verification failed. Never retried, fails closed.
    VerifyFailed,

    /// Output buffer too small; the required size is always recoverable by
    /// the caller (asset size + keyblob expansion), so a single retry with
    /// a larger buffer is expected to succeed.
    BufferTooSmall,

    /// Hardware asset store or DMA pool exhausted.
    NoMemory,

    /// Hardware declined the operation (freeing a static asset, referencing
    /// a freed asset, filling an already-loaded asset).
    OperationFailed,

    /// Channel or transport failure: lock timeout, no response, malformed
    /// response token.
    InternalError,
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, kind, doc) tuples and generates
/// constant definitions for each error code plus the `kind()` classifier.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $kind:ident, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: CofferError = CofferError::new_const($value);
        )*

        /// Classify this error into the closed taxonomy.
        pub const fn kind(&self) -> ErrorKind {
            match self.0.get() {
                $($value => ErrorKind::$kind,)*
                _ => ErrorKind::InternalError,
            }
        }

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl CofferError {
    /// Create a coffer error; intended to only be used from const contexts, as
    /// we don't want runtime panics if val is zero. The preferred way to get a
    /// CofferError from a u32 is to use `CofferError::try_from()` from the
    /// `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("CofferError cannot be 0"),
        }
    }

    // Use the macro to define all error constants
    define_error_constants![
        // Token codec (component 0x0001)
        (
            API_TOKEN_INVALID_OPCODE,
            0x00010001,
            InvalidCommand,
            "Response token carried an opcode the codec does not know"
        ),
        (
            API_TOKEN_ID_MISMATCH,
            0x00010002,
            InternalError,
            "Response token identifier did not echo the command"
        ),
        (
            API_TOKEN_BAD_CHECKSUM,
            0x00010003,
            InvalidCommand,
            "Command token checksum mismatch"
        ),
        (
            API_TOKEN_UNKNOWN_SUBCODE,
            0x00010004,
            InternalError,
            "Hardware reported an error subcode outside the closed set"
        ),
        (
            API_TOKEN_PAYLOAD_RANGE,
            0x00010005,
            InvalidLength,
            "Inline token payload exceeds the word range its family owns"
        ),
        // Policy / asset typing (component 0x0002)
        (
            API_POLICY_UNUSED_BITS,
            0x00020001,
            InvalidParameter,
            "Policy mask has bits outside the defined field groups"
        ),
        (
            API_POLICY_UNRECOGNIZED_SHAPE,
            0x00020002,
            InvalidParameter,
            "Policy mask does not describe a supported key shape"
        ),
        (
            API_POLICY_FUNCTION_MISMATCH,
            0x00020003,
            InvalidParameter,
            "Asset policy does not permit the requested function"
        ),
        // Exclusive channel (component 0x0003)
        (
            DRIVER_CHANNEL_LOCK_TIMEOUT,
            0x00030001,
            InternalError,
            "Mailbox lock not acquired within the configured deadline"
        ),
        (
            DRIVER_CHANNEL_TRANSPORT,
            0x00030002,
            InternalError,
            "Transport failed to complete the token exchange"
        ),
        (
            DRIVER_CHANNEL_POISONED,
            0x00030003,
            InternalError,
            "Channel lock poisoned by a panicked holder"
        ),
        // Asset store client (component 0x0004)
        (
            DRIVER_ASSET_INVALID_SIZE,
            0x00040001,
            InvalidKeySize,
            "Asset size is zero or exceeds the 64-byte store limit"
        ),
        (
            DRIVER_ASSET_INVALID_ID,
            0x00040002,
            InvalidParameter,
            "Asset ID is the invalid sentinel"
        ),
        (
            DRIVER_ASSET_SIZE_MISMATCH,
            0x00040003,
            InvalidKeySize,
            "Fill data length does not equal the allocated asset size"
        ),
        (
            DRIVER_ASSET_NO_TEMP_MAPPING,
            0x00040004,
            InvalidParameter,
            "No temporary-asset mapping for this (key type, mode) pair"
        ),
        (
            DRIVER_ASSET_AAD_TOO_LONG,
            0x00040005,
            InvalidParameter,
            "Keyblob additional data exceeds 224 bytes"
        ),
        (
            DRIVER_ASSET_LABEL_LENGTH,
            0x00040006,
            InvalidParameter,
            "Derive label is empty or exceeds 224 bytes"
        ),
        (
            DRIVER_ASSET_BLOB_LENGTH,
            0x00040007,
            InvalidLength,
            "Keyblob length is not asset size + 16"
        ),
        (
            DRIVER_BUFFER_TOO_SMALL,
            0x00040008,
            BufferTooSmall,
            "Caller output buffer smaller than the result to be written"
        ),
        // Streaming dispatcher (component 0x0005)
        (
            DRIVER_STREAM_INIT_FROM_ASSET,
            0x00050001,
            InvalidMode,
            "init requested together with loading state from an asset"
        ),
        (
            DRIVER_STREAM_FINAL_TO_ASSET,
            0x00050002,
            InvalidMode,
            "final requested together with saving state to an asset"
        ),
        (
            DRIVER_STREAM_ALREADY_FINAL,
            0x00050003,
            InvalidParameter,
            "Streaming context used after its final segment"
        ),
        (
            DRIVER_STREAM_NOT_INITIALIZED,
            0x00050004,
            InvalidParameter,
            "Continuation segment on a context that was never initialized"
        ),
        (
            DRIVER_STREAM_PARTIAL_SEGMENT,
            0x00050005,
            InvalidLength,
            "Non-block-multiple input on a non-final segment"
        ),
        (
            DRIVER_STREAM_NO_ASSET_STATE,
            0x00050006,
            InvalidMode,
            "This algorithm cannot keep streaming state in the asset store"
        ),
        (
            DRIVER_STREAM_LENGTH_OVERFLOW,
            0x00050007,
            InvalidLength,
            "Running message length overflowed 64 bits"
        ),
        (
            DRIVER_STREAM_STATE_LOCATION,
            0x00050008,
            InvalidMode,
            "State placement request does not match where the state lives"
        ),
        // Algorithm router (component 0x0006)
        (
            DRIVER_ROUTER_UNKNOWN_KEY_TYPE,
            0x00060001,
            InvalidAlgorithm,
            "Unknown symmetric key type"
        ),
        (
            DRIVER_ROUTER_UNSUPPORTED_MODE,
            0x00060002,
            InvalidMode,
            "Feedback mode not supported for this key type"
        ),
        (
            DRIVER_ROUTER_KEY_LENGTH,
            0x00060003,
            InvalidKeySize,
            "Key length illegal for this key type"
        ),
        (
            DRIVER_ROUTER_FEATURE_UNAVAILABLE,
            0x00060004,
            FeatureNotAvailable,
            "Attached module does not implement this engine family"
        ),
        (
            DRIVER_ROUTER_IV_REQUIRED,
            0x00060005,
            InvalidParameter,
            "Feedback mode requires an IV and none was supplied"
        ),
        // One-time init (component 0x0007)
        (
            DRIVER_INIT_IN_PROGRESS,
            0x00070001,
            InvalidParameter,
            "Another thread is running one-time initialization"
        ),
        (
            DRIVER_INIT_SELF_TEST_FAILED,
            0x00070002,
            InternalError,
            "Known-answer self test mismatch during initialization"
        ),
        // Hardware-reported status subcodes (component 0x0008); these are the
        // driver-side image of the closed wire enumeration in coffer-api.
        (
            HW_UNSUPPORTED,
            0x00080001,
            FeatureNotAvailable,
            "Hardware: feature not available"
        ),
        (
            HW_INVALID_PARAMETER,
            0x00080002,
            InvalidParameter,
            "Hardware: invalid parameter"
        ),
        (
            HW_INVALID_KEY_SIZE,
            0x00080003,
            InvalidKeySize,
            "Hardware: invalid key size"
        ),
        (
            HW_INVALID_LENGTH,
            0x00080004,
            InvalidLength,
            "Hardware: invalid data length"
        ),
        (
            HW_INVALID_ALGORITHM,
            0x00080005,
            InvalidAlgorithm,
            "Hardware: invalid algorithm"
        ),
        (
            HW_INVALID_MODE,
            0x00080006,
            InvalidMode,
            "Hardware: invalid mode"
        ),
        (
            HW_INVALID_COMMAND,
            0x00080007,
            InvalidCommand,
            "Hardware: malformed command token"
        ),
        (
            HW_UNWRAP_ERROR,
            0x00080008,
            UnwrapError,
            "Hardware: keyblob unwrap authentication failure"
        ),
        (
            HW_VERIFY_FAILED,
            0x00080009,
            VerifyFailed,
            "Hardware: verification failure"
        ),
        (
            HW_BUFFER_TOO_SMALL,
            0x0008000A,
            BufferTooSmall,
            "Hardware: output buffer too small"
        ),
        (
            HW_NO_MEMORY,
            0x0008000B,
            NoMemory,
            "Hardware: asset store or workspace exhausted"
        ),
        (
            HW_OPERATION_FAILED,
            0x0008000C,
            OperationFailed,
            "Hardware: operation declined"
        ),
        (
            HW_INTERNAL_ERROR,
            0x0008000D,
            InternalError,
            "Hardware: internal error"
        ),
    ];

    /// True for errors that must never be retried and must fail closed
    /// (cryptographic authentication failures).
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnwrapError | ErrorKind::VerifyFailed
        )
    }
}

impl From<CofferError> for core::num::NonZeroU32 {
    fn from(val: CofferError) -> Self {
        val.0
    }
}

impl From<CofferError> for u32 {
    fn from(val: CofferError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for CofferError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(CofferError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type CofferResult<T> = Result<T, CofferError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_try_from() {
        assert!(CofferError::try_from(0).is_err());
        assert_eq!(
            Ok(CofferError::DRIVER_CHANNEL_LOCK_TIMEOUT),
            CofferError::try_from(0x00030001)
        );
    }

    #[test]
    fn test_error_constants_uniqueness() {
        let constants = CofferError::all_constants();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in constants {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            CofferError::HW_UNWRAP_ERROR.kind(),
            ErrorKind::UnwrapError
        );
        assert_eq!(
            CofferError::DRIVER_STREAM_INIT_FROM_ASSET.kind(),
            ErrorKind::InvalidMode
        );
        assert!(CofferError::HW_VERIFY_FAILED.is_auth_failure());
        assert!(!CofferError::HW_NO_MEMORY.is_auth_failure());
        // Unknown values classify as internal rather than panicking.
        let unknown = CofferError::try_from(0xdead_beef).unwrap();
        assert_eq!(unknown.kind(), ErrorKind::InternalError);
    }
}
