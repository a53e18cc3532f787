// Licensed under the Apache-2.0 license

//! Token codec for the Coffer crypto module.
//!
//! Everything in this crate is pure: builders write fixed word ranges into a
//! command token, parsers read fixed word ranges out of a response token.
//! The word layout is the wire contract with the module firmware and must be
//! reproduced bit-exactly; offsets are documented on each builder and pinned
//! by unit tests.

#![cfg_attr(not(test), no_std)]

pub mod algo;
pub mod asset;
pub mod capabilities;
pub mod cipher;
pub mod hash;
pub mod mac;
pub mod policy;
pub mod status;
pub mod system;
pub mod token;
pub mod transport;

pub use algo::{FeedbackMode, HashAlgo, MacAlgo, SymKeyType};
pub use capabilities::CofferCapabilities;
pub use coffer_error as error;
pub use policy::{AssetId, AssetPolicy, KeyShape};
pub use status::{HwStatus, StatusCategory};
pub use token::{
    calc_checksum, verify_checksum, CommandToken, LocationCode, Opcode, ResponseToken,
    TOKEN_WORDS,
};
pub use transport::{CofferTransport, DescriptorHandle, TransportError};

/// Largest asset the store will hold, in bytes.
pub const MAX_ASSET_SIZE: usize = 64;

/// Fixed keyblob expansion: ciphertext is asset-sized, followed by the
/// 16-byte integrity tag. There is no nonce field.
pub const KEYBLOB_OVERHEAD: usize = 16;

/// Longest additional-authenticated-data buffer accepted at keyblob
/// export/import.
pub const MAX_KEYBLOB_AAD_SIZE: usize = 224;

/// Longest derive label accepted by the built-in KDF.
pub const MAX_DERIVE_LABEL_SIZE: usize = 224;

/// Size of the keyblob produced for an asset of `asset_size` bytes.
pub const fn keyblob_size(asset_size: usize) -> usize {
    asset_size + KEYBLOB_OVERHEAD
}
