// Licensed under the Apache-2.0 license

//! Asset management token family (opcode 0x07).
//!
//! Subcodes: 0 create, 1 load, 2 search, 3 delete.
//!
//! Create: word 2 policy, word 3 size. Response word 2: new asset ID.
//!
//! Load: word 2 asset ID, word 3 fill method, word 4 flags (bit 0: also
//! export a keyblob), word 5 KEK/KDK asset ID, word 6 AAD or label length,
//! word 7 input descriptor (AAD ‖ payload), word 8 payload length, word 9
//! output descriptor (keyblob), word 10 random fill size. Response word 2:
//! keyblob length written (or, under a buffer-too-small status, the length
//! that would have been required).
//!
//! Search: word 2 static asset number. Response word 2 asset ID, word 3
//! asset size.
//!
//! Delete: word 2 asset ID.

use crate::policy::{AssetId, AssetPolicy};
use crate::token::{CommandToken, Opcode, ResponseToken};
use crate::transport::DescriptorHandle;
use coffer_error::{CofferError, CofferResult};

pub const SUBCODE_CREATE: u8 = 0;
pub const SUBCODE_LOAD: u8 = 1;
pub const SUBCODE_SEARCH: u8 = 2;
pub const SUBCODE_DELETE: u8 = 3;

pub const WORD_POLICY: usize = 2;
pub const WORD_SIZE: usize = 3;

pub const WORD_ASSET_ID: usize = 2;
pub const WORD_METHOD: usize = 3;
pub const WORD_LOAD_FLAGS: usize = 4;
pub const WORD_WRAP_KEY: usize = 5;
pub const WORD_AAD_LEN: usize = 6;
pub const WORD_INPUT_DESC: usize = 7;
pub const WORD_PAYLOAD_LEN: usize = 8;
pub const WORD_OUTPUT_DESC: usize = 9;
pub const WORD_RANDOM_SIZE: usize = 10;

pub const WORD_STATIC_NUMBER: usize = 2;

pub const RESP_WORD_ASSET_ID: usize = 2;
pub const RESP_WORD_ASSET_SIZE: usize = 3;
pub const RESP_WORD_BLOB_LEN: usize = 2;

pub const LOAD_FLAG_WRAP: u32 = 1 << 0;

/// How a load command fills the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadMethod {
    /// Caller-supplied plaintext through the input descriptor.
    Plaintext = 1,

    /// Hardware RNG fill.
    Random = 2,

    /// Built-in KDF keyed by a KDK; the label rides the input descriptor.
    Derive = 3,

    /// Keyblob import; AAD ‖ blob ride the input descriptor.
    Import = 4,
}

impl LoadMethod {
    pub fn from_wire(value: u32) -> CofferResult<Self> {
        match value {
            1 => Ok(LoadMethod::Plaintext),
            2 => Ok(LoadMethod::Random),
            3 => Ok(LoadMethod::Derive),
            4 => Ok(LoadMethod::Import),
            _ => Err(CofferError::HW_INVALID_COMMAND),
        }
    }
}

// ---- Create ----

pub fn create_command(token_id: u16, policy: AssetPolicy, size: u32) -> CommandToken {
    let mut cmd = CommandToken::new(Opcode::Asset, SUBCODE_CREATE, token_id);
    cmd.0[WORD_POLICY] = policy.bits();
    cmd.0[WORD_SIZE] = size;
    cmd
}

pub fn create_policy_word(cmd: &CommandToken) -> u32 {
    cmd.0[WORD_POLICY]
}

pub fn create_size(cmd: &CommandToken) -> u32 {
    cmd.0[WORD_SIZE]
}

pub fn created_id(resp: &ResponseToken) -> AssetId {
    AssetId(resp.0[RESP_WORD_ASSET_ID])
}

pub fn set_created_id(resp: &mut ResponseToken, id: AssetId) {
    resp.0[RESP_WORD_ASSET_ID] = id.0;
}

// ---- Load ----

pub fn load_command(token_id: u16, id: AssetId, method: LoadMethod) -> CommandToken {
    let mut cmd = CommandToken::new(Opcode::Asset, SUBCODE_LOAD, token_id);
    cmd.0[WORD_ASSET_ID] = id.0;
    cmd.0[WORD_METHOD] = method as u32;
    cmd
}

/// Request a keyblob export in the same transaction; `wrap_kek` is the KEK,
/// `output` receives ciphertext ‖ tag.
pub fn set_wrap_request(cmd: &mut CommandToken, wrap_kek: AssetId, output: DescriptorHandle) {
    cmd.0[WORD_LOAD_FLAGS] |= LOAD_FLAG_WRAP;
    cmd.0[WORD_WRAP_KEY] = wrap_kek.0;
    cmd.0[WORD_OUTPUT_DESC] = output.0;
}

/// Key the built-in KDF (derive) or the unwrap engine (import).
pub fn set_source_key(cmd: &mut CommandToken, key: AssetId) {
    cmd.0[WORD_WRAP_KEY] = key.0;
}

/// Attach the variable payload: AAD (or derive label) length plus the
/// combined input buffer.
pub fn set_load_payload(
    cmd: &mut CommandToken,
    aad_len: u32,
    payload_len: u32,
    input: DescriptorHandle,
) {
    cmd.0[WORD_AAD_LEN] = aad_len;
    cmd.0[WORD_PAYLOAD_LEN] = payload_len;
    cmd.0[WORD_INPUT_DESC] = input.0;
}

pub fn set_random_size(cmd: &mut CommandToken, size: u32) {
    cmd.0[WORD_RANDOM_SIZE] = size;
}

pub fn load_target(cmd: &CommandToken) -> AssetId {
    AssetId(cmd.0[WORD_ASSET_ID])
}

pub fn load_method(cmd: &CommandToken) -> CofferResult<LoadMethod> {
    LoadMethod::from_wire(cmd.0[WORD_METHOD])
}

pub fn wrap_requested(cmd: &CommandToken) -> bool {
    cmd.0[WORD_LOAD_FLAGS] & LOAD_FLAG_WRAP != 0
}

pub fn source_key(cmd: &CommandToken) -> AssetId {
    AssetId(cmd.0[WORD_WRAP_KEY])
}

pub fn blob_len(resp: &ResponseToken) -> u32 {
    resp.0[RESP_WORD_BLOB_LEN]
}

pub fn set_blob_len(resp: &mut ResponseToken, len: u32) {
    resp.0[RESP_WORD_BLOB_LEN] = len;
}

// ---- Search ----

pub fn search_command(token_id: u16, static_number: u32) -> CommandToken {
    let mut cmd = CommandToken::new(Opcode::Asset, SUBCODE_SEARCH, token_id);
    cmd.0[WORD_STATIC_NUMBER] = static_number;
    cmd
}

pub fn search_number(cmd: &CommandToken) -> u32 {
    cmd.0[WORD_STATIC_NUMBER]
}

pub fn found_id(resp: &ResponseToken) -> AssetId {
    AssetId(resp.0[RESP_WORD_ASSET_ID])
}

pub fn found_size(resp: &ResponseToken) -> u32 {
    resp.0[RESP_WORD_ASSET_SIZE]
}

pub fn set_found(resp: &mut ResponseToken, id: AssetId, size: u32) {
    resp.0[RESP_WORD_ASSET_ID] = id.0;
    resp.0[RESP_WORD_ASSET_SIZE] = size;
}

// ---- Delete ----

pub fn delete_command(token_id: u16, id: AssetId) -> CommandToken {
    let mut cmd = CommandToken::new(Opcode::Asset, SUBCODE_DELETE, token_id);
    cmd.0[WORD_ASSET_ID] = id.0;
    cmd
}

pub fn delete_target(cmd: &CommandToken) -> AssetId {
    AssetId(cmd.0[WORD_ASSET_ID])
}
