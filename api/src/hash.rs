// Licensed under the Apache-2.0 license

//! Hash token family (opcode 0x02, subcode 0).
//!
//! Command word layout:
//!
//! | word | field |
//! |------|-------|
//! | 2    | flags: bit 0 init, bit 1 final, bits 5:4 state location, bits 11:8 algorithm |
//! | 3    | segment length in bytes |
//! | 4    | input descriptor handle |
//! | 5,6  | total message length in bytes, low/high word (final segments only) |
//! | 7    | state asset ID |
//! | 8..23 | inline digest state, up to 64 bytes |
//!
//! Response words 2..17 carry the digest (final) or intermediate state
//! (continuation with in-context state).

use crate::algo::HashAlgo;
use crate::token::{CommandToken, LocationCode, Opcode, ResponseToken};
use crate::transport::DescriptorHandle;
use crate::MAX_ASSET_SIZE;
use coffer_error::CofferResult;

pub const SUBCODE: u8 = 0;

pub const WORD_FLAGS: usize = 2;
pub const WORD_DATA_LEN: usize = 3;
pub const WORD_INPUT_DESC: usize = 4;
pub const WORD_TOTAL_LEN_LO: usize = 5;
pub const WORD_TOTAL_LEN_HI: usize = 6;
pub const WORD_STATE_ASSET: usize = 7;
pub const WORD_STATE: usize = 8;
pub const RESP_WORD_DIGEST: usize = 2;

pub const FLAG_INIT: u32 = 1 << 0;
pub const FLAG_FINAL: u32 = 1 << 1;
const LOCATION_SHIFT: u32 = 4;
const ALGO_SHIFT: u32 = 8;

/// Start a hash command token.
pub fn command(token_id: u16) -> CommandToken {
    CommandToken::new(Opcode::Hash, SUBCODE, token_id)
}

/// Select the algorithm and segment flags. Owns only the flag word.
pub fn set_control(cmd: &mut CommandToken, algo: HashAlgo, init: bool, is_final: bool) {
    let mut flags = (algo as u32) << ALGO_SHIFT;
    if init {
        flags |= FLAG_INIT;
    }
    if is_final {
        flags |= FLAG_FINAL;
    }
    // Preserve the location bits a previous builder call may have set.
    cmd.0[WORD_FLAGS] = (cmd.0[WORD_FLAGS] & (0x3 << LOCATION_SHIFT)) | flags;
}

/// Select where the digest state lives or should move to on this call.
pub fn set_state_location(cmd: &mut CommandToken, location: LocationCode) {
    cmd.0[WORD_FLAGS] =
        (cmd.0[WORD_FLAGS] & !(0x3 << LOCATION_SHIFT)) | ((location as u32) << LOCATION_SHIFT);
}

/// Reference the state asset. Only flips the asset-id word; the inline
/// state words keep whatever was written there (hardware ignores them when
/// the location selects the asset store).
pub fn set_state_asset(cmd: &mut CommandToken, id: crate::AssetId) {
    cmd.0[WORD_STATE_ASSET] = id.0;
}

/// Write the inline digest state (continuation with in-context state).
pub fn write_state(cmd: &mut CommandToken, state: &[u8]) -> CofferResult<()> {
    debug_assert!(state.len() <= MAX_ASSET_SIZE);
    cmd.write_bytes(WORD_STATE, state)
}

/// Attach this segment's input payload.
pub fn set_data(cmd: &mut CommandToken, desc: DescriptorHandle, len: u32) {
    cmd.0[WORD_INPUT_DESC] = desc.0;
    cmd.0[WORD_DATA_LEN] = len;
}

/// Write the 64-bit running total (bytes, including this segment). Final
/// segments only; the module uses it to synthesize length padding.
pub fn set_total_length(cmd: &mut CommandToken, total_bytes: u64) {
    cmd.0[WORD_TOTAL_LEN_LO] = total_bytes as u32;
    cmd.0[WORD_TOTAL_LEN_HI] = (total_bytes >> 32) as u32;
}

/// Parsers for the module side and for tests.
pub fn control(cmd: &CommandToken) -> (u32, LocationCode) {
    let flags = cmd.0[WORD_FLAGS];
    (
        flags,
        LocationCode::from_wire(((flags >> LOCATION_SHIFT) & 0x3) as u8),
    )
}

pub fn algo(cmd: &CommandToken) -> CofferResult<HashAlgo> {
    HashAlgo::from_wire(((cmd.0[WORD_FLAGS] >> ALGO_SHIFT) & 0xF) as u8)
}

pub fn total_length(cmd: &CommandToken) -> u64 {
    (cmd.0[WORD_TOTAL_LEN_LO] as u64) | ((cmd.0[WORD_TOTAL_LEN_HI] as u64) << 32)
}

/// Read the digest (or intermediate state) out of a response.
pub fn read_digest(resp: &ResponseToken, out: &mut [u8]) -> CofferResult<()> {
    resp.read_bytes(RESP_WORD_DIGEST, out)
}

/// Write the digest into a response (module side).
pub fn write_digest(resp: &mut ResponseToken, digest: &[u8]) -> CofferResult<()> {
    resp.write_bytes(RESP_WORD_DIGEST, digest)
}
