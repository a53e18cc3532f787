// Licensed under the Apache-2.0 license

//! MAC token family (opcode 0x03, subcode 0): HMAC, AES-CMAC, AES-CBC-MAC
//! and C2-H share one layout.
//!
//! Command word layout:
//!
//! | word | field |
//! |------|-------|
//! | 2    | flags: bit 0 init, bit 1 final, bits 5:4 state location, bits 11:8 algorithm, bit 16 key-from-asset |
//! | 3    | segment length in bytes |
//! | 4    | input descriptor handle |
//! | 5,6  | total message length in bytes, low/high word (final segments only) |
//! | 7    | state asset ID |
//! | 8    | key length in bytes |
//! | 9    | key asset ID |
//! | 10..25 | inline intermediate MAC state, up to 64 bytes |
//! | 26..41 | inline key, up to 64 bytes |
//!
//! Response words 2..17 carry the MAC (final) or intermediate state.

use crate::algo::MacAlgo;
use crate::token::{CommandToken, LocationCode, Opcode, ResponseToken};
use crate::transport::DescriptorHandle;
use coffer_error::CofferResult;

pub const SUBCODE: u8 = 0;

pub const WORD_FLAGS: usize = 2;
pub const WORD_DATA_LEN: usize = 3;
pub const WORD_INPUT_DESC: usize = 4;
pub const WORD_TOTAL_LEN_LO: usize = 5;
pub const WORD_TOTAL_LEN_HI: usize = 6;
pub const WORD_STATE_ASSET: usize = 7;
pub const WORD_KEY_LEN: usize = 8;
pub const WORD_KEY_ASSET: usize = 9;
pub const WORD_STATE: usize = 10;
pub const WORD_KEY: usize = 26;
pub const RESP_WORD_MAC: usize = 2;

pub const FLAG_INIT: u32 = 1 << 0;
pub const FLAG_FINAL: u32 = 1 << 1;
pub const FLAG_KEY_FROM_ASSET: u32 = 1 << 16;
const LOCATION_SHIFT: u32 = 4;
const ALGO_SHIFT: u32 = 8;

/// The longest key a MAC token can carry inline. HMAC keys longer than this
/// are pre-hashed by the driver before they ever reach a token.
pub const MAX_INLINE_KEY_SIZE: usize = 64;

pub fn command(token_id: u16) -> CommandToken {
    CommandToken::new(Opcode::Mac, SUBCODE, token_id)
}

pub fn set_control(cmd: &mut CommandToken, algo: MacAlgo, init: bool, is_final: bool) {
    let keep = cmd.0[WORD_FLAGS] & ((0x3 << LOCATION_SHIFT) | FLAG_KEY_FROM_ASSET);
    let mut flags = (algo as u32) << ALGO_SHIFT;
    if init {
        flags |= FLAG_INIT;
    }
    if is_final {
        flags |= FLAG_FINAL;
    }
    cmd.0[WORD_FLAGS] = keep | flags;
}

pub fn set_state_location(cmd: &mut CommandToken, location: LocationCode) {
    cmd.0[WORD_FLAGS] =
        (cmd.0[WORD_FLAGS] & !(0x3 << LOCATION_SHIFT)) | ((location as u32) << LOCATION_SHIFT);
}

pub fn set_state_asset(cmd: &mut CommandToken, id: crate::AssetId) {
    cmd.0[WORD_STATE_ASSET] = id.0;
}

pub fn write_state(cmd: &mut CommandToken, state: &[u8]) -> CofferResult<()> {
    cmd.write_bytes(WORD_STATE, state)
}

/// Use a key from the asset store. Flips the flag bit and writes the
/// asset-id word only; the inline key region is left untouched (the module
/// ignores it when the flag is set).
pub fn set_key_asset(cmd: &mut CommandToken, id: crate::AssetId, key_len: u32) {
    cmd.0[WORD_FLAGS] |= FLAG_KEY_FROM_ASSET;
    cmd.0[WORD_KEY_ASSET] = id.0;
    cmd.0[WORD_KEY_LEN] = key_len;
}

/// Embed a literal key.
pub fn set_key_literal(cmd: &mut CommandToken, key: &[u8]) -> CofferResult<()> {
    cmd.0[WORD_FLAGS] &= !FLAG_KEY_FROM_ASSET;
    cmd.0[WORD_KEY_LEN] = key.len() as u32;
    cmd.write_bytes(WORD_KEY, key)
}

pub fn set_data(cmd: &mut CommandToken, desc: DescriptorHandle, len: u32) {
    cmd.0[WORD_INPUT_DESC] = desc.0;
    cmd.0[WORD_DATA_LEN] = len;
}

pub fn set_total_length(cmd: &mut CommandToken, total_bytes: u64) {
    cmd.0[WORD_TOTAL_LEN_LO] = total_bytes as u32;
    cmd.0[WORD_TOTAL_LEN_HI] = (total_bytes >> 32) as u32;
}

pub fn algo(cmd: &CommandToken) -> CofferResult<MacAlgo> {
    MacAlgo::from_wire(((cmd.0[WORD_FLAGS] >> ALGO_SHIFT) & 0xF) as u8)
}

pub fn control(cmd: &CommandToken) -> (u32, LocationCode) {
    let flags = cmd.0[WORD_FLAGS];
    (
        flags,
        LocationCode::from_wire(((flags >> LOCATION_SHIFT) & 0x3) as u8),
    )
}

pub fn key_from_asset(cmd: &CommandToken) -> bool {
    cmd.0[WORD_FLAGS] & FLAG_KEY_FROM_ASSET != 0
}

pub fn total_length(cmd: &CommandToken) -> u64 {
    (cmd.0[WORD_TOTAL_LEN_LO] as u64) | ((cmd.0[WORD_TOTAL_LEN_HI] as u64) << 32)
}

pub fn read_mac(resp: &ResponseToken, out: &mut [u8]) -> CofferResult<()> {
    resp.read_bytes(RESP_WORD_MAC, out)
}

pub fn write_mac(resp: &mut ResponseToken, mac: &[u8]) -> CofferResult<()> {
    resp.write_bytes(RESP_WORD_MAC, mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetId;

    #[test]
    fn test_word_layout() {
        let mut cmd = command(0x11);
        set_control(&mut cmd, MacAlgo::AesCmac, true, false);
        set_data(&mut cmd, DescriptorHandle(5), 48);
        set_key_literal(&mut cmd, &[0x01; 16]).unwrap();

        assert_eq!(cmd.0[0], 0x0300_0011);
        assert_eq!(cmd.0[WORD_FLAGS], (8 << 8) | FLAG_INIT);
        assert_eq!(cmd.0[WORD_DATA_LEN], 48);
        assert_eq!(cmd.0[WORD_KEY_LEN], 16);
        assert_eq!(cmd.0[WORD_KEY], 0x0101_0101);
        assert_eq!(algo(&cmd).unwrap(), MacAlgo::AesCmac);
    }

    #[test]
    fn test_key_asset_leaves_literal_region_untouched() {
        // Intentional layering: selecting "key from asset" must only flip
        // the flag and the id word, never clear the literal key words.
        let mut cmd = command(0);
        set_key_literal(&mut cmd, &[0xEE; 32]).unwrap();
        set_key_asset(&mut cmd, AssetId(0x40), 32);

        assert!(key_from_asset(&cmd));
        assert_eq!(cmd.0[WORD_KEY_ASSET], 0x40);
        assert_eq!(cmd.0[WORD_KEY], 0xEEEE_EEEE);
        assert_eq!(cmd.0[WORD_KEY_LEN], 32);
    }

    #[test]
    fn test_control_preserves_key_flag() {
        let mut cmd = command(0);
        set_key_asset(&mut cmd, AssetId(7), 20);
        set_control(&mut cmd, MacAlgo::HmacSha1, false, true);
        assert!(key_from_asset(&cmd));
        assert_eq!(cmd.0[WORD_FLAGS] & FLAG_FINAL, FLAG_FINAL);
    }

    #[test]
    fn test_mac_round_trip() {
        let cmd = command(2);
        let mut resp = ResponseToken::reply_to(&cmd);
        write_mac(&mut resp, &[0xC3; 16]).unwrap();
        let mut out = [0u8; 16];
        read_mac(&resp, &mut out).unwrap();
        assert_eq!(out, [0xC3; 16]);
    }
}
