// Licensed under the Apache-2.0 license

//! Cipher token family (opcode 0x04, subcode 0).
//!
//! Command word layout:
//!
//! | word | field |
//! |------|-------|
//! | 2    | flags: bit 0 encrypt, bit 1 init, bit 2 final, bits 7:4 feedback mode, bits 15:8 key type, bits 21:20 IV location, bit 24 key-from-asset |
//! | 3    | data length in bytes |
//! | 4    | input descriptor handle |
//! | 5    | output descriptor handle |
//! | 6    | key length in bytes |
//! | 7    | key asset ID |
//! | 8    | IV asset ID |
//! | 9..12 | inline IV, 16 bytes |
//! | 13..20 | inline key, up to 32 bytes |
//! | 21..24 | f8 salt key, 16 bytes |
//! | 25..28 | f8 IV, 16 bytes |
//! | 29    | keystream position (f8) / packed (i, j) indices (ARC4) |
//! | 30    | ARC4 state-box input descriptor handle |
//! | 31    | ARC4 state-box output descriptor handle |
//!
//! Response: words 2..5 updated IV / chaining value, word 6 updated
//! keystream position or (i, j), word 7 actual output length.

use crate::algo::{FeedbackMode, SymKeyType};
use crate::token::{CommandToken, LocationCode, Opcode, ResponseToken};
use crate::transport::DescriptorHandle;
use coffer_error::CofferResult;

pub const SUBCODE: u8 = 0;

pub const WORD_FLAGS: usize = 2;
pub const WORD_DATA_LEN: usize = 3;
pub const WORD_INPUT_DESC: usize = 4;
pub const WORD_OUTPUT_DESC: usize = 5;
pub const WORD_KEY_LEN: usize = 6;
pub const WORD_KEY_ASSET: usize = 7;
pub const WORD_IV_ASSET: usize = 8;
pub const WORD_IV: usize = 9;
pub const WORD_KEY: usize = 13;
pub const WORD_F8_SALT: usize = 21;
pub const WORD_F8_IV: usize = 25;
pub const WORD_STREAM_POS: usize = 29;
pub const WORD_ARC4_STATE_DESC: usize = 30;
pub const WORD_ARC4_STATE_OUT_DESC: usize = 31;

pub const RESP_WORD_IV: usize = 2;
pub const RESP_WORD_STREAM_POS: usize = 6;
pub const RESP_WORD_OUTPUT_LEN: usize = 7;

pub const FLAG_ENCRYPT: u32 = 1 << 0;
pub const FLAG_INIT: u32 = 1 << 1;
pub const FLAG_FINAL: u32 = 1 << 2;
pub const FLAG_KEY_FROM_ASSET: u32 = 1 << 24;
const MODE_SHIFT: u32 = 4;
const KEY_TYPE_SHIFT: u32 = 8;
const IV_LOCATION_SHIFT: u32 = 20;

/// The longest cipher key a token carries inline (AES-256/Camellia-256).
/// ARC4 keys beyond this travel through the input descriptor alongside the
/// data; the state descriptor moves the 256-byte box.
pub const MAX_INLINE_KEY_SIZE: usize = 32;

pub fn command(token_id: u16) -> CommandToken {
    CommandToken::new(Opcode::Cipher, SUBCODE, token_id)
}

/// Select key type, feedback mode and direction. Owns bits 0..16 of the
/// flag word only.
pub fn set_control(
    cmd: &mut CommandToken,
    key_type: SymKeyType,
    mode: FeedbackMode,
    encrypt: bool,
) {
    let keep = cmd.0[WORD_FLAGS]
        & ((0x3 << IV_LOCATION_SHIFT) | FLAG_KEY_FROM_ASSET | FLAG_INIT | FLAG_FINAL);
    let mut flags =
        ((key_type as u32) << KEY_TYPE_SHIFT) | ((mode as u32) << MODE_SHIFT);
    if encrypt {
        flags |= FLAG_ENCRYPT;
    }
    cmd.0[WORD_FLAGS] = keep | flags;
}

/// Mark the first and/or last segment of a streaming cipher operation. The
/// init flag tells stream ciphers to run their key schedule.
pub fn set_segment(cmd: &mut CommandToken, init: bool, is_final: bool) {
    let mut flags = cmd.0[WORD_FLAGS] & !(FLAG_INIT | FLAG_FINAL);
    if init {
        flags |= FLAG_INIT;
    }
    if is_final {
        flags |= FLAG_FINAL;
    }
    cmd.0[WORD_FLAGS] = flags;
}

pub fn set_iv_location(cmd: &mut CommandToken, location: LocationCode) {
    cmd.0[WORD_FLAGS] = (cmd.0[WORD_FLAGS] & !(0x3 << IV_LOCATION_SHIFT))
        | ((location as u32) << IV_LOCATION_SHIFT);
}

pub fn set_iv_asset(cmd: &mut CommandToken, id: crate::AssetId) {
    cmd.0[WORD_IV_ASSET] = id.0;
}

pub fn write_iv(cmd: &mut CommandToken, iv: &[u8; 16]) {
    // Infallible: the IV words are inside the token by construction.
    let _ = cmd.write_bytes(WORD_IV, iv);
}

/// Use a key from the asset store; flips the flag bit and writes the
/// asset-id word, leaving the literal-key words untouched.
pub fn set_key_asset(cmd: &mut CommandToken, id: crate::AssetId, key_len: u32) {
    cmd.0[WORD_FLAGS] |= FLAG_KEY_FROM_ASSET;
    cmd.0[WORD_KEY_ASSET] = id.0;
    cmd.0[WORD_KEY_LEN] = key_len;
}

pub fn set_key_literal(cmd: &mut CommandToken, key: &[u8]) -> CofferResult<()> {
    cmd.0[WORD_FLAGS] &= !FLAG_KEY_FROM_ASSET;
    cmd.0[WORD_KEY_LEN] = key.len() as u32;
    if key.len() <= MAX_INLINE_KEY_SIZE {
        cmd.write_bytes(WORD_KEY, key)
    } else {
        // Oversized (ARC4) keys ride the input descriptor; only the length
        // is recorded here.
        Ok(())
    }
}

pub fn set_data(cmd: &mut CommandToken, input: DescriptorHandle, output: DescriptorHandle, len: u32) {
    cmd.0[WORD_INPUT_DESC] = input.0;
    cmd.0[WORD_OUTPUT_DESC] = output.0;
    cmd.0[WORD_DATA_LEN] = len;
}

/// f8 sub-state: salt key, f8 IV and keystream position.
pub fn set_f8_state(cmd: &mut CommandToken, salt: &[u8; 16], f8_iv: &[u8; 16], position: u32) {
    let _ = cmd.write_bytes(WORD_F8_SALT, salt);
    let _ = cmd.write_bytes(WORD_F8_IV, f8_iv);
    cmd.0[WORD_STREAM_POS] = position;
}

/// ARC4 sub-state: packed `(i, j)` indices plus the descriptors moving the
/// 256-byte state box in and back out.
pub fn set_arc4_state(
    cmd: &mut CommandToken,
    i: u8,
    j: u8,
    state_in: DescriptorHandle,
    state_out: DescriptorHandle,
) {
    cmd.0[WORD_STREAM_POS] = ((i as u32) << 8) | j as u32;
    cmd.0[WORD_ARC4_STATE_DESC] = state_in.0;
    cmd.0[WORD_ARC4_STATE_OUT_DESC] = state_out.0;
}

pub fn key_type(cmd: &CommandToken) -> CofferResult<SymKeyType> {
    SymKeyType::from_wire(((cmd.0[WORD_FLAGS] >> KEY_TYPE_SHIFT) & 0xFF) as u8)
}

pub fn mode(cmd: &CommandToken) -> CofferResult<FeedbackMode> {
    FeedbackMode::from_wire(((cmd.0[WORD_FLAGS] >> MODE_SHIFT) & 0xF) as u8)
}

pub fn is_encrypt(cmd: &CommandToken) -> bool {
    cmd.0[WORD_FLAGS] & FLAG_ENCRYPT != 0
}

pub fn is_init(cmd: &CommandToken) -> bool {
    cmd.0[WORD_FLAGS] & FLAG_INIT != 0
}

pub fn is_final(cmd: &CommandToken) -> bool {
    cmd.0[WORD_FLAGS] & FLAG_FINAL != 0
}

pub fn iv_location(cmd: &CommandToken) -> LocationCode {
    LocationCode::from_wire(((cmd.0[WORD_FLAGS] >> IV_LOCATION_SHIFT) & 0x3) as u8)
}

pub fn key_from_asset(cmd: &CommandToken) -> bool {
    cmd.0[WORD_FLAGS] & FLAG_KEY_FROM_ASSET != 0
}

pub fn read_updated_iv(resp: &ResponseToken, out: &mut [u8; 16]) {
    let _ = resp.read_bytes(RESP_WORD_IV, out);
}

pub fn write_updated_iv(resp: &mut ResponseToken, iv: &[u8; 16]) {
    let _ = resp.write_bytes(RESP_WORD_IV, iv);
}

pub fn output_len(resp: &ResponseToken) -> u32 {
    resp.0[RESP_WORD_OUTPUT_LEN]
}

pub fn set_output_len(resp: &mut ResponseToken, len: u32) {
    resp.0[RESP_WORD_OUTPUT_LEN] = len;
}

pub fn stream_position(resp: &ResponseToken) -> u32 {
    resp.0[RESP_WORD_STREAM_POS]
}

pub fn set_stream_position(resp: &mut ResponseToken, pos: u32) {
    resp.0[RESP_WORD_STREAM_POS] = pos;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetId;

    #[test]
    fn test_word_layout() {
        let mut cmd = command(0xA0A0);
        set_control(&mut cmd, SymKeyType::Aes, FeedbackMode::Cbc, true);
        set_iv_location(&mut cmd, LocationCode::InContext);
        write_iv(&mut cmd, &[0x10; 16]);
        set_key_literal(&mut cmd, &[0x22; 24]).unwrap();
        set_data(&mut cmd, DescriptorHandle(1), DescriptorHandle(2), 64);

        assert_eq!(cmd.0[0], 0x0400_A0A0);
        assert_eq!(
            cmd.0[WORD_FLAGS],
            FLAG_ENCRYPT | (1 << MODE_SHIFT) | (1 << KEY_TYPE_SHIFT)
        );
        assert_eq!(cmd.0[WORD_DATA_LEN], 64);
        assert_eq!(cmd.0[WORD_INPUT_DESC], 1);
        assert_eq!(cmd.0[WORD_OUTPUT_DESC], 2);
        assert_eq!(cmd.0[WORD_KEY_LEN], 24);
        assert_eq!(cmd.0[WORD_IV], 0x1010_1010);
        assert_eq!(cmd.0[WORD_KEY], 0x2222_2222);

        assert_eq!(key_type(&cmd).unwrap(), SymKeyType::Aes);
        assert_eq!(mode(&cmd).unwrap(), FeedbackMode::Cbc);
        assert!(is_encrypt(&cmd));
    }

    #[test]
    fn test_segment_flags_survive_control() {
        let mut cmd = command(0);
        set_segment(&mut cmd, true, false);
        set_control(&mut cmd, SymKeyType::Arc4, FeedbackMode::Stream, true);
        assert!(is_init(&cmd));
        assert!(!is_final(&cmd));
        assert_eq!(key_type(&cmd).unwrap(), SymKeyType::Arc4);

        set_segment(&mut cmd, false, true);
        assert!(!is_init(&cmd));
        assert!(is_final(&cmd));
        assert!(is_encrypt(&cmd));
    }

    #[test]
    fn test_key_asset_flag_layering() {
        let mut cmd = command(0);
        set_key_literal(&mut cmd, &[0x33; 16]).unwrap();
        set_key_asset(&mut cmd, AssetId(12), 16);
        set_control(&mut cmd, SymKeyType::Aes, FeedbackMode::Ecb, false);

        assert!(key_from_asset(&cmd));
        assert_eq!(cmd.0[WORD_KEY_ASSET], 12);
        // Literal region untouched by the asset selection.
        assert_eq!(cmd.0[WORD_KEY], 0x3333_3333);
        assert!(!is_encrypt(&cmd));
    }

    #[test]
    fn test_iv_location_bits() {
        let mut cmd = command(0);
        set_control(&mut cmd, SymKeyType::TripleDes, FeedbackMode::Cbc, true);
        set_iv_location(&mut cmd, LocationCode::FromAsset);
        set_iv_asset(&mut cmd, AssetId(0x55));

        assert_eq!(iv_location(&cmd), LocationCode::FromAsset);
        assert_eq!(cmd.0[WORD_IV_ASSET], 0x55);
        // Direction/mode bits survived the location write.
        assert_eq!(mode(&cmd).unwrap(), FeedbackMode::Cbc);
    }

    #[test]
    fn test_f8_and_arc4_substate() {
        let mut cmd = command(0);
        set_f8_state(&mut cmd, &[1; 16], &[2; 16], 77);
        assert_eq!(cmd.0[WORD_F8_SALT], 0x0101_0101);
        assert_eq!(cmd.0[WORD_F8_IV], 0x0202_0202);
        assert_eq!(cmd.0[WORD_STREAM_POS], 77);

        let mut cmd = command(0);
        set_arc4_state(&mut cmd, 0xAB, 0xCD, DescriptorHandle(6), DescriptorHandle(7));
        assert_eq!(cmd.0[WORD_STREAM_POS], 0xABCD);
        assert_eq!(cmd.0[WORD_ARC4_STATE_DESC], 6);
        assert_eq!(cmd.0[WORD_ARC4_STATE_OUT_DESC], 7);
    }
}
