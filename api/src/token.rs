// Licensed under the Apache-2.0 license

//! Command/response token word arrays and the shared header/checksum words.

use coffer_error::{CofferError, CofferResult};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Every token is this many 32-bit words, both directions.
pub const TOKEN_WORDS: usize = 64;

/// Word offset of the checksum in a command token.
pub const CMD_WORD_CHECKSUM: usize = 1;

/// Word offset of the status in a response token.
pub const RESP_WORD_STATUS: usize = 1;

/// Operation families. The opcode occupies the top byte of word 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Hash = 0x02,
    Mac = 0x03,
    Cipher = 0x04,
    Asset = 0x07,
    System = 0x0F,
}

impl TryFrom<u8> for Opcode {
    type Error = CofferError;
    fn try_from(value: u8) -> CofferResult<Self> {
        match value {
            0x02 => Ok(Opcode::Hash),
            0x03 => Ok(Opcode::Mac),
            0x04 => Ok(Opcode::Cipher),
            0x07 => Ok(Opcode::Asset),
            0x0F => Ok(Opcode::System),
            _ => Err(CofferError::API_TOKEN_INVALID_OPCODE),
        }
    }
}

/// Command token.
///
/// Word 0: bits 31:24 opcode, bits 23:20 subcode, bits 15:0 token identifier
/// (echoed by the module in response word 0). Word 1: checksum over all other
/// words. Words 2.. are owned by the opcode family.
#[repr(C)]
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct CommandToken(pub [u32; TOKEN_WORDS]);

/// Response token.
///
/// Word 0 echoes the command header. Word 1 is the status word: zero on
/// success, otherwise bits 7:0 carry the error subcode and bits 31:24 the
/// category group (see [`crate::status`]).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub struct ResponseToken(pub [u32; TOKEN_WORDS]);

impl Default for CommandToken {
    fn default() -> Self {
        Self([0; TOKEN_WORDS])
    }
}

impl Default for ResponseToken {
    fn default() -> Self {
        Self([0; TOKEN_WORDS])
    }
}

fn pack_header(opcode: Opcode, subcode: u8, token_id: u16) -> u32 {
    ((opcode as u32) << 24) | (((subcode as u32) & 0xF) << 20) | token_id as u32
}

impl CommandToken {
    /// Start a token for `(opcode, subcode)` with caller identifier
    /// `token_id`. All family words start zeroed.
    pub fn new(opcode: Opcode, subcode: u8, token_id: u16) -> Self {
        let mut words = [0u32; TOKEN_WORDS];
        words[0] = pack_header(opcode, subcode, token_id);
        Self(words)
    }

    pub fn opcode(&self) -> CofferResult<Opcode> {
        Opcode::try_from((self.0[0] >> 24) as u8)
    }

    pub fn subcode(&self) -> u8 {
        ((self.0[0] >> 20) & 0xF) as u8
    }

    pub fn token_id(&self) -> u16 {
        self.0[0] as u16
    }

    /// Write the checksum word. Call after every family builder has run;
    /// builders never touch word 1.
    pub fn populate_checksum(&mut self) {
        self.0[CMD_WORD_CHECKSUM] = 0;
        let mut sum = 0u32;
        for (idx, word) in self.0.iter().enumerate() {
            if idx != CMD_WORD_CHECKSUM {
                sum = sum.wrapping_add(byte_sum(*word));
            }
        }
        self.0[CMD_WORD_CHECKSUM] = 0u32.wrapping_sub(sum);
    }

    /// Verify the checksum word (module side).
    pub fn verify_checksum(&self) -> bool {
        let mut sum = self.0[CMD_WORD_CHECKSUM];
        for (idx, word) in self.0.iter().enumerate() {
            if idx != CMD_WORD_CHECKSUM {
                sum = sum.wrapping_add(byte_sum(*word));
            }
        }
        sum == 0
    }

    /// Copy `data` into the inline payload words starting at `word_offset`.
    /// Fails if the bytes would run past the end of the token; partial final
    /// words are zero-padded (tokens are always fully zeroed at build time).
    pub fn write_bytes(&mut self, word_offset: usize, data: &[u8]) -> CofferResult<()> {
        let words = data.len().div_ceil(4);
        if word_offset + words > TOKEN_WORDS {
            return Err(CofferError::API_TOKEN_PAYLOAD_RANGE);
        }
        for (i, chunk) in data.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.0[word_offset + i] = u32::from_le_bytes(word);
        }
        Ok(())
    }

    /// Read `buf.len()` bytes out of the inline payload words starting at
    /// `word_offset` (module side).
    pub fn read_bytes(&self, word_offset: usize, buf: &mut [u8]) -> CofferResult<()> {
        read_words_le(&self.0, word_offset, buf)
    }
}

impl ResponseToken {
    /// Start a success response echoing the command header.
    pub fn reply_to(cmd: &CommandToken) -> Self {
        let mut words = [0u32; TOKEN_WORDS];
        words[0] = cmd.0[0];
        Self(words)
    }

    pub fn token_id(&self) -> u16 {
        self.0[0] as u16
    }

    pub fn status_word(&self) -> u32 {
        self.0[RESP_WORD_STATUS]
    }

    /// Check that this response answers `cmd` (header echo).
    pub fn matches(&self, cmd: &CommandToken) -> bool {
        self.0[0] == cmd.0[0]
    }

    pub fn write_bytes(&mut self, word_offset: usize, data: &[u8]) -> CofferResult<()> {
        let words = data.len().div_ceil(4);
        if word_offset + words > TOKEN_WORDS {
            return Err(CofferError::API_TOKEN_PAYLOAD_RANGE);
        }
        for (i, chunk) in data.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.0[word_offset + i] = u32::from_le_bytes(word);
        }
        Ok(())
    }

    pub fn read_bytes(&self, word_offset: usize, buf: &mut [u8]) -> CofferResult<()> {
        read_words_le(&self.0, word_offset, buf)
    }
}

fn read_words_le(words: &[u32; TOKEN_WORDS], word_offset: usize, buf: &mut [u8]) -> CofferResult<()> {
    let nwords = buf.len().div_ceil(4);
    if word_offset + nwords > TOKEN_WORDS {
        return Err(CofferError::API_TOKEN_PAYLOAD_RANGE);
    }
    for (i, chunk) in buf.chunks_mut(4).enumerate() {
        let word = words[word_offset + i].to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
    Ok(())
}

fn byte_sum(word: u32) -> u32 {
    word.to_le_bytes()
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_add(*b as u32))
}

/// Two-bit wire encoding of a streaming-state location request. After a
/// call completes the driver normalizes its context back to the
/// {InContext, InAsset} subset; ToAsset/FromAsset only ever appear in
/// command tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LocationCode {
    InContext = 0,
    InAsset = 1,
    ToAsset = 2,
    FromAsset = 3,
}

impl LocationCode {
    pub fn from_wire(value: u8) -> Self {
        match value & 0x3 {
            0 => LocationCode::InContext,
            1 => LocationCode::InAsset,
            2 => LocationCode::ToAsset,
            _ => LocationCode::FromAsset,
        }
    }
}

/// Calculate the two's-complement byte-sum checksum over `data`.
pub fn calc_checksum(data: &[u8]) -> u32 {
    let mut checksum = 0u32;
    for d in data {
        checksum = checksum.wrapping_add(*d as u32);
    }
    0u32.wrapping_sub(checksum)
}

/// Verify a two's-complement byte-sum checksum.
pub fn verify_checksum(checksum: u32, data: &[u8]) -> bool {
    calc_checksum(data) == checksum
}
