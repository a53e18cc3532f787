/*++

Licensed under the Apache-2.0 license.

File Name:

    cipher_engine.rs

Abstract:

    File contains the model's block-cipher engine: AES/DES/3DES primitives
    and the ECB, CBC and counter feedback modes with resumable chaining
    state.

--*/

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use coffer_api::{HwStatus, SymKeyType};
use des::{Des, TdesEde3};

/// One keyed block-cipher instance. The variant is picked from the token's
/// key type and key length; lengths outside the engine's schedule are
/// refused before any state is touched.
pub(crate) enum BlockEngine {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
    Des(Des),
    TripleDes(TdesEde3),
}

impl BlockEngine {
    pub fn new(key_type: SymKeyType, key: &[u8]) -> Result<Self, HwStatus> {
        match key_type {
            SymKeyType::Aes => match key.len() {
                16 => Ok(BlockEngine::Aes128(
                    Aes128::new_from_slice(key).map_err(|_| HwStatus::InvalidKeySize)?,
                )),
                24 => Ok(BlockEngine::Aes192(
                    Aes192::new_from_slice(key).map_err(|_| HwStatus::InvalidKeySize)?,
                )),
                32 => Ok(BlockEngine::Aes256(
                    Aes256::new_from_slice(key).map_err(|_| HwStatus::InvalidKeySize)?,
                )),
                _ => Err(HwStatus::InvalidKeySize),
            },
            SymKeyType::Des => Ok(BlockEngine::Des(
                Des::new_from_slice(key).map_err(|_| HwStatus::InvalidKeySize)?,
            )),
            SymKeyType::TripleDes => Ok(BlockEngine::TripleDes(
                TdesEde3::new_from_slice(key).map_err(|_| HwStatus::InvalidKeySize)?,
            )),
            _ => Err(HwStatus::Unsupported),
        }
    }

    pub fn block_size(&self) -> usize {
        match self {
            BlockEngine::Aes128(_) | BlockEngine::Aes192(_) | BlockEngine::Aes256(_) => 16,
            BlockEngine::Des(_) | BlockEngine::TripleDes(_) => 8,
        }
    }

    /// Encrypt one block in place. `block` must be exactly
    /// [`BlockEngine::block_size`] bytes.
    pub fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockEngine::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Aes192(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Des(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::TripleDes(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    /// Decrypt one block in place.
    pub fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockEngine::Aes128(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Aes192(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Aes256(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::Des(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockEngine::TripleDes(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// ECB over whole blocks.
pub(crate) fn ecb(engine: &BlockEngine, encrypt: bool, data: &mut [u8]) {
    let bs = engine.block_size();
    for block in data.chunks_exact_mut(bs) {
        if encrypt {
            engine.encrypt_block(block);
        } else {
            engine.decrypt_block(block);
        }
    }
}

/// CBC over whole blocks. `chain` is the IV on entry and the next segment's
/// chaining value on exit.
pub(crate) fn cbc(engine: &BlockEngine, encrypt: bool, chain: &mut [u8], data: &mut [u8]) {
    let bs = engine.block_size();
    for block in data.chunks_exact_mut(bs) {
        if encrypt {
            xor_in_place(block, chain);
            engine.encrypt_block(block);
            chain.copy_from_slice(block);
        } else {
            let ciphertext: [u8; 16] = {
                let mut c = [0u8; 16];
                c[..bs].copy_from_slice(block);
                c
            };
            engine.decrypt_block(block);
            xor_in_place(block, chain);
            chain.copy_from_slice(&ciphertext[..bs]);
        }
    }
}

/// Big-endian increment of the low `window` bytes of the counter; a carry
/// out of the window is dropped (the ICM rollover rule).
fn increment(counter: &mut [u8], window: usize) {
    let n = counter.len();
    for i in (n - window..n).rev() {
        counter[i] = counter[i].wrapping_add(1);
        if counter[i] != 0 {
            break;
        }
    }
}

/// Counter mode. `window` is the number of counter bytes that increment:
/// the full block for CTR, two for ICM. The final chunk may be partial.
pub(crate) fn ctr(engine: &BlockEngine, counter: &mut [u8], data: &mut [u8], window: usize) {
    let bs = engine.block_size();
    for chunk in data.chunks_mut(bs) {
        let mut keystream = [0u8; 16];
        keystream[..bs].copy_from_slice(counter);
        engine.encrypt_block(&mut keystream[..bs]);
        xor_in_place(chunk, &keystream[..chunk.len()]);
        increment(counter, window);
    }
}
