/*++

Licensed under the Apache-2.0 license.

File Name:

    mac_engine.rs

Abstract:

    File contains the model's cipher-MAC engine: AES-CMAC and AES-CBC-MAC
    over a resumable 16-byte chaining value. The subkey tweak is applied to
    the final block only, which always arrives in the final token.

--*/

use crate::cipher_engine::BlockEngine;

const BLOCK: usize = 16;

/// GF(2^128) doubling used by the CMAC subkey schedule and S2V.
pub(crate) fn dbl(block: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut carry = 0u8;
    for i in (0..16).rev() {
        out[i] = (block[i] << 1) | carry;
        carry = block[i] >> 7;
    }
    if carry != 0 {
        out[15] ^= 0x87;
    }
    out
}

fn xor_in_place(dst: &mut [u8; 16], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// Absorb whole blocks into the chaining value (plain CBC, zero feedback
/// output).
pub(crate) fn absorb(engine: &BlockEngine, chain: &mut [u8; 16], data: &[u8]) {
    for block in data.chunks_exact(BLOCK) {
        xor_in_place(chain, block);
        engine.encrypt_block(&mut chain[..]);
    }
}

fn subkeys(engine: &BlockEngine) -> ([u8; 16], [u8; 16]) {
    let mut l = [0u8; 16];
    engine.encrypt_block(&mut l[..]);
    let k1 = dbl(&l);
    let k2 = dbl(&k1);
    (k1, k2)
}

/// CMAC finish: absorb all but the last block of `tail` plainly, XOR the
/// last (whole or padded) block with the matching subkey, and encrypt.
pub(crate) fn cmac_finish(engine: &BlockEngine, mut chain: [u8; 16], tail: &[u8]) -> [u8; 16] {
    let (k1, k2) = subkeys(engine);
    let (body, last) = if !tail.is_empty() && tail.len() % BLOCK == 0 {
        tail.split_at(tail.len() - BLOCK)
    } else {
        tail.split_at(tail.len() - tail.len() % BLOCK)
    };
    absorb(engine, &mut chain, body);

    let mut block = [0u8; 16];
    if last.len() == BLOCK {
        block.copy_from_slice(last);
        xor_in_place(&mut block, &k1);
    } else {
        block[..last.len()].copy_from_slice(last);
        block[last.len()] = 0x80;
        xor_in_place(&mut block, &k2);
    }
    xor_in_place(&mut chain, &block);
    engine.encrypt_block(&mut chain[..]);
    chain
}

/// CBC-MAC finish: absorb whole blocks, zero-pad a partial tail. An empty
/// tail leaves the chaining value as the MAC.
pub(crate) fn cbc_mac_finish(engine: &BlockEngine, mut chain: [u8; 16], tail: &[u8]) -> [u8; 16] {
    let full = tail.len() - tail.len() % BLOCK;
    absorb(engine, &mut chain, &tail[..full]);
    let rem = &tail[full..];
    if !rem.is_empty() {
        let mut block = [0u8; 16];
        block[..rem.len()].copy_from_slice(rem);
        xor_in_place(&mut chain, &block);
        engine.encrypt_block(&mut chain[..]);
    }
    chain
}
