/*++

Licensed under the Apache-2.0 license.

File Name:

    keyblob.rs

Abstract:

    File contains the model's keyblob engine. A blob is ciphertext followed
    by a 16-byte tag with no nonce: the tag is an S2V vector MAC binding the
    asset's policy, size, the caller's additional data and the key material,
    and it doubles as the synthetic counter for the encryption pass.

--*/

use crate::mac_engine::dbl;
use aes::Aes128;
use cmac::{Cmac, Mac};
use coffer_api::{AssetPolicy, HwStatus, KEYBLOB_OVERHEAD, MAX_KEYBLOB_AAD_SIZE};
use ctr::cipher::{KeyIvInit, StreamCipher};

/// KEK assets are two AES-128 subkeys: tag key then encryption key.
pub const KEK_SIZE: usize = 32;

type KeyblobCtr = ctr::Ctr128BE<Aes128>;

/// One-shot AES-128-CMAC over concatenated chunks.
pub(crate) fn cmac_aes(key: &[u8], chunks: &[&[u8]]) -> Result<[u8; 16], HwStatus> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .map_err(|_| HwStatus::InvalidKeySize)?;
    for chunk in chunks {
        mac.update(chunk);
    }
    Ok(mac.finalize().into_bytes().into())
}

fn header(policy: AssetPolicy, size: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&policy.bits().to_le_bytes());
    out[4..].copy_from_slice(&size.to_le_bytes());
    out
}

/// S2V over the fixed component vector [header, aad, payload]. The
/// component count is fixed, so an empty AAD is still a component and
/// cannot collide with its absence.
fn s2v(
    tag_key: &[u8],
    policy: AssetPolicy,
    aad: &[u8],
    payload: &[u8],
) -> Result<[u8; 16], HwStatus> {
    let mut d = cmac_aes(tag_key, &[&[0u8; 16]])?;
    d = dbl(&d);
    for (x, y) in d
        .iter_mut()
        .zip(cmac_aes(tag_key, &[&header(policy, payload.len() as u32)])?)
    {
        *x ^= y;
    }
    d = dbl(&d);
    for (x, y) in d.iter_mut().zip(cmac_aes(tag_key, &[aad])?) {
        *x ^= y;
    }

    if payload.len() >= 16 {
        let mut t = payload.to_vec();
        let n = t.len();
        for i in 0..16 {
            t[n - 16 + i] ^= d[i];
        }
        cmac_aes(tag_key, &[&t])
    } else {
        d = dbl(&d);
        let mut padded = [0u8; 16];
        padded[..payload.len()].copy_from_slice(payload);
        padded[payload.len()] = 0x80;
        for (x, y) in padded.iter_mut().zip(d) {
            *x ^= y;
        }
        cmac_aes(tag_key, &[&padded])
    }
}

fn counter_from_tag(tag: &[u8; 16]) -> [u8; 16] {
    let mut iv = *tag;
    // Clearing two bits bounds the counter run below any tag collision.
    iv[8] &= 0x7F;
    iv[12] &= 0x7F;
    iv
}

fn apply_ctr(enc_key: &[u8], tag: &[u8; 16], data: &mut [u8]) -> Result<(), HwStatus> {
    let mut cipher = KeyblobCtr::new_from_slices(enc_key, &counter_from_tag(tag))
        .map_err(|_| HwStatus::InvalidKeySize)?;
    cipher.apply_keystream(data);
    Ok(())
}

/// Export `payload` under `kek`, bound to the asset's policy and size and
/// the caller's AAD. Deterministic: identical inputs produce an identical
/// blob.
pub fn wrap(
    kek: &[u8],
    policy: AssetPolicy,
    aad: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, HwStatus> {
    if kek.len() != KEK_SIZE {
        return Err(HwStatus::InvalidKeySize);
    }
    if aad.len() > MAX_KEYBLOB_AAD_SIZE {
        return Err(HwStatus::InvalidLength);
    }
    let (tag_key, enc_key) = kek.split_at(16);
    let tag = s2v(tag_key, policy, aad, payload)?;
    let mut blob = payload.to_vec();
    apply_ctr(enc_key, &tag, &mut blob)?;
    blob.extend_from_slice(&tag);
    Ok(blob)
}

/// Authenticate and decrypt a blob produced by [`wrap`]. The target's
/// policy and size participate in the tag, so a blob can only ever open
/// into a slot shaped like the one it was exported from.
pub fn unwrap(
    kek: &[u8],
    policy: AssetPolicy,
    size: u32,
    aad: &[u8],
    blob: &[u8],
) -> Result<Vec<u8>, HwStatus> {
    if kek.len() != KEK_SIZE {
        return Err(HwStatus::InvalidKeySize);
    }
    if aad.len() > MAX_KEYBLOB_AAD_SIZE || blob.len() <= KEYBLOB_OVERHEAD {
        return Err(HwStatus::InvalidLength);
    }
    let (ciphertext, tag_bytes) = blob.split_at(blob.len() - KEYBLOB_OVERHEAD);
    if ciphertext.len() != size as usize {
        return Err(HwStatus::InvalidLength);
    }
    let mut tag = [0u8; 16];
    tag.copy_from_slice(tag_bytes);

    let (tag_key, enc_key) = kek.split_at(16);
    let mut payload = ciphertext.to_vec();
    apply_ctr(enc_key, &tag, &mut payload)?;

    let expected = s2v(tag_key, policy, aad, &payload)?;
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(tag) {
        diff |= a ^ b;
    }
    if diff != 0 {
        return Err(HwStatus::UnwrapError);
    }
    Ok(payload)
}
