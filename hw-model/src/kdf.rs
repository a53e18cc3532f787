/*++

Licensed under the Apache-2.0 license.

File Name:

    kdf.rs

Abstract:

    File contains the model's key derivation engine: AES-CMAC in counter
    mode over the caller's label, with the target asset's policy and size
    folded into the fixed input so a derived key is bound to the slot it
    was requested for.

--*/

use aes::{Aes128, Aes192, Aes256};
use cmac::{Cmac, Mac};
use coffer_api::{AssetPolicy, HwStatus};

fn round(kdk: &[u8], input: &[&[u8]]) -> Result<[u8; 16], HwStatus> {
    macro_rules! run {
        ($cipher:ty) => {{
            let mut mac = <Cmac<$cipher> as Mac>::new_from_slice(kdk)
                .map_err(|_| HwStatus::InvalidKeySize)?;
            for chunk in input {
                mac.update(chunk);
            }
            Ok(mac.finalize().into_bytes().into())
        }};
    }
    match kdk.len() {
        16 => run!(Aes128),
        24 => run!(Aes192),
        32 => run!(Aes256),
        _ => Err(HwStatus::InvalidKeySize),
    }
}

/// Derive `out_len` bytes from `kdk` for a target asset with the given
/// policy. Deterministic in all inputs; changing the label, the target
/// policy or the output size changes every output byte.
pub fn derive_key(
    kdk: &[u8],
    label: &[u8],
    policy: AssetPolicy,
    out_len: usize,
) -> Result<Vec<u8>, HwStatus> {
    let policy_bytes = policy.bits().to_le_bytes();
    let size_bytes = (out_len as u32).to_le_bytes();
    let bits_bytes = ((out_len as u32) * 8).to_be_bytes();

    let mut out = Vec::with_capacity(out_len);
    let mut counter = 1u32;
    while out.len() < out_len {
        let block = round(
            kdk,
            &[
                &counter.to_be_bytes(),
                label,
                &[0u8],
                &policy_bytes,
                &size_bytes,
                &bits_bytes,
            ],
        )?;
        out.extend_from_slice(&block);
        counter += 1;
    }
    out.truncate(out_len);
    Ok(out)
}
