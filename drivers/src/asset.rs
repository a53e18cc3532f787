/*++

Licensed under the Apache-2.0 license.

File Name:

    asset.rs

Abstract:

    File contains the asset store client: allocate/free/search, the
    temporary-asset inference table, key fill (plaintext, random, derive,
    import) and the atomic fill-and-wrap operations.

--*/

use crate::{CofferCm, CofferError, CofferResult};
use coffer_api::policy::AssetRole;
use coffer_api::{
    asset as wire, keyblob_size, AssetId, AssetPolicy, CofferTransport, FeedbackMode, HashAlgo,
    KeyShape, MacAlgo, SymKeyType, MAX_ASSET_SIZE, MAX_DERIVE_LABEL_SIZE, MAX_KEYBLOB_AAD_SIZE,
};

/// Static asset number of the device root key provisioned at manufacture.
pub const ROOT_KEY_INDEX: u32 = 1;

/// Which operation a temporary state asset is for. The (operation) →
/// (role, size) inference is fixed; pairs outside the table are refused
/// locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempAssetFor {
    /// Parked digest state of a streaming hash.
    Hash(HashAlgo),

    /// Parked intermediate state of a streaming MAC.
    Mac(MacAlgo),

    /// Chained IV / counter / C-CBC state of a streaming cipher.
    Cipher(SymKeyType, FeedbackMode),
}

impl TempAssetFor {
    /// The role policy and size the store slot must have.
    pub(crate) fn mapping(self) -> CofferResult<(AssetPolicy, u32)> {
        let (role, size) = match self {
            TempAssetFor::Hash(algo) => (AssetRole::AuthState, algo.state_size()),
            TempAssetFor::Mac(algo) => (AssetRole::TempMac, algo.state_size()),
            TempAssetFor::Cipher(key_type, mode) => match (key_type, mode) {
                (SymKeyType::Aes, FeedbackMode::Cbc) => (AssetRole::Iv, 16),
                (SymKeyType::Aes, FeedbackMode::Ctr | FeedbackMode::Icm) => {
                    (AssetRole::Counter, 16)
                }
                (SymKeyType::Camellia, FeedbackMode::Cbc) => (AssetRole::Iv, 16),
                (
                    SymKeyType::Des | SymKeyType::TripleDes | SymKeyType::Multi2,
                    FeedbackMode::Cbc,
                ) => (AssetRole::Iv, 8),
                (SymKeyType::C2, FeedbackMode::CCbc) => (AssetRole::CcbcState, 8),
                _ => return Err(CofferError::DRIVER_ASSET_NO_TEMP_MAPPING),
            },
        };
        if size == 0 {
            return Err(CofferError::DRIVER_ASSET_NO_TEMP_MAPPING);
        }
        Ok((role.policy(), size as u32))
    }
}

fn check_size(size: usize) -> CofferResult<()> {
    if size == 0 || size > MAX_ASSET_SIZE {
        return Err(CofferError::DRIVER_ASSET_INVALID_SIZE);
    }
    Ok(())
}

fn check_id(id: AssetId) -> CofferResult<()> {
    if !id.is_valid() {
        return Err(CofferError::DRIVER_ASSET_INVALID_ID);
    }
    Ok(())
}

impl<T: CofferTransport> CofferCm<T> {
    /// Allocate an empty asset slot. The policy must describe exactly one
    /// recognized key shape; unclassifiable masks are refused with no
    /// hardware contact. The classified shape is recorded so later key use
    /// through this handle is checked before a token is built.
    pub fn allocate(&self, policy: AssetPolicy, size: usize) -> CofferResult<AssetId> {
        check_size(size)?;
        let shape = KeyShape::classify(policy)?;
        let mut cmd = wire::create_command(0, policy, size as u32);
        let resp = self.channel.exchange(&mut cmd)?;
        let id = wire::created_id(&resp);
        check_id(id)?;
        self.record_shape(id, shape);
        Ok(id)
    }

    /// Allocate a temporary streaming-state asset for the given operation,
    /// with role and size inferred from the fixed table.
    pub fn allocate_temporary(&self, purpose: TempAssetFor) -> CofferResult<AssetId> {
        let (policy, size) = purpose.mapping()?;
        self.allocate(policy, size as usize)
    }

    /// Free an asset slot. Static assets are refused by the module.
    pub fn free(&self, id: AssetId) -> CofferResult<()> {
        check_id(id)?;
        let mut cmd = wire::delete_command(0, id);
        self.channel.exchange(&mut cmd)?;
        self.forget_shape(id);
        Ok(())
    }

    /// Look up a static asset by its provisioned number.
    pub fn search(&self, static_number: u32) -> CofferResult<AssetId> {
        let mut cmd = wire::search_command(0, static_number);
        let resp = self.channel.exchange(&mut cmd)?;
        let id = wire::found_id(&resp);
        check_id(id)?;
        Ok(id)
    }

    /// The device root key, or [`AssetId::INVALID`] if the attached module
    /// was provisioned without one. Never fails.
    pub fn get_root_key(&self) -> AssetId {
        self.search(ROOT_KEY_INDEX).unwrap_or(AssetId::INVALID)
    }

    /// Fill an empty asset with caller-supplied plaintext. The length must
    /// equal the allocated size; the store enforces it.
    pub fn load_key(&self, id: AssetId, key: &[u8]) -> CofferResult<()> {
        check_id(id)?;
        check_size(key.len())?;
        let mut cmd = wire::load_command(0, id, wire::LoadMethod::Plaintext);
        self.channel.with_transport(|t| {
            let input = t
                .prepare_input(key)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_load_payload(&mut cmd, 0, key.len() as u32, input);
            self.channel.round_trip(t, &mut cmd)
        })?;
        Ok(())
    }

    /// Fill an empty asset from the hardware RNG.
    pub fn gen_key(&self, id: AssetId, size: usize) -> CofferResult<()> {
        check_id(id)?;
        check_size(size)?;
        let mut cmd = wire::load_command(0, id, wire::LoadMethod::Random);
        wire::set_random_size(&mut cmd, size as u32);
        self.channel.exchange(&mut cmd)?;
        Ok(())
    }

    /// Fill an empty asset deterministically from a KDK and a label. Same
    /// KDK, same label, same target policy and size always produce the same
    /// key material.
    pub fn derive(&self, target: AssetId, kdk: AssetId, label: &[u8]) -> CofferResult<()> {
        check_id(target)?;
        check_id(kdk)?;
        self.check_known_shape(kdk, |shape| matches!(shape, KeyShape::Kdk { .. }))?;
        if label.is_empty() || label.len() > MAX_DERIVE_LABEL_SIZE {
            return Err(CofferError::DRIVER_ASSET_LABEL_LENGTH);
        }
        let mut cmd = wire::load_command(0, target, wire::LoadMethod::Derive);
        wire::set_source_key(&mut cmd, kdk);
        self.channel.with_transport(|t| {
            let input = t
                .prepare_input(label)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_load_payload(&mut cmd, label.len() as u32, 0, input);
            self.channel.round_trip(t, &mut cmd)
        })?;
        Ok(())
    }

    /// Fill an empty asset from a keyblob, authenticating it against the KEK
    /// and the additional data it was exported under. Fails closed: an
    /// authentication failure leaves the target empty.
    pub fn import(
        &self,
        target: AssetId,
        kek: AssetId,
        aad: &[u8],
        blob: &[u8],
    ) -> CofferResult<()> {
        check_id(target)?;
        check_id(kek)?;
        self.check_known_shape(kek, |shape| {
            matches!(shape, KeyShape::Kek { unwrap: true, .. })
        })?;
        if aad.len() > MAX_KEYBLOB_AAD_SIZE {
            return Err(CofferError::DRIVER_ASSET_AAD_TOO_LONG);
        }
        if blob.len() <= coffer_api::KEYBLOB_OVERHEAD
            || blob.len() > keyblob_size(MAX_ASSET_SIZE)
        {
            return Err(CofferError::DRIVER_ASSET_BLOB_LENGTH);
        }
        let mut cmd = wire::load_command(0, target, wire::LoadMethod::Import);
        wire::set_source_key(&mut cmd, kek);
        let mut combined = Vec::with_capacity(aad.len() + blob.len());
        combined.extend_from_slice(aad);
        combined.extend_from_slice(blob);
        self.channel.with_transport(|t| {
            let input = t
                .prepare_input(&combined)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_load_payload(&mut cmd, aad.len() as u32, blob.len() as u32, input);
            self.channel.round_trip(t, &mut cmd)
        })?;
        Ok(())
    }

    /// Fill an asset with plaintext and export its keyblob in one
    /// round-trip. Returns the blob length written into `blob_out`; the
    /// buffer must hold at least `keyblob_size(key.len())` bytes.
    pub fn load_key_and_wrap(
        &self,
        id: AssetId,
        key: &[u8],
        kek: AssetId,
        aad: &[u8],
        blob_out: &mut [u8],
    ) -> CofferResult<usize> {
        check_size(key.len())?;
        let mut cmd = wire::load_command(0, id, wire::LoadMethod::Plaintext);
        self.fill_and_wrap(&mut cmd, kek, aad, key, key.len(), blob_out)
    }

    /// Fill an asset from the RNG and export its keyblob in one round-trip.
    pub fn gen_key_and_wrap(
        &self,
        id: AssetId,
        size: usize,
        kek: AssetId,
        aad: &[u8],
        blob_out: &mut [u8],
    ) -> CofferResult<usize> {
        check_size(size)?;
        let mut cmd = wire::load_command(0, id, wire::LoadMethod::Random);
        wire::set_random_size(&mut cmd, size as u32);
        self.fill_and_wrap(&mut cmd, kek, aad, &[], size, blob_out)
    }

    /// Shared tail of the atomic fill-and-wrap operations: one token carries
    /// the fill and the export, so no observable window exists in which the
    /// key is loaded but not yet wrapped.
    fn fill_and_wrap(
        &self,
        cmd: &mut coffer_api::CommandToken,
        kek: AssetId,
        aad: &[u8],
        payload: &[u8],
        asset_size: usize,
        blob_out: &mut [u8],
    ) -> CofferResult<usize> {
        check_id(wire::load_target(cmd))?;
        check_id(kek)?;
        self.check_known_shape(kek, |shape| {
            matches!(shape, KeyShape::Kek { wrap: true, .. })
        })?;
        if aad.len() > MAX_KEYBLOB_AAD_SIZE {
            return Err(CofferError::DRIVER_ASSET_AAD_TOO_LONG);
        }
        let required = keyblob_size(asset_size);
        if blob_out.len() < required {
            return Err(CofferError::DRIVER_BUFFER_TOO_SMALL);
        }
        let mut combined = Vec::with_capacity(aad.len() + payload.len());
        combined.extend_from_slice(aad);
        combined.extend_from_slice(payload);
        let blob_len = self.channel.with_transport(|t| {
            let input = t
                .prepare_input(&combined)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            let output = t
                .prepare_output(required)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_load_payload(cmd, aad.len() as u32, payload.len() as u32, input);
            wire::set_wrap_request(cmd, kek, output);
            let resp = self.channel.round_trip(t, cmd)?;
            let blob_len = wire::blob_len(&resp) as usize;
            if blob_len > blob_out.len() {
                return Err(CofferError::DRIVER_ASSET_BLOB_LENGTH);
            }
            t.read_output(output, &mut blob_out[..blob_len])
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            Ok(blob_len)
        })?;
        if blob_len != required {
            return Err(CofferError::DRIVER_ASSET_BLOB_LENGTH);
        }
        Ok(blob_len)
    }
}
