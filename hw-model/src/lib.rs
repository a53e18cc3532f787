/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    In-process model of the Coffer crypto module. Implements the transport
    trait directly: command tokens come in, the token families are parsed
    and executed against a software asset store and software crypto engines,
    and response tokens go back out. Deterministic for a given seed.

--*/

mod cipher_engine;
mod hash_engine;
pub mod kdf;
pub mod keyblob;
mod mac_engine;
mod store;

pub use store::{MAX_ASSETS, ROOT_KEY_NUMBER};

use crate::cipher_engine::BlockEngine;
use crate::hash_engine::{hmac_pad_block, HashState};
use crate::store::AssetStore;
use coffer_api::asset::LoadMethod;
use coffer_api::policy::CipherAlgo;
use coffer_api::{
    asset, cipher, hash, mac, system, AssetId, AssetPolicy, CofferCapabilities, CofferTransport,
    CommandToken, DescriptorHandle, FeedbackMode, HwStatus, KeyShape, LocationCode, MacAlgo,
    Opcode, ResponseToken, SymKeyType, TransportError, MAX_DERIVE_LABEL_SIZE,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Version word the model's Version token reports.
pub const FIRMWARE_VERSION: u32 = 0x0002_0001;

/// Engine families the model implements. The wire protocol names more
/// (ARC4, Camellia, C2, Multi2, AES-f8); the model answers those with an
/// Unsupported status, which is exactly what a module built without the
/// optional engines does.
pub const MODEL_CAPABILITIES: CofferCapabilities = CofferCapabilities::SHA1
    .union(CofferCapabilities::SHA2)
    .union(CofferCapabilities::HMAC)
    .union(CofferCapabilities::AES)
    .union(CofferCapabilities::DES)
    .union(CofferCapabilities::TDES)
    .union(CofferCapabilities::CMAC)
    .union(CofferCapabilities::CBC_MAC)
    .union(CofferCapabilities::KEYBLOB)
    .union(CofferCapabilities::DERIVE)
    .union(CofferCapabilities::RNG);

fn rng_block(seed: u64, counter: u64) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(seed.to_le_bytes());
    h.update(counter.to_le_bytes());
    h.finalize().into()
}

struct OutputBuf {
    capacity: usize,
    data: Vec<u8>,
}

/// The modeled module. One instance is one powered-on device: the asset
/// store, descriptor pools and RNG stream live for the instance's lifetime.
pub struct CofferModel {
    store: AssetStore,
    inputs: HashMap<u32, Vec<u8>>,
    outputs: HashMap<u32, OutputBuf>,
    next_desc: u32,
    seed: u64,
    rng_counter: u64,
}

impl CofferModel {
    /// Power on a model. The root key and every random fill derive from
    /// `seed`, so two models with the same seed are interchangeable.
    pub fn new(seed: u64) -> Self {
        CofferModel {
            store: AssetStore::new(rng_block(seed, 0)),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            next_desc: 1,
            seed,
            rng_counter: 1,
        }
    }

    fn mint_desc(&mut self) -> u32 {
        let desc = self.next_desc;
        self.next_desc += 1;
        desc
    }

    fn rng_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            out.extend_from_slice(&rng_block(self.seed, self.rng_counter));
            self.rng_counter += 1;
        }
        out.truncate(n);
        out
    }

    /// Consume the input descriptor named by a token word. Descriptor zero
    /// with an expected length of zero is "no payload".
    fn take_input(&mut self, desc: u32, expected: usize) -> Result<Vec<u8>, HwStatus> {
        if desc == 0 {
            return if expected == 0 {
                Ok(Vec::new())
            } else {
                Err(HwStatus::InvalidCommand)
            };
        }
        let data = self.inputs.remove(&desc).ok_or(HwStatus::InvalidCommand)?;
        if data.len() != expected {
            return Err(HwStatus::InvalidLength);
        }
        Ok(data)
    }

    fn write_output(&mut self, desc: u32, bytes: &[u8]) -> Result<(), HwStatus> {
        let buf = self.outputs.get_mut(&desc).ok_or(HwStatus::InvalidCommand)?;
        if buf.capacity < bytes.len() {
            return Err(HwStatus::BufferTooSmall);
        }
        buf.data = bytes.to_vec();
        Ok(())
    }

    fn handle(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        let opcode = cmd.opcode().map_err(|_| HwStatus::InvalidCommand)?;
        match opcode {
            Opcode::Hash => self.hash_op(cmd, resp),
            Opcode::Mac => self.mac_op(cmd, resp),
            Opcode::Cipher => self.cipher_op(cmd, resp),
            Opcode::Asset => self.asset_op(cmd, resp),
            Opcode::System => self.system_op(cmd, resp),
        }
    }

    // ---- Hash family ----

    fn hash_op(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        if cmd.subcode() != hash::SUBCODE {
            return Err(HwStatus::InvalidCommand);
        }
        let algo = hash::algo(cmd).map_err(|_| HwStatus::InvalidAlgorithm)?;
        if !MODEL_CAPABILITIES.supports_hash(algo) {
            return Err(HwStatus::Unsupported);
        }
        let (flags, loc) = hash::control(cmd);
        let init = flags & hash::FLAG_INIT != 0;
        let is_final = flags & hash::FLAG_FINAL != 0;
        let data =
            self.take_input(cmd.0[hash::WORD_INPUT_DESC], cmd.0[hash::WORD_DATA_LEN] as usize)?;
        if !is_final && data.len() % algo.block_size() != 0 {
            return Err(HwStatus::InvalidLength);
        }

        let state_asset = AssetId(cmd.0[hash::WORD_STATE_ASSET]);
        let mut state = if init {
            HashState::new(algo)
        } else {
            match loc {
                LocationCode::InContext | LocationCode::ToAsset => {
                    let mut bytes = [0u8; 64];
                    let n = algo.state_size();
                    cmd.read_bytes(hash::WORD_STATE, &mut bytes[..n])
                        .map_err(|_| HwStatus::InternalError)?;
                    HashState::from_bytes(algo, &bytes[..n])?
                }
                LocationCode::InAsset | LocationCode::FromAsset => {
                    let bytes = self.store.read_state(
                        state_asset,
                        AssetPolicy::ROLE_AUTH_STATE,
                        algo.state_size(),
                    )?;
                    HashState::from_bytes(algo, &bytes)?
                }
            }
        };

        if is_final {
            let digest = state.finish(algo, &data, hash::total_length(cmd));
            hash::write_digest(resp, &digest).map_err(|_| HwStatus::InternalError)?;
        } else {
            state.compress(&data);
            match loc {
                LocationCode::InAsset | LocationCode::ToAsset => {
                    self.store.write_state(
                        state_asset,
                        AssetPolicy::ROLE_AUTH_STATE,
                        &state.to_bytes(),
                    )?;
                }
                LocationCode::InContext | LocationCode::FromAsset => {
                    hash::write_digest(resp, &state.to_bytes())
                        .map_err(|_| HwStatus::InternalError)?;
                }
            }
        }
        Ok(())
    }

    // ---- MAC family ----

    fn mac_key(&self, cmd: &CommandToken, algo: MacAlgo) -> Result<Vec<u8>, HwStatus> {
        if mac::key_from_asset(cmd) {
            let (key, policy) = self.store.read_key(AssetId(cmd.0[mac::WORD_KEY_ASSET]))?;
            let shape = KeyShape::classify(policy).map_err(|_| HwStatus::InvalidParameter)?;
            let allowed = match (algo.hash_algo(), shape) {
                (Some(h), KeyShape::HmacKey { hash }) => hash == h,
                (
                    None,
                    KeyShape::CipherMacKey {
                        algo: CipherAlgo::Aes,
                    },
                ) => true,
                _ => false,
            };
            if !allowed {
                return Err(HwStatus::InvalidParameter);
            }
            // Zero means "take the length from the slot".
            let declared = cmd.0[mac::WORD_KEY_LEN] as usize;
            if declared != 0 && declared != key.len() {
                return Err(HwStatus::InvalidKeySize);
            }
            Ok(key)
        } else {
            let len = cmd.0[mac::WORD_KEY_LEN] as usize;
            if len == 0 || len > mac::MAX_INLINE_KEY_SIZE {
                return Err(HwStatus::InvalidKeySize);
            }
            let mut key = vec![0u8; len];
            cmd.read_bytes(mac::WORD_KEY, &mut key)
                .map_err(|_| HwStatus::InvalidCommand)?;
            Ok(key)
        }
    }

    fn mac_op(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        if cmd.subcode() != mac::SUBCODE {
            return Err(HwStatus::InvalidCommand);
        }
        let algo = mac::algo(cmd).map_err(|_| HwStatus::InvalidAlgorithm)?;
        if !MODEL_CAPABILITIES.supports_mac(algo) {
            return Err(HwStatus::Unsupported);
        }
        let (flags, loc) = mac::control(cmd);
        let init = flags & mac::FLAG_INIT != 0;
        let is_final = flags & mac::FLAG_FINAL != 0;
        let data =
            self.take_input(cmd.0[mac::WORD_INPUT_DESC], cmd.0[mac::WORD_DATA_LEN] as usize)?;
        if !is_final && data.len() % algo.block_size() != 0 {
            return Err(HwStatus::InvalidLength);
        }
        let key = self.mac_key(cmd, algo)?;
        let state_asset = AssetId(cmd.0[mac::WORD_STATE_ASSET]);

        match algo.hash_algo() {
            Some(hash_algo) => {
                // HMAC: the running state is the inner hash; the outer pass
                // happens entirely in the final token.
                let block = hash_algo.block_size();
                let mut state = if init {
                    let mut st = HashState::new(hash_algo);
                    st.compress(&hmac_pad_block(&key, block, 0x36));
                    st
                } else {
                    match loc {
                        LocationCode::InContext | LocationCode::ToAsset => {
                            let mut bytes = [0u8; 64];
                            let n = hash_algo.state_size();
                            cmd.read_bytes(mac::WORD_STATE, &mut bytes[..n])
                                .map_err(|_| HwStatus::InternalError)?;
                            HashState::from_bytes(hash_algo, &bytes[..n])?
                        }
                        LocationCode::InAsset | LocationCode::FromAsset => {
                            let bytes = self.store.read_state(
                                state_asset,
                                AssetPolicy::ROLE_TEMP_MAC,
                                hash_algo.state_size(),
                            )?;
                            HashState::from_bytes(hash_algo, &bytes)?
                        }
                    }
                };
                if is_final {
                    let inner = state.finish(
                        hash_algo,
                        &data,
                        block as u64 + mac::total_length(cmd),
                    );
                    let mut outer = HashState::new(hash_algo);
                    outer.compress(&hmac_pad_block(&key, block, 0x5C));
                    let tag = outer.finish(hash_algo, &inner, (block + inner.len()) as u64);
                    mac::write_mac(resp, &tag).map_err(|_| HwStatus::InternalError)?;
                } else {
                    state.compress(&data);
                    match loc {
                        LocationCode::InAsset | LocationCode::ToAsset => {
                            self.store.write_state(
                                state_asset,
                                AssetPolicy::ROLE_TEMP_MAC,
                                &state.to_bytes(),
                            )?;
                        }
                        LocationCode::InContext | LocationCode::FromAsset => {
                            mac::write_mac(resp, &state.to_bytes())
                                .map_err(|_| HwStatus::InternalError)?;
                        }
                    }
                }
            }
            None => {
                // AES-CMAC / AES-CBC-MAC over a 16-byte chaining value. The
                // capability gate already bounced C2-H.
                let engine = BlockEngine::new(SymKeyType::Aes, &key)?;
                let mut chain = [0u8; 16];
                if !init {
                    match loc {
                        LocationCode::InContext | LocationCode::ToAsset => {
                            cmd.read_bytes(mac::WORD_STATE, &mut chain)
                                .map_err(|_| HwStatus::InternalError)?;
                        }
                        LocationCode::InAsset | LocationCode::FromAsset => {
                            let bytes = self.store.read_state(
                                state_asset,
                                AssetPolicy::ROLE_TEMP_MAC,
                                16,
                            )?;
                            chain.copy_from_slice(&bytes);
                        }
                    }
                }
                if is_final {
                    let tag = match algo {
                        MacAlgo::AesCmac => mac_engine::cmac_finish(&engine, chain, &data),
                        _ => mac_engine::cbc_mac_finish(&engine, chain, &data),
                    };
                    mac::write_mac(resp, &tag).map_err(|_| HwStatus::InternalError)?;
                } else {
                    mac_engine::absorb(&engine, &mut chain, &data);
                    match loc {
                        LocationCode::InAsset | LocationCode::ToAsset => {
                            self.store.write_state(
                                state_asset,
                                AssetPolicy::ROLE_TEMP_MAC,
                                &chain,
                            )?;
                        }
                        LocationCode::InContext | LocationCode::FromAsset => {
                            mac::write_mac(resp, &chain).map_err(|_| HwStatus::InternalError)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ---- Cipher family ----

    fn cipher_key(
        &self,
        cmd: &CommandToken,
        key_type: SymKeyType,
        encrypt: bool,
    ) -> Result<Vec<u8>, HwStatus> {
        if cipher::key_from_asset(cmd) {
            let (key, policy) = self.store.read_key(AssetId(cmd.0[cipher::WORD_KEY_ASSET]))?;
            let shape = KeyShape::classify(policy).map_err(|_| HwStatus::InvalidParameter)?;
            let allowed = match shape {
                KeyShape::CipherKey {
                    algo,
                    encrypt: may_encrypt,
                    decrypt: may_decrypt,
                } => {
                    let algo_ok = match key_type {
                        SymKeyType::Aes => algo == CipherAlgo::Aes,
                        SymKeyType::Des | SymKeyType::TripleDes => algo == CipherAlgo::TripleDes,
                        _ => false,
                    };
                    algo_ok && if encrypt { may_encrypt } else { may_decrypt }
                }
                _ => false,
            };
            if !allowed {
                return Err(HwStatus::InvalidParameter);
            }
            let declared = cmd.0[cipher::WORD_KEY_LEN] as usize;
            if declared != 0 && declared != key.len() {
                return Err(HwStatus::InvalidKeySize);
            }
            Ok(key)
        } else {
            let len = cmd.0[cipher::WORD_KEY_LEN] as usize;
            if len == 0 || len > cipher::MAX_INLINE_KEY_SIZE {
                return Err(HwStatus::InvalidKeySize);
            }
            let mut key = vec![0u8; len];
            cmd.read_bytes(cipher::WORD_KEY, &mut key)
                .map_err(|_| HwStatus::InvalidCommand)?;
            Ok(key)
        }
    }

    fn cipher_op(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        if cmd.subcode() != cipher::SUBCODE {
            return Err(HwStatus::InvalidCommand);
        }
        let key_type = cipher::key_type(cmd).map_err(|_| HwStatus::InvalidAlgorithm)?;
        let mode = cipher::mode(cmd).map_err(|_| HwStatus::InvalidMode)?;
        if !MODEL_CAPABILITIES.supports_cipher(key_type, mode) {
            return Err(HwStatus::Unsupported);
        }
        let supported = matches!(
            (key_type, mode),
            (
                SymKeyType::Aes,
                FeedbackMode::Ecb | FeedbackMode::Cbc | FeedbackMode::Ctr | FeedbackMode::Icm
            ) | (
                SymKeyType::Des | SymKeyType::TripleDes,
                FeedbackMode::Ecb | FeedbackMode::Cbc
            )
        );
        if !supported {
            return Err(HwStatus::Unsupported);
        }

        let encrypt = cipher::is_encrypt(cmd);
        let is_final = cipher::is_final(cmd);
        let loc = cipher::iv_location(cmd);
        let key = self.cipher_key(cmd, key_type, encrypt)?;
        let engine = BlockEngine::new(key_type, &key)?;
        let bs = engine.block_size();
        let mut data = self.take_input(
            cmd.0[cipher::WORD_INPUT_DESC],
            cmd.0[cipher::WORD_DATA_LEN] as usize,
        )?;
        // Counter modes absorb a sub-block tail on the final segment only.
        let tail_ok = is_final && matches!(mode, FeedbackMode::Ctr | FeedbackMode::Icm);
        if data.len() % bs != 0 && !tail_ok {
            return Err(HwStatus::InvalidLength);
        }

        let iv_asset = AssetId(cmd.0[cipher::WORD_IV_ASSET]);
        let (role, state_len) = match mode {
            FeedbackMode::Cbc => (AssetPolicy::ROLE_IV, bs),
            FeedbackMode::Ctr | FeedbackMode::Icm => (AssetPolicy::ROLE_COUNTER, 16),
            _ => (AssetPolicy::empty(), 0),
        };
        let mut chain = [0u8; 16];
        if mode.uses_iv() {
            match loc {
                LocationCode::InContext | LocationCode::ToAsset => {
                    cmd.read_bytes(cipher::WORD_IV, &mut chain)
                        .map_err(|_| HwStatus::InternalError)?;
                }
                LocationCode::InAsset | LocationCode::FromAsset => {
                    let bytes = self.store.read_state(iv_asset, role, state_len)?;
                    chain[..state_len].copy_from_slice(&bytes);
                }
            }
        }
        match mode {
            FeedbackMode::Ecb => cipher_engine::ecb(&engine, encrypt, &mut data),
            FeedbackMode::Cbc => cipher_engine::cbc(&engine, encrypt, &mut chain[..bs], &mut data),
            FeedbackMode::Ctr => cipher_engine::ctr(&engine, &mut chain, &mut data, 16),
            FeedbackMode::Icm => cipher_engine::ctr(&engine, &mut chain, &mut data, 2),
            _ => return Err(HwStatus::Unsupported),
        }

        if mode.uses_iv() {
            if matches!(loc, LocationCode::InAsset | LocationCode::ToAsset) {
                self.store.write_state(iv_asset, role, &chain[..state_len])?;
            }
            cipher::write_updated_iv(resp, &chain);
        }
        self.write_output(cmd.0[cipher::WORD_OUTPUT_DESC], &data)?;
        cipher::set_output_len(resp, data.len() as u32);
        Ok(())
    }

    // ---- Asset family ----

    fn asset_op(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        match cmd.subcode() {
            asset::SUBCODE_CREATE => {
                let policy = AssetPolicy::from_wire(asset::create_policy_word(cmd))
                    .map_err(|_| HwStatus::InvalidParameter)?;
                KeyShape::classify(policy).map_err(|_| HwStatus::InvalidParameter)?;
                let id = self.store.create(policy, asset::create_size(cmd))?;
                asset::set_created_id(resp, id);
                Ok(())
            }
            asset::SUBCODE_LOAD => self.asset_load(cmd, resp),
            asset::SUBCODE_SEARCH => {
                let (id, size) = self.store.find_static(asset::search_number(cmd))?;
                asset::set_found(resp, id, size);
                Ok(())
            }
            asset::SUBCODE_DELETE => self.store.delete(asset::delete_target(cmd)),
            _ => Err(HwStatus::InvalidCommand),
        }
    }

    fn asset_load(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        let target = asset::load_target(cmd);
        let policy = self.store.policy(target)?;
        let size = self.store.size(target)?;
        if self.store.is_filled(target)? {
            return Err(HwStatus::OperationFailed);
        }
        let aad_len = cmd.0[asset::WORD_AAD_LEN] as usize;
        let payload_len = cmd.0[asset::WORD_PAYLOAD_LEN] as usize;
        let input = self.take_input(cmd.0[asset::WORD_INPUT_DESC], aad_len + payload_len)?;
        let (aad, payload) = input.split_at(aad_len);

        let method = asset::load_method(cmd).map_err(|_| HwStatus::InvalidCommand)?;
        let material = match method {
            LoadMethod::Plaintext => payload.to_vec(),
            LoadMethod::Random => {
                let n = cmd.0[asset::WORD_RANDOM_SIZE] as usize;
                self.rng_bytes(n)
            }
            LoadMethod::Derive => {
                let (kdk, kdk_policy) = self.store.read_key(asset::source_key(cmd))?;
                if !matches!(KeyShape::classify(kdk_policy), Ok(KeyShape::Kdk { .. })) {
                    return Err(HwStatus::InvalidParameter);
                }
                if aad.is_empty() || aad.len() > MAX_DERIVE_LABEL_SIZE {
                    return Err(HwStatus::InvalidLength);
                }
                kdf::derive_key(&kdk, aad, policy, size as usize)?
            }
            LoadMethod::Import => {
                let (kek, kek_policy) = self.store.read_key(asset::source_key(cmd))?;
                if !matches!(
                    KeyShape::classify(kek_policy),
                    Ok(KeyShape::Kek { unwrap: true, .. })
                ) {
                    return Err(HwStatus::InvalidParameter);
                }
                keyblob::unwrap(&kek, policy, size, aad, payload)?
            }
        };

        if asset::wrap_requested(cmd) {
            let (kek, kek_policy) = self.store.read_key(asset::source_key(cmd))?;
            if !matches!(
                KeyShape::classify(kek_policy),
                Ok(KeyShape::Kek { wrap: true, .. })
            ) {
                return Err(HwStatus::InvalidParameter);
            }
            let blob = keyblob::wrap(&kek, policy, aad, &material)?;
            // Under a buffer-too-small failure the response still reports
            // the length that would have been required, and the target slot
            // stays empty so the load can be retried.
            asset::set_blob_len(resp, blob.len() as u32);
            self.write_output(cmd.0[asset::WORD_OUTPUT_DESC], &blob)?;
        }
        self.store.fill(target, &material)
    }

    // ---- System family ----

    fn system_op(&mut self, cmd: &CommandToken, resp: &mut ResponseToken) -> Result<(), HwStatus> {
        match cmd.subcode() {
            system::SUBCODE_VERSION => {
                system::set_version_info(resp, FIRMWARE_VERSION, MODEL_CAPABILITIES);
                Ok(())
            }
            // The model's known-answer battery is its test suite; the token
            // always reports success.
            system::SUBCODE_SELF_TEST => Ok(()),
            _ => Err(HwStatus::InvalidCommand),
        }
    }
}

impl CofferTransport for CofferModel {
    fn exchange(&mut self, cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
        let mut resp = ResponseToken::reply_to(cmd);
        if !cmd.verify_checksum() {
            resp.0[1] = HwStatus::InvalidCommand.encode();
            return Ok(resp);
        }
        if let Err(status) = self.handle(cmd, &mut resp) {
            resp.0[1] = status.encode();
        }
        Ok(resp)
    }

    fn prepare_input(&mut self, data: &[u8]) -> Result<DescriptorHandle, TransportError> {
        let desc = self.mint_desc();
        self.inputs.insert(desc, data.to_vec());
        Ok(DescriptorHandle(desc))
    }

    fn prepare_output(&mut self, capacity: usize) -> Result<DescriptorHandle, TransportError> {
        let desc = self.mint_desc();
        self.outputs.insert(
            desc,
            OutputBuf {
                capacity,
                data: Vec::new(),
            },
        );
        Ok(DescriptorHandle(desc))
    }

    fn read_output(
        &mut self,
        desc: DescriptorHandle,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        let out = self
            .outputs
            .remove(&desc.0)
            .ok_or(TransportError::Descriptor)?;
        let n = out.data.len().min(buf.len());
        buf[..n].copy_from_slice(&out.data[..n]);
        Ok(n)
    }
}

/// Transport wrapper that counts exchanges. Lets tests assert how many
/// tokens actually crossed the mailbox, or that none did.
pub struct CountingTransport<T> {
    inner: T,
    exchanges: Arc<AtomicU64>,
}

impl<T> CountingTransport<T> {
    pub fn new(inner: T) -> Self {
        CountingTransport {
            inner,
            exchanges: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle onto the exchange counter; survives the wrapper moving
    /// into a driver.
    pub fn exchange_counter(&self) -> Arc<AtomicU64> {
        self.exchanges.clone()
    }
}

impl<T: CofferTransport> CofferTransport for CountingTransport<T> {
    fn exchange(&mut self, cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        self.inner.exchange(cmd)
    }

    fn prepare_input(&mut self, data: &[u8]) -> Result<DescriptorHandle, TransportError> {
        self.inner.prepare_input(data)
    }

    fn prepare_output(&mut self, capacity: usize) -> Result<DescriptorHandle, TransportError> {
        self.inner.prepare_output(capacity)
    }

    fn read_output(
        &mut self,
        desc: DescriptorHandle,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.inner.read_output(desc, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_api::{keyblob_size, HashAlgo};

    fn run(model: &mut CofferModel, cmd: &mut CommandToken) -> ResponseToken {
        cmd.populate_checksum();
        model.exchange(cmd).unwrap()
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut model = CofferModel::new(1);
        let mut cmd = system::version_command(1);
        cmd.0[1] = 0xDEAD_BEEF;
        let resp = model.exchange(&cmd).unwrap();
        assert_eq!(resp.status_word(), HwStatus::InvalidCommand.encode());
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut model = CofferModel::new(1);
        let mut cmd = CommandToken::default();
        cmd.0[0] = 0xAA00_0001;
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::InvalidCommand.encode());
    }

    #[test]
    fn test_version_token() {
        let mut model = CofferModel::new(1);
        let mut cmd = system::version_command(7);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        assert!(resp.matches(&cmd));
        assert_eq!(system::version(&resp), FIRMWARE_VERSION);
        assert_eq!(system::capabilities(&resp), MODEL_CAPABILITIES);
    }

    #[test]
    fn test_single_shot_hash_token() {
        let mut model = CofferModel::new(1);
        let input = model.prepare_input(b"abc").unwrap();
        let mut cmd = hash::command(2);
        hash::set_control(&mut cmd, HashAlgo::Sha256, true, true);
        hash::set_data(&mut cmd, input, 3);
        hash::set_total_length(&mut cmd, 3);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        let mut digest = [0u8; 32];
        hash::read_digest(&resp, &mut digest).unwrap();
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_single_shot_hmac_token_matches_reference() {
        use hmac::{Hmac, Mac as _};
        let mut model = CofferModel::new(1);
        let key = [0x0Bu8; 20];
        let msg = b"Hi There";
        let input = model.prepare_input(msg).unwrap();
        let mut cmd = mac::command(3);
        mac::set_control(&mut cmd, MacAlgo::HmacSha256, true, true);
        mac::set_key_literal(&mut cmd, &key).unwrap();
        mac::set_data(&mut cmd, input, msg.len() as u32);
        mac::set_total_length(&mut cmd, msg.len() as u64);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        let mut tag = [0u8; 32];
        mac::read_mac(&resp, &mut tag).unwrap();

        let mut reference = Hmac::<Sha256>::new_from_slice(&key).unwrap();
        reference.update(msg);
        assert_eq!(tag[..], reference.finalize().into_bytes()[..]);
    }

    #[test]
    fn test_partial_nonfinal_hash_rejected() {
        let mut model = CofferModel::new(1);
        let input = model.prepare_input(&[0u8; 30]).unwrap();
        let mut cmd = hash::command(0);
        hash::set_control(&mut cmd, HashAlgo::Sha256, true, false);
        hash::set_data(&mut cmd, input, 30);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::InvalidLength.encode());
    }

    #[test]
    fn test_asset_life_cycle_tokens() {
        let mut model = CofferModel::new(9);
        let policy = AssetPolicy::ALGO_AES | AssetPolicy::FUNC_ENCRYPT;

        let mut cmd = asset::create_command(0, policy, 16);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        let id = asset::created_id(&resp);
        assert!(id.is_valid());

        // Plaintext fill.
        let input = model.prepare_input(&[0x4B; 16]).unwrap();
        let mut cmd = asset::load_command(0, id, LoadMethod::Plaintext);
        asset::set_load_payload(&mut cmd, 0, 16, input);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);

        // Second fill is refused.
        let input = model.prepare_input(&[0x4B; 16]).unwrap();
        let mut cmd = asset::load_command(0, id, LoadMethod::Plaintext);
        asset::set_load_payload(&mut cmd, 0, 16, input);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::OperationFailed.encode());

        // Root key answers search.
        let mut cmd = asset::search_command(0, ROOT_KEY_NUMBER);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        assert!(asset::found_id(&resp).is_valid());
        assert_eq!(asset::found_size(&resp), 32);

        let mut cmd = asset::delete_command(0, id);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
    }

    #[test]
    fn test_undefined_policy_bit_rejected() {
        let mut model = CofferModel::new(9);
        let mut cmd = CommandToken::new(Opcode::Asset, asset::SUBCODE_CREATE, 0);
        cmd.0[asset::WORD_POLICY] =
            (AssetPolicy::ALGO_AES | AssetPolicy::FUNC_ENCRYPT).bits() | 0x0100_0000;
        cmd.0[asset::WORD_SIZE] = 16;
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::InvalidParameter.encode());
    }

    #[test]
    fn test_wrap_buffer_too_small_reports_required_length() {
        let mut model = CofferModel::new(3);

        // KEK slot.
        let kek_policy = AssetPolicy::SECURE_WRAP | AssetPolicy::SECURE_UNWRAP;
        let mut cmd = asset::create_command(0, kek_policy, 32);
        let kek = asset::created_id(&run(&mut model, &mut cmd));
        let input = model.prepare_input(&[0x77; 32]).unwrap();
        let mut cmd = asset::load_command(0, kek, LoadMethod::Plaintext);
        asset::set_load_payload(&mut cmd, 0, 32, input);
        assert_eq!(run(&mut model, &mut cmd).status_word(), 0);

        // Load-and-wrap a 16-byte key into an 8-byte output window.
        let policy = AssetPolicy::ALGO_AES | AssetPolicy::FUNC_ENCRYPT;
        let mut cmd = asset::create_command(0, policy, 16);
        let target = asset::created_id(&run(&mut model, &mut cmd));
        let input = model.prepare_input(&[0xC0; 16]).unwrap();
        let output = model.prepare_output(8).unwrap();
        let mut cmd = asset::load_command(0, target, LoadMethod::Plaintext);
        asset::set_load_payload(&mut cmd, 0, 16, input);
        asset::set_wrap_request(&mut cmd, kek, output);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::BufferTooSmall.encode());
        assert_eq!(asset::blob_len(&resp) as usize, keyblob_size(16));

        // The fill never happened, so the load can be retried whole.
        let input = model.prepare_input(&[0xC0; 16]).unwrap();
        let output = model.prepare_output(keyblob_size(16)).unwrap();
        let mut cmd = asset::load_command(0, target, LoadMethod::Plaintext);
        asset::set_load_payload(&mut cmd, 0, 16, input);
        asset::set_wrap_request(&mut cmd, kek, output);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), 0);
        assert_eq!(asset::blob_len(&resp) as usize, keyblob_size(16));
    }

    #[test]
    fn test_unsupported_engine_reported() {
        let mut model = CofferModel::new(1);
        let input = model.prepare_input(&[0u8; 16]).unwrap();
        let output = model.prepare_output(16).unwrap();
        let mut cmd = cipher::command(0);
        cipher::set_control(&mut cmd, SymKeyType::Camellia, FeedbackMode::Ecb, true);
        cipher::set_segment(&mut cmd, true, true);
        cipher::set_key_literal(&mut cmd, &[0u8; 16]).unwrap();
        cipher::set_data(&mut cmd, input, output, 16);
        let resp = run(&mut model, &mut cmd);
        assert_eq!(resp.status_word(), HwStatus::Unsupported.encode());
    }
}
