/*++

Licensed under the Apache-2.0 license.

File Name:

    cipher.rs

Abstract:

    File contains the streaming symmetric-cipher dispatcher: block modes
    with a chained IV or counter, ARC4 keystream state, and AES-f8.

--*/

use crate::stream::{SegmentPlan, StatePlacement, StreamState};
use crate::{CofferCm, CofferError, CofferResult, Location};
use coffer_api::policy::CipherAlgo;
use coffer_api::{
    cipher as wire, AssetId, CofferTransport, FeedbackMode, KeyShape, LocationCode, SymKeyType,
};

/// Key material for a cipher operation. Asset keys carry their length so
/// the router can apply the key-length table without a store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherKey {
    Literal(Vec<u8>),
    Asset { id: AssetId, len: usize },
}

impl CipherKey {
    fn len(&self) -> usize {
        match self {
            CipherKey::Literal(key) => key.len(),
            CipherKey::Asset { len, .. } => *len,
        }
    }

    fn check(&self) -> CofferResult<()> {
        if let CipherKey::Asset { id, .. } = self {
            if !id.is_valid() {
                return Err(CofferError::DRIVER_ASSET_INVALID_ID);
            }
        }
        Ok(())
    }

    fn apply(&self, cmd: &mut coffer_api::CommandToken) -> CofferResult<()> {
        match self {
            CipherKey::Literal(key) => wire::set_key_literal(cmd, key),
            CipherKey::Asset { id, len } => {
                wire::set_key_asset(cmd, *id, *len as u32);
                Ok(())
            }
        }
    }
}

/// Per-algorithm keystream state that never leaves the context.
enum Keystream {
    None,
    Arc4 {
        i: u8,
        j: u8,
        state: Box<[u8; 256]>,
    },
    F8 {
        salt: [u8; 16],
        iv: [u8; 16],
        position: u32,
    },
}

/// A streaming cipher operation.
pub struct CipherContext<'a, T: CofferTransport> {
    cm: &'a CofferCm<T>,
    key_type: SymKeyType,
    mode: FeedbackMode,
    encrypt: bool,
    key: CipherKey,
    stream: StreamState,
    keystream: Keystream,
}

/// Modes whose final segment must still be whole blocks (no keystream to
/// absorb a tail).
fn block_aligned_only(mode: FeedbackMode) -> bool {
    matches!(mode, FeedbackMode::Ecb | FeedbackMode::Cbc | FeedbackMode::CCbc)
}

/// The cipher-algorithm shape an asset key must carry for this key type.
/// ARC4 keys are never asset-resident.
fn shape_algo(key_type: SymKeyType) -> Option<CipherAlgo> {
    match key_type {
        SymKeyType::Aes | SymKeyType::AesF8 => Some(CipherAlgo::Aes),
        SymKeyType::Des | SymKeyType::TripleDes => Some(CipherAlgo::TripleDes),
        SymKeyType::Camellia => Some(CipherAlgo::Camellia),
        SymKeyType::Multi2 => Some(CipherAlgo::Multi2),
        SymKeyType::C2 => Some(CipherAlgo::C2),
        SymKeyType::Arc4 => None,
    }
}

/// Refuse an asset key whose recorded shape does not cover this algorithm
/// and direction. Keys without a recorded shape pass through to the module.
fn check_asset_key<T: CofferTransport>(
    cm: &CofferCm<T>,
    key: &CipherKey,
    key_type: SymKeyType,
    encrypt: bool,
) -> CofferResult<()> {
    if let (CipherKey::Asset { id, .. }, Some(want)) = (key, shape_algo(key_type)) {
        cm.check_known_shape(*id, |shape| match shape {
            KeyShape::CipherKey {
                algo,
                encrypt: may_encrypt,
                decrypt: may_decrypt,
            } => *algo == want && if encrypt { *may_encrypt } else { *may_decrypt },
            _ => false,
        })?;
    }
    Ok(())
}

impl<T: CofferTransport> CofferCm<T> {
    /// Start a streaming block-cipher operation. `iv` seeds the chained
    /// IV/counter for modes that use one and must be absent for ECB.
    /// ARC4 and AES-f8 have dedicated constructors.
    pub fn cipher_init(
        &self,
        key_type: SymKeyType,
        mode: FeedbackMode,
        encrypt: bool,
        key: CipherKey,
        iv: Option<&[u8; 16]>,
    ) -> CofferResult<CipherContext<'_, T>> {
        if matches!(key_type, SymKeyType::Arc4 | SymKeyType::AesF8) {
            return Err(CofferError::DRIVER_ROUTER_UNSUPPORTED_MODE);
        }
        crate::router::route_cipher(self.capabilities(), key_type, mode, key.len())?;
        key.check()?;
        check_asset_key(self, &key, key_type, encrypt)?;
        if mode.uses_iv() && iv.is_none() {
            return Err(CofferError::DRIVER_ROUTER_IV_REQUIRED);
        }
        let mut stream = StreamState::new(key_type.block_size(), 16, mode.uses_iv());
        if let Some(iv) = iv {
            stream.set_state(iv);
        }
        Ok(CipherContext {
            cm: self,
            key_type,
            mode,
            encrypt,
            key,
            stream,
            keystream: Keystream::None,
        })
    }

    /// Start a streaming ARC4 operation. The module runs the key schedule
    /// on the first segment; the evolving state box and the `(i, j)`
    /// indices live in the context only and cannot be parked in the store.
    pub fn arc4_init(&self, key: &[u8]) -> CofferResult<CipherContext<'_, T>> {
        crate::router::route_cipher(
            self.capabilities(),
            SymKeyType::Arc4,
            FeedbackMode::Stream,
            key.len(),
        )?;
        Ok(CipherContext {
            cm: self,
            key_type: SymKeyType::Arc4,
            mode: FeedbackMode::Stream,
            // ARC4 is its own inverse; the direction bit is informational.
            encrypt: true,
            key: CipherKey::Literal(key.to_vec()),
            stream: StreamState::new(1, 0, false),
            keystream: Keystream::Arc4 {
                i: 0,
                j: 0,
                state: Box::new([0; 256]),
            },
        })
    }

    /// Start a streaming AES-f8 operation. The salt key, f8 IV and
    /// keystream position live in the context only.
    pub fn f8_init(
        &self,
        key: CipherKey,
        salt: &[u8; 16],
        iv: &[u8; 16],
        encrypt: bool,
    ) -> CofferResult<CipherContext<'_, T>> {
        crate::router::route_cipher(
            self.capabilities(),
            SymKeyType::AesF8,
            FeedbackMode::F8,
            key.len(),
        )?;
        key.check()?;
        check_asset_key(self, &key, SymKeyType::AesF8, encrypt)?;
        Ok(CipherContext {
            cm: self,
            key_type: SymKeyType::AesF8,
            mode: FeedbackMode::F8,
            encrypt,
            key,
            stream: StreamState::new(16, 0, false),
            keystream: Keystream::F8 {
                salt: *salt,
                iv: *iv,
                position: 0,
            },
        })
    }
}

impl<T: CofferTransport> CipherContext<'_, T> {
    pub fn location(&self) -> Location {
        self.stream.location()
    }

    /// The chained IV/counter after the last completed segment.
    pub fn iv(&self) -> &[u8] {
        self.stream.state()
    }

    /// Process a non-final segment; returns the bytes written to `output`.
    pub fn update(&mut self, input: &[u8], output: &mut [u8]) -> CofferResult<usize> {
        self.update_with(input, output, StatePlacement::Keep)
    }

    /// Process a non-final segment and move the chained IV as requested.
    pub fn update_with(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        placement: StatePlacement,
    ) -> CofferResult<usize> {
        let plan = self.stream.plan(input.len(), false, placement)?;
        self.run_segment(input, output, plan)
    }

    /// Process the final segment; returns the bytes written to `output`.
    pub fn finalize(mut self, input: &[u8], output: &mut [u8]) -> CofferResult<usize> {
        if block_aligned_only(self.mode) && input.len() % self.key_type.block_size() != 0 {
            return Err(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT);
        }
        let plan = self.stream.plan(input.len(), true, StatePlacement::Keep)?;
        self.run_segment(input, output, plan)
    }

    fn run_segment(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        plan: SegmentPlan,
    ) -> CofferResult<usize> {
        if output.len() < input.len() {
            return Err(CofferError::DRIVER_BUFFER_TOO_SMALL);
        }
        let mut cmd = wire::command(0);
        wire::set_control(&mut cmd, self.key_type, self.mode, self.encrypt);
        wire::set_segment(&mut cmd, plan.init, plan.is_final);
        wire::set_iv_location(&mut cmd, plan.code);
        if plan.asset.is_valid() {
            wire::set_iv_asset(&mut cmd, plan.asset);
        }
        if self.mode.uses_iv()
            && matches!(plan.code, LocationCode::InContext | LocationCode::ToAsset)
        {
            let mut iv = [0u8; 16];
            let state = self.stream.state();
            iv[..state.len()].copy_from_slice(state);
            wire::write_iv(&mut cmd, &iv);
        }
        self.key.apply(&mut cmd)?;
        if let Keystream::F8 { salt, iv, position } = &self.keystream {
            wire::set_f8_state(&mut cmd, salt, iv, *position);
        }

        let channel = &self.cm.channel;
        let keystream = &mut self.keystream;
        let resp = channel.with_transport(|t| {
            let input_desc = t
                .prepare_input(input)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            let output_desc = t
                .prepare_output(input.len())
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_data(&mut cmd, input_desc, output_desc, input.len() as u32);

            let arc4_out = if let Keystream::Arc4 { state, i, j } = &*keystream {
                let state_in = t
                    .prepare_input(&state[..])
                    .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
                let state_out = t
                    .prepare_output(256)
                    .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
                wire::set_arc4_state(&mut cmd, *i, *j, state_in, state_out);
                Some(state_out)
            } else {
                None
            };

            let resp = channel.round_trip(t, &mut cmd)?;

            let out_len = wire::output_len(&resp) as usize;
            if out_len > output.len() {
                return Err(CofferError::DRIVER_BUFFER_TOO_SMALL);
            }
            t.read_output(output_desc, &mut output[..out_len])
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;

            if let (Some(state_out), Keystream::Arc4 { state, .. }) = (arc4_out, &mut *keystream) {
                t.read_output(state_out, &mut state[..])
                    .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            }
            Ok(resp)
        })?;

        self.stream.commit(&plan);
        match &mut self.keystream {
            Keystream::Arc4 { i, j, .. } => {
                let packed = wire::stream_position(&resp);
                *i = (packed >> 8) as u8;
                *j = packed as u8;
            }
            Keystream::F8 { position, .. } => {
                *position = wire::stream_position(&resp);
            }
            Keystream::None => {
                if self.mode.uses_iv() && matches!(self.stream.location(), Location::InContext) {
                    let mut iv = [0u8; 16];
                    wire::read_updated_iv(&resp, &mut iv);
                    self.stream.set_state(&iv);
                }
            }
        }
        Ok(wire::output_len(&resp) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelConfig;
    use coffer_api::{
        CofferCapabilities, CommandToken, DescriptorHandle, ResponseToken, TransportError,
    };

    struct NoContact;

    impl CofferTransport for NoContact {
        fn exchange(&mut self, _cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
            panic!("local rejection expected, hardware was contacted");
        }
        fn prepare_input(&mut self, _data: &[u8]) -> Result<DescriptorHandle, TransportError> {
            panic!("local rejection expected, hardware was contacted");
        }
        fn prepare_output(&mut self, _capacity: usize) -> Result<DescriptorHandle, TransportError> {
            panic!("local rejection expected, hardware was contacted");
        }
        fn read_output(
            &mut self,
            _desc: DescriptorHandle,
            _buf: &mut [u8],
        ) -> Result<usize, TransportError> {
            panic!("local rejection expected, hardware was contacted");
        }
    }

    fn cm() -> CofferCm<NoContact> {
        let cm = CofferCm::new(NoContact, ChannelConfig::default());
        cm.set_capabilities(CofferCapabilities::AES | CofferCapabilities::TDES);
        cm
    }

    fn aes_key() -> CipherKey {
        CipherKey::Literal(vec![0x4B; 16])
    }

    #[test]
    fn test_missing_iv_rejected_locally() {
        assert_eq!(
            cm().cipher_init(SymKeyType::Aes, FeedbackMode::Cbc, true, aes_key(), None)
                .err(),
            Some(CofferError::DRIVER_ROUTER_IV_REQUIRED)
        );
        assert!(cm()
            .cipher_init(SymKeyType::Aes, FeedbackMode::Ecb, true, aes_key(), None)
            .is_ok());
    }

    #[test]
    fn test_bad_pair_and_key_length_rejected_locally() {
        assert_eq!(
            cm().cipher_init(
                SymKeyType::TripleDes,
                FeedbackMode::Ctr,
                true,
                CipherKey::Literal(vec![0; 24]),
                Some(&[0; 16])
            )
            .err(),
            Some(CofferError::DRIVER_ROUTER_UNSUPPORTED_MODE)
        );
        assert_eq!(
            cm().cipher_init(
                SymKeyType::Aes,
                FeedbackMode::Cbc,
                true,
                CipherKey::Literal(vec![0; 15]),
                Some(&[0; 16])
            )
            .err(),
            Some(CofferError::DRIVER_ROUTER_KEY_LENGTH)
        );
    }

    #[test]
    fn test_keystream_state_cannot_be_parked() {
        let cm = CofferCm::new(NoContact, ChannelConfig::default());
        cm.set_capabilities(CofferCapabilities::ARC4);
        let mut ctx = cm.arc4_init(&[0x11; 16]).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(
            ctx.update_with(&[0u8; 8], &mut out, StatePlacement::Park(AssetId(3))),
            Err(CofferError::DRIVER_STREAM_NO_ASSET_STATE)
        );
    }

    #[test]
    fn test_cbc_final_must_be_block_aligned() {
        let cm = cm();
        let ctx = cm
            .cipher_init(
                SymKeyType::Aes,
                FeedbackMode::Cbc,
                true,
                aes_key(),
                Some(&[0; 16]),
            )
            .unwrap();
        let mut out = [0u8; 16];
        assert_eq!(
            ctx.finalize(&[0u8; 10], &mut out).err(),
            Some(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT)
        );
    }

    #[test]
    fn test_recorded_key_shape_rejects_wrong_direction() {
        // An encrypt-only key cannot open a decrypt stream; the recorded
        // shape answers before any token exists.
        let cm = cm();
        cm.record_shape(
            AssetId(4),
            KeyShape::CipherKey {
                algo: CipherAlgo::Aes,
                encrypt: true,
                decrypt: false,
            },
        );
        let key = CipherKey::Asset { id: AssetId(4), len: 16 };
        assert_eq!(
            cm.cipher_init(SymKeyType::Aes, FeedbackMode::Cbc, false, key.clone(), Some(&[0; 16]))
                .err(),
            Some(CofferError::API_POLICY_FUNCTION_MISMATCH)
        );
        assert!(cm
            .cipher_init(SymKeyType::Aes, FeedbackMode::Cbc, true, key, Some(&[0; 16]))
            .is_ok());
    }

    #[test]
    fn test_output_buffer_checked_locally() {
        let cm = cm();
        let mut ctx = cm
            .cipher_init(
                SymKeyType::Aes,
                FeedbackMode::Cbc,
                true,
                aes_key(),
                Some(&[0; 16]),
            )
            .unwrap();
        let mut out = [0u8; 8];
        assert_eq!(
            ctx.update(&[0u8; 16], &mut out),
            Err(CofferError::DRIVER_BUFFER_TOO_SMALL)
        );
    }
}
