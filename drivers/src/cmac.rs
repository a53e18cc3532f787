/*++

Licensed under the Apache-2.0 license.

File Name:

    cmac.rs

Abstract:

    File contains the streaming cipher-MAC dispatcher (AES-CMAC,
    AES-CBC-MAC, C2-H).

--*/

use crate::hmac::MacKey;
use crate::stream::{SegmentPlan, StatePlacement, StreamState};
use crate::{CofferCm, CofferError, CofferResult, Location};
use coffer_api::policy::CipherAlgo;
use coffer_api::{mac as wire, CofferTransport, KeyShape, LocationCode, MacAlgo, ResponseToken};

/// A streaming cipher-backed MAC operation.
///
/// CMAC-family algorithms tweak the last message block with a subkey, so
/// the module must see that block in the final token. The context withholds
/// one trailing block from every update and feeds it with the finalize data.
pub struct CipherMacContext<'a, T: CofferTransport> {
    cm: &'a CofferCm<T>,
    algo: MacAlgo,
    key: MacKey,
    stream: StreamState,
    /// Withheld tail, at most one block (CMAC and C2-H only).
    pending: Vec<u8>,
}

/// Algorithms whose final block is transformed before absorption.
fn withholds_tail(algo: MacAlgo) -> bool {
    matches!(algo, MacAlgo::AesCmac | MacAlgo::C2H)
}

impl<T: CofferTransport> CofferCm<T> {
    /// Start a streaming AES-CMAC.
    pub fn cmac_init(&self, key: MacKey) -> CofferResult<CipherMacContext<'_, T>> {
        self.cipher_mac_init(MacAlgo::AesCmac, key)
    }

    /// Start a streaming AES-CBC-MAC.
    pub fn cbc_mac_init(&self, key: MacKey) -> CofferResult<CipherMacContext<'_, T>> {
        self.cipher_mac_init(MacAlgo::AesCbcMac, key)
    }

    /// Start a streaming C2-H.
    pub fn c2_mac_init(&self, key: MacKey) -> CofferResult<CipherMacContext<'_, T>> {
        self.cipher_mac_init(MacAlgo::C2H, key)
    }

    fn cipher_mac_init(
        &self,
        algo: MacAlgo,
        key: MacKey,
    ) -> CofferResult<CipherMacContext<'_, T>> {
        crate::router::route_mac(self.capabilities(), algo)?;
        key.check(algo)?;
        if let MacKey::Asset(id) = &key {
            let want = if algo == MacAlgo::C2H {
                CipherAlgo::C2
            } else {
                CipherAlgo::Aes
            };
            self.check_known_shape(*id, |shape| {
                matches!(shape, KeyShape::CipherMacKey { algo: key_algo } if *key_algo == want)
            })?;
        }
        Ok(CipherMacContext {
            cm: self,
            algo,
            key,
            stream: StreamState::new(algo.block_size(), algo.state_size(), true),
            pending: Vec::new(),
        })
    }
}

impl<T: CofferTransport> CipherMacContext<'_, T> {
    pub fn algo(&self) -> MacAlgo {
        self.algo
    }

    pub fn location(&self) -> Location {
        self.stream.location()
    }

    pub fn update(&mut self, data: &[u8]) -> CofferResult<()> {
        self.update_with(data, StatePlacement::Keep)
    }

    pub fn update_with(&mut self, data: &[u8], placement: StatePlacement) -> CofferResult<()> {
        let send_len = if withholds_tail(self.algo) {
            let block = self.algo.block_size();
            if data.len() % block != 0 {
                return Err(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT);
            }
            self.pending.extend_from_slice(data);
            self.pending.len().saturating_sub(block)
        } else {
            data.len()
        };
        if send_len == 0 && placement == StatePlacement::Keep {
            if withholds_tail(self.algo) || self.stream.started() {
                return Ok(());
            }
        }
        let plan = self.stream.plan(send_len, false, placement)?;
        let resp = if withholds_tail(self.algo) {
            let resp = self.exchange(&self.pending[..send_len], &plan)?;
            self.pending.drain(..send_len);
            resp
        } else {
            self.exchange(data, &plan)?
        };
        self.stream.commit(&plan);
        if matches!(self.stream.location(), Location::InContext) {
            let mut state = [0u8; 64];
            let n = self.algo.state_size();
            wire::read_mac(&resp, &mut state[..n])?;
            self.stream.set_state(&state[..n]);
        }
        Ok(())
    }

    /// Feed the final segment and read the MAC. Returns the MAC length.
    ///
    /// Two zero-total-length messages are special: CBC-MAC of an empty
    /// message is the all-zero MAC and never reaches the module, while CMAC
    /// and C2-H of an empty message are one padded zero block and do.
    pub fn finalize(self, data: &[u8], mac_out: &mut [u8]) -> CofferResult<usize> {
        self.finalize_with(data, StatePlacement::Keep, mac_out)
    }

    pub fn finalize_with(
        mut self,
        data: &[u8],
        placement: StatePlacement,
        mac_out: &mut [u8],
    ) -> CofferResult<usize> {
        let mac_len = self.algo.mac_size();
        if mac_out.len() < mac_len {
            return Err(CofferError::DRIVER_BUFFER_TOO_SMALL);
        }
        let mut tail = core::mem::take(&mut self.pending);
        tail.extend_from_slice(data);
        let plan = self.stream.plan(tail.len(), true, placement)?;
        if self.algo == MacAlgo::AesCbcMac && plan.init && plan.total_after == 0 {
            mac_out[..mac_len].fill(0);
            return Ok(mac_len);
        }
        let resp = self.exchange(&tail, &plan)?;
        self.stream.commit(&plan);
        wire::read_mac(&resp, &mut mac_out[..mac_len])?;
        Ok(mac_len)
    }

    fn exchange(&self, data: &[u8], plan: &SegmentPlan) -> CofferResult<ResponseToken> {
        let mut cmd = wire::command(0);
        wire::set_control(&mut cmd, self.algo, plan.init, plan.is_final);
        wire::set_state_location(&mut cmd, plan.code);
        if plan.asset.is_valid() {
            wire::set_state_asset(&mut cmd, plan.asset);
        }
        if !plan.init && matches!(plan.code, LocationCode::InContext | LocationCode::ToAsset) {
            wire::write_state(&mut cmd, self.stream.state())?;
        }
        if plan.is_final {
            wire::set_total_length(&mut cmd, plan.total_after);
        }
        self.key.apply(&mut cmd)?;
        self.cm.channel.with_transport(|t| {
            let input = t
                .prepare_input(data)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_data(&mut cmd, input, data.len() as u32);
            self.cm.channel.round_trip(t, &mut cmd)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelConfig;
    use coffer_api::{
        AssetId, CofferCapabilities, CommandToken, DescriptorHandle, TransportError,
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
        cm.set_capabilities(
            CofferCapabilities::AES | CofferCapabilities::CMAC | CofferCapabilities::CBC_MAC,
        );
        cm
    }

    #[test]
    fn test_cbc_mac_of_nothing_never_reaches_hardware() {
        // NoContact panics on any transport call, so this passing proves the
        // all-zero MAC came from the driver alone.
        let cm = cm();
        let ctx = cm.cbc_mac_init(MacKey::Literal(vec![0x2B; 16])).unwrap();
        let mut mac = [0xFFu8; 16];
        let n = ctx.finalize(&[], &mut mac).unwrap();
        assert_eq!(n, 16);
        assert_eq!(mac, [0u8; 16]);
    }

    #[test]
    fn test_cmac_withholds_trailing_block() {
        // A single block is held back for the final tweak; NoContact proves
        // the update never reached hardware.
        let cm = cm();
        let mut ctx = cm.cmac_init(MacKey::Literal(vec![0x2B; 16])).unwrap();
        ctx.update(&[0xAA; 16]).unwrap();
        assert_eq!(
            ctx.update(&[0; 10]).err(),
            Some(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT)
        );
    }

    #[test]
    fn test_cmac_key_length_checked_locally() {
        assert_eq!(
            cm().cmac_init(MacKey::Literal(vec![0; 20])).err(),
            Some(CofferError::DRIVER_ROUTER_KEY_LENGTH)
        );
    }

    #[test]
    fn test_c2_mac_requires_engine() {
        assert_eq!(
            cm().c2_mac_init(MacKey::Literal(vec![0; 7])).err(),
            Some(CofferError::DRIVER_ROUTER_FEATURE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_recorded_key_shape_rejects_non_mac_key() {
        // An encrypt-only cipher key offered as a CMAC key fails from the
        // recorded shape; NoContact proves no token was built.
        let cm = cm();
        cm.record_shape(
            AssetId(9),
            KeyShape::CipherKey {
                algo: CipherAlgo::Aes,
                encrypt: true,
                decrypt: false,
            },
        );
        assert_eq!(
            cm.cmac_init(MacKey::Asset(AssetId(9))).err(),
            Some(CofferError::API_POLICY_FUNCTION_MISMATCH)
        );
    }
}
