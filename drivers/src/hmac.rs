/*++

Licensed under the Apache-2.0 license.

File Name:

    hmac.rs

Abstract:

    File contains the streaming HMAC dispatcher (HMAC-SHA-1/224/256/384/512).

--*/

use crate::stream::{SegmentPlan, StatePlacement, StreamState};
use crate::{CofferCm, CofferError, CofferResult, Location};
use coffer_api::{
    mac as wire, AssetId, CofferTransport, HashAlgo, KeyShape, LocationCode, MacAlgo,
    ResponseToken,
};

/// Key material for a MAC operation: literal bytes or an asset-store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacKey {
    Literal(Vec<u8>),
    Asset(AssetId),
}

impl MacKey {
    pub(crate) fn check(&self, algo: MacAlgo) -> CofferResult<()> {
        match self {
            MacKey::Literal(key) => {
                if !crate::router::mac_key_len_legal(algo, key.len()) {
                    return Err(CofferError::DRIVER_ROUTER_KEY_LENGTH);
                }
            }
            MacKey::Asset(id) => {
                if !id.is_valid() {
                    return Err(CofferError::DRIVER_ASSET_INVALID_ID);
                }
            }
        }
        Ok(())
    }

    /// Write this key into a MAC command token.
    pub(crate) fn apply(&self, cmd: &mut coffer_api::CommandToken) -> CofferResult<()> {
        match self {
            MacKey::Literal(key) => wire::set_key_literal(cmd, key),
            // Zero length: the module takes the length from the asset slot.
            MacKey::Asset(id) => {
                wire::set_key_asset(cmd, *id, 0);
                Ok(())
            }
        }
    }
}

/// A streaming HMAC operation. The intermediate state lives in the context
/// (or a parked asset) between segments; the key rides every token.
pub struct HmacContext<'a, T: CofferTransport> {
    cm: &'a CofferCm<T>,
    algo: MacAlgo,
    key: MacKey,
    stream: StreamState,
    /// Sub-block tail held back until a whole block accumulates.
    pending: Vec<u8>,
}

impl<T: CofferTransport> CofferCm<T> {
    /// Start a streaming HMAC. Literal keys longer than the token's inline
    /// capacity are first condensed through a single-shot hash, which is the
    /// standard HMAC long-key rule.
    pub fn hmac_init(&self, hash: HashAlgo, key: MacKey) -> CofferResult<HmacContext<'_, T>> {
        let algo = MacAlgo::hmac(hash);
        crate::router::route_mac(self.capabilities(), algo)?;
        key.check(algo)?;
        if let MacKey::Asset(id) = &key {
            self.check_known_shape(*id, |shape| {
                matches!(shape, KeyShape::HmacKey { hash: h } if *h == hash)
            })?;
        }
        let key = match key {
            MacKey::Literal(bytes) if bytes.len() > wire::MAX_INLINE_KEY_SIZE => {
                let mut digest = vec![0u8; hash.digest_size()];
                self.hash(hash, &bytes, &mut digest)?;
                MacKey::Literal(digest)
            }
            other => other,
        };
        Ok(HmacContext {
            cm: self,
            algo,
            key,
            stream: StreamState::new(algo.block_size(), algo.state_size(), true),
            pending: Vec::new(),
        })
    }

    /// Single-shot HMAC. Returns the MAC length.
    pub fn hmac(
        &self,
        hash: HashAlgo,
        key: MacKey,
        data: &[u8],
        mac_out: &mut [u8],
    ) -> CofferResult<usize> {
        self.hmac_init(hash, key)?.finalize(data, mac_out)
    }
}

impl<T: CofferTransport> HmacContext<'_, T> {
    pub fn location(&self) -> Location {
        self.stream.location()
    }

    /// Feed a non-final segment of any length. Sub-block tails are buffered
    /// in the context until a whole block is available.
    pub fn update(&mut self, data: &[u8]) -> CofferResult<()> {
        self.update_with(data, StatePlacement::Keep)
    }

    /// Feed a non-final segment and move the intermediate state as requested.
    pub fn update_with(&mut self, data: &[u8], placement: StatePlacement) -> CofferResult<()> {
        let block = self.algo.block_size();
        let total = self.pending.len() + data.len();
        let send_len = total - (total % block);
        if send_len == 0 && placement == StatePlacement::Keep {
            self.pending.extend_from_slice(data);
            return Ok(());
        }
        let plan = self.stream.plan(send_len, false, placement)?;
        let resp = if send_len == 0 {
            // A state move with only a sub-block tail buffered; the tail
            // stays back and the segment goes out empty.
            let resp = self.exchange(&[], &plan)?;
            self.pending.extend_from_slice(data);
            resp
        } else {
            let take = send_len - self.pending.len();
            let mut seg = core::mem::take(&mut self.pending);
            seg.extend_from_slice(&data[..take]);
            let resp = self.exchange(&seg, &plan)?;
            self.pending.extend_from_slice(&data[take..]);
            resp
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
        let plan = self
            .stream
            .plan(self.pending.len() + data.len(), true, placement)?;
        let mut tail = core::mem::take(&mut self.pending);
        tail.extend_from_slice(data);
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
