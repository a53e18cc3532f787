/*++

Licensed under the Apache-2.0 license.

File Name:

    hash.rs

Abstract:

    File contains the streaming hash dispatcher (SHA-1/224/256/384/512).

--*/

use crate::stream::{SegmentPlan, StatePlacement, StreamState};
use crate::{CofferCm, CofferError, CofferResult, Location};
use coffer_api::{
    hash as wire, CofferTransport, HashAlgo, LocationCode, ResponseToken,
};

/// A streaming hash operation. Obtained from [`CofferCm::hash_init`]; the
/// digest state lives in the context (or a parked asset) between segments.
pub struct HashContext<'a, T: CofferTransport> {
    cm: &'a CofferCm<T>,
    algo: HashAlgo,
    stream: StreamState,
    /// Sub-block tail held back until a whole block accumulates.
    pending: Vec<u8>,
}

impl<T: CofferTransport> CofferCm<T> {
    /// Start a streaming hash.
    pub fn hash_init(&self, algo: HashAlgo) -> CofferResult<HashContext<'_, T>> {
        crate::router::route_hash(self.capabilities(), algo)?;
        Ok(HashContext {
            cm: self,
            algo,
            stream: StreamState::new(algo.block_size(), algo.state_size(), true),
            pending: Vec::new(),
        })
    }

    /// Single-shot hash. Returns the digest length.
    pub fn hash(&self, algo: HashAlgo, data: &[u8], digest_out: &mut [u8]) -> CofferResult<usize> {
        self.hash_init(algo)?.finalize(data, digest_out)
    }
}

impl<T: CofferTransport> HashContext<'_, T> {
    pub fn algo(&self) -> HashAlgo {
        self.algo
    }

    /// Where the digest state currently lives.
    pub fn location(&self) -> Location {
        self.stream.location()
    }

    /// Feed a non-final segment of any length. Sub-block tails are buffered
    /// in the context until a whole block is available, so a message may be
    /// split at any byte boundary.
    pub fn update(&mut self, data: &[u8]) -> CofferResult<()> {
        self.update_with(data, StatePlacement::Keep)
    }

    /// Feed a non-final segment and move the digest state as requested.
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
            wire::read_digest(&resp, &mut state[..n])?;
            self.stream.set_state(&state[..n]);
        }
        Ok(())
    }

    /// Feed the final segment (any length, possibly empty) and read the
    /// digest. Returns the digest length.
    pub fn finalize(self, data: &[u8], digest_out: &mut [u8]) -> CofferResult<usize> {
        self.finalize_with(data, StatePlacement::Keep, digest_out)
    }

    pub fn finalize_with(
        mut self,
        data: &[u8],
        placement: StatePlacement,
        digest_out: &mut [u8],
    ) -> CofferResult<usize> {
        let digest_len = self.algo.digest_size();
        if digest_out.len() < digest_len {
            return Err(CofferError::DRIVER_BUFFER_TOO_SMALL);
        }
        let plan = self
            .stream
            .plan(self.pending.len() + data.len(), true, placement)?;
        let mut tail = core::mem::take(&mut self.pending);
        tail.extend_from_slice(data);
        let resp = self.exchange(&tail, &plan)?;
        self.stream.commit(&plan);
        wire::read_digest(&resp, &mut digest_out[..digest_len])?;
        Ok(digest_len)
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
        self.cm.channel.with_transport(|t| {
            let input = t
                .prepare_input(data)
                .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;
            wire::set_data(&mut cmd, input, data.len() as u32);
            self.cm.channel.round_trip(t, &mut cmd)
        })
    }
}
