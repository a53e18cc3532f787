/*++

Licensed under the Apache-2.0 license.

File Name:

    stream.rs

Abstract:

    File contains the segment bookkeeping shared by every streaming
    context: state location, init/final flag derivation, block-granularity
    and running-length checks.

--*/

use coffer_api::{AssetId, LocationCode, MAX_ASSET_SIZE};
use coffer_error::{CofferError, CofferResult};

/// Where a streaming context's intermediate state currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Inline in the context; travels inside tokens.
    InContext,

    /// In an asset-store slot; tokens reference it by ID.
    InAsset(AssetId),
}

/// Per-call request for where the state should live after the segment.
///
/// `Park` and `Recall` are transients: they appear in exactly one command
/// token and the context normalizes back to [`Location`] when the call
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePlacement {
    /// Leave the state where it is.
    Keep,

    /// Move in-context state into the given asset-store slot.
    Park(AssetId),

    /// Bring asset-held state back into the context.
    Recall,
}

/// The wire encoding decided for one segment. Produced by
/// [`StreamState::plan`], consumed by the family dispatcher building the
/// token, then handed back to [`StreamState::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentPlan {
    pub init: bool,
    pub is_final: bool,
    pub code: LocationCode,
    pub asset: AssetId,
    pub total_after: u64,
}

/// Streaming segment bookkeeping. One per context; the family dispatchers
/// own the algorithm-specific token layout, this owns the rules that are
/// identical across hash, MAC and cipher streams.
pub(crate) struct StreamState {
    location: Location,
    state: [u8; MAX_ASSET_SIZE],
    state_len: usize,
    total_len: u64,
    started: bool,
    finished: bool,
    block_size: usize,
    asset_state_ok: bool,
}

impl StreamState {
    pub fn new(block_size: usize, state_len: usize, asset_state_ok: bool) -> Self {
        Self {
            location: Location::InContext,
            state: [0; MAX_ASSET_SIZE],
            state_len,
            total_len: 0,
            started: false,
            finished: false,
            block_size,
            asset_state_ok,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// The inline intermediate state from the last completed segment.
    pub fn state(&self) -> &[u8] {
        &self.state[..self.state_len]
    }

    /// Record the intermediate state a response carried back.
    pub fn set_state(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= MAX_ASSET_SIZE);
        self.state_len = bytes.len().min(MAX_ASSET_SIZE);
        self.state[..self.state_len].copy_from_slice(&bytes[..self.state_len]);
    }

    /// Validate one segment against the shared streaming rules and decide
    /// its wire location code. Nothing is mutated; a failed plan leaves the
    /// context exactly as it was.
    pub fn plan(
        &self,
        data_len: usize,
        is_final: bool,
        placement: StatePlacement,
    ) -> CofferResult<SegmentPlan> {
        if self.finished {
            return Err(CofferError::DRIVER_STREAM_ALREADY_FINAL);
        }
        if !is_final && self.block_size > 1 && data_len % self.block_size != 0 {
            return Err(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT);
        }
        let total_after = self
            .total_len
            .checked_add(data_len as u64)
            .ok_or(CofferError::DRIVER_STREAM_LENGTH_OVERFLOW)?;

        if !matches!(placement, StatePlacement::Keep) && !self.asset_state_ok {
            return Err(CofferError::DRIVER_STREAM_NO_ASSET_STATE);
        }

        let init = !self.started;
        let (code, asset) = match (placement, self.location) {
            (StatePlacement::Keep, Location::InContext) => {
                (LocationCode::InContext, AssetId::INVALID)
            }
            (StatePlacement::Keep, Location::InAsset(id)) => {
                if init {
                    return Err(CofferError::DRIVER_STREAM_INIT_FROM_ASSET);
                }
                (LocationCode::InAsset, id)
            }
            (StatePlacement::Park(id), Location::InContext) => {
                if !id.is_valid() {
                    return Err(CofferError::DRIVER_ASSET_INVALID_ID);
                }
                if is_final {
                    return Err(CofferError::DRIVER_STREAM_FINAL_TO_ASSET);
                }
                (LocationCode::ToAsset, id)
            }
            (StatePlacement::Park(_), Location::InAsset(_)) => {
                return Err(CofferError::DRIVER_STREAM_STATE_LOCATION);
            }
            (StatePlacement::Recall, Location::InAsset(id)) => {
                if init {
                    return Err(CofferError::DRIVER_STREAM_INIT_FROM_ASSET);
                }
                (LocationCode::FromAsset, id)
            }
            (StatePlacement::Recall, Location::InContext) => {
                return Err(CofferError::DRIVER_STREAM_STATE_LOCATION);
            }
        };

        Ok(SegmentPlan {
            init,
            is_final,
            code,
            asset,
            total_after,
        })
    }

    /// Apply a successfully exchanged segment: advance the running length
    /// and normalize the location back to {InContext, InAsset}.
    pub fn commit(&mut self, plan: &SegmentPlan) {
        self.started = true;
        self.total_len = plan.total_after;
        if plan.is_final {
            self.finished = true;
        }
        self.location = match plan.code {
            LocationCode::ToAsset | LocationCode::InAsset => Location::InAsset(plan.asset),
            LocationCode::InContext | LocationCode::FromAsset => Location::InContext,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StreamState {
        StreamState::new(64, 32, true)
    }

    #[test]
    fn test_first_segment_is_init() {
        let s = ctx();
        let plan = s.plan(64, false, StatePlacement::Keep).unwrap();
        assert!(plan.init);
        assert!(!plan.is_final);
        assert_eq!(plan.code, LocationCode::InContext);
        assert_eq!(plan.total_after, 64);
    }

    #[test]
    fn test_single_shot_sets_both_flags() {
        let s = ctx();
        let plan = s.plan(10, true, StatePlacement::Keep).unwrap();
        assert!(plan.init && plan.is_final);
    }

    #[test]
    fn test_partial_segment_only_on_final() {
        let s = ctx();
        assert_eq!(
            s.plan(63, false, StatePlacement::Keep),
            Err(CofferError::DRIVER_STREAM_PARTIAL_SEGMENT)
        );
        assert!(s.plan(63, true, StatePlacement::Keep).is_ok());
    }

    #[test]
    fn test_use_after_final_rejected() {
        let mut s = ctx();
        let plan = s.plan(0, true, StatePlacement::Keep).unwrap();
        s.commit(&plan);
        assert_eq!(
            s.plan(64, false, StatePlacement::Keep),
            Err(CofferError::DRIVER_STREAM_ALREADY_FINAL)
        );
    }

    #[test]
    fn test_park_then_continue_in_asset() {
        let mut s = ctx();
        let plan = s.plan(64, false, StatePlacement::Park(AssetId(5))).unwrap();
        assert_eq!(plan.code, LocationCode::ToAsset);
        s.commit(&plan);
        assert_eq!(s.location(), Location::InAsset(AssetId(5)));

        let plan = s.plan(64, false, StatePlacement::Keep).unwrap();
        assert_eq!(plan.code, LocationCode::InAsset);
        assert_eq!(plan.asset, AssetId(5));
    }

    #[test]
    fn test_recall_normalizes_to_context() {
        let mut s = ctx();
        let plan = s.plan(64, false, StatePlacement::Park(AssetId(5))).unwrap();
        s.commit(&plan);
        let plan = s.plan(64, false, StatePlacement::Recall).unwrap();
        assert_eq!(plan.code, LocationCode::FromAsset);
        s.commit(&plan);
        assert_eq!(s.location(), Location::InContext);
    }

    #[test]
    fn test_final_to_asset_rejected() {
        let s = ctx();
        assert_eq!(
            s.plan(0, true, StatePlacement::Park(AssetId(5))),
            Err(CofferError::DRIVER_STREAM_FINAL_TO_ASSET)
        );
    }

    #[test]
    fn test_placement_mismatch_rejected() {
        let mut s = ctx();
        assert_eq!(
            s.plan(0, false, StatePlacement::Recall),
            Err(CofferError::DRIVER_STREAM_STATE_LOCATION)
        );
        let plan = s.plan(64, false, StatePlacement::Park(AssetId(5))).unwrap();
        s.commit(&plan);
        assert_eq!(
            s.plan(64, false, StatePlacement::Park(AssetId(6))),
            Err(CofferError::DRIVER_STREAM_STATE_LOCATION)
        );
    }

    #[test]
    fn test_no_asset_state_algorithms() {
        // ARC4 and f8 keep keystream state in-context only.
        let s = StreamState::new(1, 2, false);
        assert_eq!(
            s.plan(5, false, StatePlacement::Park(AssetId(5))),
            Err(CofferError::DRIVER_STREAM_NO_ASSET_STATE)
        );
        assert!(s.plan(5, false, StatePlacement::Keep).is_ok());
    }

    #[test]
    fn test_invalid_park_target_rejected() {
        let s = ctx();
        assert_eq!(
            s.plan(64, false, StatePlacement::Park(AssetId::INVALID)),
            Err(CofferError::DRIVER_ASSET_INVALID_ID)
        );
    }

    #[test]
    fn test_failed_plan_leaves_state_untouched() {
        let mut s = ctx();
        let plan = s.plan(64, false, StatePlacement::Keep).unwrap();
        s.commit(&plan);
        let before = s.total_len();
        assert!(s.plan(1, false, StatePlacement::Keep).is_err());
        assert_eq!(s.total_len(), before);
        assert!(!s.started() || s.total_len() == 64);
    }
}
