/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    User-space driver for the Coffer crypto module: asset store client,
    streaming operation dispatcher, algorithm router and the exclusive
    token-exchange channel.

--*/

mod asset;
mod channel;
mod cipher;
mod cmac;
mod hash;
mod hmac;
mod init;
mod router;
mod stream;

pub use asset::{TempAssetFor, ROOT_KEY_INDEX};
pub use channel::ChannelConfig;
pub use cipher::{CipherContext, CipherKey};
pub use cmac::CipherMacContext;
pub use coffer_api::{
    keyblob_size, AssetId, AssetPolicy, CofferCapabilities, CofferTransport, FeedbackMode,
    HashAlgo, KeyShape, MacAlgo, SymKeyType,
};
pub use coffer_error::{CofferError, CofferResult, ErrorKind};
pub use hash::HashContext;
pub use hmac::{HmacContext, MacKey};
pub use init::InitState;
pub use stream::{Location, StatePlacement};

use channel::ExclusiveChannel;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::collections::HashMap;
use std::sync::Mutex;

/// Driver handle for one Coffer crypto module.
///
/// All methods take `&self`; the exclusive channel inside serializes every
/// token exchange, so a single handle may be shared across threads. The
/// streaming contexts handed back by the dispatcher are the one exception:
/// each context belongs to exactly one logical operation and must not be
/// shared without external locking.
pub struct CofferCm<T: CofferTransport> {
    pub(crate) channel: ExclusiveChannel<T>,

    /// Engine families the attached module offers; learned from the
    /// Version token during [`CofferCm::init`].
    capabilities: AtomicU32,

    /// Firmware version word from the same token.
    version: AtomicU32,

    /// Tri-state one-time init flag (see [`init::InitState`]).
    init_state: AtomicU8,

    /// Shapes of assets allocated through this handle, keyed by raw id.
    /// Consulted to refuse policy-violating key use before a token is
    /// built. Assets found by [`CofferCm::search`] have no entry here and
    /// rely on the module's own policy check.
    shapes: Mutex<HashMap<u32, KeyShape>>,
}

impl<T: CofferTransport> CofferCm<T> {
    /// Wrap a transport. The handle is not usable for cryptographic work
    /// until [`CofferCm::init`] has run once.
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Self {
            channel: ExclusiveChannel::new(transport, config),
            capabilities: AtomicU32::new(0),
            version: AtomicU32::new(0),
            init_state: AtomicU8::new(init::InitState::Uninitialized as u8),
            shapes: Mutex::new(HashMap::new()),
        }
    }

    /// The capability matrix reported by the module, empty before init.
    pub fn capabilities(&self) -> CofferCapabilities {
        CofferCapabilities::from_wire(self.capabilities.load(Ordering::Acquire))
    }

    fn set_capabilities(&self, caps: CofferCapabilities) {
        self.capabilities.store(caps.bits(), Ordering::Release);
    }

    pub(crate) fn record_shape(&self, id: AssetId, shape: KeyShape) {
        self.lock_shapes().insert(id.0, shape);
    }

    pub(crate) fn forget_shape(&self, id: AssetId) {
        self.lock_shapes().remove(&id.0);
    }

    /// The shape recorded when `id` was allocated, if it was allocated
    /// through this handle.
    pub(crate) fn known_shape(&self, id: AssetId) -> Option<KeyShape> {
        self.lock_shapes().get(&id.0).copied()
    }

    /// Refuse a key use the recorded shape does not permit. Ids without a
    /// recorded shape pass; the module enforces the policy either way.
    pub(crate) fn check_known_shape(
        &self,
        id: AssetId,
        permits: impl FnOnce(&KeyShape) -> bool,
    ) -> CofferResult<()> {
        match self.known_shape(id) {
            Some(shape) if !permits(&shape) => Err(CofferError::API_POLICY_FUNCTION_MISMATCH),
            _ => Ok(()),
        }
    }

    fn lock_shapes(&self) -> std::sync::MutexGuard<'_, HashMap<u32, KeyShape>> {
        self.shapes.lock().unwrap_or_else(|e| e.into_inner())
    }
}
