// Licensed under the Apache-2.0 license

//! The transport collaborator interface.
//!
//! Register access, interrupt handling and DMA bounce buffering live below
//! this trait. The driver sees exactly three things: a blocking token
//! exchange and the two descriptor-preparation hooks for bulk payloads.

use crate::token::{CommandToken, ResponseToken};

/// Opaque DMA descriptor handle minted by the transport. The value travels
/// inside command tokens; the driver never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle(pub u32);

impl DescriptorHandle {
    /// Written into descriptor words of token families that take no bulk
    /// payload on this call.
    pub const NONE: DescriptorHandle = DescriptorHandle(0);
}

/// Transport-level failures. The driver maps every variant onto
/// `InternalError`; distinguishing them is for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No response token within the transport's own deadline.
    Timeout,

    /// The hand-off itself failed.
    Fault,

    /// Descriptor bookkeeping failure (unknown handle, pool exhausted).
    Descriptor,
}

/// One physical mailbox to the Coffer crypto module.
///
/// `exchange` is a complete round-trip: hand the command token over, block
/// until the response token is available. Serialization across callers is
/// not this trait's job; the exclusive channel above it owns that.
pub trait CofferTransport {
    fn exchange(&mut self, cmd: &CommandToken) -> Result<ResponseToken, TransportError>;

    /// Stage `data` for device reads during the next exchange.
    fn prepare_input(&mut self, data: &[u8]) -> Result<DescriptorHandle, TransportError>;

    /// Reserve `capacity` bytes for device writes during the next exchange.
    fn prepare_output(&mut self, capacity: usize) -> Result<DescriptorHandle, TransportError>;

    /// Collect the bytes the device wrote through `desc`; returns the actual
    /// length. Consumes the descriptor.
    fn read_output(
        &mut self,
        desc: DescriptorHandle,
        buf: &mut [u8],
    ) -> Result<usize, TransportError>;
}
