/*++

Licensed under the Apache-2.0 license.

File Name:

    channel.rs

Abstract:

    File contains the exclusive token-exchange channel. One physical
    mailbox, one exchange in flight system-wide.

--*/

use coffer_api::status::parse_status;
use coffer_api::{CofferTransport, CommandToken, ResponseToken};
use coffer_error::{CofferError, CofferResult};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Channel tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// How long a caller waits for exclusive mailbox access before the
    /// operation fails hard. There is no silent retry.
    pub lock_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Serializes all token exchanges over the one hardware mailbox.
///
/// The transport is parked in an `Option`; a caller takes it out under the
/// mutex (waiting up to the configured deadline when another caller holds
/// it), runs its whole transaction on the owned value outside the lock, and
/// puts it back. Descriptor preparation therefore stays paired with the
/// exchange it belongs to.
pub struct ExclusiveChannel<T> {
    slot: Mutex<Option<T>>,
    available: Condvar,
    config: ChannelConfig,
    next_token_id: AtomicU16,
}

impl<T: CofferTransport> ExclusiveChannel<T> {
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Self {
            slot: Mutex::new(Some(transport)),
            available: Condvar::new(),
            config,
            next_token_id: AtomicU16::new(1),
        }
    }

    /// Run `f` with exclusive ownership of the transport. Acquisition is
    /// bounded by the configured deadline; timing out is a hard
    /// `InternalError`, never a silent retry.
    pub fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut T) -> CofferResult<R>,
    ) -> CofferResult<R> {
        let mut transport = self.acquire()?;
        let result = f(&mut transport);
        self.release(transport);
        result
    }

    fn acquire(&self) -> CofferResult<T> {
        let deadline = Instant::now() + self.config.lock_timeout;
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| CofferError::DRIVER_CHANNEL_POISONED)?;
        loop {
            if let Some(transport) = guard.take() {
                return Ok(transport);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CofferError::DRIVER_CHANNEL_LOCK_TIMEOUT);
            }
            let (g, wait) = self
                .available
                .wait_timeout(guard, deadline - now)
                .map_err(|_| CofferError::DRIVER_CHANNEL_POISONED)?;
            guard = g;
            if wait.timed_out() && guard.is_none() {
                return Err(CofferError::DRIVER_CHANNEL_LOCK_TIMEOUT);
            }
        }
    }

    fn release(&self, transport: T) {
        // A poisoned slot means some caller panicked while the transport was
        // checked out; parking it back is still the best we can do.
        if let Ok(mut guard) = self.slot.lock() {
            *guard = Some(transport);
        }
        self.available.notify_one();
    }

    /// Stamp a fresh token identifier into `cmd`, finalize its checksum,
    /// hand it through the transport, and validate the response envelope:
    /// header echo first, then the status word.
    pub fn round_trip(&self, transport: &mut T, cmd: &mut CommandToken) -> CofferResult<ResponseToken> {
        let id = self.next_token_id.fetch_add(1, Ordering::Relaxed);
        cmd.0[0] = (cmd.0[0] & 0xFFFF_0000) | id as u32;
        cmd.populate_checksum();

        let resp = transport
            .exchange(cmd)
            .map_err(|_| CofferError::DRIVER_CHANNEL_TRANSPORT)?;

        if !resp.matches(cmd) {
            return Err(CofferError::API_TOKEN_ID_MISMATCH);
        }
        parse_status(&resp)?;
        Ok(resp)
    }

    /// Single-token convenience: acquire, round-trip, release.
    pub fn exchange(&self, cmd: &mut CommandToken) -> CofferResult<ResponseToken> {
        self.with_transport(|t| self.round_trip(t, cmd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_api::{DescriptorHandle, Opcode, TransportError};

    /// Transport that answers every command with a success echo.
    struct EchoTransport;

    impl CofferTransport for EchoTransport {
        fn exchange(&mut self, cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
            Ok(ResponseToken::reply_to(cmd))
        }
        fn prepare_input(&mut self, _data: &[u8]) -> Result<DescriptorHandle, TransportError> {
            Ok(DescriptorHandle(1))
        }
        fn prepare_output(&mut self, _capacity: usize) -> Result<DescriptorHandle, TransportError> {
            Ok(DescriptorHandle(2))
        }
        fn read_output(
            &mut self,
            _desc: DescriptorHandle,
            _buf: &mut [u8],
        ) -> Result<usize, TransportError> {
            Ok(0)
        }
    }

    /// Transport that never answers.
    struct FaultTransport;

    impl CofferTransport for FaultTransport {
        fn exchange(&mut self, _cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
            Err(TransportError::Timeout)
        }
        fn prepare_input(&mut self, _data: &[u8]) -> Result<DescriptorHandle, TransportError> {
            Err(TransportError::Fault)
        }
        fn prepare_output(&mut self, _capacity: usize) -> Result<DescriptorHandle, TransportError> {
            Err(TransportError::Fault)
        }
        fn read_output(
            &mut self,
            _desc: DescriptorHandle,
            _buf: &mut [u8],
        ) -> Result<usize, TransportError> {
            Err(TransportError::Fault)
        }
    }

    #[test]
    fn test_round_trip_stamps_fresh_token_ids() {
        let channel = ExclusiveChannel::new(EchoTransport, ChannelConfig::default());
        let mut cmd = CommandToken::new(Opcode::System, 0, 0);
        channel.exchange(&mut cmd).unwrap();
        let first = cmd.token_id();
        channel.exchange(&mut cmd).unwrap();
        assert_ne!(first, cmd.token_id());
        assert!(cmd.verify_checksum());
    }

    #[test]
    fn test_transport_failure_maps_to_internal() {
        let channel = ExclusiveChannel::new(FaultTransport, ChannelConfig::default());
        let mut cmd = CommandToken::new(Opcode::System, 0, 0);
        assert_eq!(
            channel.exchange(&mut cmd),
            Err(CofferError::DRIVER_CHANNEL_TRANSPORT)
        );
    }

    #[test]
    fn test_lock_timeout_is_hard_error() {
        let channel = ExclusiveChannel::new(
            EchoTransport,
            ChannelConfig {
                lock_timeout: Duration::from_millis(50),
            },
        );
        // Steal the transport so every acquisition must time out.
        let stolen = channel.acquire().unwrap();
        let mut cmd = CommandToken::new(Opcode::System, 0, 0);
        assert_eq!(
            channel.exchange(&mut cmd),
            Err(CofferError::DRIVER_CHANNEL_LOCK_TIMEOUT)
        );
        channel.release(stolen);
        assert!(channel.exchange(&mut cmd).is_ok());
    }
}
