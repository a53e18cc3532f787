/*++

Licensed under the Apache-2.0 license.

File Name:

    init.rs

Abstract:

    File contains one-time module initialization: version/capability
    discovery, the module self-test battery, and a driver-side SHA-256
    known-answer check through the full token path.

--*/

use crate::{CofferCm, CofferError, CofferResult};
use coffer_api::{system as wire, CofferTransport, HashAlgo};
use core::sync::atomic::Ordering;

/// SHA-256 of "abc".
#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA256_KAT_DIGEST: [u8; 32] = [
    0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea,
    0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22, 0x23,
    0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c,
    0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00, 0x15, 0xad,
];

/// One-time initialization tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl InitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => InitState::Uninitialized,
            1 => InitState::Initializing,
            _ => InitState::Ready,
        }
    }
}

impl<T: CofferTransport> CofferCm<T> {
    pub fn init_state(&self) -> InitState {
        InitState::from_u8(self.init_state.load(Ordering::Acquire))
    }

    /// Firmware version word reported at init; zero before.
    pub fn firmware_version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Run one-time initialization. Exactly one caller performs the work;
    /// a second caller arriving while it runs is a caller-ordering error,
    /// and any caller arriving after success gets `Ok` with no round-trip.
    /// A failed attempt resets the state so init can be retried.
    pub fn init(&self) -> CofferResult<()> {
        match self.init_state.compare_exchange(
            InitState::Uninitialized as u8,
            InitState::Initializing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(current) if current == InitState::Ready as u8 => return Ok(()),
            Err(_) => return Err(CofferError::DRIVER_INIT_IN_PROGRESS),
        }

        let result = self.run_init();
        let next = match result {
            Ok(()) => InitState::Ready,
            Err(_) => InitState::Uninitialized,
        };
        self.init_state.store(next as u8, Ordering::Release);
        result
    }

    fn run_init(&self) -> CofferResult<()> {
        let mut cmd = wire::version_command(0);
        let resp = self.channel.exchange(&mut cmd)?;
        self.version.store(wire::version(&resp), Ordering::Release);
        self.set_capabilities(wire::capabilities(&resp));

        let mut cmd = wire::self_test_command(0);
        self.channel.exchange(&mut cmd)?;

        // The module's battery passing says little about the path between
        // us and it; run one known answer end to end.
        if self.capabilities().supports_hash(HashAlgo::Sha256) {
            let mut digest = [0u8; 32];
            self.hash(HashAlgo::Sha256, b"abc", &mut digest)?;
            if digest != SHA256_KAT_DIGEST {
                return Err(CofferError::DRIVER_INIT_SELF_TEST_FAILED);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelConfig;
    use coffer_api::{
        CofferCapabilities, CommandToken, DescriptorHandle, HwStatus, Opcode, ResponseToken,
        TransportError,
    };
    use std::cell::Cell;
    use std::rc::Rc;

    /// System-token-only module: answers version and self-test, counts
    /// exchanges, optionally fails the self-test battery.
    struct SystemOnly {
        exchanges: Rc<Cell<u32>>,
        fail_self_test: bool,
    }

    impl CofferTransport for SystemOnly {
        fn exchange(&mut self, cmd: &CommandToken) -> Result<ResponseToken, TransportError> {
            self.exchanges.set(self.exchanges.get() + 1);
            let mut resp = ResponseToken::reply_to(cmd);
            assert_eq!(cmd.opcode().unwrap(), Opcode::System);
            match cmd.subcode() {
                wire::SUBCODE_VERSION => {
                    // A module with no SHA-256, so the KAT leg is skipped.
                    wire::set_version_info(&mut resp, 0x0001_0000, CofferCapabilities::AES);
                }
                _ => {
                    if self.fail_self_test {
                        resp.0[1] = HwStatus::OperationFailed.encode();
                    }
                }
            }
            Ok(resp)
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

    #[test]
    fn test_init_once_then_free() {
        let exchanges = Rc::new(Cell::new(0));
        let cm = CofferCm::new(
            SystemOnly {
                exchanges: exchanges.clone(),
                fail_self_test: false,
            },
            ChannelConfig::default(),
        );
        assert_eq!(cm.init_state(), InitState::Uninitialized);
        cm.init().unwrap();
        assert_eq!(cm.init_state(), InitState::Ready);
        assert_eq!(cm.firmware_version(), 0x0001_0000);
        assert_eq!(cm.capabilities(), CofferCapabilities::AES);
        let after_first = exchanges.get();
        assert_eq!(after_first, 2);

        // Re-init when ready is success with no hardware contact.
        cm.init().unwrap();
        assert_eq!(exchanges.get(), after_first);
    }

    #[test]
    fn test_failed_init_can_be_retried() {
        let exchanges = Rc::new(Cell::new(0));
        let cm = CofferCm::new(
            SystemOnly {
                exchanges: exchanges.clone(),
                fail_self_test: true,
            },
            ChannelConfig::default(),
        );
        assert_eq!(cm.init(), Err(CofferError::HW_OPERATION_FAILED));
        assert_eq!(cm.init_state(), InitState::Uninitialized);
        // The next attempt goes back to hardware rather than reporting a
        // stuck in-progress state.
        assert_eq!(cm.init(), Err(CofferError::HW_OPERATION_FAILED));
        assert!(exchanges.get() >= 4);
    }
}
