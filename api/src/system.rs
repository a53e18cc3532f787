// Licensed under the Apache-2.0 license

//! System token family (opcode 0x0F).
//!
//! Subcode 0 (version): response word 2 firmware version, word 3 the
//! capability word. Subcode 1 (self-test): the module runs its internal
//! known-answer battery; a failing battery reports through the status word.

use crate::capabilities::CofferCapabilities;
use crate::token::{CommandToken, Opcode, ResponseToken};

pub const SUBCODE_VERSION: u8 = 0;
pub const SUBCODE_SELF_TEST: u8 = 1;

pub const RESP_WORD_VERSION: usize = 2;
pub const RESP_WORD_CAPABILITIES: usize = 3;

pub fn version_command(token_id: u16) -> CommandToken {
    CommandToken::new(Opcode::System, SUBCODE_VERSION, token_id)
}

pub fn self_test_command(token_id: u16) -> CommandToken {
    CommandToken::new(Opcode::System, SUBCODE_SELF_TEST, token_id)
}

pub fn version(resp: &ResponseToken) -> u32 {
    resp.0[RESP_WORD_VERSION]
}

pub fn capabilities(resp: &ResponseToken) -> CofferCapabilities {
    CofferCapabilities::from_wire(resp.0[RESP_WORD_CAPABILITIES])
}

pub fn set_version_info(resp: &mut ResponseToken, version: u32, caps: CofferCapabilities) {
    resp.0[RESP_WORD_VERSION] = version;
    resp.0[RESP_WORD_CAPABILITIES] = caps.bits();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let cmd = version_command(5);
        assert_eq!(cmd.0[0], 0x0F00_0005);
        let cmd = self_test_command(6);
        assert_eq!(cmd.0[0], 0x0F10_0006);
    }

    #[test]
    fn test_version_info_round_trip() {
        let cmd = version_command(0);
        let mut resp = ResponseToken::reply_to(&cmd);
        let caps = CofferCapabilities::AES | CofferCapabilities::SHA2;
        set_version_info(&mut resp, 0x0001_0002, caps);
        assert_eq!(version(&resp), 0x0001_0002);
        assert_eq!(capabilities(&resp), caps);
    }
}
