// Licensed under the Apache-2.0 license

//! Engine capability bits reported by the Version token.
//!
//! The driver assembles its feature matrix from this word at init time and
//! refuses operations the attached module cannot run, instead of selecting
//! backends at compile time.

use crate::algo::{FeedbackMode, HashAlgo, MacAlgo, SymKeyType};

bitflags::bitflags! {
    #[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
    pub struct CofferCapabilities : u32 {
        const SHA1     = 1 << 0;
        const SHA2     = 1 << 1;
        const HMAC     = 1 << 2;
        const AES      = 1 << 3;
        const DES      = 1 << 4;
        const TDES     = 1 << 5;
        const ARC4     = 1 << 6;
        const CAMELLIA = 1 << 7;
        const C2       = 1 << 8;
        const MULTI2   = 1 << 9;
        const AES_F8   = 1 << 10;
        const CMAC     = 1 << 11;
        const CBC_MAC  = 1 << 12;
        const KEYBLOB  = 1 << 13;
        const DERIVE   = 1 << 14;
        const RNG      = 1 << 15;
    }
}

impl CofferCapabilities {
    pub const SIZE_IN_BYTES: usize = 4;

    pub fn to_bytes(&self) -> [u8; CofferCapabilities::SIZE_IN_BYTES] {
        self.bits().to_le_bytes()
    }

    /// Parse the capability word from the Version response; undefined bits
    /// from newer firmware are dropped rather than rejected.
    pub fn from_wire(raw: u32) -> Self {
        CofferCapabilities::from_bits_truncate(raw)
    }

    pub fn supports_hash(&self, algo: HashAlgo) -> bool {
        match algo {
            HashAlgo::Sha1 => self.contains(CofferCapabilities::SHA1),
            _ => self.contains(CofferCapabilities::SHA2),
        }
    }

    pub fn supports_mac(&self, algo: MacAlgo) -> bool {
        match algo {
            MacAlgo::AesCmac => self.contains(CofferCapabilities::CMAC | CofferCapabilities::AES),
            MacAlgo::AesCbcMac => {
                self.contains(CofferCapabilities::CBC_MAC | CofferCapabilities::AES)
            }
            MacAlgo::C2H => self.contains(CofferCapabilities::C2),
            _ => match algo.hash_algo() {
                Some(h) => self.contains(CofferCapabilities::HMAC) && self.supports_hash(h),
                None => false,
            },
        }
    }

    pub fn supports_cipher(&self, key_type: SymKeyType, _mode: FeedbackMode) -> bool {
        match key_type {
            SymKeyType::Aes => self.contains(CofferCapabilities::AES),
            SymKeyType::Des => self.contains(CofferCapabilities::DES),
            SymKeyType::TripleDes => self.contains(CofferCapabilities::TDES),
            SymKeyType::Arc4 => self.contains(CofferCapabilities::ARC4),
            SymKeyType::Camellia => self.contains(CofferCapabilities::CAMELLIA),
            SymKeyType::C2 => self.contains(CofferCapabilities::C2),
            SymKeyType::Multi2 => self.contains(CofferCapabilities::MULTI2),
            SymKeyType::AesF8 => self.contains(CofferCapabilities::AES_F8),
        }
    }
}
