// Licensed under the Apache-2.0 license

//! Algorithm identifiers and their wire encodings.

use coffer_error::{CofferError, CofferResult};

/// Hash algorithms. The discriminant is the wire encoding used in hash and
/// MAC token flag words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HashAlgo {
    Sha1 = 1,
    Sha224 = 2,
    Sha256 = 3,
    Sha384 = 4,
    Sha512 = 5,
}

impl HashAlgo {
    pub const ALL: [HashAlgo; 5] = [
        HashAlgo::Sha1,
        HashAlgo::Sha224,
        HashAlgo::Sha256,
        HashAlgo::Sha384,
        HashAlgo::Sha512,
    ];

    pub fn digest_size(self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha224 => 28,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha384 => 48,
            HashAlgo::Sha512 => 64,
        }
    }

    /// Size of the intermediate digest state carried between segments.
    /// SHA-224/384 run on the wider internal state of their parent.
    pub fn state_size(self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha224 | HashAlgo::Sha256 => 32,
            HashAlgo::Sha384 | HashAlgo::Sha512 => 64,
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            HashAlgo::Sha1 | HashAlgo::Sha224 | HashAlgo::Sha256 => 64,
            HashAlgo::Sha384 | HashAlgo::Sha512 => 128,
        }
    }

    pub fn from_wire(value: u8) -> CofferResult<Self> {
        match value {
            1 => Ok(HashAlgo::Sha1),
            2 => Ok(HashAlgo::Sha224),
            3 => Ok(HashAlgo::Sha256),
            4 => Ok(HashAlgo::Sha384),
            5 => Ok(HashAlgo::Sha512),
            _ => Err(CofferError::HW_INVALID_ALGORITHM),
        }
    }
}

/// MAC algorithms. HMAC variants share the hash encodings; cipher-MAC
/// variants occupy the 8+ range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MacAlgo {
    HmacSha1 = 1,
    HmacSha224 = 2,
    HmacSha256 = 3,
    HmacSha384 = 4,
    HmacSha512 = 5,
    AesCmac = 8,
    AesCbcMac = 9,
    C2H = 10,
}

impl MacAlgo {
    pub fn hmac(hash: HashAlgo) -> Self {
        match hash {
            HashAlgo::Sha1 => MacAlgo::HmacSha1,
            HashAlgo::Sha224 => MacAlgo::HmacSha224,
            HashAlgo::Sha256 => MacAlgo::HmacSha256,
            HashAlgo::Sha384 => MacAlgo::HmacSha384,
            HashAlgo::Sha512 => MacAlgo::HmacSha512,
        }
    }

    pub fn hash_algo(self) -> Option<HashAlgo> {
        match self {
            MacAlgo::HmacSha1 => Some(HashAlgo::Sha1),
            MacAlgo::HmacSha224 => Some(HashAlgo::Sha224),
            MacAlgo::HmacSha256 => Some(HashAlgo::Sha256),
            MacAlgo::HmacSha384 => Some(HashAlgo::Sha384),
            MacAlgo::HmacSha512 => Some(HashAlgo::Sha512),
            _ => None,
        }
    }

    pub fn mac_size(self) -> usize {
        match self {
            MacAlgo::HmacSha1 => 20,
            MacAlgo::HmacSha224 => 28,
            MacAlgo::HmacSha256 => 32,
            MacAlgo::HmacSha384 => 48,
            MacAlgo::HmacSha512 => 64,
            MacAlgo::AesCmac | MacAlgo::AesCbcMac => 16,
            MacAlgo::C2H => 8,
        }
    }

    /// Size of the intermediate MAC state carried between segments.
    pub fn state_size(self) -> usize {
        match self {
            MacAlgo::AesCmac | MacAlgo::AesCbcMac => 16,
            MacAlgo::C2H => 8,
            _ => match self.hash_algo() {
                Some(h) => h.state_size(),
                None => 0,
            },
        }
    }

    /// Input block granularity for non-final segments.
    pub fn block_size(self) -> usize {
        match self {
            MacAlgo::AesCmac | MacAlgo::AesCbcMac => 16,
            MacAlgo::C2H => 8,
            _ => match self.hash_algo() {
                Some(h) => h.block_size(),
                None => 0,
            },
        }
    }

    pub fn from_wire(value: u8) -> CofferResult<Self> {
        match value {
            1 => Ok(MacAlgo::HmacSha1),
            2 => Ok(MacAlgo::HmacSha224),
            3 => Ok(MacAlgo::HmacSha256),
            4 => Ok(MacAlgo::HmacSha384),
            5 => Ok(MacAlgo::HmacSha512),
            8 => Ok(MacAlgo::AesCmac),
            9 => Ok(MacAlgo::AesCbcMac),
            10 => Ok(MacAlgo::C2H),
            _ => Err(CofferError::HW_INVALID_ALGORITHM),
        }
    }
}

/// Symmetric key types understood by the cipher engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymKeyType {
    Aes = 1,
    Des = 2,
    TripleDes = 3,
    Arc4 = 4,
    Camellia = 5,
    C2 = 6,
    Multi2 = 7,
    AesF8 = 8,
}

impl SymKeyType {
    pub const ALL: [SymKeyType; 8] = [
        SymKeyType::Aes,
        SymKeyType::Des,
        SymKeyType::TripleDes,
        SymKeyType::Arc4,
        SymKeyType::Camellia,
        SymKeyType::C2,
        SymKeyType::Multi2,
        SymKeyType::AesF8,
    ];

    /// Cipher block size; stream ciphers report 1.
    pub fn block_size(self) -> usize {
        match self {
            SymKeyType::Aes | SymKeyType::Camellia | SymKeyType::AesF8 => 16,
            SymKeyType::Des | SymKeyType::TripleDes | SymKeyType::C2 | SymKeyType::Multi2 => 8,
            SymKeyType::Arc4 => 1,
        }
    }

    pub fn from_wire(value: u8) -> CofferResult<Self> {
        match value {
            1 => Ok(SymKeyType::Aes),
            2 => Ok(SymKeyType::Des),
            3 => Ok(SymKeyType::TripleDes),
            4 => Ok(SymKeyType::Arc4),
            5 => Ok(SymKeyType::Camellia),
            6 => Ok(SymKeyType::C2),
            7 => Ok(SymKeyType::Multi2),
            8 => Ok(SymKeyType::AesF8),
            _ => Err(CofferError::HW_INVALID_ALGORITHM),
        }
    }
}

/// Cipher feedback modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FeedbackMode {
    Ecb = 0,
    Cbc = 1,
    Ctr = 2,
    /// Integer counter mode with a 16-bit rollover window (SRTP-style).
    Icm = 3,
    F8 = 4,
    /// C2 converted cipher-block chaining.
    CCbc = 5,
    /// Keystream mode for stream ciphers (ARC4).
    Stream = 6,
}

impl FeedbackMode {
    pub fn from_wire(value: u8) -> CofferResult<Self> {
        match value {
            0 => Ok(FeedbackMode::Ecb),
            1 => Ok(FeedbackMode::Cbc),
            2 => Ok(FeedbackMode::Ctr),
            3 => Ok(FeedbackMode::Icm),
            4 => Ok(FeedbackMode::F8),
            5 => Ok(FeedbackMode::CCbc),
            6 => Ok(FeedbackMode::Stream),
            _ => Err(CofferError::HW_INVALID_MODE),
        }
    }

    /// True for modes that chain state (an IV or counter) between segments.
    pub fn uses_iv(self) -> bool {
        !matches!(self, FeedbackMode::Ecb | FeedbackMode::Stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_wire_codes_stable() {
        for algo in HashAlgo::ALL {
            assert_eq!(HashAlgo::from_wire(algo as u8), Ok(algo));
        }
        assert!(HashAlgo::from_wire(0).is_err());
        assert!(HashAlgo::from_wire(6).is_err());
    }

    #[test]
    fn test_hash_geometry() {
        assert_eq!(HashAlgo::Sha1.digest_size(), 20);
        assert_eq!(HashAlgo::Sha224.digest_size(), 28);
        assert_eq!(HashAlgo::Sha224.state_size(), 32);
        assert_eq!(HashAlgo::Sha384.state_size(), 64);
        assert_eq!(HashAlgo::Sha512.block_size(), 128);
    }

    #[test]
    fn test_mac_geometry() {
        assert_eq!(MacAlgo::AesCmac.mac_size(), 16);
        assert_eq!(MacAlgo::C2H.block_size(), 8);
        assert_eq!(MacAlgo::HmacSha512.state_size(), 64);
        assert_eq!(MacAlgo::hmac(HashAlgo::Sha256), MacAlgo::HmacSha256);
    }

    #[test]
    fn test_key_type_wire_codes_stable() {
        for kt in SymKeyType::ALL {
            assert_eq!(SymKeyType::from_wire(kt as u8), Ok(kt));
        }
        assert!(SymKeyType::from_wire(0).is_err());
        assert!(SymKeyType::from_wire(9).is_err());
    }
}
