// Licensed under the Apache-2.0 license

//! Asset identifiers and the policy bitmask.
//!
//! The policy word travels on the wire as a raw `u32` and every bit of it,
//! including the undefined ones, participates in the module's type-equality
//! computation. The only widening path from `u32` is [`AssetPolicy::from_wire`],
//! which refuses undefined bits, and the only path into business logic is
//! [`KeyShape::classify`], which refuses masks that do not describe a
//! recognized key shape.

use crate::algo::{HashAlgo, SymKeyType};
use coffer_error::{CofferError, CofferResult};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Opaque handle into the hardware asset store. Zero is the reserved
/// invalid sentinel; valid IDs are only ever minted by the module.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoBytes, FromBytes, Immutable, KnownLayout,
)]
pub struct AssetId(pub u32);

impl AssetId {
    pub const INVALID: AssetId = AssetId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<AssetId> for u32 {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

bitflags::bitflags! {
    /// Asset policy mask. Field groups are disjoint and fixed at allocation:
    /// bits 0..4 cipher algorithms, 5..9 HMAC algorithms, 10..14 asset
    /// roles, 15..19 functions, 20..23 trusted operations. Bits 24..31 are
    /// undefined; `from_bits` refusing them is the wire-level "unused bits
    /// corrupt the type" rule.
    #[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
    pub struct AssetPolicy : u32 {
        // Cipher algorithm group
        const ALGO_AES      = 1 << 0;
        const ALGO_TDES     = 1 << 1;
        const ALGO_CAMELLIA = 1 << 2;
        const ALGO_MULTI2   = 1 << 3;
        const ALGO_C2       = 1 << 4;

        // HMAC algorithm group
        const HMAC_SHA1     = 1 << 5;
        const HMAC_SHA224   = 1 << 6;
        const HMAC_SHA256   = 1 << 7;
        const HMAC_SHA384   = 1 << 8;
        const HMAC_SHA512   = 1 << 9;

        // Asset role group
        const ROLE_IV         = 1 << 10;
        const ROLE_COUNTER    = 1 << 11;
        const ROLE_TEMP_MAC   = 1 << 12;
        const ROLE_CCBC_STATE = 1 << 13;
        const ROLE_AUTH_STATE = 1 << 14;

        // Function group
        const FUNC_ENCRYPT        = 1 << 15;
        const FUNC_DECRYPT        = 1 << 16;
        const FUNC_MAC            = 1 << 17;
        const FUNC_C2_DERIVE_AKC  = 1 << 18;
        const FUNC_C2_DERIVE_SKC  = 1 << 19;

        // Trusted operation group
        const TRUSTED_DERIVE = 1 << 20;
        const SECURE_DERIVE  = 1 << 21;
        const SECURE_WRAP    = 1 << 22;
        const SECURE_UNWRAP  = 1 << 23;
    }
}

impl AssetPolicy {
    pub const CIPHER_ALGO_GROUP: AssetPolicy = AssetPolicy::ALGO_AES
        .union(AssetPolicy::ALGO_TDES)
        .union(AssetPolicy::ALGO_CAMELLIA)
        .union(AssetPolicy::ALGO_MULTI2)
        .union(AssetPolicy::ALGO_C2);

    pub const HMAC_ALGO_GROUP: AssetPolicy = AssetPolicy::HMAC_SHA1
        .union(AssetPolicy::HMAC_SHA224)
        .union(AssetPolicy::HMAC_SHA256)
        .union(AssetPolicy::HMAC_SHA384)
        .union(AssetPolicy::HMAC_SHA512);

    pub const ROLE_GROUP: AssetPolicy = AssetPolicy::ROLE_IV
        .union(AssetPolicy::ROLE_COUNTER)
        .union(AssetPolicy::ROLE_TEMP_MAC)
        .union(AssetPolicy::ROLE_CCBC_STATE)
        .union(AssetPolicy::ROLE_AUTH_STATE);

    pub const FUNC_GROUP: AssetPolicy = AssetPolicy::FUNC_ENCRYPT
        .union(AssetPolicy::FUNC_DECRYPT)
        .union(AssetPolicy::FUNC_MAC)
        .union(AssetPolicy::FUNC_C2_DERIVE_AKC)
        .union(AssetPolicy::FUNC_C2_DERIVE_SKC);

    pub const TRUSTED_GROUP: AssetPolicy = AssetPolicy::TRUSTED_DERIVE
        .union(AssetPolicy::SECURE_DERIVE)
        .union(AssetPolicy::SECURE_WRAP)
        .union(AssetPolicy::SECURE_UNWRAP);

    /// Validate a raw wire policy word. Any bit outside the defined field
    /// groups invalidates the whole mask.
    pub fn from_wire(raw: u32) -> CofferResult<Self> {
        AssetPolicy::from_bits(raw).ok_or(CofferError::API_POLICY_UNUSED_BITS)
    }

    /// The policy algorithm bit for a cipher key type; `None` for key types
    /// whose state never enters the asset store (DES single-length, ARC4,
    /// and the f8 variant share the plain algorithm bits of their family).
    pub fn cipher_algo_bit(key_type: SymKeyType) -> Option<AssetPolicy> {
        match key_type {
            SymKeyType::Aes | SymKeyType::AesF8 => Some(AssetPolicy::ALGO_AES),
            SymKeyType::Des | SymKeyType::TripleDes => Some(AssetPolicy::ALGO_TDES),
            SymKeyType::Camellia => Some(AssetPolicy::ALGO_CAMELLIA),
            SymKeyType::Multi2 => Some(AssetPolicy::ALGO_MULTI2),
            SymKeyType::C2 => Some(AssetPolicy::ALGO_C2),
            SymKeyType::Arc4 => None,
        }
    }

    pub fn hmac_algo_bit(hash: HashAlgo) -> AssetPolicy {
        match hash {
            HashAlgo::Sha1 => AssetPolicy::HMAC_SHA1,
            HashAlgo::Sha224 => AssetPolicy::HMAC_SHA224,
            HashAlgo::Sha256 => AssetPolicy::HMAC_SHA256,
            HashAlgo::Sha384 => AssetPolicy::HMAC_SHA384,
            HashAlgo::Sha512 => AssetPolicy::HMAC_SHA512,
        }
    }
}

/// Cipher algorithms a key-shaped policy can name (exactly one bit of the
/// cipher group).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgo {
    Aes,
    TripleDes,
    Camellia,
    Multi2,
    C2,
}

impl CipherAlgo {
    fn from_single_bit(bits: AssetPolicy) -> Option<Self> {
        match bits {
            AssetPolicy::ALGO_AES => Some(CipherAlgo::Aes),
            AssetPolicy::ALGO_TDES => Some(CipherAlgo::TripleDes),
            AssetPolicy::ALGO_CAMELLIA => Some(CipherAlgo::Camellia),
            AssetPolicy::ALGO_MULTI2 => Some(CipherAlgo::Multi2),
            AssetPolicy::ALGO_C2 => Some(CipherAlgo::C2),
            _ => None,
        }
    }
}

/// Temporary-asset roles (exactly one bit of the role group, nothing else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Iv,
    Counter,
    TempMac,
    CcbcState,
    AuthState,
}

impl AssetRole {
    pub fn policy(self) -> AssetPolicy {
        match self {
            AssetRole::Iv => AssetPolicy::ROLE_IV,
            AssetRole::Counter => AssetPolicy::ROLE_COUNTER,
            AssetRole::TempMac => AssetPolicy::ROLE_TEMP_MAC,
            AssetRole::CcbcState => AssetPolicy::ROLE_CCBC_STATE,
            AssetRole::AuthState => AssetPolicy::ROLE_AUTH_STATE,
        }
    }

    fn from_single_bit(bits: AssetPolicy) -> Option<Self> {
        match bits {
            AssetPolicy::ROLE_IV => Some(AssetRole::Iv),
            AssetPolicy::ROLE_COUNTER => Some(AssetRole::Counter),
            AssetPolicy::ROLE_TEMP_MAC => Some(AssetRole::TempMac),
            AssetPolicy::ROLE_CCBC_STATE => Some(AssetRole::CcbcState),
            AssetPolicy::ROLE_AUTH_STATE => Some(AssetRole::AuthState),
            _ => None,
        }
    }
}

/// The closed set of recognized policy shapes. Exactly one shape matches
/// any valid mask; an allocate request whose mask matches none fails before
/// a token is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Cipher key: one cipher algorithm bit plus a non-empty subset of
    /// {Encrypt, Decrypt}.
    CipherKey {
        algo: CipherAlgo,
        encrypt: bool,
        decrypt: bool,
    },

    /// Cipher-MAC key: one cipher algorithm bit plus the Mac function.
    CipherMacKey { algo: CipherAlgo },

    /// HMAC key: one HMAC algorithm bit plus the Mac function.
    HmacKey { hash: HashAlgo },

    /// C2 derive key: the C2 algorithm bit plus one or both of the C2
    /// derive sub-functions.
    C2DeriveKey { akc: bool, skc: bool },

    /// Streaming-state asset: exactly one role bit, nothing else.
    RoleAsset { role: AssetRole },

    /// Key-derivation key: exactly one of the derive trust bits.
    Kdk { trusted: bool },

    /// Key-encrypting key: wrap, unwrap, or both.
    Kek { wrap: bool, unwrap: bool },
}

impl KeyShape {
    /// Classify a validated policy mask into the single shape it describes.
    pub fn classify(policy: AssetPolicy) -> CofferResult<KeyShape> {
        let cipher = policy & AssetPolicy::CIPHER_ALGO_GROUP;
        let hmac = policy & AssetPolicy::HMAC_ALGO_GROUP;
        let role = policy & AssetPolicy::ROLE_GROUP;
        let func = policy & AssetPolicy::FUNC_GROUP;
        let trusted = policy & AssetPolicy::TRUSTED_GROUP;

        // Role assets carry the role bit alone.
        if !role.is_empty() {
            if policy != role {
                return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE);
            }
            let role = AssetRole::from_single_bit(role)
                .ok_or(CofferError::API_POLICY_UNRECOGNIZED_SHAPE)?;
            return Ok(KeyShape::RoleAsset { role });
        }

        // Trusted-operation shapes carry no algorithm or function bits.
        if !trusted.is_empty() {
            if !cipher.is_empty() || !hmac.is_empty() || !func.is_empty() {
                return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE);
            }
            let wrap = policy.contains(AssetPolicy::SECURE_WRAP);
            let unwrap = policy.contains(AssetPolicy::SECURE_UNWRAP);
            let t_derive = policy.contains(AssetPolicy::TRUSTED_DERIVE);
            let s_derive = policy.contains(AssetPolicy::SECURE_DERIVE);
            return match (wrap || unwrap, t_derive, s_derive) {
                (true, false, false) => Ok(KeyShape::Kek { wrap, unwrap }),
                (false, true, false) => Ok(KeyShape::Kdk { trusted: true }),
                (false, false, true) => Ok(KeyShape::Kdk { trusted: false }),
                _ => Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE),
            };
        }

        if !hmac.is_empty() {
            if !cipher.is_empty() || func != AssetPolicy::FUNC_MAC {
                return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE);
            }
            let hash = match hmac {
                AssetPolicy::HMAC_SHA1 => HashAlgo::Sha1,
                AssetPolicy::HMAC_SHA224 => HashAlgo::Sha224,
                AssetPolicy::HMAC_SHA256 => HashAlgo::Sha256,
                AssetPolicy::HMAC_SHA384 => HashAlgo::Sha384,
                AssetPolicy::HMAC_SHA512 => HashAlgo::Sha512,
                _ => return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE),
            };
            return Ok(KeyShape::HmacKey { hash });
        }

        if !cipher.is_empty() {
            let algo = CipherAlgo::from_single_bit(cipher)
                .ok_or(CofferError::API_POLICY_UNRECOGNIZED_SHAPE)?;

            let akc = policy.contains(AssetPolicy::FUNC_C2_DERIVE_AKC);
            let skc = policy.contains(AssetPolicy::FUNC_C2_DERIVE_SKC);
            if akc || skc {
                if algo != CipherAlgo::C2
                    || !(policy & AssetPolicy::FUNC_GROUP
                        & !(AssetPolicy::FUNC_C2_DERIVE_AKC | AssetPolicy::FUNC_C2_DERIVE_SKC))
                        .is_empty()
                {
                    return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE);
                }
                return Ok(KeyShape::C2DeriveKey { akc, skc });
            }

            if func == AssetPolicy::FUNC_MAC {
                return Ok(KeyShape::CipherMacKey { algo });
            }

            let encrypt = policy.contains(AssetPolicy::FUNC_ENCRYPT);
            let decrypt = policy.contains(AssetPolicy::FUNC_DECRYPT);
            if (encrypt || decrypt)
                && func
                    == (policy
                        & (AssetPolicy::FUNC_ENCRYPT | AssetPolicy::FUNC_DECRYPT))
            {
                return Ok(KeyShape::CipherKey {
                    algo,
                    encrypt,
                    decrypt,
                });
            }
            return Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE);
        }

        Err(CofferError::API_POLICY_UNRECOGNIZED_SHAPE)
    }

    /// Validate a raw wire word and classify it in one step.
    pub fn classify_wire(raw: u32) -> CofferResult<KeyShape> {
        KeyShape::classify(AssetPolicy::from_wire(raw)?)
    }
}
