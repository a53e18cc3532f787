/*++

Licensed under the Apache-2.0 license.

File Name:

    router.rs

Abstract:

    File contains the algorithm router: the (key type, feedback mode)
    legality table, the per-family key-length table, and the capability
    gate. Everything here fails before a token is built.

--*/

use coffer_api::{CofferCapabilities, FeedbackMode, HashAlgo, MacAlgo, SymKeyType};
use coffer_error::{CofferError, CofferResult};

/// Modes each key type can run. Pairs outside this table are refused with
/// no hardware contact.
pub(crate) fn mode_supported(key_type: SymKeyType, mode: FeedbackMode) -> bool {
    match key_type {
        SymKeyType::Aes => matches!(
            mode,
            FeedbackMode::Ecb | FeedbackMode::Cbc | FeedbackMode::Ctr | FeedbackMode::Icm
        ),
        SymKeyType::AesF8 => matches!(mode, FeedbackMode::F8),
        SymKeyType::Des | SymKeyType::TripleDes => {
            matches!(mode, FeedbackMode::Ecb | FeedbackMode::Cbc)
        }
        SymKeyType::Camellia => matches!(mode, FeedbackMode::Ecb | FeedbackMode::Cbc),
        SymKeyType::Multi2 => matches!(mode, FeedbackMode::Ecb | FeedbackMode::Cbc),
        SymKeyType::C2 => matches!(mode, FeedbackMode::Ecb | FeedbackMode::CCbc),
        SymKeyType::Arc4 => matches!(mode, FeedbackMode::Stream),
    }
}

/// Key-length legality per key type, in bytes.
pub(crate) fn key_len_legal(key_type: SymKeyType, len: usize) -> bool {
    match key_type {
        SymKeyType::Aes | SymKeyType::Camellia | SymKeyType::AesF8 => {
            matches!(len, 16 | 24 | 32)
        }
        SymKeyType::Des => len == 8,
        SymKeyType::TripleDes => len == 24,
        SymKeyType::Arc4 => (1..=256).contains(&len),
        SymKeyType::C2 => len == 7,
        SymKeyType::Multi2 => len == 8,
    }
}

/// Route a cipher request: mode table, key-length table, capability gate,
/// in that order.
pub(crate) fn route_cipher(
    caps: CofferCapabilities,
    key_type: SymKeyType,
    mode: FeedbackMode,
    key_len: usize,
) -> CofferResult<()> {
    if !mode_supported(key_type, mode) {
        return Err(CofferError::DRIVER_ROUTER_UNSUPPORTED_MODE);
    }
    if !key_len_legal(key_type, key_len) {
        return Err(CofferError::DRIVER_ROUTER_KEY_LENGTH);
    }
    if !caps.supports_cipher(key_type, mode) {
        return Err(CofferError::DRIVER_ROUTER_FEATURE_UNAVAILABLE);
    }
    Ok(())
}

pub(crate) fn route_hash(caps: CofferCapabilities, algo: HashAlgo) -> CofferResult<()> {
    if !caps.supports_hash(algo) {
        return Err(CofferError::DRIVER_ROUTER_FEATURE_UNAVAILABLE);
    }
    Ok(())
}

pub(crate) fn route_mac(caps: CofferCapabilities, algo: MacAlgo) -> CofferResult<()> {
    if !caps.supports_mac(algo) {
        return Err(CofferError::DRIVER_ROUTER_FEATURE_UNAVAILABLE);
    }
    Ok(())
}

/// MAC key-length legality. HMAC accepts any non-empty key (oversized keys
/// are pre-hashed by the HMAC dispatcher before they reach a token); the
/// cipher-backed MACs inherit their cipher's table.
pub(crate) fn mac_key_len_legal(algo: MacAlgo, len: usize) -> bool {
    match algo {
        MacAlgo::AesCmac | MacAlgo::AesCbcMac => key_len_legal(SymKeyType::Aes, len),
        MacAlgo::C2H => key_len_legal(SymKeyType::C2, len),
        _ => len > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_table() {
        assert!(mode_supported(SymKeyType::Aes, FeedbackMode::Ctr));
        assert!(!mode_supported(SymKeyType::Aes, FeedbackMode::F8));
        assert!(!mode_supported(SymKeyType::Aes, FeedbackMode::CCbc));
        assert!(mode_supported(SymKeyType::AesF8, FeedbackMode::F8));
        assert!(!mode_supported(SymKeyType::AesF8, FeedbackMode::Cbc));
        assert!(mode_supported(SymKeyType::C2, FeedbackMode::CCbc));
        assert!(!mode_supported(SymKeyType::TripleDes, FeedbackMode::Ctr));
        assert!(mode_supported(SymKeyType::Arc4, FeedbackMode::Stream));
        assert!(!mode_supported(SymKeyType::Arc4, FeedbackMode::Ecb));
    }

    #[test]
    fn test_key_length_table() {
        assert!(key_len_legal(SymKeyType::Aes, 16));
        assert!(key_len_legal(SymKeyType::Aes, 24));
        assert!(key_len_legal(SymKeyType::Aes, 32));
        assert!(!key_len_legal(SymKeyType::Aes, 20));
        assert!(key_len_legal(SymKeyType::Des, 8));
        assert!(!key_len_legal(SymKeyType::Des, 16));
        assert!(key_len_legal(SymKeyType::TripleDes, 24));
        assert!(!key_len_legal(SymKeyType::TripleDes, 16));
        assert!(key_len_legal(SymKeyType::Arc4, 1));
        assert!(key_len_legal(SymKeyType::Arc4, 256));
        assert!(!key_len_legal(SymKeyType::Arc4, 0));
        assert!(!key_len_legal(SymKeyType::Arc4, 257));
        assert!(key_len_legal(SymKeyType::C2, 7));
        assert!(!key_len_legal(SymKeyType::C2, 8));
        assert!(key_len_legal(SymKeyType::Multi2, 8));
    }

    #[test]
    fn test_route_order_mode_before_capability() {
        // An unsupported pair reports the mode error even when the engine
        // family itself is absent.
        let caps = CofferCapabilities::empty();
        assert_eq!(
            route_cipher(caps, SymKeyType::Aes, FeedbackMode::F8, 16),
            Err(CofferError::DRIVER_ROUTER_UNSUPPORTED_MODE)
        );
        assert_eq!(
            route_cipher(caps, SymKeyType::Aes, FeedbackMode::Cbc, 17),
            Err(CofferError::DRIVER_ROUTER_KEY_LENGTH)
        );
        assert_eq!(
            route_cipher(caps, SymKeyType::Aes, FeedbackMode::Cbc, 16),
            Err(CofferError::DRIVER_ROUTER_FEATURE_UNAVAILABLE)
        );
        let caps = CofferCapabilities::AES;
        assert_eq!(route_cipher(caps, SymKeyType::Aes, FeedbackMode::Cbc, 16), Ok(()));
    }

    #[test]
    fn test_mac_key_lengths() {
        assert!(mac_key_len_legal(MacAlgo::AesCmac, 16));
        assert!(!mac_key_len_legal(MacAlgo::AesCmac, 20));
        assert!(mac_key_len_legal(MacAlgo::C2H, 7));
        assert!(mac_key_len_legal(MacAlgo::HmacSha256, 200));
        assert!(!mac_key_len_legal(MacAlgo::HmacSha256, 0));
    }
}
