/*++

Licensed under the Apache-2.0 license.

File Name:

    hash_engine.rs

Abstract:

    File contains the model's hash engine: block-level SHA compression with
    exportable intermediate state, plus Merkle-Damgard length padding driven
    by the token's total-length words.

--*/

use coffer_api::{HashAlgo, HwStatus};
use sha2::digest::block_buffer::Block;
use sha2::digest::consts::{U128, U64};

#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA1_IV: [u32; 5] = [
    0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0,
];

#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA224_IV: [u32; 8] = [
    0xc1059ed8, 0x367cd507, 0x3070dd17, 0xf70e5939,
    0xffc00b31, 0x68581511, 0x64f98fa7, 0xbefa4fa4,
];

#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a,
    0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA384_IV: [u64; 8] = [
    0xcbbb9d5dc1059ed8, 0x629a292a367cd507, 0x9159015a3070dd17, 0x152fecd8f70e5939,
    0x67332667ffc00b31, 0x8eb44a8768581511, 0xdb0c2e0d64f98fa7, 0x47b5481dbefa4fa4,
];

#[cfg_attr(rustfmt, rustfmt_skip)]
const SHA512_IV: [u64; 8] = [
    0x6a09e667f3bcc908, 0xbb67ae8584caa73b, 0x3c6ef372fe94f82b, 0xa54ff53a5f1d36f1,
    0x510e527fade682d1, 0x9b05688c2b3e6c1f, 0x1f83d9abfb41bd6b, 0x5be0cd19137e2179,
];

/// Resumable digest state. Truncated variants (SHA-224/384) run on the full
/// internal state of their parent; truncation happens at digest output only.
pub(crate) enum HashState {
    Sha1([u32; 5]),
    Sha256([u32; 8]),
    Sha512([u64; 8]),
}

impl HashState {
    pub fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Sha1 => HashState::Sha1(SHA1_IV),
            HashAlgo::Sha224 => HashState::Sha256(SHA224_IV),
            HashAlgo::Sha256 => HashState::Sha256(SHA256_IV),
            HashAlgo::Sha384 => HashState::Sha512(SHA384_IV),
            HashAlgo::Sha512 => HashState::Sha512(SHA512_IV),
        }
    }

    /// Rebuild a state exported by [`HashState::to_bytes`]. `bytes` must be
    /// exactly [`HashAlgo::state_size`] long.
    pub fn from_bytes(algo: HashAlgo, bytes: &[u8]) -> Result<Self, HwStatus> {
        if bytes.len() != algo.state_size() {
            return Err(HwStatus::InvalidLength);
        }
        Ok(match algo {
            HashAlgo::Sha1 => {
                let mut words = [0u32; 5];
                for (w, c) in words.iter_mut().zip(bytes.chunks_exact(4)) {
                    *w = u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
                }
                HashState::Sha1(words)
            }
            HashAlgo::Sha224 | HashAlgo::Sha256 => {
                let mut words = [0u32; 8];
                for (w, c) in words.iter_mut().zip(bytes.chunks_exact(4)) {
                    *w = u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
                }
                HashState::Sha256(words)
            }
            HashAlgo::Sha384 | HashAlgo::Sha512 => {
                let mut words = [0u64; 8];
                for (w, c) in words.iter_mut().zip(bytes.chunks_exact(8)) {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(c);
                    *w = u64::from_be_bytes(buf);
                }
                HashState::Sha512(words)
            }
        })
    }

    /// Export the running state, big-endian words.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HashState::Sha1(words) => words.iter().flat_map(|w| w.to_be_bytes()).collect(),
            HashState::Sha256(words) => words.iter().flat_map(|w| w.to_be_bytes()).collect(),
            HashState::Sha512(words) => words.iter().flat_map(|w| w.to_be_bytes()).collect(),
        }
    }

    pub fn block_size(&self) -> usize {
        match self {
            HashState::Sha1(_) | HashState::Sha256(_) => 64,
            HashState::Sha512(_) => 128,
        }
    }

    /// Compress whole blocks into the state. `data` must be a multiple of
    /// the block size.
    pub fn compress(&mut self, data: &[u8]) {
        match self {
            HashState::Sha1(state) => {
                let blocks: Vec<Block<U64>> = data
                    .chunks_exact(64)
                    .map(|c| *Block::<U64>::from_slice(c))
                    .collect();
                sha1::compress(state, &blocks);
            }
            HashState::Sha256(state) => {
                let blocks: Vec<Block<U64>> = data
                    .chunks_exact(64)
                    .map(|c| *Block::<U64>::from_slice(c))
                    .collect();
                sha2::compress256(state, &blocks);
            }
            HashState::Sha512(state) => {
                let blocks: Vec<Block<U128>> = data
                    .chunks_exact(128)
                    .map(|c| *Block::<U128>::from_slice(c))
                    .collect();
                sha2::compress512(state, &blocks);
            }
        }
    }

    /// Absorb the final segment, append the 0x80 / length padding for a
    /// `total_len`-byte message, and return the digest truncated to
    /// `algo.digest_size()`.
    pub fn finish(mut self, algo: HashAlgo, tail: &[u8], total_len: u64) -> Vec<u8> {
        let bs = self.block_size();
        let full = tail.len() - tail.len() % bs;
        self.compress(&tail[..full]);
        let rem = &tail[full..];

        let len_field = if bs == 64 { 8 } else { 16 };
        let mut pad = Vec::with_capacity(2 * bs);
        pad.extend_from_slice(rem);
        pad.push(0x80);
        while (pad.len() + len_field) % bs != 0 {
            pad.push(0);
        }
        let bits = (total_len as u128) * 8;
        if len_field == 16 {
            pad.extend_from_slice(&bits.to_be_bytes());
        } else {
            pad.extend_from_slice(&(bits as u64).to_be_bytes());
        }
        self.compress(&pad);

        let mut digest = self.to_bytes();
        digest.truncate(algo.digest_size());
        digest
    }
}

/// Key block for one HMAC pass: the key zero-padded to a block and XORed
/// with the pad byte (0x36 inner, 0x5C outer).
pub(crate) fn hmac_pad_block(key: &[u8], block_size: usize, pad: u8) -> Vec<u8> {
    let mut block = vec![pad; block_size];
    for (b, k) in block.iter_mut().zip(key) {
        *b ^= k;
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_shot(algo: HashAlgo, data: &[u8]) -> Vec<u8> {
        HashState::new(algo).finish(algo, data, data.len() as u64)
    }

    #[test]
    fn test_sha1_abc() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha1, b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha256, b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha224_truncates_parent_state() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha224, b"abc")),
            "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
        );
    }

    #[test]
    fn test_sha512_abc() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha512, b"abc")),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_sha384_abc() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha384, b"abc")),
            "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed\
             8086072ba1e7cc2358baeca134c825a7"
        );
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(
            hex::encode(single_shot(HashAlgo::Sha256, b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_state_export_resumes() {
        let message = [0xA7u8; 192];

        let one = single_shot(HashAlgo::Sha256, &message);

        let mut first = HashState::new(HashAlgo::Sha256);
        first.compress(&message[..64]);
        let exported = first.to_bytes();
        let resumed = HashState::from_bytes(HashAlgo::Sha256, &exported).unwrap();
        let split = resumed.finish(HashAlgo::Sha256, &message[64..], message.len() as u64);
        assert_eq!(one, split);
    }

    #[test]
    fn test_state_length_checked() {
        assert_eq!(
            HashState::from_bytes(HashAlgo::Sha512, &[0; 32]).err(),
            Some(HwStatus::InvalidLength)
        );
    }

    #[test]
    fn test_multiblock_final_tail() {
        // A final segment longer than one block compresses its whole blocks
        // before padding.
        let message = [0x11u8; 150];
        let one = single_shot(HashAlgo::Sha1, &message);

        let mut st = HashState::new(HashAlgo::Sha1);
        st.compress(&message[..64]);
        let split = st.finish(HashAlgo::Sha1, &message[64..], message.len() as u64);
        assert_eq!(one, split);
    }
}
