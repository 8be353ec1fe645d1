//! Hashing primitives and the signature verification seam.
//!
//! Hashes define the identity of blocks and transactions and are computed with Keccak-256.
//! Signature schemes are supplied by the caller through [`SignatureVerifier`].

use crate::primitives::{Hash, KeyImage, PublicKey, Signature};
use sha3::{Digest, Keccak256};

pub fn fast_hash(data: &[u8]) -> Hash {
    Hash(Keccak256::digest(data).into())
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Hash(hasher.finalize().into())
}

/// Merkle root over a list of hashes. An empty list yields the zero hash and a single
/// hash is its own root.
pub fn tree_hash(hashes: &[Hash]) -> Hash {
    match hashes.len() {
        0 => Hash::zero(),
        1 => hashes[0],
        2 => hash_pair(&hashes[0], &hashes[1]),
        count => {
            // largest power of two strictly below count
            let mut cnt = 1usize << (usize::BITS - 1 - (count - 1).leading_zeros());
            let carried = 2 * cnt - count;
            let mut ints: Vec<Hash> = hashes[..carried].to_vec();
            ints.resize(cnt, Hash::zero());

            let mut i = carried;
            for j in carried..cnt {
                ints[j] = hash_pair(&hashes[i], &hashes[i + 1]);
                i += 2;
            }

            while cnt > 2 {
                cnt >>= 1;
                for j in 0..cnt {
                    ints[j] = hash_pair(&ints[2 * j], &ints[2 * j + 1]);
                }
            }

            hash_pair(&ints[0], &ints[1])
        }
    }
}

/// Whether a proof of work hash meets the difficulty, i.e. `hash * difficulty` fits in
/// 256 bits with the hash read as a little endian integer.
pub fn check_hash(hash: &Hash, difficulty: u64) -> bool {
    let mut carry: u128 = 0;
    for chunk in hash.0.chunks_exact(8) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let product = u64::from_le_bytes(word) as u128 * difficulty as u128 + carry;
        carry = product >> 64;
    }
    carry == 0
}

/// Curve and ring signature operations consumed by validation
pub trait SignatureVerifier: Send + Sync {
    /// Whether the key is a valid curve point
    fn check_key(&self, key: &PublicKey) -> bool;

    fn check_ring_signature(
        &self,
        prefix_hash: &Hash,
        key_image: &KeyImage,
        keys: &[PublicKey],
        signatures: &[Signature],
    ) -> bool;

    /// Hash used for proof of work checks
    fn pow_hash(&self, blob: &[u8]) -> Hash {
        fast_hash(blob)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hashes(n: u8) -> Vec<Hash> {
        (0..n).map(|i| fast_hash(&[i])).collect()
    }

    #[test]
    fn test_tree_hash() {
        let h = hashes(4);
        assert_eq!(tree_hash(&[]), Hash::zero());
        assert_eq!(tree_hash(&h[..1]), h[0]);
        assert_eq!(tree_hash(&h[..2]), hash_pair(&h[0], &h[1]));
        assert_eq!(
            tree_hash(&h[..3]),
            hash_pair(&h[0], &hash_pair(&h[1], &h[2]))
        );
        assert_eq!(
            tree_hash(&h),
            hash_pair(&hash_pair(&h[0], &h[1]), &hash_pair(&h[2], &h[3]))
        );
        // order matters
        let mut reversed = h.clone();
        reversed.reverse();
        assert_ne!(tree_hash(&h), tree_hash(&reversed));
    }

    #[test]
    fn test_check_hash() {
        assert!(check_hash(&Hash([0xff; 32]), 1));
        assert!(!check_hash(&Hash([0xff; 32]), 2));
        assert!(check_hash(&Hash::zero(), u64::MAX));

        let mut low = [0u8; 32];
        low[31] = 0x0f;
        assert!(check_hash(&Hash(low), 17));
        assert!(!check_hash(&Hash(low), 18));
    }
}
