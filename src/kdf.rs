//! Hash and key-derivation primitives.
//!
//! The random function `H` is HMAC-SHA-256 and the stretching KDF is the
//! counter-mode construction from IEEE Std 802.11-2020 12.7.1.6.2, with
//! little-endian counter and length fields.

use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

pub const HASH_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// `H(key, data_1 || data_2 || ..)`.
pub fn hash(key: &[u8], parts: &[&[u8]]) -> [u8; HASH_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// `KDF-Hash-Length(key, label, context)` producing `bits` bits.
///
/// Output is `(bits + 7) / 8` bytes with surplus low bits of the final byte
/// cleared.
pub fn kdf_hash_length(key: &[u8], label: &str, context: &[u8], bits: usize) -> Vec<u8> {
    let length = u16::try_from(bits).expect("KDF output length fits u16");
    let iterations = bits.div_ceil(8 * HASH_LEN);
    let mut out = Vec::with_capacity(iterations * HASH_LEN);
    for counter in 1..=iterations as u16 {
        out.extend_from_slice(&hash(
            key,
            &[
                &counter.to_le_bytes(),
                label.as_bytes(),
                context,
                &length.to_le_bytes(),
            ],
        ));
    }
    out.truncate(bits.div_ceil(8));
    if bits % 8 != 0 {
        if let Some(last) = out.last_mut() {
            *last &= 0xff << (8 - bits % 8);
        }
    }
    out
}

/// Confirm digest `CN(KCK, send_confirm, scA, elA, scB, elB)`.
pub fn confirm_digest(
    kck: &[u8],
    send_confirm: u16,
    own_scalar: &[u8],
    own_element: &[u8],
    peer_scalar: &[u8],
    peer_element: &[u8],
) -> [u8; HASH_LEN] {
    hash(
        kck,
        &[
            &send_confirm.to_le_bytes(),
            own_scalar,
            own_element,
            peer_scalar,
            peer_element,
        ],
    )
}

#[cfg(test)]
mod tests {
    use {super::*, hex_literal::hex};

    #[test]
    fn test_hmac_sha256_rfc4231_vector() {
        // RFC 4231 test case 2.
        let digest = hash(b"Jefe", &[b"what do ya want ", b"for nothing?"]);
        assert_eq!(
            digest,
            hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
        assert_eq!(
            hex::encode(digest),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hash_matches_concatenation() {
        let split = hash(b"key", &[b"hello ", b"world"]);
        let joined = hash(b"key", &[b"hello world"]);
        assert_eq!(split, joined);
        assert_ne!(split, hash(b"other", &[b"hello world"]));
    }

    #[test]
    fn test_kdf_lengths() {
        let key = [0x5c; 32];
        assert_eq!(kdf_hash_length(&key, "label", b"ctx", 256).len(), 32);
        assert_eq!(kdf_hash_length(&key, "label", b"ctx", 512).len(), 64);
        assert_eq!(kdf_hash_length(&key, "label", b"ctx", 521).len(), 66);
    }

    #[test]
    fn test_kdf_binds_length() {
        // The requested length is mixed into every block, so truncating a
        // longer output does not yield a shorter one.
        let key = [0xa7; 32];
        let short = kdf_hash_length(&key, "label", b"ctx", 256);
        let long = kdf_hash_length(&key, "label", b"ctx", 512);
        assert_ne!(short, long[..32]);
        assert_eq!(short, kdf_hash_length(&key, "label", b"ctx", 256));
    }

    #[test]
    fn test_kdf_masks_partial_byte() {
        let key = [0x11; 32];
        let out = kdf_hash_length(&key, "label", b"ctx", 521);
        // 521 = 65 * 8 + 1: only the top bit of the last byte survives.
        assert_eq!(out[65] & 0x7f, 0);
    }

    #[test]
    fn test_confirm_digest_depends_on_counter() {
        let kck = [9; 32];
        let a = confirm_digest(&kck, 1, b"s1", b"e1", b"s2", b"e2");
        let b = confirm_digest(&kck, 2, b"s1", b"e1", b"s2", b"e2");
        assert_ne!(a, b);
    }
}
