//! Key hierarchy derived from a completed commit exchange.

use {
    crate::{
        field::{uint_to_be_bytes, SaeUint},
        group::{Element, Group},
        kdf,
    },
    zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing},
};

pub const KCK_LEN: usize = 32;
pub const PMK_LEN: usize = 32;
pub const PMKID_LEN: usize = 16;

const KEY_LABEL: &str = "SAE KCK and PMK";

/// Keys produced by a successful handshake.
///
/// The key confirmation key never leaves the engine; the PMK and PMKID are
/// handed to the caller on establishment.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub kck:   [u8; KCK_LEN],
    pub pmk:   [u8; PMK_LEN],
    pub pmkid: [u8; PMKID_LEN],
}

/// Derives KCK, PMK and PMKID from the shared element and both scalars.
///
/// keyseed = H(0^32, k), then KCK || PMK = KDF(keyseed, label, scA + scB
/// mod r). The PMKID is the leading bytes of the same scalar sum, so both
/// peers name the cached PMK identically.
pub(crate) fn derive_keys(
    group: &Group,
    shared: &Element<'_>,
    own_scalar: SaeUint,
    peer_scalar: SaeUint,
) -> KeyMaterial {
    let k = Zeroizing::new(group.secret_bytes(shared));
    let keyseed = Zeroizing::new(kdf::hash(&[0; kdf::HASH_LEN], &[k.as_slice()]));

    let order = group.scalar_field().modulus();
    let sum = own_scalar.add_mod(peer_scalar, order);
    let context = uint_to_be_bytes(&sum, group.scalar_len());

    let stream = Zeroizing::new(kdf::kdf_hash_length(
        keyseed.as_slice(),
        KEY_LABEL,
        &context,
        8 * (KCK_LEN + PMK_LEN),
    ));
    let mut keys = KeyMaterial {
        kck:   [0; KCK_LEN],
        pmk:   [0; PMK_LEN],
        pmkid: [0; PMKID_LEN],
    };
    keys.kck.copy_from_slice(&stream[..KCK_LEN]);
    keys.pmk.copy_from_slice(&stream[KCK_LEN..]);
    keys.pmkid.copy_from_slice(&context[..PMKID_LEN]);
    keys
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::group::{find, GroupId},
    };

    #[test]
    fn test_scalar_sum_is_symmetric() {
        let group = find(GroupId(19)).unwrap();
        let shared = Element::Ec(group.as_ec().unwrap().generator());
        let (a, b) = (SaeUint::from(0x1111_u64), SaeUint::from(0x2222_u64));
        let ab = derive_keys(group, &shared, a, b);
        let ba = derive_keys(group, &shared, b, a);
        assert_eq!(ab.kck, ba.kck);
        assert_eq!(ab.pmk, ba.pmk);
        assert_eq!(ab.pmkid, ba.pmkid);
    }

    #[test]
    fn test_keys_depend_on_shared_element() {
        let group = find(GroupId(19)).unwrap();
        let curve = group.as_ec().unwrap();
        let (a, b) = (SaeUint::from(3_u64), SaeUint::from(5_u64));
        let one = derive_keys(group, &Element::Ec(curve.generator()), a, b);
        let two = derive_keys(
            group,
            &Element::Ec(curve.generator().mul_uint(SaeUint::from(2_u64))),
            a,
            b,
        );
        assert_ne!(one.pmk, two.pmk);
        // Same scalar sum, same PMKID; the PMKID names the exchange, not
        // the key.
        assert_eq!(one.pmkid, two.pmkid);
    }
}
